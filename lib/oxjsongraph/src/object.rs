use crate::node::{JsonNode, NodeIdentity};
use std::cell::{Ref, RefCell};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::rc::Rc;

/// A shared, insertion-ordered JSON object.
///
/// A `JsonObject` is a cheap-to-clone handle: clones refer to the same underlying
/// members, so mutating through one handle is visible through all of them. This is
/// what allows cyclic and shared document graphs to be built:
///
/// ```
/// use oxjsongraph::JsonObject;
///
/// let employee = JsonObject::new();
/// employee.insert("Name", "Bob");
/// employee.insert("Manager", employee.clone()); // self reference
/// assert!(employee.get("Manager").unwrap().as_object().unwrap().same(&employee));
/// ```
///
/// Equality and hashing are by identity, not by contents: two independently built
/// objects with equal members are not equal. Contents-based equality is not provided
/// because it is not well-defined on cyclic graphs.
#[derive(Default, Clone)]
pub struct JsonObject(Rc<RefCell<Vec<(String, JsonNode)>>>);

impl JsonObject {
    /// Creates an empty object.
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    /// The identity key of this object, distinguishing it from any other live composite.
    #[inline]
    pub fn identity(&self) -> NodeIdentity {
        NodeIdentity::new(Rc::as_ptr(&self.0).addr())
    }

    /// Checks if both handles refer to the same underlying object.
    #[inline]
    pub fn same(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    /// The value of the member named `key`, if any.
    pub fn get(&self, key: &str) -> Option<JsonNode> {
        self.0
            .borrow()
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.clone())
    }

    /// Checks the presence of a member named `key`.
    pub fn contains_key(&self, key: &str) -> bool {
        self.0.borrow().iter().any(|(k, _)| k == key)
    }

    /// Inserts a member, replacing in place and returning any member already named `key`.
    ///
    /// A fresh key is appended, so members enumerate in insertion order.
    pub fn insert(&self, key: impl Into<String>, value: impl Into<JsonNode>) -> Option<JsonNode> {
        let key = key.into();
        let value = value.into();
        let mut members = self.0.borrow_mut();
        if let Some((_, slot)) = members.iter_mut().find(|(k, _)| *k == key) {
            Some(std::mem::replace(slot, value))
        } else {
            members.push((key, value));
            None
        }
    }

    /// Removes and returns the member named `key`, if any.
    pub fn remove(&self, key: &str) -> Option<JsonNode> {
        let mut members = self.0.borrow_mut();
        let position = members.iter().position(|(k, _)| k == key)?;
        Some(members.remove(position).1)
    }

    /// The number of members.
    #[inline]
    pub fn len(&self) -> usize {
        self.0.borrow().len()
    }

    /// Checks if the object has no member.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.0.borrow().is_empty()
    }

    /// Borrows the members in insertion order.
    ///
    /// The borrow is shared: reading nested composites while it is held is fine,
    /// mutating this object is not.
    #[inline]
    pub fn entries(&self) -> Ref<'_, [(String, JsonNode)]> {
        Ref::map(self.0.borrow(), Vec::as_slice)
    }
}

impl PartialEq for JsonObject {
    #[inline]
    fn eq(&self, other: &Self) -> bool {
        self.same(other)
    }
}

impl Eq for JsonObject {}

impl Hash for JsonObject {
    #[inline]
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.identity().hash(state);
    }
}

impl fmt::Debug for JsonObject {
    /// Intentionally shallow: the graph below this object may contain cycles.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "JsonObject({} members, {:?})", self.len(), self.identity())
    }
}

impl FromIterator<(String, JsonNode)> for JsonObject {
    fn from_iter<I: IntoIterator<Item = (String, JsonNode)>>(iter: I) -> Self {
        let object = Self::new();
        for (key, value) in iter {
            object.insert(key, value);
        }
        object
    }
}
