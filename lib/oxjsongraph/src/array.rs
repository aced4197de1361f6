use crate::node::{JsonNode, NodeIdentity};
use std::cell::{Ref, RefCell};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::rc::Rc;

/// A shared JSON array.
///
/// Like [`JsonObject`](crate::JsonObject), a `JsonArray` is a cheap-to-clone handle
/// with identity semantics, so an array can contain itself:
///
/// ```
/// use oxjsongraph::JsonArray;
///
/// let list = JsonArray::new();
/// list.push(list.clone());
/// assert!(list.get(0).unwrap().as_array().unwrap().same(&list));
/// ```
#[derive(Default, Clone)]
pub struct JsonArray(Rc<RefCell<Vec<JsonNode>>>);

impl JsonArray {
    /// Creates an empty array.
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    /// The identity key of this array, distinguishing it from any other live composite.
    #[inline]
    pub fn identity(&self) -> NodeIdentity {
        NodeIdentity::new(Rc::as_ptr(&self.0).addr())
    }

    /// Checks if both handles refer to the same underlying array.
    #[inline]
    pub fn same(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    /// Appends an element.
    pub fn push(&self, value: impl Into<JsonNode>) {
        self.0.borrow_mut().push(value.into());
    }

    /// The element at `index`, if any.
    pub fn get(&self, index: usize) -> Option<JsonNode> {
        self.0.borrow().get(index).cloned()
    }

    /// Replaces the element at `index`, returning the previous element,
    /// or `None` without effect when `index` is out of bounds.
    pub fn set(&self, index: usize, value: impl Into<JsonNode>) -> Option<JsonNode> {
        let mut elements = self.0.borrow_mut();
        let slot = elements.get_mut(index)?;
        Some(std::mem::replace(slot, value.into()))
    }

    /// The number of elements.
    #[inline]
    pub fn len(&self) -> usize {
        self.0.borrow().len()
    }

    /// Checks if the array has no element.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.0.borrow().is_empty()
    }

    /// Borrows the elements.
    ///
    /// The borrow is shared: reading nested composites while it is held is fine,
    /// mutating this array is not.
    #[inline]
    pub fn entries(&self) -> Ref<'_, [JsonNode]> {
        Ref::map(self.0.borrow(), Vec::as_slice)
    }
}

impl PartialEq for JsonArray {
    #[inline]
    fn eq(&self, other: &Self) -> bool {
        self.same(other)
    }
}

impl Eq for JsonArray {}

impl Hash for JsonArray {
    #[inline]
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.identity().hash(state);
    }
}

impl fmt::Debug for JsonArray {
    /// Intentionally shallow: the graph below this array may contain cycles.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "JsonArray({} elements, {:?})", self.len(), self.identity())
    }
}

impl FromIterator<JsonNode> for JsonArray {
    fn from_iter<I: IntoIterator<Item = JsonNode>>(iter: I) -> Self {
        let array = Self::new();
        for value in iter {
            array.push(value);
        }
        array
    }
}
