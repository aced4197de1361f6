use crate::error::JsonRefSerializeError;
use crate::handling::ReferenceHandling;
use crate::path::JsonPath;
#[cfg(feature = "async-tokio")]
use json_event_parser::TokioAsyncWriterJsonSerializer;
use json_event_parser::{JsonEvent, WriterJsonSerializer};
use oxjsongraph::{JsonNode, NodeIdentity};
use rustc_hash::{FxHashMap, FxHashSet};
use std::io::Write;
#[cfg(feature = "async-tokio")]
use tokio::io::AsyncWrite;

/// A serializer for JSON document graphs with configurable reference handling.
///
/// Shared composites are tracked by identity according to the configured
/// [`ReferenceHandling`]; in [`Preserve`](ReferenceHandling::Preserve) mode the
/// output carries `$id`/`$ref`/`$values` metadata so that cycles and sharing
/// survive a round-trip through [`JsonRefParser`](crate::JsonRefParser).
///
/// No output is written before the whole document has been traversed, so a
/// failing graph never commits partial output.
///
/// ```
/// use oxjsongraph::JsonObject;
/// use oxjsonref::{JsonRefSerializer, ReferenceHandling};
///
/// let employee = JsonObject::new();
/// employee.insert("Name", "Angela");
/// employee.insert("Manager", employee.clone());
///
/// let buffer = JsonRefSerializer::new()
///     .with_reference_handling(ReferenceHandling::Preserve)
///     .serialize_to_writer(Vec::new(), &employee.into())?;
/// assert_eq!(buffer, br#"{"$id":"1","Name":"Angela","Manager":{"$ref":"1"}}"#);
/// # Result::<_, oxjsonref::JsonRefSerializeError>::Ok(())
/// ```
#[derive(Clone)]
#[must_use]
pub struct JsonRefSerializer {
    handling: ReferenceHandling,
    max_depth: usize,
    ignore_null_values: bool,
}

impl JsonRefSerializer {
    /// Builds a new [`JsonRefSerializer`] with the
    /// [`Default`](ReferenceHandling::Default) policy and a depth ceiling of 64.
    #[inline]
    pub fn new() -> Self {
        Self {
            handling: ReferenceHandling::Default,
            max_depth: 64,
            ignore_null_values: false,
        }
    }

    /// Sets the reference-handling policy applied to shared composites.
    #[inline]
    pub fn with_reference_handling(mut self, handling: ReferenceHandling) -> Self {
        self.handling = handling;
        self
    }

    /// Sets the nesting ceiling, enforced whatever the policy.
    ///
    /// In [`Default`](ReferenceHandling::Default) mode this is also what
    /// terminates traversal of cyclic graphs, with
    /// [`CycleDetected`](JsonRefSerializeError::CycleDetected).
    #[inline]
    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    /// Omits object and record members whose value is `null`.
    ///
    /// Array and tuple elements are never omitted.
    #[inline]
    pub fn ignore_null_values(mut self) -> Self {
        self.ignore_null_values = true;
        self
    }

    /// Serializes a document graph into the given [`Write`] implementation.
    ///
    /// Shared sub-objects are de-duplicated in
    /// [`Preserve`](ReferenceHandling::Preserve) mode:
    /// ```
    /// use oxjsongraph::JsonObject;
    /// use oxjsonref::{JsonRefSerializer, ReferenceHandling};
    ///
    /// let bob = JsonObject::new();
    /// bob.insert("Name", "Bob");
    /// let root = JsonObject::new();
    /// root.insert("Manager", bob.clone());
    /// root.insert("Manager2", bob);
    ///
    /// let buffer = JsonRefSerializer::new()
    ///     .with_reference_handling(ReferenceHandling::Preserve)
    ///     .serialize_to_writer(Vec::new(), &root.into())?;
    /// assert_eq!(
    ///     buffer,
    ///     br#"{"$id":"1","Manager":{"$id":"2","Name":"Bob"},"Manager2":{"$ref":"2"}}"#
    /// );
    /// # Result::<_, oxjsonref::JsonRefSerializeError>::Ok(())
    /// ```
    pub fn serialize_to_writer<W: Write>(
        self,
        writer: W,
        node: &JsonNode,
    ) -> Result<W, JsonRefSerializeError> {
        let output = self.into_inner().serialize(node)?;
        let mut serializer = WriterJsonSerializer::new(writer);
        for event in output {
            serializer.serialize_event(event)?;
        }
        Ok(serializer.finish()?)
    }

    /// Serializes a document graph into the given [`AsyncWrite`] implementation.
    ///
    /// ```
    /// # #[tokio::main(flavor = "current_thread")]
    /// # async fn main() -> Result<(), oxjsonref::JsonRefSerializeError> {
    /// use oxjsongraph::JsonArray;
    /// use oxjsonref::{JsonRefSerializer, ReferenceHandling};
    ///
    /// let list = JsonArray::new();
    /// list.push(list.clone());
    ///
    /// let buffer = JsonRefSerializer::new()
    ///     .with_reference_handling(ReferenceHandling::Preserve)
    ///     .serialize_to_tokio_async_write(Vec::new(), &list.into())
    ///     .await?;
    /// assert_eq!(buffer, br#"{"$id":"1","$values":[{"$ref":"1"}]}"#);
    /// # Ok(())
    /// # }
    /// ```
    #[cfg(feature = "async-tokio")]
    pub async fn serialize_to_tokio_async_write<W: AsyncWrite + Unpin>(
        self,
        writer: W,
        node: &JsonNode,
    ) -> Result<W, JsonRefSerializeError> {
        let output = self.into_inner().serialize(node)?;
        let mut serializer = TokioAsyncWriterJsonSerializer::new(writer);
        for event in output {
            serializer.serialize_event(event).await?;
        }
        Ok(serializer.finish()?)
    }

    fn into_inner(self) -> InnerJsonRefSerializer {
        InnerJsonRefSerializer {
            handling: self.handling,
            max_depth: self.max_depth,
            ignore_null_values: self.ignore_null_values,
            preserved: FxHashMap::default(),
            next_id: 0,
            on_path: FxHashSet::default(),
            path: JsonPath::root(),
        }
    }
}

impl Default for JsonRefSerializer {
    #[inline]
    fn default() -> Self {
        Self::new()
    }
}

struct InnerJsonRefSerializer {
    handling: ReferenceHandling,
    max_depth: usize,
    ignore_null_values: bool,
    /// Identifiers assigned to already-written composites, Preserve mode only.
    preserved: FxHashMap<NodeIdentity, String>,
    next_id: u64,
    /// Identities on the current root-to-leaf path, Ignore mode only.
    on_path: FxHashSet<NodeIdentity>,
    path: JsonPath,
}

impl InnerJsonRefSerializer {
    fn serialize(
        mut self,
        node: &JsonNode,
    ) -> Result<Vec<JsonEvent<'static>>, JsonRefSerializeError> {
        let mut output = Vec::new();
        self.write_value(node, 0, &mut output)?;
        Ok(output)
    }

    /// Writes one slot, returning `false` when the slot is suppressed
    /// (Ignore-mode loop) so the caller can drop the property key too.
    fn write_value(
        &mut self,
        node: &JsonNode,
        depth: usize,
        output: &mut Vec<JsonEvent<'static>>,
    ) -> Result<bool, JsonRefSerializeError> {
        match node {
            JsonNode::Null => output.push(JsonEvent::Null),
            JsonNode::Boolean(value) => output.push(JsonEvent::Boolean(*value)),
            JsonNode::Number(value) => {
                output.push(JsonEvent::Number(value.as_str().to_owned().into()));
            }
            JsonNode::String(value) => output.push(JsonEvent::String(value.clone().into())),
            JsonNode::Record(members) => {
                self.check_depth(depth)?;
                output.push(JsonEvent::StartObject);
                self.write_members(members, depth, output)?;
                output.push(JsonEvent::EndObject);
            }
            JsonNode::Tuple(elements) => {
                self.check_depth(depth)?;
                output.push(JsonEvent::StartArray);
                self.write_elements(elements, depth, output)?;
                output.push(JsonEvent::EndArray);
            }
            JsonNode::Object(object) => {
                self.check_depth(depth)?;
                let identity = object.identity();
                match self.handling {
                    ReferenceHandling::Default => {
                        output.push(JsonEvent::StartObject);
                    }
                    ReferenceHandling::Ignore => {
                        if !self.on_path.insert(identity) {
                            return Ok(false);
                        }
                        output.push(JsonEvent::StartObject);
                    }
                    ReferenceHandling::Preserve => {
                        if let Some(id) = self.preserved.get(&identity) {
                            write_reference(id.clone(), output);
                            return Ok(true);
                        }
                        let id = self.allocate_id(identity);
                        output.push(JsonEvent::StartObject);
                        output.push(JsonEvent::ObjectKey("$id".into()));
                        output.push(JsonEvent::String(id.into()));
                    }
                }
                self.write_members(&object.entries(), depth, output)?;
                output.push(JsonEvent::EndObject);
                if self.handling == ReferenceHandling::Ignore {
                    self.on_path.remove(&identity);
                }
            }
            JsonNode::Array(array) => {
                self.check_depth(depth)?;
                let identity = array.identity();
                let mut wrapped = false;
                match self.handling {
                    ReferenceHandling::Default => (),
                    ReferenceHandling::Ignore => {
                        if !self.on_path.insert(identity) {
                            return Ok(false);
                        }
                    }
                    ReferenceHandling::Preserve => {
                        if let Some(id) = self.preserved.get(&identity) {
                            write_reference(id.clone(), output);
                            return Ok(true);
                        }
                        let id = self.allocate_id(identity);
                        output.push(JsonEvent::StartObject);
                        output.push(JsonEvent::ObjectKey("$id".into()));
                        output.push(JsonEvent::String(id.into()));
                        output.push(JsonEvent::ObjectKey("$values".into()));
                        wrapped = true;
                    }
                }
                output.push(JsonEvent::StartArray);
                self.write_elements(&array.entries(), depth, output)?;
                output.push(JsonEvent::EndArray);
                if wrapped {
                    output.push(JsonEvent::EndObject);
                }
                if self.handling == ReferenceHandling::Ignore {
                    self.on_path.remove(&identity);
                }
            }
        }
        Ok(true)
    }

    fn write_members(
        &mut self,
        members: &[(String, JsonNode)],
        depth: usize,
        output: &mut Vec<JsonEvent<'static>>,
    ) -> Result<(), JsonRefSerializeError> {
        for (key, value) in members {
            if self.ignore_null_values && value.is_null() {
                continue;
            }
            self.path.push_property(key);
            let rollback = output.len();
            output.push(JsonEvent::ObjectKey(key.clone().into()));
            if !self.write_value(value, depth + 1, output)? {
                // suppressed member: the key is dropped too
                output.truncate(rollback);
            }
            self.path.pop();
        }
        Ok(())
    }

    fn write_elements(
        &mut self,
        elements: &[JsonNode],
        depth: usize,
        output: &mut Vec<JsonEvent<'static>>,
    ) -> Result<(), JsonRefSerializeError> {
        for (index, value) in elements.iter().enumerate() {
            self.path.push_index(index);
            self.write_value(value, depth + 1, output)?;
            self.path.pop();
        }
        Ok(())
    }

    fn allocate_id(&mut self, identity: NodeIdentity) -> String {
        self.next_id += 1;
        let id = self.next_id.to_string();
        self.preserved.insert(identity, id.clone());
        id
    }

    fn check_depth(&self, depth: usize) -> Result<(), JsonRefSerializeError> {
        if depth < self.max_depth {
            return Ok(());
        }
        Err(if self.handling == ReferenceHandling::Default {
            JsonRefSerializeError::CycleDetected(self.path.clone())
        } else {
            JsonRefSerializeError::DepthExceeded(self.path.clone())
        })
    }
}

fn write_reference(id: String, output: &mut Vec<JsonEvent<'static>>) {
    output.push(JsonEvent::StartObject);
    output.push(JsonEvent::ObjectKey("$ref".into()));
    output.push(JsonEvent::String(id.into()));
    output.push(JsonEvent::EndObject);
}

#[cfg(test)]
mod tests {
    use super::*;
    use oxjsongraph::{JsonArray, JsonObject};

    fn serialize(handling: ReferenceHandling, node: &JsonNode) -> String {
        let buffer = JsonRefSerializer::new()
            .with_reference_handling(handling)
            .serialize_to_writer(Vec::new(), node)
            .unwrap();
        String::from_utf8(buffer).unwrap()
    }

    fn self_managed_employee() -> JsonNode {
        let employee = JsonObject::new();
        employee.insert("Name", JsonNode::Null);
        employee.insert("Manager", employee.clone());
        employee.into()
    }

    #[test]
    fn test_self_reference_preserve() {
        assert_eq!(
            serialize(ReferenceHandling::Preserve, &self_managed_employee()),
            r#"{"$id":"1","Name":null,"Manager":{"$ref":"1"}}"#
        );
    }

    #[test]
    fn test_self_reference_ignore() {
        assert_eq!(
            serialize(ReferenceHandling::Ignore, &self_managed_employee()),
            r#"{"Name":null}"#
        );
    }

    #[test]
    fn test_self_reference_default_fails() {
        let error = JsonRefSerializer::new()
            .serialize_to_writer(Vec::new(), &self_managed_employee())
            .unwrap_err();
        assert!(matches!(error, JsonRefSerializeError::CycleDetected(_)));
    }

    #[test]
    fn test_non_cyclic_duplicate_is_written_twice_in_ignore_mode() {
        let shared = JsonObject::new();
        shared.insert("Name", "Bob");
        let root = JsonObject::new();
        root.insert("A", shared.clone());
        root.insert("B", shared);
        assert_eq!(
            serialize(ReferenceHandling::Ignore, &root.into()),
            r#"{"A":{"Name":"Bob"},"B":{"Name":"Bob"}}"#
        );
    }

    #[test]
    fn test_array_containing_itself_three_times() {
        let list = JsonArray::new();
        list.push(list.clone());
        list.push(list.clone());
        list.push(list.clone());
        assert_eq!(
            serialize(ReferenceHandling::Preserve, &list.into()),
            r#"{"$id":"1","$values":[{"$ref":"1"},{"$ref":"1"},{"$ref":"1"}]}"#
        );
    }

    #[test]
    fn test_cyclic_array_suppressed_in_ignore_mode() {
        let list = JsonArray::new();
        list.push(1);
        list.push(list.clone());
        list.push(2);
        assert_eq!(serialize(ReferenceHandling::Ignore, &list.into()), "[1,2]");
    }

    #[test]
    fn test_empty_preserved_array() {
        assert_eq!(
            serialize(ReferenceHandling::Preserve, &JsonArray::new().into()),
            r#"{"$id":"1","$values":[]}"#
        );
    }

    #[test]
    fn test_records_are_never_preserved() {
        let record = JsonNode::Record(vec![("X".into(), 1.into()), ("Y".into(), 2.into())]);
        let root = JsonObject::new();
        root.insert("A", record.clone());
        root.insert("B", record);
        assert_eq!(
            serialize(ReferenceHandling::Preserve, &root.into()),
            r#"{"$id":"1","A":{"X":1,"Y":2},"B":{"X":1,"Y":2}}"#
        );
    }

    #[test]
    fn test_identifier_allocation_is_deterministic() {
        let shared = JsonObject::new();
        let root = JsonObject::new();
        root.insert("A", shared.clone());
        root.insert("B", shared);
        let first = serialize(ReferenceHandling::Preserve, &root.clone().into());
        let second = serialize(ReferenceHandling::Preserve, &root.into());
        assert_eq!(first, second);
        assert_eq!(first, r#"{"$id":"1","A":{"$id":"2"},"B":{"$ref":"2"}}"#);
    }

    #[test]
    fn test_ignore_null_values() {
        let root = JsonObject::new();
        root.insert("Name", JsonNode::Null);
        root.insert("Values", JsonNode::Tuple(vec![JsonNode::Null, 1.into()]));
        let buffer = JsonRefSerializer::new()
            .ignore_null_values()
            .serialize_to_writer(Vec::new(), &root.into())
            .unwrap();
        // array elements keep their nulls, members drop them
        assert_eq!(buffer, br#"{"Values":[null,1]}"#);
    }

    #[test]
    fn test_deep_nesting_fails_in_preserve_mode_too() {
        let root = JsonObject::new();
        let mut current = root.clone();
        for _ in 0..70 {
            let child = JsonObject::new();
            current.insert("Child", child.clone());
            current = child;
        }
        let error = JsonRefSerializer::new()
            .with_reference_handling(ReferenceHandling::Preserve)
            .serialize_to_writer(Vec::new(), &root.into())
            .unwrap_err();
        assert!(matches!(error, JsonRefSerializeError::DepthExceeded(_)));
    }

    #[test]
    fn test_cycle_error_carries_the_path() {
        let inner = JsonObject::new();
        inner.insert("Loop", inner.clone());
        let root = JsonObject::new();
        root.insert("Value", inner);
        let error = JsonRefSerializer::new()
            .with_max_depth(8)
            .serialize_to_writer(Vec::new(), &root.into())
            .unwrap_err();
        let JsonRefSerializeError::CycleDetected(path) = error else {
            panic!("expected a cycle failure");
        };
        assert!(path.to_string().starts_with("$.Value.Loop"));
    }
}
