use crate::error::{JsonRefErrorCode, JsonRefParseError, JsonRefSyntaxError};
use crate::handling::ReferenceHandling;
use crate::path::JsonPath;
use crate::shape::JsonShape;
#[cfg(feature = "async-tokio")]
use json_event_parser::TokioAsyncReaderJsonParser;
use json_event_parser::{JsonEvent, ReaderJsonParser, SliceJsonParser};
use oxjsongraph::{JsonArray, JsonNode, JsonNumber, JsonObject};
use rustc_hash::FxHashMap;
use std::collections::hash_map::Entry;
use std::io::Read;
use std::mem::take;
#[cfg(feature = "async-tokio")]
use tokio::io::AsyncRead;

/// A streaming parser for JSON documents carrying `$id`/`$ref`/`$values`
/// reference metadata.
///
/// With [`Preserve`](ReferenceHandling::Preserve) the metadata is interpreted:
/// every `$id` registers the composite under construction in a per-operation
/// reference table, `{"$ref": ...}` objects graft the referent into the slot
/// instead of allocating anything, and `{"$id": ..., "$values": [...]}`
/// wrappers read back as plain arrays. Cycles work because a composite is
/// addressable from the moment its `$id` is read, before its members exist.
/// With any other policy, `$`-prefixed names are ordinary property names.
///
/// ```
/// use oxjsonref::{JsonRefParser, ReferenceHandling};
///
/// let root = JsonRefParser::new()
///     .with_reference_handling(ReferenceHandling::Preserve)
///     .parse_slice(br#"{"$id":"1","Name":"Angela","Manager":{"$ref":"1"}}"#)?;
/// let root = root.as_object().unwrap();
/// // the manager is the employee itself
/// assert!(root.get("Manager").unwrap().as_object().unwrap().same(root));
/// # Result::<_, oxjsonref::JsonRefSyntaxError>::Ok(())
/// ```
#[derive(Default, Clone)]
#[must_use]
pub struct JsonRefParser {
    handling: ReferenceHandling,
    shape: JsonShape,
    max_depth: Option<usize>,
}

impl JsonRefParser {
    /// Builds a new [`JsonRefParser`] that does not interpret metadata and
    /// accepts any document shape, with a depth ceiling of 64.
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the reference-handling policy.
    ///
    /// Only [`Preserve`](ReferenceHandling::Preserve) enables metadata
    /// interpretation; the other policies leave `$`-prefixed names alone:
    /// ```
    /// use oxjsonref::JsonRefParser;
    ///
    /// let root = JsonRefParser::new().parse_slice(br#"{"$id":"1"}"#)?;
    /// assert_eq!(
    ///     root.as_object().unwrap().get("$id").unwrap().as_str(),
    ///     Some("1")
    /// );
    /// # Result::<_, oxjsonref::JsonRefSyntaxError>::Ok(())
    /// ```
    #[inline]
    pub fn with_reference_handling(mut self, handling: ReferenceHandling) -> Self {
        self.handling = handling;
        self
    }

    /// Sets the expected shape of the document root, the stand-in for a schema
    /// resolver. Defaults to [`JsonShape::Any`].
    #[inline]
    pub fn with_shape(mut self, shape: JsonShape) -> Self {
        self.shape = shape;
        self
    }

    /// Sets the nesting ceiling enforced on the document.
    #[inline]
    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = Some(max_depth);
        self
    }

    /// Parses a document from a [`Read`] implementation.
    ///
    /// ```
    /// use oxjsonref::{JsonRefParser, ReferenceHandling};
    ///
    /// let file = br#"{"$id":"1","$values":[{"$ref":"1"}]}"#;
    /// let root = JsonRefParser::new()
    ///     .with_reference_handling(ReferenceHandling::Preserve)
    ///     .parse_reader(file.as_slice())?;
    /// let root = root.as_array().unwrap();
    /// // the array contains itself
    /// assert!(root.get(0).unwrap().as_array().unwrap().same(root));
    /// # Result::<_, oxjsonref::JsonRefParseError>::Ok(())
    /// ```
    pub fn parse_reader<R: Read>(self, reader: R) -> Result<JsonNode, JsonRefParseError> {
        let mut json_parser = ReaderJsonParser::new(reader);
        let mut inner = self.into_inner();
        loop {
            if let Some(node) = inner.parse_event(json_parser.parse_next()?)? {
                return Ok(node);
            }
        }
    }

    /// Parses a document from an [`AsyncRead`] implementation.
    ///
    /// ```
    /// # #[tokio::main(flavor = "current_thread")]
    /// # async fn main() -> Result<(), oxjsonref::JsonRefParseError> {
    /// use oxjsonref::{JsonRefParser, ReferenceHandling};
    ///
    /// let file = br#"{"$id":"1","Next":{"$ref":"1"}}"#;
    /// let root = JsonRefParser::new()
    ///     .with_reference_handling(ReferenceHandling::Preserve)
    ///     .parse_tokio_async_reader(file.as_slice())
    ///     .await?;
    /// assert!(root.as_object().unwrap().get("Next").unwrap().same(&root));
    /// # Ok(())
    /// # }
    /// ```
    #[cfg(feature = "async-tokio")]
    pub async fn parse_tokio_async_reader<R: AsyncRead + Unpin>(
        self,
        reader: R,
    ) -> Result<JsonNode, JsonRefParseError> {
        let mut json_parser = TokioAsyncReaderJsonParser::new(reader);
        let mut inner = self.into_inner();
        loop {
            if let Some(node) = inner.parse_event(json_parser.parse_next().await?)? {
                return Ok(node);
            }
        }
    }

    /// Parses a document from a byte slice.
    ///
    /// An unresolvable reference is not an error, it grafts `null`:
    /// ```
    /// use oxjsongraph::JsonNode;
    /// use oxjsonref::{JsonRefParser, ReferenceHandling};
    ///
    /// let root = JsonRefParser::new()
    ///     .with_reference_handling(ReferenceHandling::Preserve)
    ///     .parse_slice(br#"{"$id":"1","Manager":{"$ref":"42"}}"#)?;
    /// assert_eq!(root.as_object().unwrap().get("Manager"), Some(JsonNode::Null));
    /// # Result::<_, oxjsonref::JsonRefSyntaxError>::Ok(())
    /// ```
    pub fn parse_slice(self, slice: &[u8]) -> Result<JsonNode, JsonRefSyntaxError> {
        let mut json_parser = SliceJsonParser::new(slice);
        let mut inner = self.into_inner();
        loop {
            if let Some(node) = inner.parse_event(json_parser.parse_next()?)? {
                return Ok(node);
            }
        }
    }

    fn into_inner(self) -> InternalJsonRefParser {
        InternalJsonRefParser {
            stack: Vec::new(),
            table: FxHashMap::default(),
            root: None,
            root_shape: self.shape,
            interpret: self.handling == ReferenceHandling::Preserve,
            max_depth: self.max_depth.unwrap_or(64),
            path: JsonPath::root(),
        }
    }
}

enum ReadState {
    /// `{` consumed at a metadata-eligible slot; the target stays undecided
    /// until the first non-metadata event, so a `$ref` placeholder never
    /// allocates and a wrapper turns into an array.
    Uninit {
        shape: JsonShape,
        id: Option<String>,
        reference: Option<String>,
    },
    /// The string value of a leading `$id` is expected.
    UninitId,
    /// The string value of `$ref` is expected.
    RefValue,
    /// The string value of a `$id` declared after regular properties.
    LateId,
    /// After the `$values` key: the wrapped array must follow.
    ValuesStart { array: JsonArray, element: JsonShape },
    /// The wrapped array is closed: only the wrapper's `}` may follow.
    WrapperEnd { value: JsonNode },
    /// A shared object being populated. `key` is the property awaiting its value.
    Object {
        object: JsonObject,
        shape: JsonShape,
        key: Option<String>,
        preserved: bool,
    },
    /// A by-value record being populated.
    Record {
        members: Vec<(String, JsonNode)>,
        shape: JsonShape,
        key: Option<String>,
    },
    /// A shared array being populated.
    Array {
        array: JsonArray,
        element: JsonShape,
        wrapped: bool,
        index: usize,
    },
    /// A by-value tuple being populated.
    Tuple {
        elements: Vec<JsonNode>,
        element: JsonShape,
        index: usize,
    },
}

struct InternalJsonRefParser {
    stack: Vec<ReadState>,
    /// identifier -> composite, registered the moment `$id` is settled.
    table: FxHashMap<String, JsonNode>,
    root: Option<JsonNode>,
    root_shape: JsonShape,
    interpret: bool,
    max_depth: usize,
    path: JsonPath,
}

impl InternalJsonRefParser {
    fn parse_event(
        &mut self,
        event: JsonEvent<'_>,
    ) -> Result<Option<JsonNode>, JsonRefSyntaxError> {
        if event == JsonEvent::Eof {
            return if let Some(root) = self.root.take() {
                Ok(Some(root))
            } else {
                Err(JsonRefSyntaxError::msg_and_code(
                    if self.stack.is_empty() {
                        "The document is empty"
                    } else {
                        "The input ended in the middle of the document"
                    },
                    JsonRefErrorCode::IncompleteInput,
                    self.path.clone(),
                ))
            };
        }
        let Some(state) = self.stack.pop() else {
            if self.root.is_some() {
                return Err(JsonRefSyntaxError::msg(
                    "Unexpected content after the end of the document",
                    self.path.clone(),
                ));
            }
            let shape = take(&mut self.root_shape);
            self.read_value(shape, event)?;
            return Ok(None);
        };
        self.handle(state, event)?;
        Ok(None)
    }

    fn handle(&mut self, state: ReadState, event: JsonEvent<'_>) -> Result<(), JsonRefSyntaxError> {
        match state {
            ReadState::Uninit {
                shape,
                id,
                reference,
            } => self.on_uninit(shape, id, reference, event),
            ReadState::UninitId => {
                let JsonEvent::String(value) = event else {
                    return Err(self.meta_error("$id", "The value of $id must be a string"));
                };
                let Some(ReadState::Uninit { id, .. }) = self.stack.last_mut() else {
                    unreachable!("$id value without an enclosing object")
                };
                *id = Some(value.into_owned());
                Ok(())
            }
            ReadState::RefValue => {
                let JsonEvent::String(value) = event else {
                    return Err(self.meta_error("$ref", "The value of $ref must be a string"));
                };
                let Some(ReadState::Uninit { reference, .. }) = self.stack.last_mut() else {
                    unreachable!("$ref value without an enclosing object")
                };
                *reference = Some(value.into_owned());
                Ok(())
            }
            ReadState::LateId => {
                let JsonEvent::String(value) = event else {
                    return Err(self.meta_error("$id", "The value of $id must be a string"));
                };
                let node = {
                    let Some(ReadState::Object {
                        object, preserved, ..
                    }) = self.stack.last_mut()
                    else {
                        unreachable!("$id value without an enclosing object")
                    };
                    *preserved = true;
                    JsonNode::Object(object.clone())
                };
                self.register(value.into_owned(), node)
            }
            ReadState::ValuesStart { array, element } => match event {
                JsonEvent::StartArray => {
                    self.stack.push(ReadState::Array {
                        array,
                        element,
                        wrapped: true,
                        index: 0,
                    });
                    Ok(())
                }
                JsonEvent::String(_)
                | JsonEvent::Number(_)
                | JsonEvent::Boolean(_)
                | JsonEvent::Null
                | JsonEvent::StartObject => Err(JsonRefSyntaxError::msg_and_code(
                    "The value of $values must be an array",
                    JsonRefErrorCode::PreservedArrayMalformed,
                    self.path.property("$values"),
                )),
                JsonEvent::EndArray
                | JsonEvent::EndObject
                | JsonEvent::ObjectKey(_)
                | JsonEvent::Eof => unreachable!(),
            },
            ReadState::WrapperEnd { value } => match event {
                JsonEvent::EndObject => self.reduce(value),
                JsonEvent::ObjectKey(key) => Err(if key.starts_with('$') {
                    JsonRefSyntaxError::msg_and_code(
                        format!("{key} is not allowed inside a preserved-array wrapper"),
                        JsonRefErrorCode::UnexpectedMetadata,
                        self.path.property(&key),
                    )
                } else {
                    JsonRefSyntaxError::msg_and_code(
                        "A preserved-array wrapper must hold $id and $values only",
                        JsonRefErrorCode::PreservedArrayMalformed,
                        self.path.clone(),
                    )
                }),
                _ => unreachable!(),
            },
            ReadState::Object {
                object,
                shape,
                key,
                preserved,
            } => {
                if let Some(key) = key {
                    let value_shape = shape.property(&key);
                    self.stack.push(ReadState::Object {
                        object,
                        shape,
                        key: Some(key),
                        preserved,
                    });
                    return self.read_value(value_shape, event);
                }
                match event {
                    JsonEvent::ObjectKey(name) => {
                        if self.interpret {
                            match name.as_ref() {
                                "$id" => {
                                    return if preserved {
                                        Err(JsonRefSyntaxError::msg_and_code(
                                            "A $id is already set for this object",
                                            JsonRefErrorCode::DuplicateIdentifier,
                                            self.path.property("$id"),
                                        ))
                                    } else {
                                        self.stack.push(ReadState::Object {
                                            object,
                                            shape,
                                            key: None,
                                            preserved,
                                        });
                                        self.stack.push(ReadState::LateId);
                                        Ok(())
                                    };
                                }
                                "$ref" => {
                                    return Err(JsonRefSyntaxError::msg_and_code(
                                        "A $ref must be the only property of its object",
                                        JsonRefErrorCode::ReferenceObjectHasOtherProperties,
                                        self.path.clone(),
                                    ));
                                }
                                "$values" => {
                                    return Err(self.meta_error(
                                        "$values",
                                        "$values is only allowed next to $id where an array is expected",
                                    ));
                                }
                                _ => (),
                            }
                        }
                        let name = name.into_owned();
                        self.path.push_property(&name);
                        self.stack.push(ReadState::Object {
                            object,
                            shape,
                            key: Some(name),
                            preserved,
                        });
                        Ok(())
                    }
                    JsonEvent::EndObject => self.reduce(JsonNode::Object(object)),
                    _ => unreachable!(),
                }
            }
            ReadState::Record {
                members,
                shape,
                key,
            } => {
                if let Some(key) = key {
                    let value_shape = shape.property(&key);
                    self.stack.push(ReadState::Record {
                        members,
                        shape,
                        key: Some(key),
                    });
                    return self.read_value(value_shape, event);
                }
                match event {
                    JsonEvent::ObjectKey(name) => {
                        if self.interpret && matches!(name.as_ref(), "$id" | "$ref" | "$values") {
                            return Err(JsonRefSyntaxError::msg_and_code(
                                format!("{name} is not allowed on a value-typed object"),
                                JsonRefErrorCode::UnexpectedMetadata,
                                self.path.property(&name),
                            ));
                        }
                        let name = name.into_owned();
                        self.path.push_property(&name);
                        self.stack.push(ReadState::Record {
                            members,
                            shape,
                            key: Some(name),
                        });
                        Ok(())
                    }
                    JsonEvent::EndObject => self.reduce(JsonNode::Record(members)),
                    _ => unreachable!(),
                }
            }
            ReadState::Array {
                array,
                element,
                wrapped,
                index,
            } => match event {
                JsonEvent::EndArray => {
                    let value = JsonNode::Array(array);
                    if wrapped {
                        self.stack.push(ReadState::WrapperEnd { value });
                        Ok(())
                    } else {
                        self.reduce(value)
                    }
                }
                event => {
                    let element_shape = element.clone();
                    self.path.push_index(index);
                    self.stack.push(ReadState::Array {
                        array,
                        element,
                        wrapped,
                        index,
                    });
                    self.read_value(element_shape, event)
                }
            },
            ReadState::Tuple {
                elements,
                element,
                index,
            } => match event {
                JsonEvent::EndArray => self.reduce(JsonNode::Tuple(elements)),
                event => {
                    let element_shape = element.clone();
                    self.path.push_index(index);
                    self.stack.push(ReadState::Tuple {
                        elements,
                        element,
                        index,
                    });
                    self.read_value(element_shape, event)
                }
            },
        }
    }

    fn on_uninit(
        &mut self,
        shape: JsonShape,
        id: Option<String>,
        reference: Option<String>,
        event: JsonEvent<'_>,
    ) -> Result<(), JsonRefSyntaxError> {
        match event {
            JsonEvent::ObjectKey(key) => match key.as_ref() {
                "$id" => {
                    if reference.is_some() {
                        return Err(self.reference_not_alone());
                    }
                    if id.is_some() {
                        return Err(JsonRefSyntaxError::msg_and_code(
                            "A $id is already set for this object",
                            JsonRefErrorCode::DuplicateIdentifier,
                            self.path.property("$id"),
                        ));
                    }
                    if matches!(shape, JsonShape::Tuple(_)) {
                        return Err(JsonRefSyntaxError::msg_and_code(
                            "The expected collection is fixed-capacity and cannot be preserved",
                            JsonRefErrorCode::UnresolvableTypeForPreservation,
                            self.path.clone(),
                        ));
                    }
                    self.stack.push(ReadState::Uninit {
                        shape,
                        id,
                        reference,
                    });
                    self.stack.push(ReadState::UninitId);
                    Ok(())
                }
                "$ref" => {
                    if id.is_some() || reference.is_some() {
                        return Err(self.reference_not_alone());
                    }
                    if matches!(shape, JsonShape::Tuple(_)) {
                        return Err(self
                            .meta_error("$ref", "A $ref cannot target a fixed-capacity array"));
                    }
                    self.stack.push(ReadState::Uninit {
                        shape,
                        id,
                        reference,
                    });
                    self.stack.push(ReadState::RefValue);
                    Ok(())
                }
                "$values" => {
                    if reference.is_some() {
                        return Err(self.reference_not_alone());
                    }
                    match &shape {
                        JsonShape::Tuple(_) => Err(JsonRefSyntaxError::msg_and_code(
                            "The expected collection is fixed-capacity and cannot be preserved",
                            JsonRefErrorCode::UnresolvableTypeForPreservation,
                            self.path.clone(),
                        )),
                        JsonShape::Any | JsonShape::Array(_) => {
                            let Some(id) = id else {
                                return Err(if matches!(shape, JsonShape::Array(_)) {
                                    JsonRefSyntaxError::msg_and_code(
                                        "A preserved array must declare $id before $values",
                                        JsonRefErrorCode::PreservedArrayMalformed,
                                        self.path.clone(),
                                    )
                                } else {
                                    self.meta_error("$values", "$values requires a sibling $id")
                                });
                            };
                            let array = JsonArray::new();
                            self.register(id, array.clone().into())?;
                            self.stack.push(ReadState::ValuesStart {
                                array,
                                element: shape.element(),
                            });
                            Ok(())
                        }
                        _ => Err(self
                            .meta_error("$values", "$values is only allowed where an array is expected")),
                    }
                }
                _ => {
                    if reference.is_some() {
                        return Err(self.reference_not_alone());
                    }
                    match &shape {
                        JsonShape::Array(_) => Err(JsonRefSyntaxError::msg_and_code(
                            "A JSON object at an array slot must be a preserved-array wrapper starting with $id",
                            JsonRefErrorCode::PreservedArrayMalformed,
                            self.path.clone(),
                        )),
                        JsonShape::Tuple(_) | JsonShape::Scalar => {
                            Err(self.mismatch("object", &shape))
                        }
                        _ => {
                            let object = JsonObject::new();
                            let preserved = id.is_some();
                            if let Some(id) = id {
                                self.register(id, object.clone().into())?;
                            }
                            let key = key.into_owned();
                            self.path.push_property(&key);
                            self.stack.push(ReadState::Object {
                                object,
                                shape,
                                key: Some(key),
                                preserved,
                            });
                            Ok(())
                        }
                    }
                }
            },
            JsonEvent::EndObject => {
                if let Some(reference) = reference {
                    let value = self.table.get(&reference).cloned().unwrap_or(JsonNode::Null);
                    if !shape.accepts(&value) {
                        return Err(JsonRefSyntaxError::msg_and_code(
                            format!(
                                "The reference '{reference}' resolves to a composite that does not fit the expected {}",
                                shape.name()
                            ),
                            JsonRefErrorCode::IncompatibleReference,
                            self.path.clone(),
                        ));
                    }
                    return self.reduce(value);
                }
                match &shape {
                    JsonShape::Array(_) => Err(JsonRefSyntaxError::msg_and_code(
                        "A preserved-array wrapper requires $id and $values",
                        JsonRefErrorCode::PreservedArrayMalformed,
                        self.path.clone(),
                    )),
                    JsonShape::Tuple(_) | JsonShape::Scalar => {
                        Err(self.mismatch("object", &shape))
                    }
                    _ => {
                        let object = JsonObject::new();
                        if let Some(id) = id {
                            self.register(id, object.clone().into())?;
                        }
                        self.reduce(JsonNode::Object(object))
                    }
                }
            }
            _ => unreachable!(),
        }
    }

    fn read_value(
        &mut self,
        shape: JsonShape,
        event: JsonEvent<'_>,
    ) -> Result<(), JsonRefSyntaxError> {
        match event {
            JsonEvent::Null => self.reduce(JsonNode::Null),
            JsonEvent::Boolean(value) => {
                self.reduce_scalar(&shape, JsonNode::Boolean(value), "boolean")
            }
            JsonEvent::Number(value) => self.reduce_scalar(
                &shape,
                JsonNode::Number(JsonNumber::new_unchecked(value.as_ref())),
                "number",
            ),
            JsonEvent::String(value) => {
                self.reduce_scalar(&shape, JsonNode::String(value.into_owned()), "string")
            }
            JsonEvent::StartObject => {
                self.check_depth()?;
                if matches!(shape, JsonShape::Record(_)) {
                    self.stack.push(ReadState::Record {
                        members: Vec::new(),
                        shape,
                        key: None,
                    });
                    return Ok(());
                }
                if self.interpret {
                    self.stack.push(ReadState::Uninit {
                        shape,
                        id: None,
                        reference: None,
                    });
                    return Ok(());
                }
                match &shape {
                    JsonShape::Any | JsonShape::Object(_) | JsonShape::Dictionary(_) => {
                        self.stack.push(ReadState::Object {
                            object: JsonObject::new(),
                            shape,
                            key: None,
                            preserved: false,
                        });
                        Ok(())
                    }
                    _ => Err(self.mismatch("object", &shape)),
                }
            }
            JsonEvent::StartArray => {
                self.check_depth()?;
                match &shape {
                    JsonShape::Tuple(_) => {
                        let element = shape.element();
                        self.stack.push(ReadState::Tuple {
                            elements: Vec::new(),
                            element,
                            index: 0,
                        });
                        Ok(())
                    }
                    JsonShape::Any | JsonShape::Array(_) => {
                        let element = shape.element();
                        self.stack.push(ReadState::Array {
                            array: JsonArray::new(),
                            element,
                            wrapped: false,
                            index: 0,
                        });
                        Ok(())
                    }
                    _ => Err(self.mismatch("array", &shape)),
                }
            }
            JsonEvent::ObjectKey(_)
            | JsonEvent::EndObject
            | JsonEvent::EndArray
            | JsonEvent::Eof => unreachable!(),
        }
    }

    fn reduce_scalar(
        &mut self,
        shape: &JsonShape,
        value: JsonNode,
        found: &str,
    ) -> Result<(), JsonRefSyntaxError> {
        if matches!(shape, JsonShape::Any | JsonShape::Scalar) {
            self.reduce(value)
        } else {
            Err(self.mismatch(found, shape))
        }
    }

    /// Attaches a finished value to the frame below it.
    fn reduce(&mut self, value: JsonNode) -> Result<(), JsonRefSyntaxError> {
        match self.stack.pop() {
            None => {
                self.root = Some(value);
                Ok(())
            }
            Some(ReadState::Object {
                object,
                shape,
                key,
                preserved,
            }) => {
                let Some(key) = key else {
                    unreachable!("value reduced into an object without a pending property")
                };
                object.insert(key, value);
                self.path.pop();
                self.stack.push(ReadState::Object {
                    object,
                    shape,
                    key: None,
                    preserved,
                });
                Ok(())
            }
            Some(ReadState::Record {
                mut members,
                shape,
                key,
            }) => {
                let Some(key) = key else {
                    unreachable!("value reduced into a record without a pending member")
                };
                members.push((key, value));
                self.path.pop();
                self.stack.push(ReadState::Record {
                    members,
                    shape,
                    key: None,
                });
                Ok(())
            }
            Some(ReadState::Array {
                array,
                element,
                wrapped,
                index,
            }) => {
                array.push(value);
                self.path.pop();
                self.stack.push(ReadState::Array {
                    array,
                    element,
                    wrapped,
                    index: index + 1,
                });
                Ok(())
            }
            Some(ReadState::Tuple {
                mut elements,
                element,
                index,
            }) => {
                elements.push(value);
                self.path.pop();
                self.stack.push(ReadState::Tuple {
                    elements,
                    element,
                    index: index + 1,
                });
                Ok(())
            }
            Some(_) => unreachable!("value reduced into a non-composite frame"),
        }
    }

    fn register(&mut self, id: String, node: JsonNode) -> Result<(), JsonRefSyntaxError> {
        match self.table.entry(id) {
            Entry::Occupied(entry) => Err(JsonRefSyntaxError::msg_and_code(
                format!("The identifier '{}' is already declared", entry.key()),
                JsonRefErrorCode::DuplicateIdentifier,
                self.path.property("$id"),
            )),
            Entry::Vacant(entry) => {
                entry.insert(node);
                Ok(())
            }
        }
    }

    fn check_depth(&self) -> Result<(), JsonRefSyntaxError> {
        if self.stack.len() < self.max_depth {
            Ok(())
        } else {
            Err(JsonRefSyntaxError::msg_and_code(
                "The document nesting exceeds the maximum depth",
                JsonRefErrorCode::DepthExceeded,
                self.path.clone(),
            ))
        }
    }

    fn meta_error(&self, name: &str, msg: impl Into<String>) -> JsonRefSyntaxError {
        JsonRefSyntaxError::msg_and_code(
            msg,
            JsonRefErrorCode::UnexpectedMetadata,
            self.path.property(name),
        )
    }

    fn reference_not_alone(&self) -> JsonRefSyntaxError {
        JsonRefSyntaxError::msg_and_code(
            "A $ref must be the only property of its object",
            JsonRefErrorCode::ReferenceObjectHasOtherProperties,
            self.path.clone(),
        )
    }

    fn mismatch(&self, found: &str, expected: &JsonShape) -> JsonRefSyntaxError {
        JsonRefSyntaxError::msg(
            format!("Unexpected JSON {found}, expected {}", expected.name()),
            self.path.clone(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_preserved(input: &[u8]) -> JsonNode {
        JsonRefParser::new()
            .with_reference_handling(ReferenceHandling::Preserve)
            .parse_slice(input)
            .unwrap()
    }

    fn preserved_failure(input: &[u8]) -> (JsonRefErrorCode, String) {
        preserved_failure_with_shape(JsonShape::Any, input)
    }

    fn preserved_failure_with_shape(shape: JsonShape, input: &[u8]) -> (JsonRefErrorCode, String) {
        let error = JsonRefParser::new()
            .with_reference_handling(ReferenceHandling::Preserve)
            .with_shape(shape)
            .parse_slice(input)
            .unwrap_err();
        (error.code().unwrap(), error.path().unwrap().to_string())
    }

    #[test]
    fn test_self_reference_round_trip() {
        let root = parse_preserved(br#"{"$id":"1","Name":null,"Manager":{"$ref":"1"}}"#);
        let root = root.as_object().unwrap();
        assert_eq!(root.get("Name"), Some(JsonNode::Null));
        assert!(root.get("Manager").unwrap().as_object().unwrap().same(root));
    }

    #[test]
    fn test_forward_scope_reference() {
        let root = parse_preserved(
            br#"{"$id":"1","Subordinates":{"$id":"2","$values":[{"$id":"3","Name":"A","Subordinates":{"$ref":"2"}}]}}"#,
        );
        let subordinates = root.as_object().unwrap().get("Subordinates").unwrap();
        let first = subordinates.as_array().unwrap().get(0).unwrap();
        let inner = first.as_object().unwrap().get("Subordinates").unwrap();
        assert!(inner.same(&subordinates));
    }

    #[test]
    fn test_reference_object_with_later_property() {
        let (code, path) =
            preserved_failure(br#"{"$id":"1","Name":"X","Manager":{"$ref":"1","Name":"Y"}}"#);
        assert_eq!(code, JsonRefErrorCode::ReferenceObjectHasOtherProperties);
        assert_eq!(path, "$.Manager");
    }

    #[test]
    fn test_reference_object_with_earlier_property() {
        let (code, path) =
            preserved_failure(br#"{"$id":"1","Manager":{"Name":"Y","$ref":"1"}}"#);
        assert_eq!(code, JsonRefErrorCode::ReferenceObjectHasOtherProperties);
        assert_eq!(path, "$.Manager");
    }

    #[test]
    fn test_duplicate_identifier_across_the_document() {
        let (code, path) = preserved_failure(br#"{"$id":"1","Child":{"$id":"1"}}"#);
        assert_eq!(code, JsonRefErrorCode::DuplicateIdentifier);
        assert_eq!(path, "$.Child.$id");
    }

    #[test]
    fn test_duplicate_identifier_in_the_same_object() {
        let (code, _) = preserved_failure(br#"{"$id":"1","$id":"2"}"#);
        assert_eq!(code, JsonRefErrorCode::DuplicateIdentifier);
    }

    #[test]
    fn test_id_value_must_be_a_string() {
        let (code, path) = preserved_failure(br#"{"$id":1}"#);
        assert_eq!(code, JsonRefErrorCode::UnexpectedMetadata);
        assert_eq!(path, "$.$id");
    }

    #[test]
    fn test_late_id_is_tolerated() {
        let root = parse_preserved(br#"{"Name":"A","$id":"7","Self":{"$ref":"7"}}"#);
        let root = root.as_object().unwrap();
        assert!(root.get("Self").unwrap().as_object().unwrap().same(root));
        assert!(!root.contains_key("$id"));
    }

    #[test]
    fn test_values_without_id() {
        let (code, path) = preserved_failure(br#"{"$values":[]}"#);
        assert_eq!(code, JsonRefErrorCode::UnexpectedMetadata);
        assert_eq!(path, "$.$values");
    }

    #[test]
    fn test_values_after_a_regular_property() {
        let (code, _) = preserved_failure(br#"{"$id":"1","a":1,"$values":[]}"#);
        assert_eq!(code, JsonRefErrorCode::UnexpectedMetadata);
    }

    #[test]
    fn test_values_must_be_an_array() {
        let (code, _) = preserved_failure(br#"{"$id":"1","$values":5}"#);
        assert_eq!(code, JsonRefErrorCode::PreservedArrayMalformed);
    }

    #[test]
    fn test_wrapper_rejects_extra_properties() {
        let (code, _) = preserved_failure(br#"{"$id":"1","$values":[],"x":1}"#);
        assert_eq!(code, JsonRefErrorCode::PreservedArrayMalformed);
        let (code, _) = preserved_failure(br#"{"$id":"1","$values":[],"$extra":1}"#);
        assert_eq!(code, JsonRefErrorCode::UnexpectedMetadata);
    }

    #[test]
    fn test_preserved_array_containing_itself() {
        let root = parse_preserved(br#"{"$id":"1","$values":[{"$ref":"1"},2]}"#);
        let root = root.as_array().unwrap();
        assert!(root.get(0).unwrap().as_array().unwrap().same(root));
        assert_eq!(root.get(1), Some(JsonNode::from(2)));
    }

    #[test]
    fn test_empty_preserved_array() {
        let root = parse_preserved(br#"{"$id":"1","$values":[]}"#);
        assert!(root.as_array().unwrap().is_empty());
    }

    #[test]
    fn test_escaped_metadata_name_is_still_metadata() {
        let root = parse_preserved(br#"{"\u0024id":"1","Self":{"\u0024ref":"1"}}"#);
        let root = root.as_object().unwrap();
        assert!(root.get("Self").unwrap().as_object().unwrap().same(root));
    }

    #[test]
    fn test_other_dollar_names_are_regular_properties() {
        let root = parse_preserved(br#"{"$id":"1","$kind":"employee"}"#);
        assert_eq!(
            root.as_object().unwrap().get("$kind").unwrap().as_str(),
            Some("employee")
        );
    }

    #[test]
    fn test_metadata_is_opaque_without_preserve() {
        let root = JsonRefParser::new()
            .parse_slice(br#"{"$ref":"1","$values":[]}"#)
            .unwrap();
        let root = root.as_object().unwrap();
        assert_eq!(root.get("$ref").unwrap().as_str(), Some("1"));
        assert!(root.get("$values").unwrap().as_array().unwrap().is_empty());
    }

    #[test]
    fn test_wrapper_required_at_an_array_slot() {
        let shape = JsonShape::object([("a", JsonShape::array(JsonShape::Any))]);
        let (code, path) = preserved_failure_with_shape(shape.clone(), br#"{"a":{}}"#);
        assert_eq!(code, JsonRefErrorCode::PreservedArrayMalformed);
        assert_eq!(path, "$.a");
        let (code, _) = preserved_failure_with_shape(shape, br#"{"a":{"x":1}}"#);
        assert_eq!(code, JsonRefErrorCode::PreservedArrayMalformed);
    }

    #[test]
    fn test_plain_array_fits_an_array_slot() {
        let shape = JsonShape::object([("a", JsonShape::array(JsonShape::Scalar))]);
        let root = JsonRefParser::new()
            .with_reference_handling(ReferenceHandling::Preserve)
            .with_shape(shape)
            .parse_slice(br#"{"a":[1,2]}"#)
            .unwrap();
        let array = root.as_object().unwrap().get("a").unwrap();
        assert_eq!(array.as_array().unwrap().len(), 2);
    }

    #[test]
    fn test_tuple_slot_rejects_preservation() {
        let shape = JsonShape::object([("a", JsonShape::tuple(JsonShape::Any))]);
        let (code, path) =
            preserved_failure_with_shape(shape, br#"{"a":{"$id":"1","$values":[]}}"#);
        assert_eq!(code, JsonRefErrorCode::UnresolvableTypeForPreservation);
        assert_eq!(path, "$.a");
    }

    #[test]
    fn test_tuple_slot_rejects_references() {
        let shape = JsonShape::object([("a", JsonShape::tuple(JsonShape::Any))]);
        let (code, _) = preserved_failure_with_shape(shape, br#"{"a":{"$ref":"1"}}"#);
        assert_eq!(code, JsonRefErrorCode::UnexpectedMetadata);
    }

    #[test]
    fn test_tuple_slot_materializes_a_tuple() {
        let shape = JsonShape::object([("a", JsonShape::tuple(JsonShape::Scalar))]);
        let root = JsonRefParser::new()
            .with_reference_handling(ReferenceHandling::Preserve)
            .with_shape(shape)
            .parse_slice(br#"{"a":[1,2]}"#)
            .unwrap();
        assert_eq!(
            root.as_object().unwrap().get("a"),
            Some(JsonNode::Tuple(vec![1.into(), 2.into()]))
        );
    }

    #[test]
    fn test_record_slot_materializes_a_record() {
        let shape = JsonShape::object([("a", JsonShape::record([("x", JsonShape::Scalar)]))]);
        let root = JsonRefParser::new()
            .with_reference_handling(ReferenceHandling::Preserve)
            .with_shape(shape)
            .parse_slice(br#"{"a":{"x":1}}"#)
            .unwrap();
        assert_eq!(
            root.as_object().unwrap().get("a"),
            Some(JsonNode::Record(vec![("x".into(), 1.into())]))
        );
    }

    #[test]
    fn test_record_slot_rejects_metadata() {
        let shape = JsonShape::object([("a", JsonShape::record([("x", JsonShape::Scalar)]))]);
        let (code, path) = preserved_failure_with_shape(shape, br#"{"a":{"$id":"1"}}"#);
        assert_eq!(code, JsonRefErrorCode::UnexpectedMetadata);
        assert_eq!(path, "$.a.$id");
    }

    #[test]
    fn test_preservation_inside_a_record_works() {
        let shape = JsonShape::object([("a", JsonShape::record([("x", JsonShape::Any)]))]);
        let root = JsonRefParser::new()
            .with_reference_handling(ReferenceHandling::Preserve)
            .with_shape(shape)
            .parse_slice(br#"{"$id":"1","a":{"x":{"$ref":"1"}}}"#)
            .unwrap();
        let JsonNode::Record(members) = root.as_object().unwrap().get("a").unwrap() else {
            panic!("expected a record");
        };
        assert!(members[0].1.same(&root));
    }

    #[test]
    fn test_incompatible_reference() {
        let shape = JsonShape::object([
            ("a", JsonShape::Any),
            ("b", JsonShape::object([("Name", JsonShape::Scalar)])),
        ]);
        let (code, path) = preserved_failure_with_shape(
            shape,
            br#"{"$id":"1","a":{"$id":"2","$values":[]},"b":{"$ref":"2"}}"#,
        );
        assert_eq!(code, JsonRefErrorCode::IncompatibleReference);
        assert_eq!(path, "$.b");
    }

    #[test]
    fn test_shape_mismatch_without_metadata_has_no_code() {
        let error = JsonRefParser::new()
            .with_shape(JsonShape::Scalar)
            .parse_slice(br#"[1]"#)
            .unwrap_err();
        assert!(error.code().is_none());
        assert!(error.path().is_some());
    }

    #[test]
    fn test_dictionary_shape_applies_to_every_value() {
        let shape = JsonShape::dictionary(JsonShape::Scalar);
        let root = JsonRefParser::new()
            .with_shape(shape.clone())
            .parse_slice(br#"{"a":1,"b":"x"}"#)
            .unwrap();
        assert_eq!(root.as_object().unwrap().len(), 2);
        assert!(
            JsonRefParser::new()
                .with_shape(shape)
                .parse_slice(br#"{"a":[1]}"#)
                .is_err()
        );
    }

    #[test]
    fn test_depth_ceiling() {
        let error = JsonRefParser::new()
            .with_max_depth(4)
            .parse_slice(br"[[[[[1]]]]]")
            .unwrap_err();
        assert_eq!(error.code(), Some(JsonRefErrorCode::DepthExceeded));
    }

    #[test]
    fn test_empty_input() {
        let error = JsonRefParser::new().parse_slice(b"").unwrap_err();
        assert_eq!(error.code(), Some(JsonRefErrorCode::IncompleteInput));
    }

    #[test]
    fn test_scalar_root() {
        assert_eq!(parse_preserved(b"42"), JsonNode::from(42));
        assert_eq!(parse_preserved(b"null"), JsonNode::Null);
    }

    #[test]
    fn test_reference_at_the_root() {
        assert_eq!(parse_preserved(br#"{"$ref":"1"}"#), JsonNode::Null);
    }
}
