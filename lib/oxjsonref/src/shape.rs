use oxjsongraph::JsonNode;

/// The expected shape of a slot, the parser-side stand-in for a schema resolver.
///
/// A shape tells the parser what kind of value a slot may hold, which properties an
/// object declares, and whether a collection slot is fixed-capacity. Everything the
/// shape does not constrain defaults to [`Any`](JsonShape::Any), so parsing without
/// a shape accepts every well-formed document.
///
/// Shapes matter most for reference metadata:
/// * a [`Tuple`](JsonShape::Tuple) slot is a fixed-capacity sequence, so a payload
///   that preserves the sequence itself (`{"$id": ..., "$values": ...}`) is rejected;
/// * a [`Record`](JsonShape::Record) slot is a by-value aggregate, so `$id` and
///   `$ref` are rejected there;
/// * a grafted `$ref` referent must be compatible with the slot shape.
///
/// ```
/// use oxjsonref::{JsonRefParser, JsonShape, ReferenceHandling};
///
/// let shape = JsonShape::object([("Scores", JsonShape::array(JsonShape::Scalar))]);
/// let root = JsonRefParser::new()
///     .with_reference_handling(ReferenceHandling::Preserve)
///     .with_shape(shape)
///     .parse_slice(br#"{"$id":"1","Scores":{"$id":"2","$values":[1,2]}}"#)?;
/// assert_eq!(root.as_object().unwrap().get("Scores").unwrap().as_array().unwrap().len(), 2);
/// # Result::<_, oxjsonref::JsonRefSyntaxError>::Ok(())
/// ```
#[derive(Debug, Clone, Default)]
pub enum JsonShape {
    /// Anything goes; composites materialize as shared [`JsonObject`](oxjsongraph::JsonObject)
    /// and [`JsonArray`](oxjsongraph::JsonArray).
    #[default]
    Any,
    /// A leaf: string, number, boolean or null.
    Scalar,
    /// A shared object with the given declared properties. Undeclared properties
    /// are accepted with the [`Any`](JsonShape::Any) shape.
    Object(Vec<(String, JsonShape)>),
    /// A shared object with arbitrary keys whose values all follow one shape.
    Dictionary(Box<JsonShape>),
    /// A shared array.
    Array(Box<JsonShape>),
    /// A by-value aggregate with named members, materialized as
    /// [`JsonNode::Record`]. Reference metadata is rejected at such a slot.
    Record(Vec<(String, JsonShape)>),
    /// A fixed-capacity by-value sequence, materialized as [`JsonNode::Tuple`].
    /// Preserving the sequence itself is rejected; preserving its elements works.
    Tuple(Box<JsonShape>),
}

impl JsonShape {
    /// Builds an [`Object`](JsonShape::Object) shape from its declared properties.
    pub fn object(
        properties: impl IntoIterator<Item = (impl Into<String>, JsonShape)>,
    ) -> Self {
        Self::Object(
            properties
                .into_iter()
                .map(|(name, shape)| (name.into(), shape))
                .collect(),
        )
    }

    /// Builds a [`Dictionary`](JsonShape::Dictionary) shape from its value shape.
    pub fn dictionary(value: JsonShape) -> Self {
        Self::Dictionary(Box::new(value))
    }

    /// Builds an [`Array`](JsonShape::Array) shape from its element shape.
    pub fn array(element: JsonShape) -> Self {
        Self::Array(Box::new(element))
    }

    /// Builds a [`Record`](JsonShape::Record) shape from its declared members.
    pub fn record(
        members: impl IntoIterator<Item = (impl Into<String>, JsonShape)>,
    ) -> Self {
        Self::Record(
            members
                .into_iter()
                .map(|(name, shape)| (name.into(), shape))
                .collect(),
        )
    }

    /// Builds a [`Tuple`](JsonShape::Tuple) shape from its element shape.
    pub fn tuple(element: JsonShape) -> Self {
        Self::Tuple(Box::new(element))
    }

    /// The shape expected for the property named `key`.
    pub(crate) fn property(&self, key: &str) -> Self {
        match self {
            Self::Object(properties) | Self::Record(properties) => properties
                .iter()
                .find(|(name, _)| name == key)
                .map_or(Self::Any, |(_, shape)| shape.clone()),
            Self::Dictionary(value) => (**value).clone(),
            _ => Self::Any,
        }
    }

    /// The shape expected for collection elements.
    pub(crate) fn element(&self) -> Self {
        match self {
            Self::Array(element) | Self::Tuple(element) => (**element).clone(),
            _ => Self::Any,
        }
    }

    /// Checks if a grafted referent fits this slot. `null` fits everywhere.
    pub(crate) fn accepts(&self, node: &JsonNode) -> bool {
        if node.is_null() {
            return true;
        }
        match self {
            Self::Any => true,
            Self::Scalar => !matches!(
                node,
                JsonNode::Array(_) | JsonNode::Object(_) | JsonNode::Record(_) | JsonNode::Tuple(_)
            ),
            Self::Object(_) | Self::Dictionary(_) => matches!(node, JsonNode::Object(_)),
            Self::Array(_) => matches!(node, JsonNode::Array(_)),
            // references against value-typed slots are rejected before resolution
            Self::Record(_) | Self::Tuple(_) => false,
        }
    }

    /// A short name used in failure messages.
    pub(crate) fn name(&self) -> &'static str {
        match self {
            Self::Any => "any value",
            Self::Scalar => "a scalar",
            Self::Object(_) => "an object",
            Self::Dictionary(_) => "a dictionary",
            Self::Array(_) => "an array",
            Self::Record(_) => "a value-typed object",
            Self::Tuple(_) => "a fixed-capacity array",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_property_lookup() {
        let shape = JsonShape::object([("a", JsonShape::Scalar)]);
        assert!(matches!(shape.property("a"), JsonShape::Scalar));
        assert!(matches!(shape.property("b"), JsonShape::Any));
        assert!(matches!(
            JsonShape::dictionary(JsonShape::Scalar).property("anything"),
            JsonShape::Scalar
        ));
    }

    #[test]
    fn test_accepts() {
        use oxjsongraph::{JsonArray, JsonObject};

        assert!(JsonShape::Any.accepts(&JsonArray::new().into()));
        assert!(JsonShape::array(JsonShape::Any).accepts(&JsonArray::new().into()));
        assert!(!JsonShape::array(JsonShape::Any).accepts(&JsonObject::new().into()));
        assert!(JsonShape::object([("a", JsonShape::Any)]).accepts(&JsonNode::Null));
        assert!(!JsonShape::Scalar.accepts(&JsonObject::new().into()));
    }
}
