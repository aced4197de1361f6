use std::fmt;

/// A path pointing at a slot of a JSON document, rendered in the `$.foo.bar[3]` style.
///
/// Every semantic failure raised by this crate carries the path of the offending slot:
///
/// ```
/// use oxjsonref::{JsonRefParser, ReferenceHandling};
///
/// let error = JsonRefParser::new()
///     .with_reference_handling(ReferenceHandling::Preserve)
///     .parse_slice(br#"{"$id":"1","Manager":{"$ref":"1","Name":"Y"}}"#)
///     .unwrap_err();
/// assert_eq!(error.path().unwrap().to_string(), "$.Manager");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct JsonPath(Vec<JsonPathSegment>);

#[derive(Debug, Clone, PartialEq, Eq)]
enum JsonPathSegment {
    Property(String),
    Index(usize),
}

impl JsonPath {
    /// The path of the document root, rendered `$`.
    #[inline]
    pub fn root() -> Self {
        Self::default()
    }

    /// Checks if this path points at the document root.
    #[inline]
    pub fn is_root(&self) -> bool {
        self.0.is_empty()
    }

    pub(crate) fn push_property(&mut self, name: impl Into<String>) {
        self.0.push(JsonPathSegment::Property(name.into()));
    }

    pub(crate) fn push_index(&mut self, index: usize) {
        self.0.push(JsonPathSegment::Index(index));
    }

    pub(crate) fn pop(&mut self) {
        self.0.pop();
    }

    /// A copy of this path extended with a property segment, used to point at
    /// the property itself rather than at the enclosing slot.
    pub(crate) fn property(&self, name: &str) -> Self {
        let mut path = self.clone();
        path.push_property(name);
        path
    }
}

impl fmt::Display for JsonPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("$")?;
        for segment in &self.0 {
            match segment {
                JsonPathSegment::Property(name) => write!(f, ".{name}")?,
                JsonPathSegment::Index(index) => write!(f, "[{index}]")?,
            }
        }
        Ok(())
    }
}
