use crate::path::JsonPath;
pub use json_event_parser::TextPosition;
use json_event_parser::{JsonParseError, JsonSyntaxError};
use std::fmt::Formatter;
use std::ops::Range;
use std::{fmt, io};

/// Error returned while parsing a reference-annotated JSON document.
#[derive(Debug, thiserror::Error)]
pub enum JsonRefParseError {
    /// I/O error during parsing (file not found...).
    #[error(transparent)]
    Io(#[from] io::Error),
    /// An error in the document syntax or reference metadata.
    #[error(transparent)]
    Syntax(#[from] JsonRefSyntaxError),
}

impl From<JsonRefParseError> for io::Error {
    #[inline]
    fn from(error: JsonRefParseError) -> Self {
        match error {
            JsonRefParseError::Io(error) => error,
            JsonRefParseError::Syntax(error) => error.into(),
        }
    }
}

#[doc(hidden)]
impl From<JsonParseError> for JsonRefParseError {
    #[inline]
    fn from(error: JsonParseError) -> Self {
        match error {
            JsonParseError::Io(error) => Self::Io(error),
            JsonParseError::Syntax(error) => Self::Syntax(error.into()),
        }
    }
}

/// An error in the syntax or the reference metadata of the parsed document.
#[derive(Debug, thiserror::Error)]
#[error(transparent)]
pub struct JsonRefSyntaxError(#[from] SyntaxErrorKind);

#[derive(Debug, thiserror::Error)]
enum SyntaxErrorKind {
    #[error(transparent)]
    Json(#[from] JsonSyntaxError),
    #[error("{msg} at {path}")]
    Msg {
        msg: String,
        code: Option<JsonRefErrorCode>,
        path: JsonPath,
    },
}

impl JsonRefSyntaxError {
    /// The [`JsonRefErrorCode`] classifying this error, if it is a metadata failure.
    pub fn code(&self) -> Option<JsonRefErrorCode> {
        match &self.0 {
            SyntaxErrorKind::Json(_) => None,
            SyntaxErrorKind::Msg { code, .. } => *code,
        }
    }

    /// The path of the slot the error was raised at, for metadata failures.
    pub fn path(&self) -> Option<&JsonPath> {
        match &self.0 {
            SyntaxErrorKind::Json(_) => None,
            SyntaxErrorKind::Msg { path, .. } => Some(path),
        }
    }

    /// The location of the error inside of the file, for raw JSON syntax errors.
    pub fn location(&self) -> Option<Range<TextPosition>> {
        match &self.0 {
            SyntaxErrorKind::Json(e) => Some(e.location()),
            SyntaxErrorKind::Msg { .. } => None,
        }
    }

    /// Builds an error from a printable error message and a path.
    pub(crate) fn msg(msg: impl Into<String>, path: JsonPath) -> Self {
        Self(SyntaxErrorKind::Msg {
            msg: msg.into(),
            code: None,
            path,
        })
    }

    /// Builds an error from a printable error message, an error code and a path.
    pub(crate) fn msg_and_code(
        msg: impl Into<String>,
        code: JsonRefErrorCode,
        path: JsonPath,
    ) -> Self {
        Self(SyntaxErrorKind::Msg {
            msg: msg.into(),
            code: Some(code),
            path,
        })
    }
}

impl From<JsonRefSyntaxError> for io::Error {
    #[inline]
    fn from(error: JsonRefSyntaxError) -> Self {
        match error.0 {
            SyntaxErrorKind::Json(error) => error.into(),
            SyntaxErrorKind::Msg { msg, .. } => Self::new(io::ErrorKind::InvalidData, msg),
        }
    }
}

#[doc(hidden)]
impl From<JsonSyntaxError> for JsonRefSyntaxError {
    #[inline]
    fn from(error: JsonSyntaxError) -> Self {
        Self(SyntaxErrorKind::Json(error))
    }
}

/// The classification of reference-metadata failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum JsonRefErrorCode {
    /// Two `$id` properties share a value, or one object declares two identifiers.
    DuplicateIdentifier,
    /// A `{"$ref": ...}` object carries another property before or after the reference.
    ReferenceObjectHasOtherProperties,
    /// Metadata appeared at a position the protocol does not allow: `$values`
    /// without a sibling `$id` or outside an array slot, another `$`-prefixed name
    /// inside a preserved-array wrapper, a non-string metadata value, or `$id`/`$ref`
    /// against a value-typed slot.
    UnexpectedMetadata,
    /// The payload preserves a collection that the expected shape declares
    /// fixed-capacity.
    UnresolvableTypeForPreservation,
    /// A preserved-array wrapper misses `$id` or `$values`, carries extra
    /// properties, or its `$values` value is not an array.
    PreservedArrayMalformed,
    /// A `$ref` resolved to a composite that is not compatible with the expected slot.
    IncompatibleReference,
    /// The token stream ended in the middle of the document.
    IncompleteInput,
    /// Nesting exceeded the configured maximum depth.
    DepthExceeded,
}

impl fmt::Display for JsonRefErrorCode {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::DuplicateIdentifier => "duplicate identifier",
            Self::ReferenceObjectHasOtherProperties => "reference object has other properties",
            Self::UnexpectedMetadata => "unexpected metadata",
            Self::UnresolvableTypeForPreservation => "unresolvable type for preservation",
            Self::PreservedArrayMalformed => "preserved array malformed",
            Self::IncompatibleReference => "incompatible reference",
            Self::IncompleteInput => "incomplete input",
            Self::DepthExceeded => "depth exceeded",
        })
    }
}

/// Error returned while serializing a document graph.
#[derive(Debug, thiserror::Error)]
pub enum JsonRefSerializeError {
    /// I/O error while writing.
    #[error(transparent)]
    Io(#[from] io::Error),
    /// The depth ceiling was reached without identity tracking, so the graph holds
    /// a cycle the [`Default`](crate::ReferenceHandling::Default) mode cannot
    /// express, or nesting beyond the configured maximum depth.
    #[error("A possible object cycle was detected at {0}: nesting reached the maximum depth")]
    CycleDetected(JsonPath),
    /// Nesting exceeded the configured maximum depth.
    #[error("The graph nesting at {0} exceeds the maximum depth")]
    DepthExceeded(JsonPath),
}
