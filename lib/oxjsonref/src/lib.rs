#![doc = include_str!("../README.md")]
#![doc(test(attr(deny(warnings))))]
#![cfg_attr(docsrs, feature(doc_auto_cfg))]

mod error;
mod handling;
mod parser;
mod path;
mod serializer;
mod shape;

pub use crate::error::{
    JsonRefErrorCode, JsonRefParseError, JsonRefSerializeError, JsonRefSyntaxError, TextPosition,
};
pub use crate::handling::ReferenceHandling;
pub use crate::parser::JsonRefParser;
pub use crate::path::JsonPath;
pub use crate::serializer::JsonRefSerializer;
pub use crate::shape::JsonShape;
