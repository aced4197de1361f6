#![doc = include_str!("../README.md")]
#![doc(test(attr(deny(warnings))))]
#![cfg_attr(docsrs, feature(doc_auto_cfg))]

mod array;
mod node;
mod number;
mod object;

pub use crate::array::JsonArray;
pub use crate::node::{JsonNode, NodeIdentity};
pub use crate::number::{JsonNumber, JsonNumberParseError};
pub use crate::object::JsonObject;
