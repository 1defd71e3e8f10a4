//! Bridge schema engine: turn an annotated JSON Schema into field descriptors,
//! walk resource paths, and validate composed output against the same schema.

#![forbid(unsafe_code)]

pub mod extract;
pub mod parser;
pub mod validate;

pub use extract::{extract, extract_owned, fan_out};
pub use parser::{parse, STRUCTURAL_KEYS};
pub use validate::{OutputValidator, SchemaCompileError, ValidationIssue};
