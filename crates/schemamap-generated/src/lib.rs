//! Generated SchemaMap modules, compiled
//!
//! `build.rs` runs every mapping in [`corpus::CORPUS`] through
//! `schemamap_codegen::generate_rust` and includes the output here, so the
//! generated source is type-checked like any other crate. The integration
//! tests then compare each module with the interpreter.

#![forbid(unsafe_code)]

use schemamap_core::{FunctionRegistry, TransformError};
use serde_json::Value;

pub mod corpus;

/// Entry points every generated mapping struct exposes
pub trait GeneratedMapping {
    /// Transform one record
    fn transform(&self, record: &Value) -> Result<Value, TransformError>;

    /// Transform records in order
    fn transform_batch(&self, records: &[Value]) -> Result<Vec<Value>, TransformError>;
}

include!(concat!(env!("OUT_DIR"), "/generated.rs"));
