//! Rust source fragments for mapping constructs
//!
//! Each helper renders one IR construct into an expression or statement of
//! the generated module. The fragments assume the imports the module
//! template brings into scope.

pub mod chain;
pub mod lookup;
pub mod source;

pub use chain::ChainCodegen;
pub use lookup::LookupCodegen;
pub use source::SourceCodegen;

use schemamap_core::PathSegment;
use serde_json::Value;

/// Escape a string for embedding in Rust source
pub fn escape_string(s: &str) -> String {
    s.escape_debug().to_string()
}

/// A Rust string literal
pub fn str_literal(s: &str) -> String {
    format!("\"{}\"", escape_string(s))
}

/// An expression building `value` as a `serde_json::Value`
pub fn value_literal(value: &Value) -> String {
    match value {
        Value::Null => "Value::Null".to_string(),
        Value::Bool(b) => format!("Value::Bool({b})"),
        Value::Number(n) => match (n.as_i64(), n.as_u64(), n.as_f64()) {
            (Some(i), _, _) => format!("Value::from({i}_i64)"),
            (None, Some(u), _) => format!("Value::from({u}_u64)"),
            (_, _, Some(f)) => format!("Value::from({f:?}_f64)"),
            _ => "Value::Null".to_string(),
        },
        Value::String(s) => format!("Value::String(String::from({}))", str_literal(s)),
        Value::Array(items) => {
            let items: Vec<_> = items.iter().map(value_literal).collect();
            format!("Value::Array(vec![{}])", items.join(", "))
        }
        Value::Object(map) => {
            let entries: Vec<_> = map
                .iter()
                .map(|(k, v)| format!("(String::from({}), {})", str_literal(k), value_literal(v)))
                .collect();
            format!(
                "Value::Object([{}].into_iter().collect())",
                entries.join(", ")
            )
        }
    }
}

/// A slice literal of values, for step arguments
pub fn args_literal(args: &[Value]) -> String {
    let args: Vec<_> = args.iter().map(value_literal).collect();
    format!("[{}]", args.join(", "))
}

/// Comma-separated `PathSegment` constructors
pub fn segments_literal(segments: &[PathSegment]) -> String {
    segments
        .iter()
        .map(|segment| match segment {
            PathSegment::Key(key) => format!("PathSegment::Key(String::from({}))", str_literal(key)),
            PathSegment::Index(index) => format!("PathSegment::Index({index})"),
            PathSegment::Wildcard => "PathSegment::Wildcard".to_string(),
        })
        .collect::<Vec<_>>()
        .join(", ")
}
