//! Source expression codegen
//!
//! Every fragment is an expression of type `Result<Resolved, TransformError>`
//! evaluated inside a rule method, where `record` is the input and `self`
//! holds the registry, bindings and config.

use crate::ir::ExprIR;

use super::{segments_literal, str_literal, value_literal};

/// Helper for generating source expression code
pub struct SourceCodegen;

impl SourceCodegen {
    /// Generate code for a source expression
    pub fn generate(expr: &ExprIR) -> String {
        match expr {
            ExprIR::Field { segments, strict } => format!(
                "path::resolve(record, &[{}], {strict})",
                segments_literal(segments)
            ),
            ExprIR::Literal(value) => format!(
                "Ok::<_, TransformError>(Resolved::Value({}))",
                value_literal(value)
            ),
            ExprIR::Concat(parts) => {
                let parts: Vec<_> = parts
                    .iter()
                    .map(|part| format!("{}?", Self::generate(part)))
                    .collect();
                format!("runtime::concat(vec![{}])", parts.join(", "))
            }
            ExprIR::Coalesce(parts) => {
                let mut code = format!("runtime::coalesce({}, |i| match i {{ ", parts.len());
                for (i, part) in parts.iter().enumerate() {
                    code.push_str(&format!("{i} => {}, ", Self::generate(part)));
                }
                code.push_str("_ => Ok(Resolved::Absent) })");
                code
            }
            ExprIR::Now => "builtins::now(&self.config).map(Resolved::Value)".to_string(),
            ExprIR::Uuid => "Ok::<_, TransformError>(Resolved::Value(runtime::uuid()))".to_string(),
            ExprIR::Aggregate {
                func,
                segments,
                strict,
            } => format!(
                "path::resolve(record, &[{}], {strict}).and_then(|items| runtime::aggregate_resolved(AggregateFn::{func:?}, items)).map(Resolved::Value)",
                segments_literal(segments)
            ),
            ExprIR::Arithmetic { op, lhs, rhs } => format!(
                "runtime::arithmetic(ArithOp::{op:?}, ({})?.into_value(), ({})?.into_value())",
                Self::generate(lhs),
                Self::generate(rhs)
            ),
            ExprIR::Call { name, args } => {
                let args: Vec<_> = args
                    .iter()
                    .map(|arg| format!("({})?.into_value().unwrap_or(Value::Null)", Self::generate(arg)))
                    .collect();
                format!(
                    "self.registry.call({}, &[{}], &self.bindings).map(Resolved::Value)",
                    str_literal(name),
                    args.join(", ")
                )
            }
        }
    }
}
