//! Source expression and transform chain evaluation

use serde_json::Value;

use crate::ast::{Compute, ExprId, Mapping, SourceExpr, TransformStep};
use crate::builtins;
use crate::error::TransformError;
use crate::path::{Resolved, resolve};
use crate::registry::FunctionRegistry;
use crate::runtime::{self, CaseGroup};

/// Evaluates expressions of one mapping against input records
#[derive(Debug, Clone, Copy)]
pub struct Evaluator<'a> {
    mapping: &'a Mapping,
    registry: &'a FunctionRegistry,
}

impl<'a> Evaluator<'a> {
    /// Create an evaluator over a mapping and the host functions it may call
    pub fn new(mapping: &'a Mapping, registry: &'a FunctionRegistry) -> Self {
        Self { mapping, registry }
    }

    /// Evaluate a source expression
    pub fn eval(&self, record: &Value, id: ExprId) -> Result<Resolved, TransformError> {
        let config = &self.mapping.config;
        match self.mapping.expr(id) {
            SourceExpr::Field(path) => resolve(record, &path.segments, config.strict_mode),
            SourceExpr::Literal(value) => Ok(Resolved::Value(value.clone())),
            SourceExpr::Concat(parts) => {
                let parts = parts
                    .iter()
                    .map(|part| self.eval(record, *part))
                    .collect::<Result<Vec<_>, _>>()?;
                runtime::concat(parts)
            }
            SourceExpr::Coalesce(parts) => {
                runtime::coalesce(parts.len(), |i| self.eval(record, parts[i]))
            }
            SourceExpr::Now => builtins::now(config).map(Resolved::Value),
            SourceExpr::Uuid => Ok(Resolved::Value(runtime::uuid())),
            SourceExpr::Compute(Compute::Aggregate { func, path }) => {
                let items = resolve(record, &path.segments, config.strict_mode)?;
                runtime::aggregate_resolved(*func, items).map(Resolved::Value)
            }
            SourceExpr::Compute(Compute::Arithmetic { op, lhs, rhs }) => {
                let lhs = self.eval(record, *lhs)?.into_value();
                let rhs = self.eval(record, *rhs)?.into_value();
                runtime::arithmetic(*op, lhs, rhs)
            }
            SourceExpr::Compute(Compute::Call { name, args }) => {
                let args = args
                    .iter()
                    .map(|arg| {
                        self.eval(record, *arg)
                            .map(|r| r.into_value().unwrap_or(Value::Null))
                    })
                    .collect::<Result<Vec<_>, _>>()?;
                self.registry
                    .call(name, &args, &self.mapping.functions)
                    .map(Resolved::Value)
            }
        }
    }

    /// Run `steps` over `value`, left to right, stopping at the first error
    pub fn apply_chain(
        &self,
        mut value: Value,
        steps: &[TransformStep],
    ) -> Result<Value, TransformError> {
        let mut group = CaseGroup::default();
        for step in steps {
            tracing::trace!(?step, input = %value, "apply step");
            value = match step {
                TransformStep::When { pattern, result } => group.when(value, pattern, result),
                TransformStep::Else(fallback) => group.otherwise(value, fallback),
                other => {
                    group.reset();
                    self.apply_step(value, other)?
                }
            };
        }
        Ok(value)
    }

    fn apply_step(&self, value: Value, step: &TransformStep) -> Result<Value, TransformError> {
        match step {
            TransformStep::Builtin { func, args } => {
                runtime::invoke_builtin(self.registry, *func, value, args, &self.mapping.config)
            }
            TransformStep::Lookup(id) => Ok(runtime::lookup(self.mapping.lookup(*id), value)),
            TransformStep::External { name, args } => runtime::invoke_external(
                self.registry,
                &self.mapping.functions,
                name,
                value,
                args,
            ),
            TransformStep::When { .. } | TransformStep::Else(_) => Ok(value),
        }
    }
}
