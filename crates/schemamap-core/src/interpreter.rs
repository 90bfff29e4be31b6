//! Mapping interpreter
//!
//! Walks the parsed rules directly against each input record. This is the
//! reference behaviour every compiled mapping must reproduce.

use serde_json::Value;

use crate::ast::{Mapping, MappingRule};
use crate::config::NullHandling;
use crate::error::TransformError;
use crate::evaluator::Evaluator;
use crate::registry::{FunctionRegistry, FunctionResult};
use crate::runtime;

/// Transform one record with a mapping and a set of host functions.
pub fn transform(
    mapping: &Mapping,
    record: &Value,
    registry: &FunctionRegistry,
) -> Result<Value, TransformError> {
    let evaluator = Evaluator::new(mapping, registry);
    let config = &mapping.config;
    let mut output = runtime::output_root();
    for (index, rule) in mapping.rules.iter().enumerate() {
        match run_rule(&evaluator, mapping, rule, record, &mut output) {
            Ok(()) => {}
            Err(err) if config.is_fatal(&err) => return Err(err.at_rule(index)),
            Err(err) => {
                tracing::warn!(
                    rule = index,
                    line = rule.line,
                    target = %rule.target,
                    error = %err,
                    "rule skipped"
                );
            }
        }
    }
    Ok(runtime::finish(output, config.null_handling))
}

fn run_rule(
    evaluator: &Evaluator<'_>,
    mapping: &Mapping,
    rule: &MappingRule,
    record: &Value,
    output: &mut Value,
) -> Result<(), TransformError> {
    let config = &mapping.config;
    let resolved = evaluator.eval(record, rule.source)?;
    let action = config.absent_action(mapping.is_optional_field(rule.source));
    let source = mapping.render_expr(rule.source);
    let value = runtime::evaluate_rule(
        resolved,
        rule.target.has_wildcard(),
        action,
        &source,
        |value| evaluator.apply_chain(value, &rule.chain),
    )?;
    let Some(value) = value else {
        tracing::debug!(line = rule.line, source = %source, "source absent, target left unset");
        return Ok(());
    };
    let fill = match config.null_handling {
        NullHandling::Default => rule.hint.map(|kind| kind.default_value()),
        _ => None,
    };
    runtime::write_rule(output, &rule.target, value, fill.as_ref())
}

/// A mapping bound to the host functions its rules may call
#[derive(Debug, Clone)]
pub struct Interpreter<'m> {
    mapping: &'m Mapping,
    registry: FunctionRegistry,
}

impl<'m> Interpreter<'m> {
    /// Interpret `mapping` with no host functions registered
    pub fn new(mapping: &'m Mapping) -> Self {
        Self::with_registry(mapping, FunctionRegistry::new())
    }

    /// Interpret `mapping` with an existing registry
    pub fn with_registry(mapping: &'m Mapping, registry: FunctionRegistry) -> Self {
        Self { mapping, registry }
    }

    /// Register a host function accepting any number of arguments
    pub fn register_function<F>(&mut self, name: impl Into<String>, func: F) -> &mut Self
    where
        F: Fn(&[Value]) -> FunctionResult + Send + Sync + 'static,
    {
        self.registry.register_function(name, func);
        self
    }

    /// Host functions, for further registration
    pub fn registry(&mut self) -> &mut FunctionRegistry {
        &mut self.registry
    }

    /// The interpreted mapping
    pub fn mapping(&self) -> &Mapping {
        self.mapping
    }

    /// Transform one record
    pub fn transform(&self, record: &Value) -> Result<Value, TransformError> {
        transform(self.mapping, record, &self.registry)
    }

    /// Transform records in order; the first fatal error names its record
    pub fn transform_batch(&self, records: &[Value]) -> Result<Vec<Value>, TransformError> {
        records
            .iter()
            .enumerate()
            .map(|(i, record)| self.transform(record).map_err(|e| e.at_record(i)))
            .collect()
    }
}
