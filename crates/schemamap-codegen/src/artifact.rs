//! In-process compiled mappings
//!
//! [`CompiledMapping`] turns each rule of a [`ProgramIR`] into a tree of
//! closures once. Transforming a record then runs the pre-dispatched
//! closures directly: built-ins are already resolved to their enum arm,
//! lookup tables are captured by the steps that read them and the config
//! policies are folded into each rule.

use std::fmt;
use std::sync::Arc;

use schemamap_core::path::{Resolved, resolve};
use schemamap_core::runtime::{self, CaseGroup};
use schemamap_core::{
    AbsentAction, Bindings, Config, FunctionRegistry, FunctionResult, LookupTable, NullHandling,
    TargetPath, TransformError, TransformErrorKind, builtins,
};
use serde_json::Value;

use crate::ir::{ExprIR, ProgramIR, RuleIR, StepIR};

/// What an expression closure can see
struct Scope<'a> {
    record: &'a Value,
    registry: &'a FunctionRegistry,
}

type ExprFn = Arc<dyn Fn(&Scope<'_>) -> Result<Resolved, TransformError> + Send + Sync>;
type StepFn = Arc<
    dyn Fn(&FunctionRegistry, Value, &mut CaseGroup) -> Result<Value, TransformError>
        + Send
        + Sync,
>;

/// Shared, immutable pieces the closures capture
struct Env {
    config: Arc<Config>,
    bindings: Arc<Bindings>,
    lookups: Vec<Arc<LookupTable>>,
}

struct CompiledRule {
    index: usize,
    line: usize,
    target: TargetPath,
    wildcard: bool,
    action: AbsentAction,
    source_text: String,
    fill: Option<Value>,
    source: ExprFn,
    chain: Vec<StepFn>,
}

impl CompiledRule {
    fn run(&self, scope: &Scope<'_>, output: &mut Value) -> Result<(), TransformError> {
        let resolved = (self.source)(scope)?;
        let value = runtime::evaluate_rule(
            resolved,
            self.wildcard,
            self.action,
            &self.source_text,
            |value| self.apply_chain(scope.registry, value),
        )?;
        let Some(value) = value else {
            tracing::debug!(
                line = self.line,
                source = %self.source_text,
                "source absent, target left unset"
            );
            return Ok(());
        };
        runtime::write_rule(output, &self.target, value, self.fill.as_ref())
    }

    fn apply_chain(
        &self,
        registry: &FunctionRegistry,
        mut value: Value,
    ) -> Result<Value, TransformError> {
        let mut group = CaseGroup::default();
        for step in &self.chain {
            value = step(registry, value, &mut group)?;
        }
        Ok(value)
    }
}

struct Program {
    rules: Vec<CompiledRule>,
    fatal: Vec<TransformErrorKind>,
    finish: fn(Value) -> Value,
}

/// A mapping compiled to closures, ready to transform records.
///
/// Cloning is cheap: the program is shared and only the registry of host
/// functions is copied.
#[derive(Clone)]
pub struct CompiledMapping {
    program: Arc<Program>,
    registry: FunctionRegistry,
    fingerprint: String,
}

impl CompiledMapping {
    /// Build the closures for `ir`, as lowered from a parsed mapping
    pub(crate) fn from_ir(ir: &ProgramIR) -> Self {
        let env = Env {
            config: Arc::new(ir.config.clone()),
            bindings: Arc::new(ir.bindings.clone()),
            lookups: ir.lookups.iter().cloned().map(Arc::new).collect(),
        };
        let rules = ir.rules.iter().map(|rule| compile_rule(rule, &env)).collect();
        let finish: fn(Value) -> Value = match ir.config.null_handling {
            NullHandling::Omit => |mut output| {
                runtime::remove_nulls(&mut output);
                output
            },
            NullHandling::Keep | NullHandling::Default => |output| output,
        };
        Self {
            program: Arc::new(Program {
                rules,
                fatal: ir.fatal.clone(),
                finish,
            }),
            registry: FunctionRegistry::new(),
            fingerprint: ir.content_hash(),
        }
    }

    /// Replace the host function registry
    pub fn with_registry(mut self, registry: FunctionRegistry) -> Self {
        self.registry = registry;
        self
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

    /// SHA-256 hex digest of the compiled program
    pub fn fingerprint(&self) -> &str {
        &self.fingerprint
    }

    /// Number of compiled rules
    pub fn rule_count(&self) -> usize {
        self.program.rules.len()
    }

    /// Transform one record
    pub fn transform(&self, record: &Value) -> Result<Value, TransformError> {
        let scope = Scope {
            record,
            registry: &self.registry,
        };
        let mut output = runtime::output_root();
        for rule in &self.program.rules {
            match rule.run(&scope, &mut output) {
                Ok(()) => {}
                Err(err) if self.program.fatal.contains(&err.kind) => {
                    return Err(err.at_rule(rule.index));
                }
                Err(err) => {
                    tracing::warn!(
                        rule = rule.index,
                        line = rule.line,
                        target = %rule.target,
                        error = %err,
                        "rule skipped"
                    );
                }
            }
        }
        Ok((self.program.finish)(output))
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

impl fmt::Debug for CompiledMapping {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompiledMapping")
            .field("rules", &self.program.rules.len())
            .field("fingerprint", &self.fingerprint)
            .field("registry", &self.registry)
            .finish()
    }
}

fn compile_rule(rule: &RuleIR, env: &Env) -> CompiledRule {
    CompiledRule {
        index: rule.index,
        line: rule.line,
        target: rule.target.clone(),
        wildcard: rule.target.has_wildcard(),
        action: rule.action,
        source_text: rule.source_text.clone(),
        fill: rule.fill.clone(),
        source: compile_expr(&rule.source, env),
        chain: rule.chain.iter().map(|step| compile_step(step, env)).collect(),
    }
}

fn compile_expr(expr: &ExprIR, env: &Env) -> ExprFn {
    match expr {
        ExprIR::Field { segments, strict } => {
            let (segments, strict) = (segments.clone(), *strict);
            expr_fn(move |scope| resolve(scope.record, &segments, strict))
        }
        ExprIR::Literal(value) => {
            let value = value.clone();
            expr_fn(move |_| Ok(Resolved::Value(value.clone())))
        }
        ExprIR::Concat(parts) => {
            let parts = compile_all(parts, env);
            expr_fn(move |scope| {
                let parts = parts
                    .iter()
                    .map(|part| part(scope))
                    .collect::<Result<Vec<_>, _>>()?;
                runtime::concat(parts)
            })
        }
        ExprIR::Coalesce(parts) => {
            let parts = compile_all(parts, env);
            expr_fn(move |scope| runtime::coalesce(parts.len(), |i| parts[i](scope)))
        }
        ExprIR::Now => {
            let config = Arc::clone(&env.config);
            expr_fn(move |_| builtins::now(&config).map(Resolved::Value))
        }
        ExprIR::Uuid => expr_fn(|_| Ok(Resolved::Value(runtime::uuid()))),
        ExprIR::Aggregate {
            func,
            segments,
            strict,
        } => {
            let (func, segments, strict) = (*func, segments.clone(), *strict);
            expr_fn(move |scope| {
                let items = resolve(scope.record, &segments, strict)?;
                runtime::aggregate_resolved(func, items).map(Resolved::Value)
            })
        }
        ExprIR::Arithmetic { op, lhs, rhs } => {
            let (op, lhs, rhs) = (*op, compile_expr(lhs, env), compile_expr(rhs, env));
            expr_fn(move |scope| {
                let lhs = lhs(scope)?.into_value();
                let rhs = rhs(scope)?.into_value();
                runtime::arithmetic(op, lhs, rhs)
            })
        }
        ExprIR::Call { name, args } => {
            let name = name.clone();
            let args = compile_all(args, env);
            let bindings = Arc::clone(&env.bindings);
            expr_fn(move |scope| {
                let args = args
                    .iter()
                    .map(|arg| arg(scope).map(|r| r.into_value().unwrap_or(Value::Null)))
                    .collect::<Result<Vec<_>, _>>()?;
                scope
                    .registry
                    .call(&name, &args, &bindings)
                    .map(Resolved::Value)
            })
        }
    }
}

fn compile_all(parts: &[ExprIR], env: &Env) -> Vec<ExprFn> {
    parts.iter().map(|part| compile_expr(part, env)).collect()
}

fn compile_step(step: &StepIR, env: &Env) -> StepFn {
    match step {
        StepIR::Builtin { func, args } => {
            let (func, args) = (*func, args.clone());
            let config = Arc::clone(&env.config);
            step_fn(move |registry, value, group| {
                group.reset();
                runtime::invoke_builtin(registry, func, value, &args, &config)
            })
        }
        StepIR::Lookup(index) => {
            let table = Arc::clone(&env.lookups[*index]);
            step_fn(move |_, value, group| {
                group.reset();
                Ok(runtime::lookup(&table, value))
            })
        }
        StepIR::When { pattern, result } => {
            let (pattern, result) = (pattern.clone(), result.clone());
            step_fn(move |_, value, group| Ok(group.when(value, &pattern, &result)))
        }
        StepIR::Else(fallback) => {
            let fallback = fallback.clone();
            step_fn(move |_, value, group| Ok(group.otherwise(value, &fallback)))
        }
        StepIR::External { name, args } => {
            let (name, args) = (name.clone(), args.clone());
            let bindings = Arc::clone(&env.bindings);
            step_fn(move |registry, value, group| {
                group.reset();
                runtime::invoke_external(registry, &bindings, &name, value, &args)
            })
        }
    }
}

fn expr_fn<F>(f: F) -> ExprFn
where
    F: Fn(&Scope<'_>) -> Result<Resolved, TransformError> + Send + Sync + 'static,
{
    Arc::new(f)
}

fn step_fn<F>(f: F) -> StepFn
where
    F: Fn(&FunctionRegistry, Value, &mut CaseGroup) -> Result<Value, TransformError>
        + Send
        + Sync
        + 'static,
{
    Arc::new(f)
}
