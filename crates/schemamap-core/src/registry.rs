//! Function dispatch table
//!
//! Names resolve in two namespaces: functions registered by the host are
//! checked first, then the fixed built-in catalogue. Registration can happen
//! after a mapping was parsed, so unknown names in rules are only reported
//! when a record reaches them.
//!
//! # Example
//!
//! ```rust,ignore
//! let mut registry = FunctionRegistry::new();
//! registry.register_function_with_arity("discount", 2, |args| {
//!     let price = args[0].as_f64().ok_or("price must be a number")?;
//!     let pct = args[1].as_f64().ok_or("pct must be a number")?;
//!     Ok(json!(price * (1.0 - pct / 100.0)))
//! });
//! ```

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use indexmap::IndexMap;
use serde_json::Value;

use crate::ast::FunctionBinding;
use crate::builtins::Builtin;
use crate::error::{TransformError, TransformErrorKind};

/// Result returned by host functions; the error string becomes the message
/// of an [`TransformErrorKind::ExternalFunction`] error.
pub type FunctionResult = std::result::Result<Value, String>;

/// A host-supplied callable
pub type ExternalFn = Arc<dyn Fn(&[Value]) -> FunctionResult + Send + Sync>;

/// Accepted argument counts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Arity {
    /// Fewest arguments
    pub min: usize,
    /// Most arguments; `None` when unbounded
    pub max: Option<usize>,
}

impl Arity {
    /// Exactly `n` arguments
    pub const fn exact(n: usize) -> Self {
        Self {
            min: n,
            max: Some(n),
        }
    }

    /// Between `min` and `max` arguments
    pub const fn range(min: usize, max: usize) -> Self {
        Self {
            min,
            max: Some(max),
        }
    }

    /// At least `min` arguments
    pub const fn at_least(min: usize) -> Self {
        Self { min, max: None }
    }

    /// Any number of arguments
    pub const fn variadic() -> Self {
        Self::at_least(0)
    }

    /// Whether `n` arguments are acceptable
    pub fn accepts(&self, n: usize) -> bool {
        n >= self.min && self.max.is_none_or(|max| n <= max)
    }
}

impl fmt::Display for Arity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.max {
            Some(max) if max == self.min => write!(f, "{max}"),
            Some(max) => write!(f, "{}..={max}", self.min),
            None => write!(f, "at least {}", self.min),
        }
    }
}

/// A registered host function
#[derive(Clone)]
pub struct ExternalFunction {
    name: String,
    arity: Arity,
    func: ExternalFn,
}

impl ExternalFunction {
    /// Registered name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Declared arity
    pub fn arity(&self) -> Arity {
        self.arity
    }

    /// Invoke with positional arguments
    pub fn call(&self, args: &[Value]) -> Result<Value, TransformError> {
        if !self.arity.accepts(args.len()) {
            return Err(TransformError::new(
                TransformErrorKind::ArityMismatch,
                format!(
                    "function '{}' expects {} argument(s), got {}",
                    self.name,
                    self.arity,
                    args.len()
                ),
            ));
        }
        (self.func)(args).map_err(|message| {
            TransformError::new(
                TransformErrorKind::ExternalFunction,
                format!("function '{}' failed: {message}", self.name),
            )
        })
    }

    /// Invoke as a chain step: the piped value comes first
    pub fn call_step(&self, value: Value, args: &[Value]) -> Result<Value, TransformError> {
        let mut full = Vec::with_capacity(args.len() + 1);
        full.push(value);
        full.extend_from_slice(args);
        self.call(&full)
    }
}

impl fmt::Debug for ExternalFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExternalFunction")
            .field("name", &self.name)
            .field("arity", &self.arity)
            .finish_non_exhaustive()
    }
}

/// Host functions by name
#[derive(Clone, Default)]
pub struct FunctionRegistry {
    functions: HashMap<String, ExternalFunction>,
}

impl FunctionRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a function accepting any number of arguments
    pub fn register_function<F>(&mut self, name: impl Into<String>, func: F) -> &mut Self
    where
        F: Fn(&[Value]) -> FunctionResult + Send + Sync + 'static,
    {
        self.insert(name.into(), Arity::variadic(), Arc::new(func))
    }

    /// Register a function taking exactly `arity` arguments
    pub fn register_function_with_arity<F>(
        &mut self,
        name: impl Into<String>,
        arity: usize,
        func: F,
    ) -> &mut Self
    where
        F: Fn(&[Value]) -> FunctionResult + Send + Sync + 'static,
    {
        self.insert(name.into(), Arity::exact(arity), Arc::new(func))
    }

    /// Register several variadic functions at once
    pub fn register_functions<I, N>(&mut self, functions: I) -> &mut Self
    where
        I: IntoIterator<Item = (N, ExternalFn)>,
        N: Into<String>,
    {
        for (name, func) in functions {
            self.insert(name.into(), Arity::variadic(), func);
        }
        self
    }

    fn insert(&mut self, name: String, arity: Arity, func: ExternalFn) -> &mut Self {
        if Builtin::from_name(&name).is_some() {
            tracing::debug!(function = %name, "external function shadows built-in");
        }
        let function = ExternalFunction {
            name: name.clone(),
            arity,
            func,
        };
        if self.functions.insert(name.clone(), function).is_some() {
            tracing::debug!(function = %name, "external function replaced");
        }
        self
    }

    /// Registered function by exact name
    pub fn get(&self, name: &str) -> Option<&ExternalFunction> {
        self.functions.get(name)
    }

    /// Whether a host function is registered under `name`
    pub fn has_function(&self, name: &str) -> bool {
        self.functions.contains_key(name)
    }

    /// Registered names, sorted
    pub fn function_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.functions.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Number of registered functions
    pub fn len(&self) -> usize {
        self.functions.len()
    }

    /// Whether nothing is registered
    pub fn is_empty(&self) -> bool {
        self.functions.is_empty()
    }

    /// Find a host function by name, then by the qualified id bound to that
    /// name in `@functions`.
    pub fn resolve_external(
        &self,
        name: &str,
        bindings: &IndexMap<String, FunctionBinding>,
    ) -> Option<&ExternalFunction> {
        self.get(name)
            .or_else(|| bindings.get(name).and_then(|b| self.get(&b.target)))
    }

    /// Call a host function used by `@call` or `@compute`
    pub fn call(
        &self,
        name: &str,
        args: &[Value],
        bindings: &IndexMap<String, FunctionBinding>,
    ) -> Result<Value, TransformError> {
        self.resolve_external(name, bindings)
            .ok_or_else(|| unknown_function(name))?
            .call(args)
    }
}

pub(crate) fn unknown_function(name: &str) -> TransformError {
    TransformError::new(
        TransformErrorKind::UnknownFunction,
        format!("no function registered as '{name}'"),
    )
}

impl fmt::Debug for FunctionRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FunctionRegistry")
            .field("functions", &self.function_names())
            .finish()
    }
}
