//! Intermediate Representation for compiled mappings
//!
//! The IR is a parsed [`Mapping`] with everything a backend would otherwise
//! look up at run time already settled: arena references become owned
//! trees, the absent-source reaction and the null fill of each rule are
//! fixed, and the set of error kinds that abort a record is computed once
//! from the config.

use schemamap_core::{
    AbsentAction, AggregateFn, ArithOp, Bindings, Builtin, Compute, Config, ExprId, LookupTable,
    Mapping, NullHandling, PathSegment, SourceExpr, TargetPath, TransformError,
    TransformErrorKind, TransformStep,
};
use serde_json::Value;

/// Intermediate representation of a complete mapping
#[derive(Debug, Clone, PartialEq)]
pub struct ProgramIR {
    /// Options used by built-ins at run time (date format, precision)
    pub config: Config,

    /// `@functions` bindings consulted for host calls
    pub bindings: Bindings,

    /// Embedded lookup tables, indexed by [`StepIR::Lookup`]
    pub lookups: Vec<LookupTable>,

    /// Rules in source order
    pub rules: Vec<RuleIR>,

    /// Error kinds that abort the record instead of skipping the rule
    pub fatal: Vec<TransformErrorKind>,
}

/// IR for a single rule
#[derive(Debug, Clone, PartialEq)]
pub struct RuleIR {
    /// Position in the mapping, reported on fatal errors
    pub index: usize,

    /// Source line, used in diagnostics
    pub line: usize,

    /// Source expression
    pub source: ExprIR,

    /// Source rendered back to mapping syntax
    pub source_text: String,

    /// Output location
    pub target: TargetPath,

    /// Reaction to an absent source
    pub action: AbsentAction,

    /// Replacement for null results under `null_handling: default`
    pub fill: Option<Value>,

    /// Expanded transform chain
    pub chain: Vec<StepIR>,
}

/// Source expression tree
#[derive(Debug, Clone, PartialEq)]
pub enum ExprIR {
    /// Path into the input record
    Field {
        /// Path segments
        segments: Vec<PathSegment>,
        /// Explicit out-of-range indices are errors
        strict: bool,
    },

    /// Constant
    Literal(Value),

    /// Stringify and join
    Concat(Vec<ExprIR>),

    /// First part neither absent nor null
    Coalesce(Vec<ExprIR>),

    /// Current timestamp
    Now,

    /// Fresh UUID
    Uuid,

    /// Fold a path with an aggregate
    Aggregate {
        /// Aggregate function
        func: AggregateFn,
        /// Path yielding the values
        segments: Vec<PathSegment>,
        /// Explicit out-of-range indices are errors
        strict: bool,
    },

    /// Binary arithmetic
    Arithmetic {
        /// Operator
        op: ArithOp,
        /// Left operand
        lhs: Box<ExprIR>,
        /// Right operand
        rhs: Box<ExprIR>,
    },

    /// Host function call
    Call {
        /// Function name as written
        name: String,
        /// Argument expressions
        args: Vec<ExprIR>,
    },
}

/// One transform step
#[derive(Debug, Clone, PartialEq)]
pub enum StepIR {
    /// Catalogue function
    Builtin {
        /// Function
        func: Builtin,
        /// Literal arguments
        args: Vec<Value>,
    },

    /// Lookup in an embedded table
    Lookup(usize),

    /// One case of a case group
    When {
        /// Compared value
        pattern: Value,
        /// Replacement
        result: Value,
    },

    /// Case group fallback
    Else(Value),

    /// Host function step
    External {
        /// Function name as written
        name: String,
        /// Literal arguments
        args: Vec<Value>,
    },
}

impl ProgramIR {
    /// Lower a parsed mapping
    pub fn lower(mapping: &Mapping) -> Self {
        let config = &mapping.config;
        let fatal = TransformErrorKind::ALL
            .iter()
            .copied()
            .filter(|kind| config.is_fatal(&TransformError::new(*kind, String::new())))
            .collect();

        let rules = mapping
            .rules
            .iter()
            .enumerate()
            .map(|(index, rule)| RuleIR {
                index,
                line: rule.line,
                source: lower_expr(mapping, rule.source),
                source_text: mapping.render_expr(rule.source),
                target: rule.target.clone(),
                action: config.absent_action(mapping.is_optional_field(rule.source)),
                fill: match config.null_handling {
                    NullHandling::Default => rule.hint.map(|kind| kind.default_value()),
                    _ => None,
                },
                chain: rule.chain.iter().map(lower_step).collect(),
            })
            .collect();

        Self {
            config: config.clone(),
            bindings: mapping.functions.clone(),
            lookups: mapping.lookups.clone(),
            rules,
            fatal,
        }
    }

    /// Whether an error aborts the record
    pub fn is_fatal(&self, err: &TransformError) -> bool {
        self.fatal.contains(&err.kind)
    }

    /// Get a hash of the IR for cache invalidation
    pub fn content_hash(&self) -> String {
        use sha2::{Digest, Sha256};

        let mut hasher = Sha256::new();
        hasher.update(format!("{:?}", self.config).as_bytes());
        hasher.update(format!("{:?}", self.bindings).as_bytes());
        for table in &self.lookups {
            hasher.update(format!("{table:?}").as_bytes());
        }
        for rule in &self.rules {
            hasher.update(format!("{rule:?}").as_bytes());
        }

        hex::encode(hasher.finalize())
    }
}

fn lower_expr(mapping: &Mapping, id: ExprId) -> ExprIR {
    let strict = mapping.config.strict_mode;
    let lower_all = |parts: &[ExprId]| parts.iter().map(|p| lower_expr(mapping, *p)).collect();
    match mapping.expr(id) {
        SourceExpr::Field(path) => ExprIR::Field {
            segments: path.segments.clone(),
            strict,
        },
        SourceExpr::Literal(value) => ExprIR::Literal(value.clone()),
        SourceExpr::Concat(parts) => ExprIR::Concat(lower_all(parts)),
        SourceExpr::Coalesce(parts) => ExprIR::Coalesce(lower_all(parts)),
        SourceExpr::Now => ExprIR::Now,
        SourceExpr::Uuid => ExprIR::Uuid,
        SourceExpr::Compute(Compute::Aggregate { func, path }) => ExprIR::Aggregate {
            func: *func,
            segments: path.segments.clone(),
            strict,
        },
        SourceExpr::Compute(Compute::Arithmetic { op, lhs, rhs }) => ExprIR::Arithmetic {
            op: *op,
            lhs: Box::new(lower_expr(mapping, *lhs)),
            rhs: Box::new(lower_expr(mapping, *rhs)),
        },
        SourceExpr::Compute(Compute::Call { name, args }) => ExprIR::Call {
            name: name.clone(),
            args: lower_all(args),
        },
    }
}

fn lower_step(step: &TransformStep) -> StepIR {
    match step {
        TransformStep::Builtin { func, args } => StepIR::Builtin {
            func: *func,
            args: args.clone(),
        },
        TransformStep::Lookup(id) => StepIR::Lookup(id.index()),
        TransformStep::When { pattern, result } => StepIR::When {
            pattern: pattern.clone(),
            result: result.clone(),
        },
        TransformStep::Else(fallback) => StepIR::Else(fallback.clone()),
        TransformStep::External { name, args } => StepIR::External {
            name: name.clone(),
            args: args.clone(),
        },
    }
}
