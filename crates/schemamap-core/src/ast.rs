//! Mapping AST
//!
//! A parsed mapping owns every source expression in one arena; composite
//! expressions refer to their parts by [`ExprId`] and lookup steps refer to
//! tables by [`LookupId`]. Aliases are already expanded into the rule chains
//! they appear in, so consumers never resolve names at run time.

use std::collections::BTreeMap;
use std::fmt;

use indexmap::IndexMap;
use serde_json::{Map, Value};

use crate::builtins::Builtin;
use crate::config::Config;

/// Index of a [`SourceExpr`] in the mapping arena
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ExprId(pub(crate) usize);

impl ExprId {
    /// Position in the arena
    pub fn index(self) -> usize {
        self.0
    }
}

/// Index of a [`LookupTable`] in the mapping
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LookupId(pub(crate) usize);

impl LookupId {
    /// Position in [`Mapping::lookups`]
    pub fn index(self) -> usize {
        self.0
    }
}

/// One step of a field or target path
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PathSegment {
    /// Object key
    Key(String),
    /// Array index; negative values count from the end
    Index(i64),
    /// Every element of an array
    Wildcard,
}

fn write_segments(f: &mut fmt::Formatter<'_>, segments: &[PathSegment]) -> fmt::Result {
    for (i, segment) in segments.iter().enumerate() {
        match segment {
            PathSegment::Key(key) if i == 0 => write!(f, "{key}")?,
            PathSegment::Key(key) => write!(f, ".{key}")?,
            PathSegment::Index(index) => write!(f, "[{index}]")?,
            PathSegment::Wildcard => f.write_str("[*]")?,
        }
    }
    Ok(())
}

/// A path into the input record
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FieldPath {
    /// Segments from the record root
    pub segments: Vec<PathSegment>,
    /// Marked with a trailing `?`
    pub optional: bool,
}

impl FieldPath {
    /// Whether any segment is a wildcard
    pub fn has_wildcard(&self) -> bool {
        self.segments.contains(&PathSegment::Wildcard)
    }
}

impl fmt::Display for FieldPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_segments(f, &self.segments)?;
        if self.optional {
            f.write_str("?")?;
        }
        Ok(())
    }
}

/// A path into the output record; holds at most one wildcard
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TargetPath {
    /// Segments from the output root
    pub segments: Vec<PathSegment>,
}

impl TargetPath {
    /// Position of the wildcard segment, if any
    pub fn wildcard_position(&self) -> Option<usize> {
        self.segments
            .iter()
            .position(|s| matches!(s, PathSegment::Wildcard))
    }

    /// Whether the target is written once per broadcast index
    pub fn has_wildcard(&self) -> bool {
        self.wildcard_position().is_some()
    }
}

impl fmt::Display for TargetPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_segments(f, &self.segments)
    }
}

/// Output type produced by a typed built-in, used for `null_handling: default`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueKind {
    /// JSON string
    String,
    /// Integral number
    Integer,
    /// Floating point number
    Float,
    /// Boolean
    Boolean,
    /// Array
    Array,
    /// Object
    Object,
}

impl ValueKind {
    /// The value substituted for null under `null_handling: default`
    pub fn default_value(self) -> Value {
        match self {
            Self::String => Value::String(String::new()),
            Self::Integer => Value::from(0),
            Self::Float => Value::from(0.0),
            Self::Boolean => Value::Bool(false),
            Self::Array => Value::Array(Vec::new()),
            Self::Object => Value::Object(Map::new()),
        }
    }
}

/// Aggregate functions available inside `@compute`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AggregateFn {
    /// Number of elements
    Count,
    /// Sum of numeric elements
    Sum,
    /// Mean of numeric elements
    Avg,
    /// Smallest numeric element
    Min,
    /// Largest numeric element
    Max,
}

impl AggregateFn {
    /// Look up an aggregate by its source name
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "count" => Some(Self::Count),
            "sum" => Some(Self::Sum),
            "avg" => Some(Self::Avg),
            "min" => Some(Self::Min),
            "max" => Some(Self::Max),
            _ => None,
        }
    }

    /// Source name
    pub fn name(self) -> &'static str {
        match self {
            Self::Count => "count",
            Self::Sum => "sum",
            Self::Avg => "avg",
            Self::Min => "min",
            Self::Max => "max",
        }
    }
}

/// Binary arithmetic operators available inside `@compute`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArithOp {
    /// `+`
    Add,
    /// `-`
    Sub,
    /// `*`
    Mul,
    /// `/`
    Div,
}

impl ArithOp {
    /// Operator as written in source
    pub fn symbol(self) -> char {
        match self {
            Self::Add => '+',
            Self::Sub => '-',
            Self::Mul => '*',
            Self::Div => '/',
        }
    }
}

/// Computed sources introduced by `@compute` and `@call`
#[derive(Debug, Clone, PartialEq)]
pub enum Compute {
    /// `@compute(sum(items[*].price))`
    Aggregate {
        /// Aggregate to apply
        func: AggregateFn,
        /// Values to aggregate
        path: FieldPath,
    },
    /// `@compute(qty * price)`
    Arithmetic {
        /// Operator
        op: ArithOp,
        /// Left operand
        lhs: ExprId,
        /// Right operand
        rhs: ExprId,
    },
    /// `@call(name, args...)` or `@compute(name(args...))`
    Call {
        /// Registered or bound function name
        name: String,
        /// Argument expressions
        args: Vec<ExprId>,
    },
}

/// Rule source expressions
#[derive(Debug, Clone, PartialEq)]
pub enum SourceExpr {
    /// A path into the input record
    Field(FieldPath),
    /// A constant
    Literal(Value),
    /// `a + b + ...`: parts stringified and joined
    Concat(Vec<ExprId>),
    /// `a ?? b ?? ...`: first part neither absent nor null
    Coalesce(Vec<ExprId>),
    /// Current timestamp
    Now,
    /// Fresh random UUID
    Uuid,
    /// Aggregate, arithmetic or function call
    Compute(Compute),
}

/// One step of a transform chain
#[derive(Debug, Clone, PartialEq)]
pub enum TransformStep {
    /// A catalogue function with literal arguments
    Builtin {
        /// Function
        func: Builtin,
        /// Literal arguments after the piped value
        args: Vec<Value>,
    },
    /// Table lookup with pass-through on miss
    Lookup(LookupId),
    /// `when(pattern, result)`: one case of a case group
    When {
        /// Value compared against the current value
        pattern: Value,
        /// Replacement when it matches
        result: Value,
    },
    /// `else(fallback)`: closes a case group
    Else(Value),
    /// A function supplied by the host at run time
    External {
        /// Registered or bound name
        name: String,
        /// Literal arguments after the piped value
        args: Vec<Value>,
    },
}

/// A named, reusable chain fragment
#[derive(Debug, Clone, PartialEq)]
pub struct AliasDef {
    /// Alias name without the `@`
    pub name: String,
    /// Fully expanded steps
    pub steps: Vec<TransformStep>,
}

/// A key → value table used by `lookup` steps
#[derive(Debug, Clone, PartialEq, Default)]
pub struct LookupTable {
    /// Declared name; `None` for inline tables
    pub name: Option<String>,
    entries: BTreeMap<String, Value>,
}

impl LookupTable {
    /// Create an empty table
    pub fn new(name: Option<String>) -> Self {
        Self {
            name,
            entries: BTreeMap::new(),
        }
    }

    /// Insert an entry; returns false when the key already existed
    pub fn insert(&mut self, key: impl Into<String>, value: Value) -> bool {
        self.entries.insert(key.into(), value).is_none()
    }

    /// The string key a value is looked up by, if it is a scalar
    pub fn key_of(value: &Value) -> Option<std::borrow::Cow<'_, str>> {
        match value {
            Value::String(s) => Some(std::borrow::Cow::Borrowed(s.as_str())),
            Value::Number(n) => Some(std::borrow::Cow::Owned(n.to_string())),
            Value::Bool(b) => Some(std::borrow::Cow::Owned(b.to_string())),
            _ => None,
        }
    }

    /// Look up a value
    pub fn get(&self, value: &Value) -> Option<&Value> {
        let key = Self::key_of(value)?;
        self.entries.get(key.as_ref())
    }

    /// Entries in key order
    pub fn entries(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Number of entries
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the table has no entries
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// An `@functions` entry binding a local name to a qualified function id
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FunctionBinding {
    /// Name used in rules
    pub name: String,
    /// Qualified id the host registers, such as `"pricing:apply_discount"`
    pub target: String,
}

/// `@functions` bindings keyed by local name
pub type Bindings = IndexMap<String, FunctionBinding>;

/// One `source : target | chain` line
#[derive(Debug, Clone, PartialEq)]
pub struct MappingRule {
    /// Root source expression
    pub source: ExprId,
    /// Where the result is written
    pub target: TargetPath,
    /// Steps applied left to right
    pub chain: Vec<TransformStep>,
    /// Line the rule starts on
    pub line: usize,
    /// Output type of the last typed step, when known
    pub hint: Option<ValueKind>,
}

/// A fully parsed and resolved mapping
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Mapping {
    /// Options from `@config`
    pub config: Config,
    /// Expanded aliases in declaration order
    pub aliases: IndexMap<String, AliasDef>,
    /// Named and inline lookup tables
    pub lookups: Vec<LookupTable>,
    /// Names of declared tables
    pub lookup_names: IndexMap<String, LookupId>,
    /// `@functions` bindings in declaration order
    pub functions: Bindings,
    pub(crate) exprs: Vec<SourceExpr>,
    /// Rules in source order
    pub rules: Vec<MappingRule>,
}

impl Mapping {
    /// Source expression by id
    ///
    /// # Panics
    ///
    /// Ids are only minted by the parser for its own arena; an id from
    /// another mapping may be out of bounds.
    pub fn expr(&self, id: ExprId) -> &SourceExpr {
        &self.exprs[id.0]
    }

    /// Lookup table by id
    pub fn lookup(&self, id: LookupId) -> &LookupTable {
        &self.lookups[id.0]
    }

    /// Lookup table by declared name
    pub fn lookup_by_name(&self, name: &str) -> Option<&LookupTable> {
        self.lookup_names.get(name).map(|id| self.lookup(*id))
    }

    /// Number of expressions in the arena
    pub fn expr_count(&self) -> usize {
        self.exprs.len()
    }

    pub(crate) fn push_expr(&mut self, expr: SourceExpr) -> ExprId {
        self.exprs.push(expr);
        ExprId(self.exprs.len() - 1)
    }

    pub(crate) fn push_lookup(&mut self, table: LookupTable) -> LookupId {
        self.lookups.push(table);
        LookupId(self.lookups.len() - 1)
    }

    /// Whether an expression yields one value per element of a wildcard path.
    ///
    /// Computed sources always produce a single value: aggregates fold
    /// their wildcard path.
    pub fn broadcasts(&self, id: ExprId) -> bool {
        match self.expr(id) {
            SourceExpr::Field(path) => path.has_wildcard(),
            SourceExpr::Concat(parts) | SourceExpr::Coalesce(parts) => {
                parts.iter().any(|p| self.broadcasts(*p))
            }
            _ => false,
        }
    }

    /// Whether the rule source is a bare field path marked optional
    pub fn is_optional_field(&self, id: ExprId) -> bool {
        matches!(self.expr(id), SourceExpr::Field(path) if path.optional)
    }

    /// Render an expression back to mapping syntax
    pub fn render_expr(&self, id: ExprId) -> String {
        match self.expr(id) {
            SourceExpr::Field(path) => path.to_string(),
            SourceExpr::Literal(value) => value.to_string(),
            SourceExpr::Concat(parts) => self.render_parts(parts, " + "),
            SourceExpr::Coalesce(parts) => self.render_parts(parts, " ?? "),
            SourceExpr::Now => "@now".to_string(),
            SourceExpr::Uuid => "@uuid".to_string(),
            SourceExpr::Compute(Compute::Aggregate { func, path }) => {
                format!("@compute({}({path}))", func.name())
            }
            SourceExpr::Compute(Compute::Arithmetic { op, lhs, rhs }) => format!(
                "@compute({} {} {})",
                self.render_expr(*lhs),
                op.symbol(),
                self.render_expr(*rhs)
            ),
            SourceExpr::Compute(Compute::Call { name, args }) => {
                let mut out = format!("@call({name}");
                for arg in args {
                    out.push_str(", ");
                    out.push_str(&self.render_expr(*arg));
                }
                out.push(')');
                out
            }
        }
    }

    fn render_parts(&self, parts: &[ExprId], separator: &str) -> String {
        let rendered: Vec<String> = parts
            .iter()
            .map(|p| match self.expr(*p) {
                SourceExpr::Concat(_) | SourceExpr::Coalesce(_) => {
                    format!("({})", self.render_expr(*p))
                }
                _ => self.render_expr(*p),
            })
            .collect();
        rendered.join(separator)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_field_path_display() {
        let path = FieldPath {
            segments: vec![
                PathSegment::Key("orders".into()),
                PathSegment::Wildcard,
                PathSegment::Key("lines".into()),
                PathSegment::Index(-1),
            ],
            optional: true,
        };
        assert_eq!(path.to_string(), "orders[*].lines[-1]?");
        assert!(path.has_wildcard());
    }

    #[test]
    fn test_lookup_table_keys_scalars() {
        let mut table = LookupTable::new(Some("codes".into()));
        assert!(table.insert("1", json!("one")));
        assert!(table.insert("true", json!("yes")));
        assert!(!table.insert("1", json!("uno")));
        assert_eq!(table.get(&json!(1)), Some(&json!("uno")));
        assert_eq!(table.get(&json!("1")), Some(&json!("uno")));
        assert_eq!(table.get(&json!(true)), Some(&json!("yes")));
        assert_eq!(table.get(&json!(null)), None);
        assert_eq!(table.get(&json!(["1"])), None);
    }

    #[test]
    fn test_broadcasts() {
        let mut mapping = Mapping::default();
        let each = mapping.push_expr(SourceExpr::Field(FieldPath {
            segments: vec![PathSegment::Key("tags".into()), PathSegment::Wildcard],
            optional: false,
        }));
        let lit = mapping.push_expr(SourceExpr::Literal(json!("#")));
        let concat = mapping.push_expr(SourceExpr::Concat(vec![lit, each]));
        let agg = mapping.push_expr(SourceExpr::Compute(Compute::Aggregate {
            func: AggregateFn::Count,
            path: FieldPath {
                segments: vec![PathSegment::Key("tags".into()), PathSegment::Wildcard],
                optional: false,
            },
        }));
        assert!(mapping.broadcasts(each));
        assert!(!mapping.broadcasts(lit));
        assert!(mapping.broadcasts(concat));
        assert!(!mapping.broadcasts(agg));
        assert_eq!(mapping.render_expr(concat), "\"#\" + tags[*]");
        assert_eq!(mapping.render_expr(agg), "@compute(count(tags[*]))");
    }

    #[test]
    fn test_value_kind_defaults() {
        assert_eq!(ValueKind::String.default_value(), json!(""));
        assert_eq!(ValueKind::Integer.default_value(), json!(0));
        assert_eq!(ValueKind::Boolean.default_value(), json!(false));
    }
}
