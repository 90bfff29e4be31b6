//! Error types for schemamap-core
//!
//! Errors come in three families that mirror the pipeline stages: lexing,
//! parsing and record transformation. Each carries a machine-readable kind
//! plus a human-readable message.

use std::fmt;

use thiserror::Error;

use crate::lexer::Span;

/// Result type alias for schemamap-core operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in schemamap-core
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    /// Tokenization failed
    #[error(transparent)]
    Lex(#[from] LexError),

    /// Grammar or symbol resolution failed
    #[error(transparent)]
    Parse(#[from] ParseError),

    /// A record could not be transformed
    #[error(transparent)]
    Transform(#[from] TransformError),
}

/// Lexer failure categories
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LexErrorKind {
    /// A quoted string reached end of line or input without closing
    UnterminatedString,
    /// A character that cannot start any token
    InvalidCharacter,
    /// A numeric literal that does not fit the number grammar
    InvalidNumber,
}

/// Error raised while tokenizing mapping source
#[derive(Error, Debug, Clone, PartialEq)]
#[error("lex error at {span}: {message}")]
pub struct LexError {
    /// Failure category
    pub kind: LexErrorKind,
    /// Description of the error
    pub message: String,
    /// Where the offending character sits
    pub span: Span,
}

impl LexError {
    pub(crate) fn new(kind: LexErrorKind, message: impl Into<String>, span: Span) -> Self {
        Self {
            kind,
            message: message.into(),
            span,
        }
    }
}

/// Parser failure categories
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseErrorKind {
    /// A token appeared where the grammar does not allow it
    UnexpectedToken,
    /// A rule is missing its `:` between source and target
    MissingSeparator,
    /// An `@Name` step names no alias defined before it
    UnknownAliasReference,
    /// A `lookup(...)` step names no declared table
    UnknownLookupReference,
    /// An alias, lookup table, lookup key, function or config key was declared twice
    DuplicateDefinition,
    /// A declaration section appeared after a later one
    SectionOutOfOrder,
    /// A built-in step was given the wrong number of arguments
    InvalidTransformArity,
    /// An alias expands into itself
    AliasCycle,
    /// `+` and `??` mixed in one expression without parentheses
    AmbiguousOperators,
    /// A target path that cannot be written
    InvalidTarget,
    /// An `@config` entry with the wrong type or value
    InvalidConfig,
    /// A wildcard target fed by a source that yields a single value
    WildcardMismatch,
}

impl fmt::Display for ParseErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::UnexpectedToken => "unexpected token",
            Self::MissingSeparator => "missing separator",
            Self::UnknownAliasReference => "unknown alias",
            Self::UnknownLookupReference => "unknown lookup",
            Self::DuplicateDefinition => "duplicate definition",
            Self::SectionOutOfOrder => "section out of order",
            Self::InvalidTransformArity => "invalid arity",
            Self::AliasCycle => "alias cycle",
            Self::AmbiguousOperators => "ambiguous operators",
            Self::InvalidTarget => "invalid target",
            Self::InvalidConfig => "invalid config",
            Self::WildcardMismatch => "wildcard mismatch",
        };
        f.write_str(name)
    }
}

/// Error raised while parsing mapping source
#[derive(Error, Debug, Clone, PartialEq)]
#[error("{}", render_parse_error(self))]
pub struct ParseError {
    /// Failure category
    pub kind: ParseErrorKind,
    /// Description of the error
    pub message: String,
    /// Location of the offending token, when one exists
    pub span: Option<Span>,
}

fn render_parse_error(err: &ParseError) -> String {
    match err.span {
        Some(span) => format!("{} at {span}: {}", err.kind, err.message),
        None => format!("{}: {}", err.kind, err.message),
    }
}

impl ParseError {
    pub(crate) fn new(kind: ParseErrorKind, message: impl Into<String>, span: Option<Span>) -> Self {
        Self {
            kind,
            message: message.into(),
            span,
        }
    }
}

/// Transformation failure categories
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransformErrorKind {
    /// A required source field is absent
    MissingField,
    /// A value could not be converted to the requested type
    TypeConversion,
    /// An explicit array index fell outside the array
    IndexOutOfRange,
    /// A step or `@call` names no registered function
    UnknownFunction,
    /// A function received the wrong number of arguments
    ArityMismatch,
    /// Broadcast parts of one expression have different lengths
    CardinalityMismatch,
    /// A registered external function reported failure
    ExternalFunction,
    /// A built-in argument is malformed (bad regex, unknown algorithm)
    InvalidArgument,
    /// Two rules disagree about the shape of a target container
    TargetConflict,
}

impl TransformErrorKind {
    /// Every kind, in declaration order
    pub const ALL: &'static [TransformErrorKind] = &[
        Self::MissingField,
        Self::TypeConversion,
        Self::IndexOutOfRange,
        Self::UnknownFunction,
        Self::ArityMismatch,
        Self::CardinalityMismatch,
        Self::ExternalFunction,
        Self::InvalidArgument,
        Self::TargetConflict,
    ];
}

impl fmt::Display for TransformErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::MissingField => "missing field",
            Self::TypeConversion => "type conversion",
            Self::IndexOutOfRange => "index out of range",
            Self::UnknownFunction => "unknown function",
            Self::ArityMismatch => "arity mismatch",
            Self::CardinalityMismatch => "cardinality mismatch",
            Self::ExternalFunction => "external function",
            Self::InvalidArgument => "invalid argument",
            Self::TargetConflict => "target conflict",
        };
        f.write_str(name)
    }
}

/// Error raised while transforming a record
#[derive(Error, Debug, Clone, PartialEq)]
#[error("{}", render_transform_error(self))]
pub struct TransformError {
    /// Failure category
    pub kind: TransformErrorKind,
    /// Description of the error
    pub message: String,
    /// Index of the rule that failed, once known
    pub rule: Option<usize>,
    /// Position of the record within a batch, once known
    pub record: Option<usize>,
}

fn render_transform_error(err: &TransformError) -> String {
    let mut out = String::new();
    if let Some(record) = err.record {
        out.push_str(&format!("record {record}: "));
    }
    if let Some(rule) = err.rule {
        out.push_str(&format!("rule {rule}: "));
    }
    out.push_str(&format!("{}: {}", err.kind, err.message));
    out
}

impl TransformError {
    /// Create an error with no rule attribution
    pub fn new(kind: TransformErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            rule: None,
            record: None,
        }
    }

    /// Attribute the error to a rule, keeping an earlier attribution
    pub fn at_rule(mut self, rule: usize) -> Self {
        self.rule.get_or_insert(rule);
        self
    }

    /// Attribute the error to a record within a batch
    pub fn at_record(mut self, record: usize) -> Self {
        self.record.get_or_insert(record);
        self
    }

    pub(crate) fn missing_field(path: impl fmt::Display) -> Self {
        Self::new(
            TransformErrorKind::MissingField,
            format!("source field '{path}' is absent"),
        )
    }

    pub(crate) fn conversion(function: &str, message: impl fmt::Display) -> Self {
        Self::new(
            TransformErrorKind::TypeConversion,
            format!("{function}: {message}"),
        )
    }

    pub(crate) fn invalid_argument(function: &str, message: impl fmt::Display) -> Self {
        Self::new(
            TransformErrorKind::InvalidArgument,
            format!("{function}: {message}"),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transform_error_display_includes_attribution() {
        let err = TransformError::missing_field("user.id").at_rule(3).at_record(7);
        assert_eq!(
            err.to_string(),
            "record 7: rule 3: missing field: source field 'user.id' is absent"
        );
    }

    #[test]
    fn test_at_rule_keeps_first_attribution() {
        let err = TransformError::missing_field("a").at_rule(1).at_rule(2);
        assert_eq!(err.rule, Some(1));
    }

    #[test]
    fn test_parse_error_display_with_span() {
        let err = ParseError::new(
            ParseErrorKind::MissingSeparator,
            "expected ':' after source expression",
            Some(Span { line: 2, column: 9 }),
        );
        assert_eq!(
            err.to_string(),
            "missing separator at 2:9: expected ':' after source expression"
        );
    }

    #[test]
    fn test_umbrella_error_from_lex() {
        let err: Error = LexError::new(
            LexErrorKind::UnterminatedString,
            "unterminated string",
            Span { line: 1, column: 1 },
        )
        .into();
        assert!(matches!(err, Error::Lex(_)));
    }
}
