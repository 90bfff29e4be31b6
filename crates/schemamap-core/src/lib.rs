//! SchemaMap Core Library
//!
//! This crate provides the mapping-language engine:
//! - Lexer and recursive-descent parser for mapping source
//! - Arena-based AST with resolved aliases and lookup tables
//! - Path resolution over nested JSON records
//! - The built-in transform catalogue and host function registry
//! - The reference interpreter
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────┐     ┌─────────────┐     ┌─────────────┐
//! │   Source    │────▶│   Mapping   │────▶│ Interpreter │──▶ record
//! │   (.smap)   │     │    (AST)    │     └─────────────┘
//! └─────────────┘     └─────────────┘
//!                            │            ┌─────────────┐
//!                            └───────────▶│  Compiler   │──▶ artifact
//!                                         └─────────────┘
//! ```
//!
//! # Example
//!
//! ```rust
//! use schemamap_core::{Interpreter, parse};
//! use serde_json::json;
//!
//! let mapping = parse("tags[*] : interests[*] | lowercase\n").unwrap();
//! let out = Interpreter::new(&mapping)
//!     .transform(&json!({"tags": ["A", "B"]}))
//!     .unwrap();
//! assert_eq!(out, json!({"interests": ["a", "b"]}));
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod ast;
pub mod builtins;
pub mod config;
pub mod error;
pub mod evaluator;
pub mod interpreter;
pub mod lexer;
pub mod parser;
pub mod path;
pub mod registry;
pub mod runtime;
pub mod value;

pub use ast::{
    AggregateFn, AliasDef, ArithOp, Bindings, Compute, ExprId, FieldPath, FunctionBinding, LookupId,
    LookupTable, Mapping, MappingRule, PathSegment, SourceExpr, TargetPath, TransformStep,
    ValueKind,
};
pub use builtins::Builtin;
pub use config::{AbsentAction, Config, MissingFields, NullHandling};
pub use error::{
    Error, LexError, LexErrorKind, ParseError, ParseErrorKind, Result, TransformError,
    TransformErrorKind,
};
pub use evaluator::Evaluator;
pub use interpreter::{Interpreter, transform};
pub use lexer::{Span, Token, TokenKind, tokenize};
pub use parser::parse;
pub use path::Resolved;
pub use registry::{Arity, ExternalFn, ExternalFunction, FunctionRegistry, FunctionResult};
