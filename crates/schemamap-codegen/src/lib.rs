//! SchemaMap Code Generation
//!
//! This crate compiles parsed mappings into executable artifacts.
//!
//! # Pipeline
//!
//! ```text
//! ┌─────────────┐     ┌─────────────┐     ┌─────────────────┐
//! │   Mapping   │────▶│  ProgramIR  │────▶│ CompiledMapping │  (closures)
//! │    (AST)    │     │             │     └─────────────────┘
//! └─────────────┘     └─────────────┘     ┌─────────────────┐
//!                            └───────────▶│   Rust source   │  (minijinja)
//!                                         └─────────────────┘
//! ```
//!
//! Both artifacts produce the same records as the interpreter in
//! `schemamap-core`: they call the same runtime primitives.
//!
//! # Example
//!
//! ```rust
//! use schemamap_codegen::compile;
//! use schemamap_core::parse;
//! use serde_json::json;
//!
//! let mapping = parse("tags[*] : interests[*] | lowercase\n").unwrap();
//! let compiled = compile(&mapping);
//! let out = compiled.transform(&json!({"tags": ["A", "B"]})).unwrap();
//! assert_eq!(out, json!({"interests": ["a", "b"]}));
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod artifact;
pub mod compiler;
pub mod error;
pub mod generator;
pub mod ir;
pub mod transforms;

pub use artifact::CompiledMapping;
pub use compiler::{CompileOptions, Compiler, compile, generate_rust};
pub use error::{Error, Result};
pub use generator::Generator;
pub use ir::{ExprIR, ProgramIR, RuleIR, StepIR};
