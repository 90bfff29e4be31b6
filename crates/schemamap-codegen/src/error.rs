//! Error types for code generation

use thiserror::Error;

/// Result type for code generation operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while emitting artifacts
#[derive(Error, Debug)]
pub enum Error {
    /// Mapping structure the generator cannot express
    #[error("Invalid mapping: {message}")]
    InvalidMapping {
        /// Error message
        message: String,
    },

    /// Module name is not a Rust identifier
    #[error("Invalid module name '{0}'")]
    InvalidModuleName(String),

    /// Template rendering error
    #[error("Template error: {0}")]
    Template(#[from] minijinja::Error),

    /// IO error while writing generated source
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
