//! Mapping compiler
//!
//! Lowers a parsed mapping to IR, then either builds an in-process
//! [`CompiledMapping`] or renders standalone Rust source.

use std::path::Path;

use schemamap_core::Mapping;

use crate::artifact::CompiledMapping;
use crate::error::Result;
use crate::generator::Generator;
use crate::ir::ProgramIR;

/// Options for the compiler
#[derive(Debug, Clone)]
pub struct CompileOptions {
    /// Name of the generated Rust module; the struct is its CamelCase form
    pub module_name: String,

    /// Whether generated source carries per-rule comments
    pub debug: bool,
}

impl Default for CompileOptions {
    fn default() -> Self {
        Self {
            module_name: "compiled_mapping".to_string(),
            debug: false,
        }
    }
}

/// Mapping compiler
#[derive(Debug, Clone)]
pub struct Compiler {
    options: CompileOptions,
    generator: Generator,
}

impl Default for Compiler {
    fn default() -> Self {
        Self::new(CompileOptions::default())
    }
}

impl Compiler {
    /// Create a new compiler with the given options
    pub fn new(options: CompileOptions) -> Self {
        Self {
            generator: if options.debug {
                Generator::new().with_debug_comments()
            } else {
                Generator::new()
            },
            options,
        }
    }

    /// Compiler options
    pub fn options(&self) -> &CompileOptions {
        &self.options
    }

    /// Compile a mapping into an in-process artifact. Never fails on a
    /// mapping produced by the parser.
    pub fn compile(&self, mapping: &Mapping) -> CompiledMapping {
        let ir = ProgramIR::lower(mapping);
        let compiled = CompiledMapping::from_ir(&ir);
        tracing::info!(
            rules = ir.rules.len(),
            lookups = ir.lookups.len(),
            fingerprint = compiled.fingerprint(),
            "compiled mapping"
        );
        compiled
    }

    /// Render a mapping as a standalone Rust module
    pub fn generate_rust(&self, mapping: &Mapping) -> Result<String> {
        let ir = ProgramIR::lower(mapping);
        self.generator.generate(&ir, &self.options.module_name)
    }

    /// Render a mapping and write the module to `path`
    pub fn write_rust(&self, mapping: &Mapping, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let source = self.generate_rust(mapping)?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, source)?;
        tracing::debug!("Saved generated Rust: {}", path.display());
        Ok(())
    }
}

/// Compile a mapping with default options
pub fn compile(mapping: &Mapping) -> CompiledMapping {
    Compiler::default().compile(mapping)
}

/// Render a mapping as Rust source
pub fn generate_rust(mapping: &Mapping, options: &CompileOptions) -> Result<String> {
    Compiler::new(options.clone()).generate_rust(mapping)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use schemamap_core::parse;

    #[test]
    fn test_compile_options_default() {
        let opts = CompileOptions::default();
        assert!(!opts.debug);
        assert_eq!(opts.module_name, "compiled_mapping");
    }

    #[test]
    fn test_compile_and_generate_agree_on_fingerprint() {
        let mapping = parse("a : b | trim\n").unwrap();
        let compiled = compile(&mapping);
        let source = generate_rust(&mapping, &CompileOptions::default()).unwrap();
        assert!(source.contains(compiled.fingerprint()));
        assert!(source.contains("pub struct CompiledMapping {"));
    }

    #[test]
    fn test_debug_option_enables_comments() {
        let mapping = parse("a : b\n").unwrap();
        let compiler = Compiler::new(CompileOptions {
            debug: true,
            ..CompileOptions::default()
        });
        assert!(compiler.generate_rust(&mapping).unwrap().contains("// rule 0"));
    }

    #[test]
    fn test_bad_module_name() {
        let mapping = parse("a : b\n").unwrap();
        let options = CompileOptions {
            module_name: "not a module".to_string(),
            ..CompileOptions::default()
        };
        assert!(matches!(
            generate_rust(&mapping, &options),
            Err(Error::InvalidModuleName(_))
        ));
    }

    #[test]
    fn test_write_rust() {
        let mapping = parse("a : b\n").unwrap();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("generated").join("mapping.rs");
        Compiler::default().write_rust(&mapping, &path).unwrap();
        let written = std::fs::read_to_string(&path).unwrap();
        assert!(written.contains("fn rule_0"));
    }
}
