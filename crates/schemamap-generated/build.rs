//! Renders every corpus mapping into `$OUT_DIR/generated.rs`.

use std::fmt::Write as _;
use std::path::PathBuf;

use anyhow::Context;
use schemamap_codegen::{CompileOptions, generate_rust};

include!("src/corpus.rs");

fn main() -> anyhow::Result<()> {
    println!("cargo:rerun-if-changed=src/corpus.rs");

    let mut code = String::new();
    let mut arms = String::new();
    for (module, source) in CORPUS {
        let mapping =
            schemamap_core::parse(source).with_context(|| format!("parsing mapping '{module}'"))?;
        let options = CompileOptions {
            module_name: module.to_string(),
            debug: true,
        };
        let rendered = generate_rust(&mapping, &options)
            .with_context(|| format!("generating module '{module}'"))?;
        let ty = format!("{module}::{}", camel_case(module));

        writeln!(code, "pub mod {module} {{\n{rendered}}}\n")?;
        writeln!(
            code,
            "impl crate::GeneratedMapping for {ty} {{
    fn transform(&self, record: &Value) -> Result<Value, TransformError> {{
        {ty}::transform(self, record)
    }}

    fn transform_batch(&self, records: &[Value]) -> Result<Vec<Value>, TransformError> {{
        {ty}::transform_batch(self, records)
    }}
}}
"
        )?;
        writeln!(
            arms,
            "        \"{module}\" => {{
            let mut mapping = {ty}::new();
            *mapping.registry() = registry;
            Some(Box::new(mapping))
        }}"
        )?;
    }
    writeln!(
        code,
        "/// The generated module for a corpus entry, bound to `registry`
pub fn generated(name: &str, registry: FunctionRegistry) -> Option<Box<dyn GeneratedMapping>> {{
    match name {{
{arms}        _ => None,
    }}
}}"
    )?;

    let out_dir = PathBuf::from(std::env::var("OUT_DIR").context("OUT_DIR not set")?);
    std::fs::write(out_dir.join("generated.rs"), code).context("writing generated.rs")?;
    Ok(())
}

fn camel_case(module: &str) -> String {
    module
        .split('_')
        .filter(|part| !part.is_empty())
        .map(|part| {
            let mut chars = part.chars();
            chars
                .next()
                .map(|first| first.to_ascii_uppercase().to_string() + chars.as_str())
                .unwrap_or_default()
        })
        .collect()
}
