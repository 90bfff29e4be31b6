//! Rust source generation
//!
//! Renders a [`ProgramIR`] into a standalone Rust module through a
//! minijinja template. The module exposes one struct with `transform`,
//! `transform_batch` and `register_function`, embeds every lookup table as
//! a `phf` static map and fixes the config policies into plain code. It
//! depends on `schemamap-core`, `serde_json`, `phf` (with `macros`) and
//! `tracing`.

use minijinja::{AutoEscape, Environment, context};
use serde::Serialize;

use crate::error::{Error, Result};
use crate::ir::{ProgramIR, RuleIR, StepIR};
use crate::transforms::{
    ChainCodegen, LookupCodegen, SourceCodegen, segments_literal, str_literal, value_literal,
};

const MODULE_TEMPLATE: &str = r#"//! Generated by schemamap-codegen. Do not edit.
//!
//! Fingerprint: {{ fingerprint }}

#![allow(dead_code, unused_imports, unused_mut, unused_variables, clippy::all)]

use phf::phf_map;
use schemamap_core::path::{self, Resolved};
use schemamap_core::runtime::{self, CaseGroup};
use schemamap_core::{
    AbsentAction, AggregateFn, ArithOp, Bindings, Builtin, Config, FunctionBinding,
    FunctionRegistry, FunctionResult, LookupTable, MissingFields, NullHandling, PathSegment,
    TargetPath, TransformError, TransformErrorKind, builtins,
};
use serde_json::Value;

/// Structure hash of the mapping this module was generated from
pub const FINGERPRINT: &str = "{{ fingerprint }}";
{% for table in tables %}
{{ table }}{% endfor %}
fn lookup(table: &phf::Map<&'static str, &'static str>, value: Value) -> Value {
    if value.is_null() {
        return value;
    }
    LookupTable::key_of(&value)
        .and_then(|key| table.get(key.as_ref()))
        .and_then(|raw| serde_json::from_str(raw).ok())
        .unwrap_or(value)
}

fn is_fatal(err: &TransformError) -> bool {
{%- if fatal %}
    matches!(err.kind, {{ fatal | join(" | ") }})
{%- else %}
    false
{%- endif %}
}

/// Compiled mapping
#[derive(Debug, Clone)]
pub struct {{ struct_name }} {
    registry: FunctionRegistry,
    bindings: Bindings,
    config: Config,
}

impl Default for {{ struct_name }} {
    fn default() -> Self {
        Self::new()
    }
}

impl {{ struct_name }} {
    /// Create the mapping with no host functions registered
    pub fn new() -> Self {
        let bindings = [{% for binding in bindings %}({{ binding[0] }}, {{ binding[1] }}), {% endfor %}]
            .into_iter()
            .map(|(name, target): (&str, &str)| {
                (
                    name.to_string(),
                    FunctionBinding {
                        name: name.to_string(),
                        target: target.to_string(),
                    },
                )
            })
            .collect();
        Self {
            registry: FunctionRegistry::new(),
            bindings,
            config: Config {
                null_handling: NullHandling::{{ config.null_handling }},
                missing_fields: MissingFields::{{ config.missing_fields }},
                date_format: String::from({{ config.date_format }}),
                decimal_precision: {{ config.decimal_precision }},
                strict_mode: {{ config.strict_mode }},
                extra: serde_json::Map::new(),
            },
        }
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

    /// Transform one record
    pub fn transform(&self, record: &Value) -> Result<Value, TransformError> {
        let mut output = runtime::output_root();
{%- for rule in rules %}
        if let Err(err) = self.rule_{{ rule.index }}(record, &mut output) {
            if is_fatal(&err) {
                return Err(err.at_rule({{ rule.index }}));
            }
            tracing::warn!(rule = {{ rule.index }}, line = {{ rule.line }}, error = %err, "rule skipped");
        }
{%- endfor %}
{%- if omit_nulls %}
        runtime::remove_nulls(&mut output);
{%- endif %}
        Ok(output)
    }

    /// Transform records in order; the first fatal error names its record
    pub fn transform_batch(&self, records: &[Value]) -> Result<Vec<Value>, TransformError> {
        records
            .iter()
            .enumerate()
            .map(|(i, record)| self.transform(record).map_err(|e| e.at_record(i)))
            .collect()
    }
{% for rule in rules %}
{%- if debug %}
    // rule {{ rule.index }}, line {{ rule.line }}: {{ rule.comment }}
{%- endif %}
    fn rule_{{ rule.index }}(&self, record: &Value, output: &mut Value) -> Result<(), TransformError> {
        let resolved = {{ rule.source }}?;
        let value = runtime::evaluate_rule(
            resolved,
            {{ rule.wildcard }},
            AbsentAction::{{ rule.action }},
            &{{ rule.source_text }},
            |value| {
                let mut group = CaseGroup::default();
{%- for step in rule.steps %}
                {{ step }}
{%- endfor %}
                Ok(value)
            },
        )?;
        let Some(value) = value else {
            return Ok(());
        };
        let target = TargetPath {
            segments: vec![{{ rule.target }}],
        };
        runtime::write_rule(output, &target, value, {{ rule.fill }})
    }
{% endfor -%}
}
"#;

#[derive(Serialize)]
struct RuleView {
    index: usize,
    line: usize,
    comment: String,
    source: String,
    source_text: String,
    wildcard: &'static str,
    action: String,
    steps: Vec<String>,
    target: String,
    fill: String,
}

#[derive(Serialize)]
struct ConfigView {
    null_handling: String,
    missing_fields: String,
    date_format: String,
    decimal_precision: u32,
    strict_mode: &'static str,
}

/// Renders compiled mappings as Rust source
#[derive(Debug, Clone, Default)]
pub struct Generator {
    debug_comments: bool,
}

impl Generator {
    /// Create a generator with default settings
    pub fn new() -> Self {
        Self::default()
    }

    /// Annotate each rule method with its source line
    pub fn with_debug_comments(mut self) -> Self {
        self.debug_comments = true;
        self
    }

    /// Render `ir` as the module `module_name`
    pub fn generate(&self, ir: &ProgramIR, module_name: &str) -> Result<String> {
        let struct_name = struct_name(module_name)?;
        check_lookups(ir)?;

        let mut env = Environment::new();
        env.set_auto_escape_callback(|_| AutoEscape::None);
        env.add_template("module.rs", MODULE_TEMPLATE)?;

        let tables: Vec<_> = ir
            .lookups
            .iter()
            .enumerate()
            .map(|(i, table)| LookupCodegen::generate_static_map(i, table))
            .collect();
        let bindings: Vec<_> = ir
            .bindings
            .values()
            .map(|b| (str_literal(&b.name), str_literal(&b.target)))
            .collect();
        let fatal: Vec<_> = ir
            .fatal
            .iter()
            .map(|kind| format!("TransformErrorKind::{kind:?}"))
            .collect();
        let config = ConfigView {
            null_handling: format!("{:?}", ir.config.null_handling),
            missing_fields: format!("{:?}", ir.config.missing_fields),
            date_format: str_literal(&ir.config.date_format),
            decimal_precision: ir.config.decimal_precision,
            strict_mode: rust_bool(ir.config.strict_mode),
        };
        let rules: Vec<_> = ir.rules.iter().map(rule_view).collect();

        let source = env.get_template("module.rs")?.render(context! {
            fingerprint => ir.content_hash(),
            struct_name => struct_name,
            tables => tables,
            bindings => bindings,
            fatal => fatal,
            config => config,
            rules => rules,
            omit_nulls => ir.config.null_handling == schemamap_core::NullHandling::Omit,
            debug => self.debug_comments,
        })?;

        tracing::debug!(
            module = module_name,
            bytes = source.len(),
            "generated mapping module"
        );
        Ok(source)
    }
}

/// Every lookup step must name an embedded table
fn check_lookups(ir: &ProgramIR) -> Result<()> {
    for rule in &ir.rules {
        for step in &rule.chain {
            if let StepIR::Lookup(index) = step
                && *index >= ir.lookups.len()
            {
                return Err(Error::InvalidMapping {
                    message: format!(
                        "rule {} reads lookup table {index} of {}",
                        rule.index,
                        ir.lookups.len()
                    ),
                });
            }
        }
    }
    Ok(())
}

fn rule_view(rule: &RuleIR) -> RuleView {
    RuleView {
        index: rule.index,
        line: rule.line,
        comment: format!("{} : {}", rule.source_text, rule.target),
        source: SourceCodegen::generate(&rule.source),
        source_text: str_literal(&rule.source_text),
        wildcard: rust_bool(rule.target.has_wildcard()),
        action: format!("{:?}", rule.action),
        steps: ChainCodegen::generate(&rule.chain),
        target: segments_literal(&rule.target.segments),
        fill: match &rule.fill {
            Some(value) => format!("Some(&{})", value_literal(value)),
            None => "None".to_string(),
        },
    }
}

// Jinja renders booleans as `True`/`False`
fn rust_bool(value: bool) -> &'static str {
    if value { "true" } else { "false" }
}

/// `order_mapping` → `OrderMapping`
fn struct_name(module_name: &str) -> Result<String> {
    let valid = module_name
        .chars()
        .next()
        .is_some_and(|c| c.is_ascii_lowercase() || c == '_')
        && module_name
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
        && module_name.chars().any(|c| c.is_ascii_lowercase());
    if !valid {
        return Err(Error::InvalidModuleName(module_name.to_string()));
    }
    Ok(module_name
        .split('_')
        .filter(|part| !part.is_empty())
        .map(|part| {
            let mut chars = part.chars();
            chars
                .next()
                .map(|first| first.to_ascii_uppercase().to_string() + chars.as_str())
                .unwrap_or_default()
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use schemamap_core::{PathSegment, parse};

    fn generate(source: &str) -> String {
        let ir = ProgramIR::lower(&parse(source).unwrap());
        Generator::new().generate(&ir, "order_mapping").unwrap()
    }

    #[rstest]
    #[case("order_mapping", "OrderMapping")]
    #[case("m2", "M2")]
    #[case("_private_map", "PrivateMap")]
    fn test_struct_name(#[case] module: &str, #[case] expected: &str) {
        assert_eq!(struct_name(module).unwrap(), expected);
    }

    #[rstest]
    #[case("")]
    #[case("2fast")]
    #[case("Order")]
    #[case("order-mapping")]
    #[case("___")]
    fn test_invalid_module_names(#[case] module: &str) {
        assert!(matches!(
            struct_name(module),
            Err(Error::InvalidModuleName(_))
        ));
    }

    #[test]
    fn test_module_shape() {
        let code = generate("user.status : status | lookup(@{\"A\":\"ACTIVE\"}) | trim\n");
        assert!(code.starts_with("//! Generated by schemamap-codegen"));
        assert!(code.contains("pub struct OrderMapping {"));
        assert!(code.contains("pub fn transform(&self, record: &Value)"));
        assert!(code.contains("pub fn transform_batch(&self, records: &[Value])"));
        assert!(code.contains("pub fn register_function<F>"));
        assert!(code.contains("static LOOKUP_0: phf::Map<&'static str, &'static str> = phf_map! {"));
        assert!(code.contains("fn rule_0(&self, record: &Value, output: &mut Value)"));
        assert!(code.contains("lookup(&LOOKUP_0, value)"));
        assert!(code.contains("Builtin::Trim"));
        assert!(code.contains(&format!(
            "segments: vec![{}]",
            segments_literal(&[PathSegment::Key("status".into())])
        )));
    }

    #[test]
    fn test_policies_are_fixed_code() {
        let code = generate("@config { missing_fields: error, null_handling: omit }\nid : id\n");
        assert!(code.contains("matches!(err.kind, TransformErrorKind::MissingField)"));
        assert!(code.contains("AbsentAction::Fail"));
        assert!(code.contains("runtime::remove_nulls(&mut output);"));
        assert!(code.contains("null_handling: NullHandling::Omit"));
        assert!(code.contains("strict_mode: false,"));
        assert!(!code.contains("False") && !code.contains("True"));

        let code = generate("id : id\n");
        assert!(!code.contains("remove_nulls(&mut output)"));
        assert!(code.contains("AbsentAction::Null"));
        assert!(code.contains("fn is_fatal(err: &TransformError) -> bool {\n    false\n}"));
    }

    #[test]
    fn test_booleans_render_as_rust() {
        let code = generate("@config { strict_mode: true }\ntags[*] : out[*]\nid : id\n");
        assert!(code.contains("strict_mode: true,"));
        assert!(code.contains("            true,\n            AbsentAction::"));
        assert!(code.contains("            false,\n            AbsentAction::"));
        assert!(code.contains("PathSegment::Wildcard], true)"));
        assert!(!code.contains("True") && !code.contains("False"));
    }

    #[test]
    fn test_bindings_and_aliases() {
        let code = generate(
            "@functions { discount: \"pricing:discount\" }\n@aliases { Clean: trim | uppercase }\n@compute(discount(price)) : net\nname : name | @Clean\n",
        );
        assert!(code.contains("(\"discount\", \"pricing:discount\"), "));
        assert!(code.contains("Builtin::Uppercase"));
        assert!(!code.contains("Clean"));
    }

    #[test]
    fn test_debug_comments() {
        let ir = ProgramIR::lower(&parse("a : b\n").unwrap());
        let plain = Generator::new().generate(&ir, "m").unwrap();
        let annotated = Generator::new()
            .with_debug_comments()
            .generate(&ir, "m")
            .unwrap();
        assert!(!plain.contains("// rule 0"));
        assert!(annotated.contains("// rule 0, line 1: a : b"));
    }

    #[test]
    fn test_dangling_lookup_rejected() {
        let mut ir = ProgramIR::lower(&parse("s : s | lookup(@{\"A\": 1})\n").unwrap());
        ir.lookups.clear();
        let err = Generator::new().generate(&ir, "m").unwrap_err();
        assert!(matches!(err, Error::InvalidMapping { .. }));
        assert!(err.to_string().contains("rule 0 reads lookup table 0 of 0"));
    }

    #[test]
    fn test_fingerprint_embedded() {
        let ir = ProgramIR::lower(&parse("a : b\n").unwrap());
        let code = Generator::new().generate(&ir, "m").unwrap();
        assert!(code.contains(&format!("pub const FINGERPRINT: &str = \"{}\";", ir.content_hash())));
    }
}
