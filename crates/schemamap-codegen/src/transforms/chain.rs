//! Transform chain codegen

use crate::ir::StepIR;

use super::{LookupCodegen, args_literal, str_literal, value_literal};

/// Helper for generating transform steps
pub struct ChainCodegen;

impl ChainCodegen {
    /// Generate the statements of a chain closure body.
    ///
    /// The body threads `value` through every step and tracks case groups
    /// in `group`.
    pub fn generate(steps: &[StepIR]) -> Vec<String> {
        steps.iter().map(Self::generate_step).collect()
    }

    /// Generate a single `let value = ...;` statement
    pub fn generate_step(step: &StepIR) -> String {
        let expr = match step {
            StepIR::Builtin { func, args } => format!(
                "{{ group.reset(); runtime::invoke_builtin(&self.registry, Builtin::{func:?}, value, &{}, &self.config)? }}",
                args_literal(args)
            ),
            StepIR::Lookup(index) => {
                format!("{{ group.reset(); {} }}", LookupCodegen::generate(*index))
            }
            StepIR::When { pattern, result } => format!(
                "group.when(value, &{}, &{})",
                value_literal(pattern),
                value_literal(result)
            ),
            StepIR::Else(fallback) => {
                format!("group.otherwise(value, &{})", value_literal(fallback))
            }
            StepIR::External { name, args } => format!(
                "{{ group.reset(); runtime::invoke_external(&self.registry, &self.bindings, {}, value, &{})? }}",
                str_literal(name),
                args_literal(args)
            ),
        };
        format!("let value = {expr};")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use schemamap_core::Builtin;
    use serde_json::json;

    #[test]
    fn test_builtin_step() {
        let code = ChainCodegen::generate_step(&StepIR::Builtin {
            func: Builtin::Round,
            args: vec![json!(2)],
        });
        assert_eq!(
            code,
            "let value = { group.reset(); runtime::invoke_builtin(&self.registry, Builtin::Round, value, &[Value::from(2_i64)], &self.config)? };"
        );
    }

    #[test]
    fn test_case_group_steps_keep_group() {
        let steps = ChainCodegen::generate(&[
            StepIR::When {
                pattern: json!("A"),
                result: json!("Alpha"),
            },
            StepIR::Else(json!(null)),
        ]);
        assert!(steps[0].starts_with("let value = group.when(value, "));
        assert_eq!(steps[1], "let value = group.otherwise(value, &Value::Null);");
        assert!(steps.iter().all(|s| !s.contains("reset")));
    }

    #[test]
    fn test_lookup_and_external_steps() {
        let lookup = ChainCodegen::generate_step(&StepIR::Lookup(1));
        assert_eq!(lookup, "let value = { group.reset(); lookup(&LOOKUP_1, value) };");

        let external = ChainCodegen::generate_step(&StepIR::External {
            name: "shout".into(),
            args: vec![],
        });
        assert!(external.contains("invoke_external(&self.registry, &self.bindings, \"shout\", value, &[])?"));
    }
}
