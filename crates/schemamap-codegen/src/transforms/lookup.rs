//! Lookup table codegen

use schemamap_core::LookupTable;

use super::str_literal;

/// Helper for generating lookup table code
pub struct LookupCodegen;

impl LookupCodegen {
    /// Static name of the table at `index`
    pub fn static_name(index: usize) -> String {
        format!("LOOKUP_{index}")
    }

    /// Generate a static PHF map declaration from a lookup table.
    ///
    /// Values are stored as JSON text and decoded on a hit, so tables whose
    /// values are numbers or objects embed as plain string maps.
    pub fn generate_static_map(index: usize, table: &LookupTable) -> String {
        let mut code = String::new();

        if let Some(name) = &table.name {
            code.push_str(&format!("/// `@{name}`\n"));
        }
        code.push_str(&format!(
            "static {}: phf::Map<&'static str, &'static str> = phf_map! {{\n",
            Self::static_name(index)
        ));
        for (key, value) in table.entries() {
            code.push_str(&format!(
                "    {} => {},\n",
                str_literal(key),
                str_literal(&value.to_string())
            ));
        }
        code.push_str("};\n");
        code
    }

    /// Expression performing a lookup of `value` in the table at `index`
    pub fn generate(index: usize) -> String {
        format!("lookup(&{}, value)", Self::static_name(index))
    }
}
