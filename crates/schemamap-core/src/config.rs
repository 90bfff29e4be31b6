//! Mapping configuration
//!
//! The `@config` block of a mapping is collected into a JSON object and
//! deserialized into [`Config`]. Every key is optional:
//!
//! ```text
//! @config {
//!     null_handling: omit        # keep | omit | default
//!     missing_fields: skip       # skip | error | default
//!     date_format: "YYYY-MM-DD"  # default output format for dates and @now
//!     decimal_precision: 2       # default scale for to_decimal
//!     strict_mode: false         # escalate lenient failures to errors
//! }
//! ```
//!
//! Unknown keys are preserved in [`Config::extra`] and reported with a
//! warning so typos do not silently change behavior.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{ParseError, ParseErrorKind, TransformError, TransformErrorKind};

/// Date format name meaning RFC 3339 / ISO 8601 output
pub const ISO8601: &str = "iso8601";

/// Options that control how a mapping treats nulls, absences and failures
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// What to do with null leaves in the output
    #[serde(default)]
    pub null_handling: NullHandling,

    /// What to do when a rule's source field is absent
    #[serde(default)]
    pub missing_fields: MissingFields,

    /// Default format for `format_date` and `@now`
    #[serde(default = "default_date_format")]
    pub date_format: String,

    /// Default scale for `to_decimal`
    #[serde(default = "default_decimal_precision")]
    pub decimal_precision: u32,

    /// Escalate conversion and index failures into record errors
    #[serde(default)]
    pub strict_mode: bool,

    /// Keys this version does not understand
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

fn default_date_format() -> String {
    ISO8601.to_string()
}

fn default_decimal_precision() -> u32 {
    2
}

impl Default for Config {
    fn default() -> Self {
        Self {
            null_handling: NullHandling::default(),
            missing_fields: MissingFields::default(),
            date_format: default_date_format(),
            decimal_precision: default_decimal_precision(),
            strict_mode: false,
            extra: Map::new(),
        }
    }
}

/// Null handling policy applied after all rules ran
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum NullHandling {
    /// Null leaves stay in the output
    #[default]
    Keep,
    /// Object fields holding null are removed
    Omit,
    /// Null leaves are replaced with the default of the rule's output type
    Default,
}

/// Policy for rules whose source field is absent
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MissingFields {
    /// The rule is skipped and its target left untouched
    Skip,
    /// The record fails with a missing field error
    Error,
    /// The chain runs with null in place of the absent value
    #[default]
    Default,
}

/// How a rule reacts once its source resolved to nothing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AbsentAction {
    /// Leave the target untouched
    Skip,
    /// Feed null into the chain
    Null,
    /// Fail the record
    Fail,
}

impl Config {
    /// Build a config from the key/value pairs of an `@config` block.
    pub fn from_entries(entries: Map<String, Value>) -> Result<Self, ParseError> {
        let config: Config = serde_json::from_value(Value::Object(entries)).map_err(|e| {
            ParseError::new(ParseErrorKind::InvalidConfig, e.to_string(), None)
        })?;
        for key in config.extra.keys() {
            tracing::warn!(key = %key, "unknown @config key ignored");
        }
        Ok(config)
    }

    /// The reaction to an absent source, given whether its path was marked optional.
    pub fn absent_action(&self, optional: bool) -> AbsentAction {
        if optional {
            return AbsentAction::Skip;
        }
        match self.missing_fields {
            MissingFields::Skip => AbsentAction::Skip,
            MissingFields::Error => AbsentAction::Fail,
            MissingFields::Default => AbsentAction::Null,
        }
    }

    /// Whether an error aborts the record rather than skipping the rule.
    pub fn is_fatal(&self, err: &TransformError) -> bool {
        match err.kind {
            TransformErrorKind::MissingField => {
                self.strict_mode || self.missing_fields == MissingFields::Error
            }
            TransformErrorKind::TypeConversion | TransformErrorKind::IndexOutOfRange => {
                self.strict_mode
            }
            _ => false,
        }
    }
}
