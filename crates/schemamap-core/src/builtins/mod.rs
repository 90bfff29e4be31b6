//! Built-in transform catalogue
//!
//! Every built-in is a variant of [`Builtin`]; names, arities and output
//! types live in one table so the parser, the interpreter and the code
//! generator agree on them. A null input passes through unchanged unless
//! the function is documented to act on null (`default`, `to_bool`, ...).

mod array;
mod date;
mod logic;
mod number;
mod string;

use serde_json::Value;

use crate::ast::ValueKind;
use crate::config::Config;
use crate::error::TransformError;
use crate::registry::Arity;
use crate::value::stringify;

pub use date::{format_timestamp, now};

macro_rules! builtins {
    ($( $variant:ident => $name:literal, $arity:expr, $kind:expr; )*) => {
        /// A function from the built-in catalogue
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum Builtin {
            $(
                #[doc = concat!("`", $name, "`")]
                $variant,
            )*
        }

        impl Builtin {
            /// Every built-in, in catalogue order
            pub const ALL: &'static [Builtin] = &[$(Builtin::$variant),*];

            /// Look up a built-in by its source name
            pub fn from_name(name: &str) -> Option<Self> {
                match name {
                    $($name => Some(Self::$variant),)*
                    _ => None,
                }
            }

            /// Source name
            pub fn name(self) -> &'static str {
                match self {
                    $(Self::$variant => $name,)*
                }
            }

            /// Accepted number of literal arguments
            pub fn arity(self) -> Arity {
                match self {
                    $(Self::$variant => $arity,)*
                }
            }

            /// Output type, when the function always produces one
            pub fn output_kind(self) -> Option<ValueKind> {
                match self {
                    $(Self::$variant => $kind,)*
                }
            }
        }
    };
}

const STR: Option<ValueKind> = Some(ValueKind::String);
const INT: Option<ValueKind> = Some(ValueKind::Integer);
const FLOAT: Option<ValueKind> = Some(ValueKind::Float);
const BOOL: Option<ValueKind> = Some(ValueKind::Boolean);
const ARRAY: Option<ValueKind> = Some(ValueKind::Array);
const OBJECT: Option<ValueKind> = Some(ValueKind::Object);
const ANY: Option<ValueKind> = None;

builtins! {
    // String
    Trim => "trim", Arity::exact(0), STR;
    Lowercase => "lowercase", Arity::exact(0), STR;
    Uppercase => "uppercase", Arity::exact(0), STR;
    Titlecase => "titlecase", Arity::exact(0), STR;
    Capitalize => "capitalize", Arity::exact(0), STR;
    SentenceCase => "sentence_case", Arity::exact(0), STR;
    CollapseSpaces => "collapse_spaces", Arity::exact(0), STR;
    Replace => "replace", Arity::exact(2), STR;
    RegexReplace => "regex_replace", Arity::exact(2), STR;
    RegexExtract => "regex_extract", Arity::range(1, 2), ANY;
    Matches => "matches", Arity::exact(1), BOOL;
    Substring => "substring", Arity::range(1, 2), STR;
    Prefix => "prefix", Arity::exact(1), STR;
    Suffix => "suffix", Arity::exact(1), STR;
    MaxLength => "max_length", Arity::exact(1), STR;
    MinLength => "min_length", Arity::range(1, 2), STR;
    PadLeft => "pad_left", Arity::range(1, 2), STR;
    PadRight => "pad_right", Arity::range(1, 2), STR;
    Split => "split", Arity::range(0, 1), ARRAY;
    Join => "join", Arity::range(0, 1), STR;
    Mask => "mask", Arity::range(0, 1), STR;
    Hash => "hash", Arity::range(0, 1), STR;
    Base64Encode => "base64_encode", Arity::exact(0), STR;
    Base64Decode => "base64_decode", Arity::exact(0), STR;
    ToString => "to_string", Arity::exact(0), STR;
    JsonParse => "json_parse", Arity::exact(0), ANY;
    JsonStringify => "json_stringify", Arity::exact(0), STR;
    Template => "template", Arity::at_least(1), STR;
    // Numeric
    ToInt => "to_int", Arity::exact(0), INT;
    ToFloat => "to_float", Arity::exact(0), FLOAT;
    ToDecimal => "to_decimal", Arity::range(0, 1), FLOAT;
    Round => "round", Arity::range(0, 1), FLOAT;
    Floor => "floor", Arity::exact(0), INT;
    Ceil => "ceil", Arity::exact(0), INT;
    Abs => "abs", Arity::exact(0), FLOAT;
    Add => "add", Arity::exact(1), FLOAT;
    Subtract => "subtract", Arity::exact(1), FLOAT;
    Multiply => "multiply", Arity::exact(1), FLOAT;
    Divide => "divide", Arity::exact(1), FLOAT;
    Min => "min", Arity::range(0, 1), FLOAT;
    Max => "max", Arity::range(0, 1), FLOAT;
    Clamp => "clamp", Arity::exact(2), FLOAT;
    // Boolean
    ToBool => "to_bool", Arity::exact(0), BOOL;
    Negate => "negate", Arity::exact(0), BOOL;
    // Date
    ParseDate => "parse_date", Arity::range(0, 1), STR;
    FormatDate => "format_date", Arity::range(0, 1), STR;
    ToIso8601 => "to_iso8601", Arity::exact(0), STR;
    ToTimestamp => "to_timestamp", Arity::exact(0), INT;
    AddDays => "add_days", Arity::exact(1), STR;
    SubtractDays => "subtract_days", Arity::exact(1), STR;
    AddMonths => "add_months", Arity::exact(1), STR;
    AddYears => "add_years", Arity::exact(1), STR;
    StartOfDay => "start_of_day", Arity::exact(0), STR;
    EndOfDay => "end_of_day", Arity::exact(0), STR;
    StartOfMonth => "start_of_month", Arity::exact(0), STR;
    EndOfMonth => "end_of_month", Arity::exact(0), STR;
    // Array
    First => "first", Arity::exact(0), ANY;
    Last => "last", Arity::exact(0), ANY;
    At => "at", Arity::exact(1), ANY;
    Flatten => "flatten", Arity::exact(0), ARRAY;
    Distinct => "distinct", Arity::exact(0), ARRAY;
    Sort => "sort", Arity::range(0, 2), ARRAY;
    Reverse => "reverse", Arity::exact(0), ANY;
    Take => "take", Arity::exact(1), ARRAY;
    Skip => "skip", Arity::exact(1), ARRAY;
    Slice => "slice", Arity::range(1, 2), ARRAY;
    Count => "count", Arity::exact(0), INT;
    Sum => "sum", Arity::exact(0), FLOAT;
    Avg => "avg", Arity::exact(0), FLOAT;
    Wrap => "wrap", Arity::exact(0), ARRAY;
    Unwrap => "unwrap", Arity::exact(0), ANY;
    // Object
    Pick => "pick", Arity::at_least(1), OBJECT;
    Omit => "omit", Arity::at_least(1), OBJECT;
    // Conditional
    Default => "default", Arity::exact(1), ANY;
    IfNull => "if_null", Arity::exact(1), ANY;
    IfEmpty => "if_empty", Arity::exact(1), ANY;
    Coalesce => "coalesce", Arity::at_least(1), ANY;
    IfThenElse => "if_then_else", Arity::exact(2), ANY;
    Required => "required", Arity::exact(0), ANY;
    Optional => "optional", Arity::exact(0), ANY;
    // Validation
    Validate => "validate", Arity::exact(1), ANY;
    In => "in", Arity::at_least(1), BOOL;
    NotIn => "not_in", Arity::at_least(1), BOOL;
    // Special
    Constant => "constant", Arity::exact(0), ANY;
    Raw => "raw", Arity::exact(0), ANY;
}

impl Builtin {
    /// Whether the function runs on a null input instead of passing it through
    pub fn accepts_null(self) -> bool {
        matches!(
            self,
            Self::ToBool
                | Self::Negate
                | Self::Default
                | Self::IfNull
                | Self::IfEmpty
                | Self::Coalesce
                | Self::IfThenElse
                | Self::Required
                | Self::Optional
                | Self::Constant
                | Self::Raw
                | Self::ToString
                | Self::JsonStringify
                | Self::Count
                | Self::Wrap
                | Self::In
                | Self::NotIn
                | Self::Matches
        )
    }

    /// Apply the function to `value` with literal `args`.
    ///
    /// Argument counts are checked by the parser; malformed argument values
    /// surface here as [`crate::TransformErrorKind::InvalidArgument`].
    pub fn apply(
        self,
        value: Value,
        args: &[Value],
        config: &Config,
    ) -> Result<Value, TransformError> {
        if value.is_null() && !self.accepts_null() {
            return Ok(Value::Null);
        }
        let name = self.name();
        match self {
            Self::Trim => Ok(string::text(&value).trim().into()),
            Self::Lowercase => Ok(string::text(&value).to_lowercase().into()),
            Self::Uppercase => Ok(string::text(&value).to_uppercase().into()),
            Self::Titlecase => Ok(string::titlecase(&string::text(&value)).into()),
            Self::Capitalize => Ok(string::capitalize(&string::text(&value)).into()),
            Self::SentenceCase => Ok(string::sentence_case(&string::text(&value)).into()),
            Self::CollapseSpaces => Ok(string::collapse_spaces(&string::text(&value)).into()),
            Self::Replace => {
                let from = arg_str(name, args, 0)?;
                let to = arg_str(name, args, 1)?;
                Ok(string::text(&value).replace(from.as_str(), &to).into())
            }
            Self::RegexReplace => string::regex_replace(name, &value, args),
            Self::RegexExtract => string::regex_extract(name, &value, args),
            Self::Matches => string::matches(name, &value, args),
            Self::Substring => string::substring(name, &value, args),
            Self::Prefix => Ok(format!("{}{}", arg_str(name, args, 0)?, string::text(&value)).into()),
            Self::Suffix => Ok(format!("{}{}", string::text(&value), arg_str(name, args, 0)?).into()),
            Self::MaxLength => {
                let n = arg_usize(name, args, 0)?;
                Ok(string::text(&value).chars().take(n).collect::<String>().into())
            }
            Self::MinLength | Self::PadRight => string::pad(name, &value, args, false),
            Self::PadLeft => string::pad(name, &value, args, true),
            Self::Split => string::split(name, &value, args),
            Self::Join => string::join(name, &value, args),
            Self::Mask => string::mask(name, &value, args),
            Self::Hash => string::hash(name, &value, args),
            Self::Base64Encode => Ok(string::base64_encode(&value).into()),
            Self::Base64Decode => string::base64_decode(name, &value),
            Self::ToString => Ok(stringify(&value).into()),
            Self::JsonParse => string::json_parse(name, value),
            Self::JsonStringify => serde_json::to_string(&value)
                .map(Value::String)
                .map_err(|e| TransformError::conversion(name, e)),
            Self::Template => string::template(name, &value, args),
            Self::ToInt => number::to_int(name, &value),
            Self::ToFloat => number::to_float(name, &value),
            Self::ToDecimal => {
                let precision = match args.first() {
                    Some(_) => arg_int(name, args, 0)?,
                    None => i64::from(config.decimal_precision),
                };
                number::to_decimal(name, &value, precision)
            }
            Self::Round => number::round(name, &value, args),
            Self::Floor => number::floor_ceil(name, &value, f64::floor),
            Self::Ceil => number::floor_ceil(name, &value, f64::ceil),
            Self::Abs => number::abs(name, &value),
            Self::Add | Self::Subtract | Self::Multiply | Self::Divide => {
                number::arithmetic(self, &value, args)
            }
            Self::Min | Self::Max => number::bound(self, value, args),
            Self::Clamp => number::clamp(name, &value, args),
            Self::ToBool => Ok(Value::Bool(crate::value::truthy(&value))),
            Self::Negate => Ok(Value::Bool(!crate::value::truthy(&value))),
            Self::ParseDate => date::parse_date(name, &value, args),
            Self::FormatDate => {
                let format = match args.first() {
                    Some(_) => arg_str(name, args, 0)?,
                    None => config.date_format.clone(),
                };
                date::format_date(name, &value, &format)
            }
            Self::ToIso8601 => date::to_iso8601(name, &value),
            Self::ToTimestamp => date::to_timestamp(name, &value),
            Self::AddDays => date::add_days(name, &value, arg_int(name, args, 0)?),
            Self::SubtractDays => {
                let days = arg_int(name, args, 0)?;
                date::add_days(name, &value, days.checked_neg().unwrap_or(i64::MAX))
            }
            Self::AddMonths => date::add_months(name, &value, arg_int(name, args, 0)?),
            Self::AddYears => {
                let years = arg_int(name, args, 0)?;
                let months = years.checked_mul(12).ok_or_else(|| {
                    TransformError::invalid_argument(name, format!("{years} years is out of range"))
                })?;
                date::add_months(name, &value, months)
            }
            Self::StartOfDay => date::boundary(name, &value, date::Boundary::StartOfDay),
            Self::EndOfDay => date::boundary(name, &value, date::Boundary::EndOfDay),
            Self::StartOfMonth => date::boundary(name, &value, date::Boundary::StartOfMonth),
            Self::EndOfMonth => date::boundary(name, &value, date::Boundary::EndOfMonth),
            Self::First => Ok(array::first(value)),
            Self::Last => Ok(array::last(value)),
            Self::At => array::at(name, value, args),
            Self::Flatten => Ok(array::flatten(value)),
            Self::Distinct => Ok(array::distinct(value)),
            Self::Sort => array::sort(name, value, args),
            Self::Reverse => Ok(array::reverse(value)),
            Self::Take => array::take(name, value, args),
            Self::Skip => array::skip(name, value, args),
            Self::Slice => array::slice(name, value, args),
            Self::Count => Ok(array::count(&value)),
            Self::Sum => array::sum(&value),
            Self::Avg => array::avg(&value),
            Self::Wrap => Ok(array::wrap(value)),
            Self::Unwrap => Ok(array::unwrap(value)),
            Self::Pick => logic::pick(name, value, args),
            Self::Omit => logic::omit(name, value, args),
            Self::Default | Self::IfNull => Ok(logic::if_null(value, args)),
            Self::IfEmpty => Ok(logic::if_empty(value, args)),
            Self::Coalesce => Ok(logic::coalesce(value, args)),
            Self::IfThenElse => Ok(logic::if_then_else(&value, args)),
            Self::Required => logic::required(value),
            Self::Optional | Self::Constant | Self::Raw => Ok(value),
            Self::Validate => logic::validate(name, value, args),
            Self::In => Ok(Value::Bool(logic::contains(&value, args))),
            Self::NotIn => Ok(Value::Bool(!logic::contains(&value, args))),
        }
    }
}

fn arg<'a>(function: &str, args: &'a [Value], index: usize) -> Result<&'a Value, TransformError> {
    args.get(index).ok_or_else(|| {
        TransformError::invalid_argument(function, format!("missing argument {}", index + 1))
    })
}

pub(crate) fn arg_str(function: &str, args: &[Value], index: usize) -> Result<String, TransformError> {
    match arg(function, args, index)? {
        Value::Array(_) | Value::Object(_) => Err(TransformError::invalid_argument(
            function,
            format!("argument {} must be a scalar", index + 1),
        )),
        other => Ok(stringify(other)),
    }
}

pub(crate) fn arg_int(function: &str, args: &[Value], index: usize) -> Result<i64, TransformError> {
    let value = arg(function, args, index)?;
    match crate::value::Num::from_value(value) {
        Some(crate::value::Num::Int(i)) => Ok(i),
        Some(crate::value::Num::Float(f)) if f.fract() == 0.0 && f.abs() < 9.0e15 => Ok(f as i64),
        _ => Err(TransformError::invalid_argument(
            function,
            format!("argument {} must be an integer, got {value}", index + 1),
        )),
    }
}

pub(crate) fn arg_usize(function: &str, args: &[Value], index: usize) -> Result<usize, TransformError> {
    let n = arg_int(function, args, index)?;
    usize::try_from(n).map_err(|_| {
        TransformError::invalid_argument(
            function,
            format!("argument {} must not be negative, got {n}", index + 1),
        )
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TransformErrorKind;
    use rstest::rstest;
    use serde_json::json;

    fn run(func: Builtin, value: Value, args: &[Value]) -> Value {
        func.apply(value, args, &Config::default()).unwrap()
    }

    #[test]
    fn test_name_table_round_trips() {
        for builtin in Builtin::ALL {
            assert_eq!(Builtin::from_name(builtin.name()), Some(*builtin));
        }
        assert_eq!(Builtin::from_name("lookup"), None);
        assert_eq!(Builtin::from_name("when"), None);
    }

    #[rstest]
    #[case(Builtin::Trim, json!("  hi  "), vec![], json!("hi"))]
    #[case(Builtin::Uppercase, json!("abc"), vec![], json!("ABC"))]
    #[case(Builtin::Lowercase, json!(12), vec![], json!("12"))]
    #[case(Builtin::Titlecase, json!("hello wORLD"), vec![], json!("Hello World"))]
    #[case(Builtin::Capitalize, json!("hELLO"), vec![], json!("Hello"))]
    #[case(Builtin::CollapseSpaces, json!(" a   b \t c "), vec![], json!("a b c"))]
    #[case(Builtin::Replace, json!("a-b-c"), vec![json!("-"), json!("+")], json!("a+b+c"))]
    #[case(Builtin::Prefix, json!("42"), vec![json!("#")], json!("#42"))]
    #[case(Builtin::Suffix, json!("42"), vec![json!("%")], json!("42%"))]
    #[case(Builtin::MaxLength, json!("abcdef"), vec![json!(3)], json!("abc"))]
    #[case(Builtin::PadLeft, json!("7"), vec![json!(3), json!("0")], json!("007"))]
    #[case(Builtin::PadRight, json!("7"), vec![json!(3)], json!("7  "))]
    #[case(Builtin::MinLength, json!("ab"), vec![json!(4), json!(".")], json!("ab.."))]
    #[case(Builtin::ToString, json!(null), vec![], json!(""))]
    #[case(Builtin::ToInt, json!("42"), vec![], json!(42))]
    #[case(Builtin::ToInt, json!(3.9), vec![], json!(3))]
    #[case(Builtin::ToFloat, json!("3.14159"), vec![], json!(3.14159))]
    #[case(Builtin::Round, json!(3.14159), vec![json!(2)], json!(3.14))]
    #[case(Builtin::Round, json!(2.5), vec![], json!(3))]
    #[case(Builtin::Round, json!(7), vec![json!(2)], json!(7))]
    #[case(Builtin::Floor, json!(2.7), vec![], json!(2))]
    #[case(Builtin::Ceil, json!(2.1), vec![], json!(3))]
    #[case(Builtin::Abs, json!(-4), vec![], json!(4))]
    #[case(Builtin::Add, json!(2), vec![json!(3)], json!(5))]
    #[case(Builtin::Multiply, json!("2.5"), vec![json!(2)], json!(5.0))]
    #[case(Builtin::Divide, json!(9), vec![json!(2)], json!(4.5))]
    #[case(Builtin::Min, json!(2), vec![json!(5)], json!(5))]
    #[case(Builtin::Max, json!(9), vec![json!(5)], json!(5))]
    #[case(Builtin::Min, json!([4, 2, 8]), vec![], json!(2))]
    #[case(Builtin::Clamp, json!(15), vec![json!(0), json!(10)], json!(10))]
    #[case(Builtin::ToBool, json!("yes"), vec![], json!(true))]
    #[case(Builtin::ToBool, json!(null), vec![], json!(false))]
    #[case(Builtin::ToBool, json!("  "), vec![], json!(true))]
    #[case(Builtin::Negate, json!("0"), vec![], json!(true))]
    #[case(Builtin::Default, json!(null), vec![json!("n/a")], json!("n/a"))]
    #[case(Builtin::Default, json!(""), vec![json!("n/a")], json!(""))]
    #[case(Builtin::IfEmpty, json!("  "), vec![json!("n/a")], json!("n/a"))]
    #[case(Builtin::IfEmpty, json!([]), vec![json!("n/a")], json!("n/a"))]
    #[case(Builtin::Coalesce, json!(null), vec![json!(null), json!(3)], json!(3))]
    #[case(Builtin::IfThenElse, json!("y"), vec![json!("on"), json!("off")], json!("on"))]
    #[case(Builtin::In, json!("b"), vec![json!("a"), json!("b")], json!(true))]
    #[case(Builtin::NotIn, json!(1), vec![json!(1.0)], json!(false))]
    #[case(Builtin::Constant, json!("same"), vec![], json!("same"))]
    fn test_apply(
        #[case] func: Builtin,
        #[case] value: Value,
        #[case] args: Vec<Value>,
        #[case] expected: Value,
    ) {
        assert_eq!(run(func, value, &args), expected);
    }

    #[rstest]
    #[case(Builtin::Trim)]
    #[case(Builtin::ToInt)]
    #[case(Builtin::FormatDate)]
    #[case(Builtin::First)]
    #[case(Builtin::Validate)]
    fn test_null_passes_through(#[case] func: Builtin) {
        let args = match func.arity().min {
            0 => vec![],
            _ => vec![json!("email")],
        };
        assert_eq!(run(func, Value::Null, &args), Value::Null);
    }

    #[test]
    fn test_trim_then_collapse_spaces() {
        let trimmed = run(Builtin::Trim, json!("  hi   there  "), &[]);
        assert_eq!(run(Builtin::CollapseSpaces, trimmed, &[]), json!("hi there"));
    }

    #[test]
    fn test_to_float_then_round() {
        let float = run(Builtin::ToFloat, json!("3.14159"), &[]);
        assert_eq!(run(Builtin::Round, float, &[json!(2)]), json!(3.14));
    }

    #[test]
    fn test_to_decimal_uses_configured_precision() {
        let config = Config {
            decimal_precision: 1,
            ..Config::default()
        };
        assert_eq!(
            Builtin::ToDecimal.apply(json!("2.26"), &[], &config).unwrap(),
            json!(2.3)
        );
        assert_eq!(
            Builtin::ToDecimal.apply(json!("2.26"), &[json!(0)], &config).unwrap(),
            json!(2.0)
        );
    }

    #[rstest]
    #[case(Builtin::ToInt, json!("abc"), vec![], TransformErrorKind::TypeConversion)]
    #[case(Builtin::ToFloat, json!([1]), vec![], TransformErrorKind::TypeConversion)]
    #[case(Builtin::Divide, json!(1), vec![json!(0)], TransformErrorKind::TypeConversion)]
    #[case(Builtin::Required, json!(null), vec![], TransformErrorKind::MissingField)]
    #[case(Builtin::Hash, json!("x"), vec![json!("md5")], TransformErrorKind::InvalidArgument)]
    #[case(Builtin::Matches, json!("x"), vec![json!("(")], TransformErrorKind::InvalidArgument)]
    #[case(Builtin::MaxLength, json!("x"), vec![json!(-1)], TransformErrorKind::InvalidArgument)]
    #[case(Builtin::Validate, json!("nope"), vec![json!("email")], TransformErrorKind::TypeConversion)]
    fn test_apply_errors(
        #[case] func: Builtin,
        #[case] value: Value,
        #[case] args: Vec<Value>,
        #[case] expected: TransformErrorKind,
    ) {
        let err = func.apply(value, &args, &Config::default()).unwrap_err();
        assert_eq!(err.kind, expected);
    }
}
