//! Value coercions shared by every backend

use std::cmp::Ordering;

use serde_json::{Number, Value};

use crate::error::TransformError;

/// Render a value the way concatenation and string built-ins see it.
///
/// Strings render bare, null renders empty, containers render as JSON.
pub fn stringify(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        other => other.to_string(),
    }
}

/// A number with its integral-ness preserved
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Num {
    /// Fits in i64
    Int(i64),
    /// Everything else
    Float(f64),
}

impl Num {
    /// Read a number from a JSON number or a numeric string
    pub fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Number(n) => Some(Self::from_number(n)),
            Value::String(s) => Self::parse(s),
            _ => None,
        }
    }

    /// Read a JSON number
    pub fn from_number(n: &Number) -> Self {
        match n.as_i64() {
            Some(i) => Self::Int(i),
            None => Self::Float(n.as_f64().unwrap_or(f64::NAN)),
        }
    }

    /// Parse a numeric string, ignoring surrounding whitespace
    pub fn parse(text: &str) -> Option<Self> {
        let text = text.trim();
        if let Ok(i) = text.parse::<i64>() {
            return Some(Self::Int(i));
        }
        text.parse::<f64>()
            .ok()
            .filter(|f| f.is_finite())
            .map(Self::Float)
    }

    /// Widen to f64
    pub fn as_f64(self) -> f64 {
        match self {
            Self::Int(i) => i as f64,
            Self::Float(f) => f,
        }
    }

    /// Convert into a JSON value; non-finite floats are conversion errors
    pub fn into_value(self) -> Result<Value, TransformError> {
        match self {
            Self::Int(i) => Ok(Value::from(i)),
            Self::Float(f) => float_value(f),
        }
    }

    /// Sum, staying integral while it fits
    pub fn add(self, other: Self) -> Self {
        match (self, other) {
            (Self::Int(a), Self::Int(b)) => a
                .checked_add(b)
                .map_or(Self::Float(a as f64 + b as f64), Self::Int),
            (a, b) => Self::Float(a.as_f64() + b.as_f64()),
        }
    }

    /// Difference, staying integral while it fits
    pub fn sub(self, other: Self) -> Self {
        match (self, other) {
            (Self::Int(a), Self::Int(b)) => a
                .checked_sub(b)
                .map_or(Self::Float(a as f64 - b as f64), Self::Int),
            (a, b) => Self::Float(a.as_f64() - b.as_f64()),
        }
    }

    /// Product, staying integral while it fits
    pub fn mul(self, other: Self) -> Self {
        match (self, other) {
            (Self::Int(a), Self::Int(b)) => a
                .checked_mul(b)
                .map_or(Self::Float(a as f64 * b as f64), Self::Int),
            (a, b) => Self::Float(a.as_f64() * b.as_f64()),
        }
    }

    /// Quotient as a float; dividing by zero is a conversion error
    pub fn div(self, other: Self) -> Result<Self, TransformError> {
        let divisor = other.as_f64();
        if divisor == 0.0 {
            return Err(TransformError::conversion("divide", "division by zero"));
        }
        Ok(Self::Float(self.as_f64() / divisor))
    }
}

/// A float as a JSON value
pub fn float_value(f: f64) -> Result<Value, TransformError> {
    Number::from_f64(f)
        .map(Value::Number)
        .ok_or_else(|| TransformError::conversion("number", format!("{f} is not finite")))
}

/// Read a number or fail with a conversion error naming `function`
pub fn expect_num(function: &str, value: &Value) -> Result<Num, TransformError> {
    Num::from_value(value).ok_or_else(|| {
        TransformError::conversion(function, format!("cannot convert {value} to a number"))
    })
}

/// Truthiness used by `to_bool`, `negate` and `if_then_else`.
///
/// `y yes true 1` are true and `n no false 0` are false, case-insensitively.
/// Any other non-empty string is true; the empty string and null are false.
pub fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => {
            match s.to_ascii_lowercase().as_str() {
                "y" | "yes" | "true" | "1" => true,
                "" | "n" | "no" | "false" | "0" => false,
                _ => true,
            }
        }
        Value::Array(items) => !items.is_empty(),
        Value::Object(map) => !map.is_empty(),
    }
}

/// Equality where numbers compare by value regardless of representation
pub fn loose_eq(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64() == y.as_f64(),
        _ => a == b,
    }
}

fn rank(value: &Value) -> u8 {
    match value {
        Value::Null => 0,
        Value::Bool(_) => 1,
        Value::Number(_) => 2,
        Value::String(_) => 3,
        Value::Array(_) => 4,
        Value::Object(_) => 5,
    }
}

/// Total order used by `sort`: null < booleans < numbers < strings < arrays < objects
pub fn compare_values(a: &Value, b: &Value) -> Ordering {
    match (a, b) {
        (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
        (Value::Number(x), Value::Number(y)) => {
            let x = x.as_f64().unwrap_or(f64::NAN);
            let y = y.as_f64().unwrap_or(f64::NAN);
            x.total_cmp(&y)
        }
        (Value::String(x), Value::String(y)) => x.cmp(y),
        (Value::Array(x), Value::Array(y)) => {
            for (l, r) in x.iter().zip(y) {
                let ordering = compare_values(l, r);
                if ordering != Ordering::Equal {
                    return ordering;
                }
            }
            x.len().cmp(&y.len())
        }
        (Value::Object(x), Value::Object(y)) => x.len().cmp(&y.len()),
        _ => rank(a).cmp(&rank(b)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use serde_json::json;

    #[rstest]
    #[case(json!("abc"), "abc")]
    #[case(json!(null), "")]
    #[case(json!(12), "12")]
    #[case(json!(1.5), "1.5")]
    #[case(json!(true), "true")]
    #[case(json!([1, "a"]), "[1,\"a\"]")]
    fn test_stringify(#[case] value: Value, #[case] expected: &str) {
        assert_eq!(stringify(&value), expected);
    }

    #[rstest]
    #[case(json!("y"), true)]
    #[case(json!("YES"), true)]
    #[case(json!("True"), true)]
    #[case(json!("1"), true)]
    #[case(json!("n"), false)]
    #[case(json!("No"), false)]
    #[case(json!("false"), false)]
    #[case(json!("0"), false)]
    #[case(json!("anything"), true)]
    #[case(json!(""), false)]
    #[case(json!("  "), true)]
    #[case(json!(" no "), true)]
    #[case(json!(null), false)]
    #[case(json!(0), false)]
    #[case(json!(2.5), true)]
    #[case(json!([]), false)]
    fn test_truthy(#[case] value: Value, #[case] expected: bool) {
        assert_eq!(truthy(&value), expected);
    }

    #[test]
    fn test_num_parsing() {
        assert_eq!(Num::from_value(&json!(" 42 ")), Some(Num::Int(42)));
        assert_eq!(Num::from_value(&json!("3.5")), Some(Num::Float(3.5)));
        assert_eq!(Num::from_value(&json!("abc")), None);
        assert_eq!(Num::from_value(&json!("inf")), None);
        assert_eq!(Num::from_value(&json!(true)), None);
    }

    #[test]
    fn test_num_arithmetic_stays_integral() {
        assert_eq!(Num::Int(2).add(Num::Int(3)), Num::Int(5));
        assert_eq!(Num::Int(2).mul(Num::Float(1.5)), Num::Float(3.0));
        assert_eq!(
            Num::Int(i64::MAX).add(Num::Int(1)),
            Num::Float(i64::MAX as f64 + 1.0)
        );
        assert!(Num::Int(1).div(Num::Int(0)).is_err());
    }

    #[test]
    fn test_loose_eq() {
        assert!(loose_eq(&json!(1), &json!(1.0)));
        assert!(!loose_eq(&json!("1"), &json!(1)));
    }

    #[test]
    fn test_compare_values_orders_types() {
        let mut values = vec![json!("b"), json!(2), json!(null), json!("a"), json!(1.5)];
        values.sort_by(compare_values);
        assert_eq!(values, vec![json!(null), json!(1.5), json!(2), json!("a"), json!("b")]);
    }
}
