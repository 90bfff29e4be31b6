//! Numeric built-ins

use serde_json::Value;

use super::{Builtin, arg_int};
use crate::ast::AggregateFn;
use crate::error::TransformError;
use crate::runtime::aggregate;
use crate::value::{Num, expect_num, float_value};

const I64_BOUND: f64 = 9_223_372_036_854_775_808.0;

fn integral(f: f64) -> Option<i64> {
    (f.is_finite() && (-I64_BOUND..I64_BOUND).contains(&f)).then_some(f as i64)
}

fn coerce(function: &str, value: &Value) -> Result<Num, TransformError> {
    match value {
        Value::Bool(b) => Ok(Num::Int(i64::from(*b))),
        other => expect_num(function, other),
    }
}

pub(super) fn to_int(function: &str, value: &Value) -> Result<Value, TransformError> {
    match coerce(function, value)? {
        Num::Int(i) => Ok(Value::from(i)),
        Num::Float(f) => integral(f.trunc()).map(Value::from).ok_or_else(|| {
            TransformError::conversion(function, format!("{f} does not fit an integer"))
        }),
    }
}

pub(super) fn to_float(function: &str, value: &Value) -> Result<Value, TransformError> {
    float_value(coerce(function, value)?.as_f64())
}

fn round_to(f: f64, digits: i64) -> f64 {
    let digits = i32::try_from(digits.clamp(-308, 308)).unwrap_or(0);
    let factor = 10f64.powi(digits.abs());
    let scaled = if digits >= 0 {
        (f * factor).round() / factor
    } else {
        (f / factor).round() * factor
    };
    if scaled.is_finite() { scaled } else { f }
}

pub(super) fn to_decimal(
    function: &str,
    value: &Value,
    precision: i64,
) -> Result<Value, TransformError> {
    let f = coerce(function, value)?.as_f64();
    float_value(round_to(f, precision))
}

/// Integers are already round; with no digits a float rounds to an integer
pub(super) fn round(function: &str, value: &Value, args: &[Value]) -> Result<Value, TransformError> {
    let digits = match args.first() {
        Some(_) => arg_int(function, args, 0)?,
        None => 0,
    };
    match coerce(function, value)? {
        Num::Int(i) => Ok(Value::from(i)),
        Num::Float(f) if digits == 0 => Ok(integral(f.round())
            .map(Value::from)
            .unwrap_or_else(|| Value::from(f.round()))),
        Num::Float(f) => float_value(round_to(f, digits)),
    }
}

pub(super) fn floor_ceil(
    function: &str,
    value: &Value,
    op: fn(f64) -> f64,
) -> Result<Value, TransformError> {
    match coerce(function, value)? {
        Num::Int(i) => Ok(Value::from(i)),
        Num::Float(f) => {
            let rounded = op(f);
            match integral(rounded) {
                Some(i) => Ok(Value::from(i)),
                None => float_value(rounded),
            }
        }
    }
}

pub(super) fn abs(function: &str, value: &Value) -> Result<Value, TransformError> {
    match coerce(function, value)? {
        Num::Int(i) => match i.checked_abs() {
            Some(a) => Ok(Value::from(a)),
            None => float_value((i as f64).abs()),
        },
        Num::Float(f) => float_value(f.abs()),
    }
}

fn arg_num(function: &str, args: &[Value], index: usize) -> Result<Num, TransformError> {
    let value = args.get(index).ok_or_else(|| {
        TransformError::invalid_argument(function, format!("missing argument {}", index + 1))
    })?;
    Num::from_value(value).ok_or_else(|| {
        TransformError::invalid_argument(
            function,
            format!("argument {} must be a number, got {value}", index + 1),
        )
    })
}

pub(super) fn arithmetic(
    func: Builtin,
    value: &Value,
    args: &[Value],
) -> Result<Value, TransformError> {
    let name = func.name();
    let lhs = coerce(name, value)?;
    let rhs = arg_num(name, args, 0)?;
    let result = match func {
        Builtin::Add => lhs.add(rhs),
        Builtin::Subtract => lhs.sub(rhs),
        Builtin::Multiply => lhs.mul(rhs),
        _ => lhs.div(rhs).map_err(|_| TransformError::conversion(name, "division by zero"))?,
    };
    result.into_value()
}

/// With an argument `min`/`max` bound the value from below/above; without
/// one they pick the extreme element of an array.
pub(super) fn bound(func: Builtin, value: Value, args: &[Value]) -> Result<Value, TransformError> {
    let name = func.name();
    if args.is_empty() {
        let items = match value {
            Value::Array(items) => items,
            other => vec![other],
        };
        let agg = if func == Builtin::Min {
            AggregateFn::Min
        } else {
            AggregateFn::Max
        };
        return aggregate(agg, &items);
    }
    let current = coerce(name, &value)?;
    let limit = arg_num(name, args, 0)?;
    let keep_limit = if func == Builtin::Min {
        current.as_f64() < limit.as_f64()
    } else {
        current.as_f64() > limit.as_f64()
    };
    if keep_limit {
        limit.into_value()
    } else {
        current.into_value()
    }
}

pub(super) fn clamp(function: &str, value: &Value, args: &[Value]) -> Result<Value, TransformError> {
    let low = arg_num(function, args, 0)?;
    let high = arg_num(function, args, 1)?;
    if low.as_f64() > high.as_f64() {
        return Err(TransformError::invalid_argument(
            function,
            "lower bound exceeds upper bound",
        ));
    }
    let current = coerce(function, value)?;
    let result = if current.as_f64() < low.as_f64() {
        low
    } else if current.as_f64() > high.as_f64() {
        high
    } else {
        current
    };
    result.into_value()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use serde_json::json;

    #[rstest]
    #[case(json!(true), json!(1))]
    #[case(json!("-7.8"), json!(-7))]
    #[case(json!(1e30), json!(null))]
    fn test_to_int(#[case] value: Value, #[case] expected: Value) {
        match to_int("to_int", &value) {
            Ok(v) => assert_eq!(v, expected),
            Err(_) => assert!(expected.is_null()),
        }
    }

    #[rstest]
    #[case(json!(1234.5678), -2, json!(1200.0))]
    #[case(json!(0.125), 2, json!(0.13))]
    fn test_round_digits(#[case] value: Value, #[case] digits: i64, #[case] expected: Value) {
        assert_eq!(round("round", &value, &[json!(digits)]).unwrap(), expected);
    }

    #[test]
    fn test_max_without_arg_picks_largest() {
        assert_eq!(
            bound(Builtin::Max, json!([3, "9", 4.5]), &[]).unwrap(),
            json!("9")
        );
    }

    #[test]
    fn test_clamp_rejects_inverted_bounds() {
        assert!(clamp("clamp", &json!(1), &[json!(5), json!(0)]).is_err());
        assert_eq!(
            clamp("clamp", &json!(-3), &[json!(0), json!(5)]).unwrap(),
            json!(0)
        );
    }

    #[test]
    fn test_integer_arithmetic_stays_integral() {
        assert_eq!(
            arithmetic(Builtin::Subtract, &json!(10), &[json!(4)]).unwrap(),
            json!(6)
        );
        assert_eq!(
            arithmetic(Builtin::Add, &json!(1.5), &[json!(1)]).unwrap(),
            json!(2.5)
        );
    }
}
