//! Conditional, object and validation built-ins

use serde_json::{Map, Value};

use super::arg_str;
use super::string::{regex, text};
use crate::error::TransformError;
use crate::path::type_name;
use crate::value::{Num, loose_eq, truthy};

const VALIDATORS: &[(&str, &str)] = &[
    ("email", r"^[^@\s]+@[^@\s]+\.[^@\s]+$"),
    ("url", r"^[a-zA-Z][a-zA-Z0-9+.-]*://[^\s/?#]+[^\s]*$"),
    (
        "uuid",
        r"^[0-9a-fA-F]{8}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{12}$",
    ),
    ("phone", r"^\+?[0-9][0-9 ().-]{5,}[0-9]$"),
    ("zip_us", r"^[0-9]{5}(-[0-9]{4})?$"),
    ("ipv4", r"^((25[0-5]|2[0-4][0-9]|1?[0-9]?[0-9])\.){3}(25[0-5]|2[0-4][0-9]|1?[0-9]?[0-9])$"),
    ("date", r"^[0-9]{4}-[0-9]{2}-[0-9]{2}$"),
    ("alpha", r"^[A-Za-z]+$"),
    ("alphanumeric", r"^[A-Za-z0-9]+$"),
];

fn object<'v>(function: &str, value: &'v mut Value) -> Result<&'v mut Map<String, Value>, TransformError> {
    let found = type_name(value);
    value
        .as_object_mut()
        .ok_or_else(|| TransformError::conversion(function, format!("expected an object, got {found}")))
}

fn keys(function: &str, args: &[Value]) -> Result<Vec<String>, TransformError> {
    (0..args.len()).map(|i| arg_str(function, args, i)).collect()
}

pub(super) fn pick(function: &str, mut value: Value, args: &[Value]) -> Result<Value, TransformError> {
    let wanted = keys(function, args)?;
    let map = object(function, &mut value)?;
    let picked: Map<String, Value> = wanted
        .iter()
        .filter_map(|key| map.remove(key).map(|v| (key.clone(), v)))
        .collect();
    Ok(Value::Object(picked))
}

pub(super) fn omit(function: &str, mut value: Value, args: &[Value]) -> Result<Value, TransformError> {
    let unwanted = keys(function, args)?;
    let map = object(function, &mut value)?;
    for key in &unwanted {
        map.shift_remove(key);
    }
    Ok(value)
}

fn fallback(args: &[Value]) -> Value {
    args.first().cloned().unwrap_or(Value::Null)
}

pub(super) fn if_null(value: Value, args: &[Value]) -> Value {
    if value.is_null() { fallback(args) } else { value }
}

/// Blank strings and empty containers count as empty
pub(super) fn if_empty(value: Value, args: &[Value]) -> Value {
    let empty = match &value {
        Value::Null => true,
        Value::String(s) => s.trim().is_empty(),
        Value::Array(items) => items.is_empty(),
        Value::Object(map) => map.is_empty(),
        _ => false,
    };
    if empty { fallback(args) } else { value }
}

pub(super) fn coalesce(value: Value, args: &[Value]) -> Value {
    if !value.is_null() {
        return value;
    }
    args.iter()
        .find(|arg| !arg.is_null())
        .cloned()
        .unwrap_or(Value::Null)
}

pub(super) fn if_then_else(value: &Value, args: &[Value]) -> Value {
    let index = if truthy(value) { 0 } else { 1 };
    args.get(index).cloned().unwrap_or(Value::Null)
}

pub(super) fn required(value: Value) -> Result<Value, TransformError> {
    if value.is_null() {
        return Err(TransformError::missing_field("required value"));
    }
    Ok(value)
}

/// Pass `value` through when it is valid for the named kind
pub(super) fn validate(function: &str, value: Value, args: &[Value]) -> Result<Value, TransformError> {
    let kind = arg_str(function, args, 0)?;
    let valid = match kind.as_str() {
        "number" => Num::from_value(&value).is_some(),
        "integer" => matches!(Num::from_value(&value), Some(Num::Int(_))),
        "boolean" => value.is_boolean(),
        "non_empty" => !text(&value).trim().is_empty(),
        other => {
            let (_, pattern) = VALIDATORS
                .iter()
                .find(|(name, _)| *name == other)
                .ok_or_else(|| {
                    TransformError::invalid_argument(function, format!("unknown validator '{other}'"))
                })?;
            regex(function, pattern)?.is_match(&text(&value))
        }
    };
    if valid {
        Ok(value)
    } else {
        Err(TransformError::conversion(
            function,
            format!("{value} is not a valid {kind}"),
        ))
    }
}

/// Membership against the arguments; an array argument contributes its elements
pub(super) fn contains(value: &Value, args: &[Value]) -> bool {
    args.iter().any(|arg| match arg {
        Value::Array(items) => items.iter().any(|item| loose_eq(value, item)),
        other => loose_eq(value, other),
    })
}
