//! Array built-ins

use serde_json::Value;

use super::{arg_int, arg_str, arg_usize};
use super::string::slice_bounds;
use crate::ast::AggregateFn;
use crate::error::TransformError;
use crate::runtime::aggregate;
use crate::value::compare_values;

fn items(value: Value) -> Vec<Value> {
    match value {
        Value::Array(items) => items,
        other => vec![other],
    }
}

pub(super) fn first(value: Value) -> Value {
    match value {
        Value::Array(items) => items.into_iter().next().unwrap_or(Value::Null),
        _ => Value::Null,
    }
}

pub(super) fn last(value: Value) -> Value {
    match value {
        Value::Array(items) => items.into_iter().next_back().unwrap_or(Value::Null),
        _ => Value::Null,
    }
}

pub(super) fn at(function: &str, value: Value, args: &[Value]) -> Result<Value, TransformError> {
    let index = arg_int(function, args, 0)?;
    let Value::Array(items) = value else {
        return Ok(Value::Null);
    };
    let len = i64::try_from(items.len()).unwrap_or(i64::MAX);
    let position = if index < 0 { len + index } else { index };
    Ok(usize::try_from(position)
        .ok()
        .and_then(|i| items.into_iter().nth(i))
        .unwrap_or(Value::Null))
}

pub(super) fn flatten(value: Value) -> Value {
    fn walk(value: Value, out: &mut Vec<Value>) {
        match value {
            Value::Array(items) => items.into_iter().for_each(|item| walk(item, out)),
            other => out.push(other),
        }
    }
    let mut out = Vec::new();
    walk(value, &mut out);
    Value::Array(out)
}

pub(super) fn distinct(value: Value) -> Value {
    let mut out: Vec<Value> = Vec::new();
    for item in items(value) {
        if !out.contains(&item) {
            out.push(item);
        }
    }
    Value::Array(out)
}

/// `sort`, `sort(desc)`, `sort("key")` or `sort("key", desc)`
pub(super) fn sort(function: &str, value: Value, args: &[Value]) -> Result<Value, TransformError> {
    let (key, descending) = match args {
        [] => (None, false),
        [Value::Bool(desc)] => (None, *desc),
        [_] => (Some(arg_str(function, args, 0)?), false),
        [_, Value::Bool(desc)] => (Some(arg_str(function, args, 0)?), *desc),
        _ => {
            return Err(TransformError::invalid_argument(
                function,
                "second argument must be a boolean",
            ));
        }
    };
    let mut list = items(value);
    let null = Value::Null;
    list.sort_by(|a, b| {
        let (a, b) = match &key {
            Some(key) => (a.get(key).unwrap_or(&null), b.get(key).unwrap_or(&null)),
            None => (a, b),
        };
        compare_values(a, b)
    });
    if descending {
        list.reverse();
    }
    Ok(Value::Array(list))
}

pub(super) fn reverse(value: Value) -> Value {
    match value {
        Value::Array(mut items) => {
            items.reverse();
            Value::Array(items)
        }
        Value::String(s) => Value::String(s.chars().rev().collect()),
        other => other,
    }
}

pub(super) fn take(function: &str, value: Value, args: &[Value]) -> Result<Value, TransformError> {
    let n = arg_usize(function, args, 0)?;
    Ok(Value::Array(items(value).into_iter().take(n).collect()))
}

pub(super) fn skip(function: &str, value: Value, args: &[Value]) -> Result<Value, TransformError> {
    let n = arg_usize(function, args, 0)?;
    match value {
        Value::Array(items) => Ok(Value::Array(items.into_iter().skip(n).collect())),
        _ => Ok(Value::Array(Vec::new())),
    }
}

pub(super) fn slice(function: &str, value: Value, args: &[Value]) -> Result<Value, TransformError> {
    let start = arg_int(function, args, 0)?;
    let end = match args.get(1) {
        Some(_) => Some(arg_int(function, args, 1)?),
        None => None,
    };
    let list = items(value);
    let (from, to) = slice_bounds(list.len(), start, end);
    Ok(Value::Array(
        list.into_iter().skip(from).take(to - from).collect(),
    ))
}

pub(super) fn count(value: &Value) -> Value {
    match value {
        Value::Null => Value::from(0),
        Value::Array(items) => Value::from(items.len()),
        _ => Value::from(1),
    }
}

pub(super) fn sum(value: &Value) -> Result<Value, TransformError> {
    aggregate(AggregateFn::Sum, as_vec(value).as_slice())
}

pub(super) fn avg(value: &Value) -> Result<Value, TransformError> {
    aggregate(AggregateFn::Avg, as_vec(value).as_slice())
}

fn as_vec(value: &Value) -> Vec<Value> {
    match value {
        Value::Array(items) => items.clone(),
        other => vec![other.clone()],
    }
}

pub(super) fn wrap(value: Value) -> Value {
    match value {
        Value::Array(items) => Value::Array(items),
        Value::Null => Value::Array(Vec::new()),
        other => Value::Array(vec![other]),
    }
}

pub(super) fn unwrap(value: Value) -> Value {
    match value {
        Value::Array(mut items) if items.len() == 1 => items.remove(0),
        other => other,
    }
}
