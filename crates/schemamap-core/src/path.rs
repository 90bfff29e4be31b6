//! Path resolution against input records and target assignment
//!
//! Reading distinguishes an *absent* value (missing key, non-container
//! intermediate, out-of-range index) from an explicit JSON `null`. A
//! wildcard turns the result into one slot per array element, each slot
//! remembering its originating index by position.

use serde_json::{Map, Value};

use crate::ast::{PathSegment, TargetPath};
use crate::error::{TransformError, TransformErrorKind};

/// The outcome of resolving a source path or evaluating a source expression
#[derive(Debug, Clone, PartialEq)]
pub enum Resolved {
    /// Nothing at the path
    Absent,
    /// A single value
    Value(Value),
    /// One slot per element of a wildcard array; `None` marks an absent element
    Each(Vec<Option<Value>>),
}

impl Resolved {
    /// Collapse into a single value; broadcast slots become an array with
    /// absent elements rendered as null.
    pub fn into_value(self) -> Option<Value> {
        match self {
            Self::Absent => None,
            Self::Value(value) => Some(value),
            Self::Each(items) => Some(Value::Array(
                items
                    .into_iter()
                    .map(|v| v.unwrap_or(Value::Null))
                    .collect(),
            )),
        }
    }

    /// Whether the result is absent or null
    pub fn is_empty(&self) -> bool {
        matches!(self, Self::Absent | Self::Value(Value::Null))
    }
}

/// Resolve `segments` against `record`.
///
/// With `strict` set an explicit index outside its array is an error instead
/// of an absence. Nested wildcards are resolved relative to each outer
/// element; the inner matches of one element are gathered into an array.
pub fn resolve(
    record: &Value,
    segments: &[PathSegment],
    strict: bool,
) -> Result<Resolved, TransformError> {
    let mut current = record;
    for (position, segment) in segments.iter().enumerate() {
        match segment {
            PathSegment::Key(key) => match current.get(key.as_str()) {
                Some(next) => current = next,
                None => return Ok(Resolved::Absent),
            },
            PathSegment::Index(index) => {
                let Value::Array(items) = current else {
                    return Ok(Resolved::Absent);
                };
                match normalize_index(*index, items.len()) {
                    Some(i) => current = &items[i],
                    None if strict => {
                        return Err(TransformError::new(
                            TransformErrorKind::IndexOutOfRange,
                            format!("index {index} is outside an array of {}", items.len()),
                        ));
                    }
                    None => return Ok(Resolved::Absent),
                }
            }
            PathSegment::Wildcard => {
                let Value::Array(items) = current else {
                    return Ok(Resolved::Absent);
                };
                let rest = &segments[position + 1..];
                let mut slots = Vec::with_capacity(items.len());
                for item in items {
                    let slot = match resolve(item, rest, strict)? {
                        Resolved::Absent => None,
                        Resolved::Value(value) => Some(value),
                        Resolved::Each(inner) => {
                            Some(Value::Array(inner.into_iter().flatten().collect()))
                        }
                    };
                    slots.push(slot);
                }
                return Ok(Resolved::Each(slots));
            }
        }
    }
    Ok(Resolved::Value(current.clone()))
}

fn normalize_index(index: i64, len: usize) -> Option<usize> {
    let len = i64::try_from(len).ok()?;
    let i = if index < 0 { len + index } else { index };
    if (0..len).contains(&i) {
        usize::try_from(i).ok()
    } else {
        None
    }
}

/// Write `value` at `target` inside `root`, creating containers on the way.
///
/// A wildcard segment is written at `index`. An object written onto an
/// existing object merges into it key by key; anything else replaces the slot.
pub fn assign(
    root: &mut Value,
    target: &TargetPath,
    value: Value,
    index: Option<usize>,
) -> Result<(), TransformError> {
    let slot = descend(root, &target.segments, index, target)?;
    merge(slot, value);
    Ok(())
}

/// Fail the way [`assign`] would, without touching `root`.
pub fn check_assign(
    root: &Value,
    target: &TargetPath,
    index: Option<usize>,
) -> Result<(), TransformError> {
    check_path(root, &target.segments, index, target)
}

/// Fail the way [`reserve`] would, without touching `root`.
pub fn check_reserve(root: &Value, target: &TargetPath) -> Result<(), TransformError> {
    match target.wildcard_position() {
        Some(position) => check_path(root, &target.segments[..=position], Some(0), target),
        None => Ok(()),
    }
}

// A missing or null node is created on write, so only existing scalars conflict.
fn check_path(
    root: &Value,
    segments: &[PathSegment],
    index: Option<usize>,
    target: &TargetPath,
) -> Result<(), TransformError> {
    let mut current = Some(root);
    for segment in segments {
        let node = current.filter(|value| !value.is_null());
        current = match segment {
            PathSegment::Key(key) => match node {
                None => None,
                Some(Value::Object(map)) => map.get(key),
                Some(other) => {
                    return Err(conflict(
                        target,
                        format!("expected an object but found {}", type_name(other)),
                    ));
                }
            },
            PathSegment::Index(i) => {
                let i = usize::try_from(*i).map_err(|_| {
                    conflict(target, format!("negative index {i} cannot be written"))
                })?;
                element(node, i, target)?
            }
            PathSegment::Wildcard => {
                let i = index.ok_or_else(|| {
                    conflict(target, "wildcard target written without an element index")
                })?;
                element(node, i, target)?
            }
        };
    }
    Ok(())
}

fn element<'v>(
    node: Option<&'v Value>,
    i: usize,
    target: &TargetPath,
) -> Result<Option<&'v Value>, TransformError> {
    match node {
        None => Ok(None),
        Some(Value::Array(items)) => Ok(items.get(i)),
        Some(other) => Err(conflict(
            target,
            format!("expected an array but found {}", type_name(other)),
        )),
    }
}

fn merge(slot: &mut Value, value: Value) {
    match (slot, value) {
        (Value::Object(existing), Value::Object(incoming)) => {
            for (key, value) in incoming {
                merge(existing.entry(key).or_insert(Value::Null), value);
            }
        }
        (slot, value) => *slot = value,
    }
}

/// Ensure the array under a wildcard target holds at least `len` slots.
pub fn reserve(root: &mut Value, target: &TargetPath, len: usize) -> Result<(), TransformError> {
    let Some(position) = target.wildcard_position() else {
        return Ok(());
    };
    let slot = descend(root, &target.segments[..position], None, target)?;
    let array = ensure_array(slot, target)?;
    if array.len() < len {
        array.resize(len, Value::Null);
    }
    Ok(())
}

fn descend<'v>(
    mut current: &'v mut Value,
    segments: &[PathSegment],
    index: Option<usize>,
    target: &TargetPath,
) -> Result<&'v mut Value, TransformError> {
    for segment in segments {
        current = match segment {
            PathSegment::Key(key) => ensure_object(current, target)?
                .entry(key.clone())
                .or_insert(Value::Null),
            PathSegment::Index(i) => {
                let i = usize::try_from(*i).map_err(|_| {
                    conflict(target, format!("negative index {i} cannot be written"))
                })?;
                slot(ensure_array(current, target)?, i)
            }
            PathSegment::Wildcard => {
                let i = index.ok_or_else(|| {
                    conflict(target, "wildcard target written without an element index")
                })?;
                slot(ensure_array(current, target)?, i)
            }
        };
    }
    Ok(current)
}

fn slot(array: &mut Vec<Value>, i: usize) -> &mut Value {
    if array.len() <= i {
        array.resize(i + 1, Value::Null);
    }
    &mut array[i]
}

fn ensure_object<'v>(
    value: &'v mut Value,
    target: &TargetPath,
) -> Result<&'v mut Map<String, Value>, TransformError> {
    if value.is_null() {
        *value = Value::Object(Map::new());
    }
    match value {
        Value::Object(map) => Ok(map),
        other => Err(conflict(
            target,
            format!("expected an object but found {}", type_name(other)),
        )),
    }
}

fn ensure_array<'v>(
    value: &'v mut Value,
    target: &TargetPath,
) -> Result<&'v mut Vec<Value>, TransformError> {
    if value.is_null() {
        *value = Value::Array(Vec::new());
    }
    match value {
        Value::Array(items) => Ok(items),
        other => Err(conflict(
            target,
            format!("expected an array but found {}", type_name(other)),
        )),
    }
}

fn conflict(target: &TargetPath, message: impl std::fmt::Display) -> TransformError {
    TransformError::new(
        TransformErrorKind::TargetConflict,
        format!("cannot write '{target}': {message}"),
    )
}

/// JSON type name used in diagnostics
pub fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use serde_json::json;

    fn key(k: &str) -> PathSegment {
        PathSegment::Key(k.to_string())
    }

    fn target(segments: Vec<PathSegment>) -> TargetPath {
        TargetPath { segments }
    }

    #[test]
    fn test_resolve_nested_key() {
        let record = json!({"user": {"name": "Ada"}});
        assert_eq!(
            resolve(&record, &[key("user"), key("name")], false).unwrap(),
            Resolved::Value(json!("Ada"))
        );
    }

    #[test]
    fn test_absent_is_not_null() {
        let record = json!({"user": {"name": null}});
        assert_eq!(
            resolve(&record, &[key("user"), key("name")], false).unwrap(),
            Resolved::Value(Value::Null)
        );
        assert_eq!(
            resolve(&record, &[key("user"), key("email")], false).unwrap(),
            Resolved::Absent
        );
        assert_eq!(
            resolve(&record, &[key("user"), key("name"), key("first")], false).unwrap(),
            Resolved::Absent
        );
    }

    #[rstest]
    #[case(0, Resolved::Value(json!("a")))]
    #[case(-1, Resolved::Value(json!("c")))]
    #[case(-3, Resolved::Value(json!("a")))]
    #[case(3, Resolved::Absent)]
    #[case(-4, Resolved::Absent)]
    fn test_resolve_index(#[case] index: i64, #[case] expected: Resolved) {
        let record = json!({"tags": ["a", "b", "c"]});
        assert_eq!(
            resolve(&record, &[key("tags"), PathSegment::Index(index)], false).unwrap(),
            expected
        );
    }

    #[test]
    fn test_out_of_range_is_error_when_strict() {
        let record = json!({"tags": ["a"]});
        let err = resolve(&record, &[key("tags"), PathSegment::Index(5)], true).unwrap_err();
        assert_eq!(err.kind, TransformErrorKind::IndexOutOfRange);
    }

    #[test]
    fn test_resolve_wildcard_keeps_positions() {
        let record = json!({"items": [{"sku": "A"}, {}, {"sku": "C"}]});
        assert_eq!(
            resolve(&record, &[key("items"), PathSegment::Wildcard, key("sku")], false).unwrap(),
            Resolved::Each(vec![Some(json!("A")), None, Some(json!("C"))])
        );
    }

    #[test]
    fn test_resolve_nested_wildcards() {
        let record = json!({"orders": [
            {"lines": [{"qty": 1}, {"qty": 2}]},
            {"lines": []},
            {"lines": [{"qty": 5}, {}]}
        ]});
        let path = [
            key("orders"),
            PathSegment::Wildcard,
            key("lines"),
            PathSegment::Wildcard,
            key("qty"),
        ];
        assert_eq!(
            resolve(&record, &path, false).unwrap(),
            Resolved::Each(vec![
                Some(json!([1, 2])),
                Some(json!([])),
                Some(json!([5])),
            ])
        );
    }

    #[test]
    fn test_wildcard_over_non_array_is_absent() {
        let record = json!({"items": "nope"});
        assert_eq!(
            resolve(&record, &[key("items"), PathSegment::Wildcard], false).unwrap(),
            Resolved::Absent
        );
    }

    #[test]
    fn test_into_value_collapses_each() {
        let each = Resolved::Each(vec![Some(json!(1)), None]);
        assert_eq!(each.into_value(), Some(json!([1, null])));
        assert_eq!(Resolved::Absent.into_value(), None);
    }

    #[test]
    fn test_assign_creates_containers() {
        let mut out = json!({});
        assign(
            &mut out,
            &target(vec![key("a"), key("b"), PathSegment::Index(1)]),
            json!("x"),
            None,
        )
        .unwrap();
        assert_eq!(out, json!({"a": {"b": [null, "x"]}}));
    }

    #[test]
    fn test_assign_wildcard_index() {
        let mut out = json!({});
        let t = target(vec![key("items"), PathSegment::Wildcard, key("id")]);
        reserve(&mut out, &t, 2).unwrap();
        assign(&mut out, &t, json!(7), Some(1)).unwrap();
        assert_eq!(out, json!({"items": [null, {"id": 7}]}));
    }

    #[test]
    fn test_reserve_empty_creates_empty_array() {
        let mut out = json!({});
        reserve(&mut out, &target(vec![key("tags"), PathSegment::Wildcard]), 0).unwrap();
        assert_eq!(out, json!({"tags": []}));
    }

    #[test]
    fn test_assign_conflict() {
        let mut out = json!({"a": "scalar"});
        let err = assign(&mut out, &target(vec![key("a"), key("b")]), json!(1), None).unwrap_err();
        assert_eq!(err.kind, TransformErrorKind::TargetConflict);
    }

    #[test]
    fn test_check_assign_agrees_with_assign() {
        let t = target(vec![key("xs"), PathSegment::Index(2), key("id"), key("k")]);
        let open = json!({"xs": []});
        let blocked = json!({"xs": [null, null, {"id": 5}]});
        assert!(check_assign(&open, &t, None).is_ok());
        assert!(assign(&mut open.clone(), &t, json!(1), None).is_ok());

        let err = check_assign(&blocked, &t, None).unwrap_err();
        assert_eq!(err.kind, TransformErrorKind::TargetConflict);
        assert_eq!(
            assign(&mut blocked.clone(), &t, json!(1), None).unwrap_err(),
            err
        );
    }

    #[test]
    fn test_check_reserve_sees_scalar_container() {
        let t = target(vec![key("tags"), PathSegment::Wildcard]);
        assert!(check_reserve(&json!({}), &t).is_ok());
        assert!(check_reserve(&json!({"tags": null}), &t).is_ok());
        assert!(check_reserve(&json!({"tags": "a"}), &t).is_err());
    }

    #[test]
    fn test_assign_overwrites_scalars() {
        let mut out = json!({"a": {"b": 1}});
        assign(&mut out, &target(vec![key("a")]), json!("flat"), None).unwrap();
        assert_eq!(out, json!({"a": "flat"}));
    }

    #[test]
    fn test_assign_merges_objects() {
        let mut out = json!({"a": {"b": 1, "c": {"d": 2}}});
        assign(
            &mut out,
            &target(vec![key("a")]),
            json!({"c": {"e": 3}, "f": 4}),
            None,
        )
        .unwrap();
        assert_eq!(out, json!({"a": {"b": 1, "c": {"d": 2, "e": 3}, "f": 4}}));
    }
}
