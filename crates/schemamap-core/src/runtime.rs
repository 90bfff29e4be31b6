//! Evaluation primitives shared by the interpreter and compiled mappings
//!
//! Everything with observable semantics (how parts combine, how an absent
//! source is settled, how results land in the output tree) lives here, so a
//! compiled mapping produces the same record as the interpreter by
//! construction.

use std::fmt;

use indexmap::IndexMap;
use serde_json::{Map, Value};

use crate::ast::{AggregateFn, ArithOp, FunctionBinding, LookupTable, TargetPath};
use crate::builtins::Builtin;
use crate::config::{AbsentAction, Config, NullHandling};
use crate::error::{TransformError, TransformErrorKind};
use crate::path::{Resolved, assign, check_assign, check_reserve, reserve};
use crate::registry::{FunctionRegistry, unknown_function};
use crate::value::{Num, float_value, loose_eq, stringify};

/// Fold values with an aggregate.
///
/// `count` counts every element. The others skip nulls; `sum` of nothing is
/// zero while `avg`, `min` and `max` of nothing are null. `min` and `max`
/// return the winning element as it was written.
pub fn aggregate(func: AggregateFn, items: &[Value]) -> Result<Value, TransformError> {
    if func == AggregateFn::Count {
        return Ok(Value::from(items.len()));
    }
    let name = func.name();
    let mut numbers = Vec::with_capacity(items.len());
    for item in items.iter().filter(|item| !item.is_null()) {
        let n = Num::from_value(item).ok_or_else(|| {
            TransformError::conversion(name, format!("{item} is not a number"))
        })?;
        numbers.push((n, item));
    }
    match func {
        AggregateFn::Sum => numbers
            .iter()
            .fold(Num::Int(0), |acc, (n, _)| acc.add(*n))
            .into_value(),
        AggregateFn::Avg if numbers.is_empty() => Ok(Value::Null),
        AggregateFn::Avg => {
            let total = numbers.iter().fold(Num::Int(0), |acc, (n, _)| acc.add(*n));
            float_value(total.as_f64() / numbers.len() as f64)
        }
        _ => {
            let mut best: Option<(Num, &Value)> = None;
            for (n, item) in numbers {
                let better = match best {
                    None => true,
                    Some((b, _)) if func == AggregateFn::Min => n.as_f64() < b.as_f64(),
                    Some((b, _)) => n.as_f64() > b.as_f64(),
                };
                if better {
                    best = Some((n, item));
                }
            }
            Ok(best.map_or(Value::Null, |(_, item)| item.clone()))
        }
    }
}

/// Aggregate whatever a path resolved to
pub fn aggregate_resolved(func: AggregateFn, resolved: Resolved) -> Result<Value, TransformError> {
    let items = match resolved {
        Resolved::Absent | Resolved::Value(Value::Null) => Vec::new(),
        Resolved::Value(Value::Array(items)) => items,
        Resolved::Value(other) => vec![other],
        Resolved::Each(slots) => slots
            .into_iter()
            .map(|slot| slot.unwrap_or(Value::Null))
            .collect(),
    };
    aggregate(func, &items)
}

fn broadcast_len(parts: &[Resolved]) -> Result<Option<usize>, TransformError> {
    let mut len = None;
    for part in parts {
        if let Resolved::Each(slots) = part {
            match len {
                None => len = Some(slots.len()),
                Some(n) if n != slots.len() => {
                    return Err(TransformError::new(
                        TransformErrorKind::CardinalityMismatch,
                        format!("wildcard parts have {n} and {} elements", slots.len()),
                    ));
                }
                Some(_) => {}
            }
        }
    }
    Ok(len)
}

fn part_text(part: &Resolved, index: usize) -> String {
    match part {
        Resolved::Absent => String::new(),
        Resolved::Value(value) => stringify(value),
        Resolved::Each(slots) => slots
            .get(index)
            .and_then(Option::as_ref)
            .map(stringify)
            .unwrap_or_default(),
    }
}

/// Join stringified parts; absent and null parts contribute nothing.
///
/// Broadcast parts are joined element by element and must agree on length.
pub fn concat(parts: Vec<Resolved>) -> Result<Resolved, TransformError> {
    match broadcast_len(&parts)? {
        None => Ok(Resolved::Value(Value::String(
            parts.iter().map(|part| part_text(part, 0)).collect(),
        ))),
        Some(len) => Ok(Resolved::Each(
            (0..len)
                .map(|i| Some(Value::String(parts.iter().map(|part| part_text(part, i)).collect())))
                .collect(),
        )),
    }
}

fn is_blank(slot: &Option<Value>) -> bool {
    slot.as_ref().is_none_or(Value::is_null)
}

/// First part that is neither absent nor null, evaluated lazily left to right.
///
/// When the leading candidate is a broadcast its blank elements are filled
/// from later parts, element by element. All-blank yields [`Resolved::Absent`].
pub fn coalesce<F>(count: usize, mut part: F) -> Result<Resolved, TransformError>
where
    F: FnMut(usize) -> Result<Resolved, TransformError>,
{
    let mut acc = Resolved::Absent;
    for i in 0..count {
        acc = match acc {
            Resolved::Absent | Resolved::Value(Value::Null) => part(i)?,
            Resolved::Each(mut slots) => {
                match part(i)? {
                    Resolved::Each(fill) if fill.len() != slots.len() => {
                        return Err(TransformError::new(
                            TransformErrorKind::CardinalityMismatch,
                            format!(
                                "wildcard parts have {} and {} elements",
                                slots.len(),
                                fill.len()
                            ),
                        ));
                    }
                    Resolved::Each(fill) => {
                        for (slot, candidate) in slots.iter_mut().zip(fill) {
                            if is_blank(slot) && !is_blank(&candidate) {
                                *slot = candidate;
                            }
                        }
                    }
                    Resolved::Value(value) if !value.is_null() => {
                        for slot in slots.iter_mut().filter(|slot| is_blank(slot)) {
                            *slot = Some(value.clone());
                        }
                    }
                    _ => {}
                }
                Resolved::Each(slots)
            }
            done => return Ok(done),
        };
        if let Resolved::Each(slots) = &acc
            && !slots.iter().any(is_blank)
        {
            return Ok(acc);
        }
    }
    Ok(match acc {
        Resolved::Value(Value::Null) => Resolved::Absent,
        other => other,
    })
}

/// `lhs op rhs` for `@compute`; an absent or null operand makes the result absent.
///
/// Division always yields a float.
pub fn arithmetic(
    op: ArithOp,
    lhs: Option<Value>,
    rhs: Option<Value>,
) -> Result<Resolved, TransformError> {
    let (Some(lhs), Some(rhs)) = (lhs, rhs) else {
        return Ok(Resolved::Absent);
    };
    if lhs.is_null() || rhs.is_null() {
        return Ok(Resolved::Absent);
    }
    let operand = |value: &Value| {
        Num::from_value(value).ok_or_else(|| {
            TransformError::conversion("compute", format!("{value} is not a number"))
        })
    };
    let (a, b) = (operand(&lhs)?, operand(&rhs)?);
    let result = match op {
        ArithOp::Add => a.add(b),
        ArithOp::Sub => a.sub(b),
        ArithOp::Mul => a.mul(b),
        ArithOp::Div => a
            .div(b)
            .map_err(|_| TransformError::conversion("compute", "division by zero"))?,
    };
    result.into_value().map(Resolved::Value)
}

/// A fresh v4 UUID in hyphenated form
pub fn uuid() -> Value {
    Value::String(uuid::Uuid::new_v4().to_string())
}

/// Decide what an absent source becomes: nothing, null, or an error.
pub fn settle(
    value: Option<Value>,
    action: AbsentAction,
    source: &dyn fmt::Display,
) -> Result<Option<Value>, TransformError> {
    match (value, action) {
        (Some(value), _) => Ok(Some(value)),
        (None, AbsentAction::Skip) => Ok(None),
        (None, AbsentAction::Null) => Ok(Some(Value::Null)),
        (None, AbsentAction::Fail) => Err(TransformError::missing_field(source)),
    }
}

/// State of a run of `when` steps within one chain
#[derive(Debug, Default, Clone, Copy)]
pub struct CaseGroup {
    active: bool,
    matched: bool,
}

impl CaseGroup {
    /// Apply one `when(pattern, result)` case
    pub fn when(&mut self, value: Value, pattern: &Value, result: &Value) -> Value {
        if !self.active {
            *self = Self {
                active: true,
                matched: false,
            };
        }
        if !self.matched && loose_eq(&value, pattern) {
            self.matched = true;
            return result.clone();
        }
        value
    }

    /// Apply `else(fallback)`. Outside a group it replaces null only.
    pub fn otherwise(&mut self, value: Value, fallback: &Value) -> Value {
        let group = std::mem::take(self);
        match (group.active, group.matched) {
            (true, true) => value,
            (true, false) => fallback.clone(),
            (false, _) if value.is_null() => fallback.clone(),
            (false, _) => value,
        }
    }

    /// Close the group before any other step runs
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

/// Table lookup; a miss passes the value through
pub fn lookup(table: &LookupTable, value: Value) -> Value {
    if value.is_null() {
        return value;
    }
    table.get(&value).cloned().unwrap_or(value)
}

/// Run a catalogue step, letting a host function of the same name take over
pub fn invoke_builtin(
    registry: &FunctionRegistry,
    func: Builtin,
    value: Value,
    args: &[Value],
    config: &Config,
) -> Result<Value, TransformError> {
    match registry.get(func.name()) {
        Some(external) => external.call_step(value, args),
        None => func.apply(value, args, config),
    }
}

/// Run a host function as a chain step
pub fn invoke_external(
    registry: &FunctionRegistry,
    bindings: &IndexMap<String, FunctionBinding>,
    name: &str,
    value: Value,
    args: &[Value],
) -> Result<Value, TransformError> {
    registry
        .resolve_external(name, bindings)
        .ok_or_else(|| unknown_function(name))?
        .call_step(value, args)
}

/// A rule's result, ready to be written
#[derive(Debug, Clone, PartialEq)]
pub enum RuleValue {
    /// One value for a plain target
    Single(Value),
    /// One slot per element for a wildcard target; `None` leaves the slot untouched
    Each(Vec<Option<Value>>),
}

/// Settle a resolved source and run the chain over it.
///
/// Returns `None` when the rule writes nothing.
pub fn evaluate_rule<F>(
    resolved: Resolved,
    wildcard_target: bool,
    action: AbsentAction,
    source: &dyn fmt::Display,
    mut chain: F,
) -> Result<Option<RuleValue>, TransformError>
where
    F: FnMut(Value) -> Result<Value, TransformError>,
{
    if !wildcard_target {
        return match settle(resolved.into_value(), action, source)? {
            Some(value) => chain(value).map(|v| Some(RuleValue::Single(v))),
            None => Ok(None),
        };
    }
    match resolved {
        Resolved::Absent => settle(None, action, source).map(|_| None),
        Resolved::Value(value) => Err(TransformError::new(
            TransformErrorKind::CardinalityMismatch,
            format!("wildcard target fed a single {} from {source}", crate::path::type_name(&value)),
        )),
        Resolved::Each(slots) => {
            let mut out = Vec::with_capacity(slots.len());
            for slot in slots {
                out.push(match settle(slot, action, source)? {
                    Some(value) => Some(chain(value)?),
                    None => None,
                });
            }
            Ok(Some(RuleValue::Each(out)))
        }
    }
}

/// Write a rule result. `fill` replaces nulls when nulls get typed defaults.
pub fn write_rule(
    root: &mut Value,
    target: &TargetPath,
    value: RuleValue,
    fill: Option<&Value>,
) -> Result<(), TransformError> {
    let fill_null = |value: Value| match (value, fill) {
        (Value::Null, Some(default)) => default.clone(),
        (value, _) => value,
    };
    match value {
        RuleValue::Single(value) => assign(root, target, fill_null(value), None),
        RuleValue::Each(slots) => {
            check_reserve(root, target)?;
            for (i, slot) in slots.iter().enumerate() {
                if slot.is_some() {
                    check_assign(root, target, Some(i))?;
                }
            }
            reserve(root, target, slots.len())?;
            for (i, slot) in slots.into_iter().enumerate() {
                if let Some(value) = slot {
                    assign(root, target, fill_null(value), Some(i))?;
                }
            }
            Ok(())
        }
    }
}

/// Apply the output null policy once all rules ran
pub fn finish(mut root: Value, null_handling: NullHandling) -> Value {
    if null_handling == NullHandling::Omit {
        remove_nulls(&mut root);
    }
    root
}

/// Drop null object fields at every depth; array elements keep their
/// positions.
pub fn remove_nulls(value: &mut Value) {
    match value {
        Value::Object(map) => {
            map.retain(|_, v| !v.is_null());
            map.values_mut().for_each(remove_nulls);
        }
        Value::Array(items) => items.iter_mut().for_each(remove_nulls),
        _ => {}
    }
}

/// A fresh, empty output record
pub fn output_root() -> Value {
    Value::Object(Map::new())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::PathSegment;
    use rstest::rstest;
    use serde_json::json;

    #[rstest]
    #[case(AggregateFn::Count, json!([1, null, "x"]), json!(3))]
    #[case(AggregateFn::Sum, json!([1, null, 2.5]), json!(3.5))]
    #[case(AggregateFn::Sum, json!([]), json!(0))]
    #[case(AggregateFn::Avg, json!([]), json!(null))]
    #[case(AggregateFn::Avg, json!([2, 4]), json!(3.0))]
    #[case(AggregateFn::Min, json!([3, "1", 2]), json!("1"))]
    #[case(AggregateFn::Max, json!([null]), json!(null))]
    fn test_aggregate(#[case] func: AggregateFn, #[case] items: Value, #[case] expected: Value) {
        let items = items.as_array().cloned().unwrap_or_default();
        assert_eq!(aggregate(func, &items).unwrap(), expected);
    }

    #[test]
    fn test_aggregate_rejects_text() {
        let err = aggregate(AggregateFn::Sum, &[json!("abc")]).unwrap_err();
        assert_eq!(err.kind, TransformErrorKind::TypeConversion);
    }

    #[test]
    fn test_concat_blanks_absent_parts() {
        let joined = concat(vec![
            Resolved::Value(json!("a")),
            Resolved::Absent,
            Resolved::Value(json!(null)),
            Resolved::Value(json!(1)),
        ])
        .unwrap();
        assert_eq!(joined, Resolved::Value(json!("a1")));
    }

    #[test]
    fn test_concat_broadcasts() {
        let joined = concat(vec![
            Resolved::Each(vec![Some(json!("a")), None]),
            Resolved::Value(json!("!")),
        ])
        .unwrap();
        assert_eq!(
            joined,
            Resolved::Each(vec![Some(json!("a!")), Some(json!("!"))])
        );
    }

    #[test]
    fn test_concat_length_mismatch() {
        let err = concat(vec![
            Resolved::Each(vec![Some(json!(1))]),
            Resolved::Each(vec![Some(json!(1)), Some(json!(2))]),
        ])
        .unwrap_err();
        assert_eq!(err.kind, TransformErrorKind::CardinalityMismatch);
    }

    #[test]
    fn test_coalesce_is_lazy() {
        let parts = [json!(null), json!("X"), json!("Y")];
        let mut seen = Vec::new();
        let result = coalesce(parts.len(), |i| {
            seen.push(i);
            Ok(Resolved::Value(parts[i].clone()))
        })
        .unwrap();
        assert_eq!(result, Resolved::Value(json!("X")));
        assert_eq!(seen, vec![0, 1]);
    }

    #[test]
    fn test_coalesce_all_null_is_absent() {
        let result = coalesce(2, |_| Ok(Resolved::Value(Value::Null))).unwrap();
        assert_eq!(result, Resolved::Absent);
    }

    #[test]
    fn test_coalesce_fills_broadcast_slots() {
        let result = coalesce(2, |i| {
            Ok(match i {
                0 => Resolved::Each(vec![Some(json!("a")), None, Some(Value::Null)]),
                _ => Resolved::Value(json!("-")),
            })
        })
        .unwrap();
        assert_eq!(
            result,
            Resolved::Each(vec![Some(json!("a")), Some(json!("-")), Some(json!("-"))])
        );
    }

    #[test]
    fn test_arithmetic() {
        let product = arithmetic(ArithOp::Mul, Some(json!("2.5")), Some(json!(4))).unwrap();
        assert_eq!(product, Resolved::Value(json!(10.0)));
        let quotient = arithmetic(ArithOp::Div, Some(json!(9)), Some(json!(3))).unwrap();
        assert_eq!(quotient, Resolved::Value(json!(3.0)));
        assert_eq!(
            arithmetic(ArithOp::Add, None, Some(json!(1))).unwrap(),
            Resolved::Absent
        );
        let err = arithmetic(ArithOp::Div, Some(json!(1)), Some(json!(0))).unwrap_err();
        assert_eq!(err.kind, TransformErrorKind::TypeConversion);
    }

    #[test]
    fn test_case_group() {
        let mut group = CaseGroup::default();
        let value = group.when(json!("A"), &json!("A"), &json!("active"));
        let value = group.when(value, &json!("active"), &json!("wrong"));
        assert_eq!(group.otherwise(value, &json!("unknown")), json!("active"));

        let value = group.when(json!("Z"), &json!("A"), &json!("active"));
        assert_eq!(group.otherwise(value, &json!("unknown")), json!("unknown"));
    }

    #[test]
    fn test_standalone_else_replaces_null() {
        let mut group = CaseGroup::default();
        assert_eq!(group.otherwise(Value::Null, &json!("n/a")), json!("n/a"));
        assert_eq!(group.otherwise(json!(0), &json!("n/a")), json!(0));
    }

    #[test]
    fn test_lookup_passes_through() {
        let mut table = LookupTable::new(None);
        table.insert("A", json!("ACTIVE"));
        table.insert("1", json!(true));
        assert_eq!(lookup(&table, json!("A")), json!("ACTIVE"));
        assert_eq!(lookup(&table, json!(1)), json!(true));
        assert_eq!(lookup(&table, json!("B")), json!("B"));
        assert_eq!(lookup(&table, Value::Null), Value::Null);
    }

    #[test]
    fn test_builtin_shadowed_by_host_function() {
        let mut registry = FunctionRegistry::new();
        registry.register_function("trim", |args| Ok(json!(format!("<{}>", args[0]))));
        let value = invoke_builtin(&registry, Builtin::Trim, json!(" x "), &[], &Config::default())
            .unwrap();
        assert_eq!(value, json!("<\" x \">"));
    }

    #[test]
    fn test_settle() {
        assert_eq!(settle(None, AbsentAction::Skip, &"a").unwrap(), None);
        assert_eq!(settle(None, AbsentAction::Null, &"a").unwrap(), Some(Value::Null));
        let err = settle(None, AbsentAction::Fail, &"a").unwrap_err();
        assert_eq!(err.kind, TransformErrorKind::MissingField);
    }

    #[test]
    fn test_evaluate_wildcard_rule() {
        let resolved = Resolved::Each(vec![Some(json!("A")), None]);
        let value = evaluate_rule(resolved, true, AbsentAction::Skip, &"tags[*]", |v| {
            Ok(json!(crate::value::stringify(&v).to_lowercase()))
        })
        .unwrap();
        assert_eq!(value, Some(RuleValue::Each(vec![Some(json!("a")), None])));
    }

    #[test]
    fn test_wildcard_target_rejects_single_value() {
        let err = evaluate_rule(
            Resolved::Value(json!("x")),
            true,
            AbsentAction::Skip,
            &"x",
            Ok,
        )
        .unwrap_err();
        assert_eq!(err.kind, TransformErrorKind::CardinalityMismatch);
    }

    #[test]
    fn test_write_rule_fills_defaults() {
        let target = TargetPath {
            segments: vec![
                PathSegment::Key("items".to_string()),
                PathSegment::Wildcard,
                PathSegment::Key("qty".to_string()),
            ],
        };
        let mut root = output_root();
        write_rule(
            &mut root,
            &target,
            RuleValue::Each(vec![Some(json!(2)), Some(Value::Null)]),
            Some(&json!(0)),
        )
        .unwrap();
        assert_eq!(root, json!({"items": [{"qty": 2}, {"qty": 0}]}));
    }

    #[test]
    fn test_write_rule_is_all_or_nothing() {
        let target = TargetPath {
            segments: vec![
                PathSegment::Key("out".to_string()),
                PathSegment::Wildcard,
                PathSegment::Key("id".to_string()),
            ],
        };
        let mut root = json!({"out": [null, "s"]});
        let err = write_rule(
            &mut root,
            &target,
            RuleValue::Each(vec![Some(json!(7)), Some(json!(8))]),
            None,
        )
        .unwrap_err();
        assert_eq!(err.kind, TransformErrorKind::TargetConflict);
        assert_eq!(root, json!({"out": [null, "s"]}));

        let mut root = json!({"out": "s"});
        assert!(write_rule(&mut root, &target, RuleValue::Each(vec![]), None).is_err());
        assert_eq!(root, json!({"out": "s"}));
    }

    #[test]
    fn test_finish_omits_nulls() {
        let root = json!({"a": null, "b": {"c": null, "d": 1}, "e": [null, {"f": null}]});
        assert_eq!(
            finish(root, NullHandling::Omit),
            json!({"b": {"d": 1}, "e": [null, {}]})
        );
    }
}
