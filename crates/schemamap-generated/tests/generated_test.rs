//! Generated modules must produce exactly what the interpreter produces

use schemamap_codegen::compile;
use schemamap_core::{FunctionRegistry, Interpreter, TransformErrorKind, parse};
use schemamap_generated::corpus::CORPUS;
use schemamap_generated::generated;
use serde_json::{Value, json};

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn host_functions() -> FunctionRegistry {
    let mut registry = FunctionRegistry::new();
    registry
        .register_function_with_arity("pricing:discount", 2, |args| {
            let price = args[0].as_f64().ok_or("price must be a number")?;
            let pct = args[1].as_f64().ok_or("pct must be a number")?;
            Ok(json!(price * (1.0 - pct / 100.0)))
        })
        .register_function("shout", |args| match &args[0] {
            Value::String(s) => Ok(json!(format!("{}!", s.to_uppercase()))),
            other => Err(format!("cannot shout {other}")),
        })
        .register_function("trim", |args| {
            Ok(json!(format!("<{}>", args[0].as_str().unwrap_or_default())))
        });
    registry
}

fn records() -> Vec<Value> {
    vec![
        json!({}),
        json!({"user": {"status": "A", "mobile": null, "phone": "555-1234"}}),
        json!({"user": {"status": "Z", "mobile": "555-0000"}}),
        json!({"tags": ["A", "B"], "items": [{"name": "a", "price": "1.5"}, {"price": "2"}, {"name": "c"}]}),
        json!({"orders": [{"lines": [{"sku": "a"}, {"sku": "b"}]}, {"lines": []}]}),
        json!({"people": [{"first": "Ada", "last": "Lovelace"}, {"first": "Alan"}], "first": "x", "id": 7}),
        json!({"a": [1, 2], "b": [1], "ok": true}),
        json!({"pi": "3.14159", "greeting": "  hi   there  "}),
        json!({"code": "B", "note": null, "name": "  ada   LOVELACE "}),
        json!({"code": 1, "name": 42}),
        json!({"items": [{"price": 10}, {"price": 20}, {}], "qty": 3, "unit": 2.5}),
        json!({"items": [{"price": "x"}], "qty": "many"}),
        json!({"price": 200, "pct": 25, "name": "hi"}),
        json!({"price": "free", "name": 5}),
        json!({"qty": null, "note": null, "flag": "yes", "id": 1}),
        json!({"id": 1, "name": null}),
        json!({"xs": [3, 1, 3, 2], "age": "old", "label": "not-an-email"}),
        json!({"xs": [1], "age": "41", "label": "a@b.co"}),
        json!({"items": [{"sku": "a", "qty": "2"}, {"sku": "b", "qty": "5"}], "meta": {"k": 1}}),
        json!({"top": [5, 9, 1], "n": [1, 2], "words": ["a", "b"]}),
        json!({"user": null, "tags": "A", "items": null}),
        json!({"a": "s", "xs": [7, 8]}),
        json!({"f": "  ", "flag": ""}),
    ]
}

#[test]
fn test_generated_modules_match_interpreter() -> anyhow::Result<()> {
    init_tracing();
    let records = records();
    for (name, source) in CORPUS {
        let mapping = parse(source)?;
        let interpreter = Interpreter::with_registry(&mapping, host_functions());
        let compiled = compile(&mapping).with_registry(host_functions());
        let module = generated(name, host_functions())
            .ok_or_else(|| anyhow::anyhow!("no generated module for '{name}'"))?;

        for record in &records {
            let expected = interpreter.transform(record);
            assert_eq!(module.transform(record), expected, "{name}: {record}");
            assert_eq!(compiled.transform(record), expected, "{name}: {record}");
        }
        assert_eq!(
            module.transform_batch(&records),
            interpreter.transform_batch(&records),
            "{name}"
        );
    }
    Ok(())
}

#[test]
fn test_every_corpus_entry_is_generated() {
    for (name, _) in CORPUS {
        assert!(generated(name, FunctionRegistry::new()).is_some(), "{name}");
    }
    assert!(generated("not_generated", FunctionRegistry::new()).is_none());
}

#[test]
fn test_generated_rules_keep_their_semantics() {
    let blocked = generated("blocked_broadcast", FunctionRegistry::new()).unwrap();
    assert_eq!(
        blocked.transform(&json!({"a": "s", "xs": [7, 8]})).unwrap(),
        json!({"out": [null, "s"]})
    );

    let truthiness = generated("truthiness", FunctionRegistry::new()).unwrap();
    assert_eq!(
        truthiness.transform(&json!({"f": "  ", "flag": ""})).unwrap(),
        json!({"f": true, "flag": true})
    );

    let strict = generated("strict", FunctionRegistry::new()).unwrap();
    let err = strict
        .transform(&json!({"id": 1, "xs": [0, 1, 2, 3, 4, 5], "age": "old"}))
        .unwrap_err();
    assert_eq!(err.kind, TransformErrorKind::TypeConversion);
    assert_eq!(err.rule, Some(2));
}
