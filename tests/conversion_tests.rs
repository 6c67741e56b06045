#![warn(clippy::all, rust_2018_idioms)]

//! Conversion Integration Tests
//!
//! How host values land in the engine and how engine values come back.

use std::collections::BTreeMap;

use pretty_assertions::assert_eq;
use v8glue::{initialize_v8_platform, Context, Error, Uint32, Value};

fn context() -> Context {
    let _ = initialize_v8_platform();
    Context::new().expect("context creation failed")
}

#[test]
fn test_typeof_injected_values() {
    let context = context();

    let mut map = BTreeMap::new();
    map.insert("k".to_string(), Value::from(1));

    let cases: Vec<(&str, Value, &str)> = vec![
        ("u", Value::Undefined, "undefined"),
        ("n", Value::Null, "object"),
        ("b", Value::from(false), "boolean"),
        ("num", Value::from(1.5), "number"),
        ("s", Value::from("text"), "string"),
        ("arr", Value::Array(vec![]), "object"),
        ("map", Value::from(map), "object"),
    ];

    for (name, value, expected) in cases {
        context.set(name, value).unwrap();
        let actual = context.eval(&format!("typeof {}", name)).unwrap();
        assert_eq!(actual.as_str(), Some(expected), "typeof {}", name);
    }
}

#[test]
fn test_nested_host_structures() {
    let context = context();

    let mut inner = BTreeMap::new();
    inner.insert("ids".to_string(), Value::Array(vec![Value::from(1), Value::from(2)]));
    let mut outer = BTreeMap::new();
    outer.insert("inner".to_string(), Value::from(inner));
    outer.insert("label".to_string(), Value::from("nested"));

    context.set("data", outer).unwrap();

    let result = context
        .eval("data.label + ':' + data.inner.ids.join('+')")
        .unwrap();
    assert_eq!(result.as_str(), Some("nested:1+2"));
}

#[test]
fn test_js_numbers_are_doubles() {
    let context = context();

    assert_eq!(context.eval("0.1 + 0.2").unwrap().as_f64(), Some(0.1 + 0.2));
    assert_eq!(context.eval("2 ** 53").unwrap().as_f64(), Some(9007199254740992.0));
    assert!(context.eval("NaN").unwrap().as_f64().unwrap().is_nan());
    assert_eq!(context.eval("-Infinity").unwrap().as_f64(), Some(f64::NEG_INFINITY));
}

#[test]
fn test_unicode_strings() {
    let context = context();

    context.set("greeting", "héllo wörld ✓").unwrap();
    assert_eq!(context.eval("greeting.length").unwrap().as_f64(), Some(13.0));
    assert_eq!(
        context.eval("greeting + ' 🚀'").unwrap().as_str(),
        Some("héllo wörld ✓ 🚀")
    );
}

#[test]
fn test_arrays_come_back_as_wrappers() {
    let context = context();

    let value = context.eval("[1, 'two', null]").unwrap();
    let array = value.as_object().expect("arrays are wrapped");
    assert!(array.is_array());

    let items = array.to_vec().unwrap();
    assert_eq!(items.len(), 3);
    assert_eq!(items[0].as_f64(), Some(1.0));
    assert_eq!(items[1].as_str(), Some("two"));
    assert!(items[2].is_null());
}

#[test]
fn test_invalid_date_fails_conversion() {
    let context = context();

    assert!(matches!(
        context.eval("new Date('not a date')"),
        Err(Error::Conversion(_))
    ));
}

#[test]
fn test_bigint_has_no_host_conversion() {
    let context = context();

    match context.eval("10n ** 20n") {
        Err(Error::Conversion(message)) => {
            assert!(message.contains("bigint"), "got: {}", message)
        }
        other => panic!("expected conversion error, got {:?}", other),
    }
}

#[test]
fn test_uint32_from_script_values() {
    let context = context();

    let length = context.eval("[1, 2, 3, 4].length").unwrap();
    assert_eq!(Uint32::try_from(&length).unwrap().get(), 4);

    let max = context.eval("4294967295").unwrap();
    assert_eq!(Uint32::try_from(&max).unwrap().get(), u32::MAX);

    let falsy = context.eval("null").unwrap();
    assert_eq!(Uint32::try_from(&falsy).unwrap().get(), 0);

    let negative = context.eval("-1").unwrap();
    assert!(matches!(Uint32::try_from(&negative), Err(Error::Conversion(_))));
}

#[test]
fn test_uint32_into_script() {
    let context = context();

    context.set("big", Uint32::from(u32::MAX)).unwrap();
    assert_eq!(
        context.eval("big === 4294967295").unwrap().as_bool(),
        Some(true)
    );
}

#[test]
fn test_proto_key_is_plain_data() {
    let context = context();

    let mut map = BTreeMap::new();
    map.insert("__proto__".to_string(), Value::from("not a prototype"));
    map.insert("name".to_string(), Value::from("record"));
    context.set("record", map).unwrap();

    assert_eq!(
        context.eval("Object.keys(record).sort().join(',')").unwrap().as_str(),
        Some("__proto__,name")
    );
    assert_eq!(
        context.eval("Object.getOwnPropertyDescriptor(record, '__proto__').value").unwrap().as_str(),
        Some("not a prototype")
    );
    assert_eq!(
        context.eval("typeof record.hasOwnProperty").unwrap().as_str(),
        Some("function")
    );
}
