#![warn(clippy::all, rust_2018_idioms)]

//! Script Integration Tests
//!
//! Compile-once / run-many behavior of `Script`.

use pretty_assertions::assert_eq;
use v8glue::{initialize_v8_platform, Context, Error, Script};

fn context() -> Context {
    let _ = initialize_v8_platform();
    Context::new().expect("context creation failed")
}

#[test]
fn test_compile_and_run() {
    let context = context();

    let script = Script::new(&context, "6 * 7", "answer.js").unwrap();
    assert_eq!(script.filename(), "answer.js");
    assert_eq!(script.run().unwrap().as_f64(), Some(42.0));
}

#[test]
fn test_compile_does_not_run() {
    let context = context();

    let script = Script::new(&context, "var ran = true;", "side_effect.js").unwrap();
    assert!(context.get("ran").unwrap().is_undefined());

    script.run().unwrap();
    assert_eq!(context.get("ran").unwrap().as_bool(), Some(true));
}

#[test]
fn test_side_effect_free_script_is_idempotent() {
    let context = context();
    context.set("base", 10).unwrap();

    let script = context.compile("base * 3 + 1", "calc.js").unwrap();
    let first = script.run().unwrap();
    let second = script.run().unwrap();

    assert_eq!(first.as_f64(), Some(31.0));
    assert_eq!(first.as_f64(), second.as_f64());
}

#[test]
fn test_script_sees_later_globals() {
    let context = context();

    let script = context.compile("greeting + ', ' + target", "greet.js").unwrap();
    context.set("greeting", "hello").unwrap();
    context.set("target", "world").unwrap();

    assert_eq!(script.run().unwrap().as_str(), Some("hello, world"));
}

#[test]
fn test_stateful_script_runs_accumulate() {
    let context = context();
    context.eval("var hits = 0;").unwrap();

    let script = context.compile("++hits", "hit.js").unwrap();
    script.run().unwrap();
    script.run().unwrap();

    assert_eq!(script.run().unwrap().as_f64(), Some(3.0));
}

#[test]
fn test_compile_error_names_file() {
    let context = context();

    let err = Script::new(&context, "function (", "broken.js").unwrap_err();
    match err {
        Error::Compile(js) => {
            assert!(js.message.contains("SyntaxError"), "got: {}", js.message);
            assert_eq!(js.resource.as_deref(), Some("broken.js"));
        }
        other => panic!("expected compile error, got {:?}", other),
    }
}

#[test]
fn test_run_error_names_file_and_line() {
    let context = context();

    let script = context
        .compile("var a = 1;\nthrow new TypeError('bad input');", "thrower.js")
        .unwrap();

    let err = script.run().unwrap_err();
    match err {
        Error::Exception(js) => {
            assert_eq!(js.message, "TypeError: bad input");
            assert_eq!(js.resource.as_deref(), Some("thrower.js"));
            assert_eq!(js.line, Some(2));
        }
        other => panic!("expected exception, got {:?}", other),
    }

    // Still runnable, still failing the same way.
    assert!(matches!(script.run(), Err(Error::Exception(_))));
}

#[test]
fn test_script_keeps_context_alive() {
    let script = {
        let context = context();
        context.set("kept", 5).unwrap();
        context.compile("kept + 1", "kept.js").unwrap()
    };

    assert_eq!(script.run().unwrap().as_f64(), Some(6.0));
    assert_eq!(script.context().eval("kept").unwrap().as_f64(), Some(5.0));
}
