#![warn(clippy::all, rust_2018_idioms)]

//! Interruption Integration Tests
//!
//! Deadlines from `ContextConfig` and termination through `InterruptHandle`.

use std::thread;
use std::time::{Duration, Instant};

use pretty_assertions::assert_eq;
use tracing_subscriber::EnvFilter;
use v8glue::{initialize_v8_platform, Context, ContextConfig, Error};

/// Show watchdog warnings with `RUST_LOG=v8glue=warn cargo test`.
fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

#[test]
fn test_timeout_terminates_infinite_loop() {
    init_tracing();
    let _ = initialize_v8_platform();

    let timeout = Duration::from_millis(100);
    let context = Context::with_config(ContextConfig::default().with_timeout(timeout)).unwrap();

    let start = Instant::now();
    let result = context.eval("while (true) {}");
    let elapsed = start.elapsed();

    match result {
        Err(Error::Timeout(limit)) => assert_eq!(limit, timeout),
        other => panic!("expected timeout, got {:?}", other),
    }
    assert!(
        elapsed < Duration::from_secs(5),
        "termination took too long: {:?}",
        elapsed
    );

    // Context should still be usable after the timeout
    assert_eq!(context.eval("1 + 1").unwrap().as_f64(), Some(2.0));
}

#[test]
fn test_fast_script_unaffected_by_timeout() {
    let _ = initialize_v8_platform();

    let context = Context::with_config(
        ContextConfig::default().with_timeout(Duration::from_millis(200)),
    )
    .unwrap();

    for _ in 0..5 {
        assert_eq!(context.eval("21 * 2").unwrap().as_f64(), Some(42.0));
    }

    // Deadlines are per operation; an idle context is never terminated.
    thread::sleep(Duration::from_millis(300));
    assert_eq!(context.eval("'still here'").unwrap().as_str(), Some("still here"));
}

#[test]
fn test_timeout_applies_to_scripts() {
    init_tracing();
    let _ = initialize_v8_platform();

    let context = Context::with_config(
        ContextConfig::default().with_timeout(Duration::from_millis(50)),
    )
    .unwrap();
    let script = context.compile("for (;;) {}", "spin.js").unwrap();

    assert!(matches!(script.run(), Err(Error::Timeout(_))));
}

#[test]
fn test_interrupt_from_another_thread() {
    let _ = initialize_v8_platform();

    let context = Context::new().unwrap();
    let handle = context.interrupt_handle();

    let interrupter = thread::spawn(move || {
        thread::sleep(Duration::from_millis(100));
        handle.interrupt()
    });

    let result = context.eval("let i = 0; while (true) { i++; }");
    assert!(interrupter.join().unwrap(), "isolate should still exist");

    assert!(
        matches!(result, Err(Error::Terminated)),
        "expected termination, got {:?}",
        result
    );
    assert_eq!(context.eval("'recovered'").unwrap().as_str(), Some("recovered"));
}
