//! v8glue - V8 contexts, scripts and objects for Rust hosts
//!
//! v8glue embeds the V8 JavaScript engine and does the glue work around it:
//! create an isolated execution context, inject host values into it, evaluate
//! scripts or compiled script objects, and convert results back into host
//! values, including wrappers that let host code index and invoke JavaScript
//! objects.
//!
//! # Architecture
//!
//! - **Platform** ([`platform`]): process-wide V8 initialization, done once
//! - **Context** ([`Context`]): one isolate plus one global scope, with `eval`
//!   and global property access
//! - **Script** ([`Script`]): source compiled once, runnable many times
//! - **Objects** ([`JsObject`]): persistent handles to engine objects
//! - **Bridge**: per-context conversion between [`Value`] and engine values,
//!   including host callables ([`HostFunction`]) exposed as JS functions and
//!   host objects ([`HostObject`]) exposed through property interceptors
//!
//! # Ownership
//!
//! Wrappers hold persistent engine handles and a reference to their context.
//! Dropping a wrapper releases its handle; the isolate goes away with the
//! last context handle or wrapper. Host callables and host objects handed to
//! JavaScript stay alive until the engine collects their JS side.
//!
//! # Example
//!
//! ```no_run
//! use v8glue::{Context, HostFunction, Value};
//!
//! let context = Context::new().unwrap();
//! context
//!     .set("greet", HostFunction::new(|args| {
//!         let name = args.first().and_then(Value::as_str).unwrap_or("world");
//!         Ok(Value::from(format!("hello, {}", name)))
//!     }))
//!     .unwrap();
//!
//! let greeting = context.eval("greet('v8')").unwrap();
//! assert_eq!(greeting.as_str(), Some("hello, v8"));
//! ```

#![warn(clippy::all, rust_2018_idioms)]

mod bridge;
pub mod config;
mod context;
pub mod error;
mod object;
pub mod platform;
mod script;
mod types;
pub mod uint32;
mod value;
mod watchdog;

pub use config::ContextConfig;
pub use context::{Context, EVAL_RESOURCE_NAME};
pub use error::{Error, JsError, Result};
pub use object::{JsObject, ObjectKind};
pub use platform::{dispose_v8_platform, initialize_v8_platform, is_v8_initialized};
pub use script::Script;
pub use uint32::Uint32;
pub use value::{what_is_this, HostFunction, HostObject, HostObjectRef, Value};
pub use watchdog::InterruptHandle;
