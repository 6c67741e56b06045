//! Compiled scripts
//!
//! A [`Script`] is compiled once against a context and can be run any
//! number of times in that same context.
//!
//! # Example
//!
//! ```no_run
//! use v8glue::{Context, Script};
//!
//! let context = Context::new().unwrap();
//! let script = Script::new(&context, "6 * 7", "answer.js").unwrap();
//! assert_eq!(script.run().unwrap().as_f64(), Some(42.0));
//! ```

#![warn(clippy::all, rust_2018_idioms)]

use std::fmt;
use std::pin::pin;
use std::rc::Rc;

use tracing::debug;

use crate::bridge::from_js;
use crate::context::{script_origin, Context, Shared};
use crate::error::{caught, Error, Phase, Result};
use crate::value::Value;

/// Field order matters: the handle is released before the context reference.
pub struct Script {
    handle: v8::Global<v8::Script>,
    filename: String,
    shared: Rc<Shared>,
}

impl Script {
    /// Compile `source` in `context` without running it.
    ///
    /// `filename` is the resource name reported in error messages. Compile
    /// errors fail with [`Error::Compile`] and produce no script.
    pub fn new(context: &Context, source: &str, filename: &str) -> Result<Self> {
        let shared = context.shared();
        let handle = shared.enter(|scope| {
            let tc = pin!(v8::TryCatch::new(scope));
            let tc = &mut tc.init();

            let code = v8::String::new(tc, source)
                .ok_or_else(|| Error::Engine("failed to create source string".to_string()))?;
            let resource_name = v8::String::new(tc, filename)
                .ok_or_else(|| Error::Conversion(format!("filename too long ({} bytes)", filename.len())))?;
            let origin = script_origin(tc, resource_name.into());

            match v8::Script::compile(tc, code, Some(&origin)) {
                Some(script) => Ok(v8::Global::new(tc, script)),
                None => Err(caught!(tc, shared, Phase::Compile)),
            }
        })?;

        debug!(filename, len = source.len(), "compiled script");

        Ok(Self {
            handle,
            filename: filename.to_string(),
            shared: Rc::clone(shared),
        })
    }

    /// Run the script in the context it was compiled in.
    pub fn run(&self) -> Result<Value> {
        let shared = &self.shared;
        shared.enter(|scope| {
            let tc = pin!(v8::TryCatch::new(scope));
            let tc = &mut tc.init();

            let script = v8::Local::new(tc, &self.handle);
            match script.run(tc) {
                Some(result) => from_js(tc, shared, result),
                None => Err(caught!(tc, shared, Phase::Run)),
            }
        })
    }

    pub fn filename(&self) -> &str {
        &self.filename
    }

    pub fn context(&self) -> Context {
        Context::from_shared(Rc::clone(&self.shared))
    }
}

impl fmt::Debug for Script {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Script")
            .field("filename", &self.filename)
            .finish_non_exhaustive()
    }
}
