//! JavaScript execution contexts
//!
//! A [`Context`] owns one isolate and one V8 context inside it. Every
//! operation on the context, or on a [`Script`] or [`JsObject`] that belongs
//! to it, runs synchronously on the calling thread.
//!
//! # Example
//!
//! ```no_run
//! use v8glue::{Context, Value};
//!
//! let context = Context::new().unwrap();
//! context.set("answer", 42).unwrap();
//! let result = context.eval("answer * 2").unwrap();
//! assert_eq!(result.as_f64(), Some(84.0));
//! ```

#![warn(clippy::all, rust_2018_idioms)]

use std::cell::{Cell, RefCell};
use std::pin::pin;
use std::rc::Rc;

use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, trace};

use crate::bridge::{from_js, to_js, Bridge};
use crate::config::ContextConfig;
use crate::error::{caught, Error, Phase, Result};
use crate::object::JsObject;
use crate::platform::{initialize_v8_platform, v8_platform};
use crate::script::Script;
use crate::types::{from_v8_value, to_v8_value};
use crate::value::Value;
use crate::watchdog::{InterruptHandle, Watchdog};

/// Resource name used for sources passed to [`Context::eval`].
pub const EVAL_RESOURCE_NAME: &str = "<eval>";

/// State shared by a context and every wrapper created from it.
///
/// Field order matters: persistent handles are released before the isolate.
pub(crate) struct Shared {
    context: v8::Global<v8::Context>,
    pub(crate) bridge: Bridge,
    config: ContextConfig,
    isolate_handle: v8::IsolateHandle,
    isolate_ptr: v8::UnsafeRawIsolatePtr,
    /// Number of `enter` calls currently on the stack.
    depth: Cell<usize>,
    isolate: RefCell<v8::OwnedIsolate>,
}

impl Shared {
    /// Run `f` inside a handle scope with this context entered.
    ///
    /// The isolate is entered only for the duration of the call, so contexts
    /// living on the same thread do not depend on each other's lifetimes.
    /// Calls made while an operation is already running (from a host
    /// callable or host object) nest inside it: they get their own handle
    /// scope and share the outer operation's deadline.
    pub(crate) fn enter<R>(&self, f: impl FnOnce(&mut v8::PinScope<'_, '_>) -> Result<R>) -> Result<R> {
        if self.depth.get() > 0 {
            return self.enter_nested(f);
        }

        let mut isolate = self
            .isolate
            .try_borrow_mut()
            .map_err(|_| Error::Engine("isolate is already in use".to_string()))?;

        let watchdog = self
            .config
            .timeout
            .map(|timeout| Watchdog::arm(self.isolate_handle.clone(), timeout));

        // SAFETY: balanced by the `exit` below; the isolate outlives this call.
        unsafe { isolate.enter() };
        let result = {
            let _depth = Depth::increment(&self.depth);
            self.run_scoped(&mut isolate, f)
        };
        pump_platform_tasks(&isolate);
        // SAFETY: matches the `enter` above.
        unsafe { isolate.exit() };

        let fired = watchdog.map(Watchdog::disarm).unwrap_or(false);
        if fired || matches!(result, Err(Error::Terminated)) {
            isolate.cancel_terminate_execution();
        }
        drop(isolate);

        self.bridge.sweep();

        match (result, self.config.timeout) {
            (Err(Error::Terminated), Some(timeout)) if fired => Err(Error::Timeout(timeout)),
            (result, _) => result,
        }
    }

    /// `enter` for a call made while an outer `enter` is running.
    fn enter_nested<R>(&self, f: impl FnOnce(&mut v8::PinScope<'_, '_>) -> Result<R>) -> Result<R> {
        trace!(depth = self.depth.get(), "nested context entry");
        // SAFETY: a non-zero depth means an outer `enter` holds the owned
        // isolate for longer than this call.
        let mut isolate = unsafe { v8::Isolate::from_raw_isolate_ptr(self.isolate_ptr) };

        // Another context's isolate may be the entered one by now.
        // SAFETY: balanced by the `exit` below.
        unsafe { isolate.enter() };
        let result = {
            let _depth = Depth::increment(&self.depth);
            self.run_scoped(&mut isolate, f)
        };
        // SAFETY: matches the `enter` above.
        unsafe { isolate.exit() };
        result
    }

    fn run_scoped<R>(
        &self,
        isolate: &mut v8::Isolate,
        f: impl FnOnce(&mut v8::PinScope<'_, '_>) -> Result<R>,
    ) -> Result<R> {
        let scope = pin!(v8::HandleScope::new(isolate));
        let scope = &mut scope.init();
        let context = v8::Local::new(scope, &self.context);
        let scope = &mut v8::ContextScope::new(scope, context);
        f(scope)
    }

    pub(crate) fn same(self: &Rc<Self>, other: &Rc<Self>) -> bool {
        Rc::ptr_eq(self, other)
    }
}

/// Keeps `Shared::depth` raised while alive.
struct Depth<'a>(&'a Cell<usize>);

impl<'a> Depth<'a> {
    fn increment(depth: &'a Cell<usize>) -> Self {
        depth.set(depth.get() + 1);
        Self(depth)
    }
}

impl Drop for Depth<'_> {
    fn drop(&mut self) {
        self.0.set(self.0.get() - 1);
    }
}

/// Run queued platform tasks for `isolate`, such as deferred weak handle
/// finalizers.
fn pump_platform_tasks(isolate: &v8::Isolate) {
    let Some(platform) = v8_platform() else {
        return;
    };
    while v8::Platform::pump_message_loop(platform, isolate, false) {}
}

impl Drop for Shared {
    fn drop(&mut self) {
        // `OwnedIsolate` exits itself on drop and expects to be the entered
        // isolate at that point.
        // SAFETY: the isolate is still alive; its own drop performs the exit.
        unsafe { self.isolate.get_mut().enter() };
    }
}

/// An isolated JavaScript global scope.
///
/// Cloning a `Context` yields another handle to the same scope. The
/// underlying isolate lives until the last context handle, script or object
/// wrapper is dropped.
#[derive(Clone)]
pub struct Context {
    shared: Rc<Shared>,
}

impl Context {
    /// Create a context with the default configuration
    pub fn new() -> Result<Self> {
        Self::with_config(ContextConfig::default())
    }

    /// Create a context with a custom configuration
    pub fn with_config(config: ContextConfig) -> Result<Self> {
        initialize_v8_platform()?;

        let params = v8::CreateParams::default().heap_limits(0, config.max_heap_size_bytes);
        let mut isolate = v8::Isolate::new(params);
        let isolate_handle = isolate.thread_safe_handle();
        // SAFETY: only dereferenced by `Shared::enter_nested`, while the
        // owned isolate is alive and borrowed by an outer `enter`.
        let isolate_ptr = unsafe { isolate.as_raw_isolate_ptr() };

        let (context, bridge) = {
            let scope = pin!(v8::HandleScope::new(&mut isolate));
            let scope = &mut scope.init();
            let context = v8::Context::new(scope, Default::default());
            let global_context = v8::Global::new(scope, context);
            let scope = &mut v8::ContextScope::new(scope, context);
            (global_context, Bridge::new(scope))
        };

        // Leave the isolate; operations enter it on demand.
        // SAFETY: `Isolate::new` entered it; `Shared::drop` re-enters before disposal.
        unsafe { isolate.exit() };

        debug!(
            max_heap_size_bytes = config.max_heap_size_bytes,
            timeout = ?config.timeout,
            "created JavaScript context"
        );

        Ok(Self {
            shared: Rc::new(Shared {
                context,
                bridge,
                config,
                isolate_handle,
                isolate_ptr,
                depth: Cell::new(0),
                isolate: RefCell::new(isolate),
            }),
        })
    }

    pub(crate) fn from_shared(shared: Rc<Shared>) -> Self {
        Self { shared }
    }

    pub(crate) fn shared(&self) -> &Rc<Shared> {
        &self.shared
    }

    pub fn config(&self) -> &ContextConfig {
        &self.shared.config
    }

    /// Evaluate `source` in the global scope and convert the result.
    pub fn eval(&self, source: &str) -> Result<Value> {
        trace!(len = source.len(), "eval");
        let shared = &self.shared;
        self.eval_with(source, |scope, result| from_js(scope, shared, result))
    }

    fn eval_with<R>(
        &self,
        source: &str,
        convert: impl FnOnce(&mut v8::PinScope<'_, '_>, v8::Local<'_, v8::Value>) -> Result<R>,
    ) -> Result<R> {
        let shared = &self.shared;
        shared.enter(|scope| {
            let tc = pin!(v8::TryCatch::new(scope));
            let tc = &mut tc.init();

            let code = v8::String::new(tc, source)
                .ok_or_else(|| Error::Engine("failed to create source string".to_string()))?;
            let resource_name = v8::String::new(tc, EVAL_RESOURCE_NAME)
                .ok_or_else(|| Error::Engine("failed to create resource name".to_string()))?;
            let origin = script_origin(tc, resource_name.into());

            let script = match v8::Script::compile(tc, code, Some(&origin)) {
                Some(script) => script,
                None => return Err(caught!(tc, shared, Phase::Compile)),
            };
            let result = match script.run(tc) {
                Some(result) => result,
                None => return Err(caught!(tc, shared, Phase::Run)),
            };

            convert(tc, result)
        })
    }

    /// Bind `value` to the global property `name` (host `[]=`).
    pub fn set(&self, name: &str, value: impl Into<Value>) -> Result<()> {
        let value = value.into();
        trace!(name, kind = value.kind(), "set global");
        let shared = &self.shared;
        shared.enter(|scope| {
            let tc = pin!(v8::TryCatch::new(scope));
            let tc = &mut tc.init();

            let global = tc.get_current_context().global(tc);
            let key = property_name(tc, name)?;
            let value = to_js(tc, shared, &value)?;
            match global.set(tc, key.into(), value) {
                Some(_) => Ok(()),
                None => Err(caught!(tc, shared, Phase::Run)),
            }
        })
    }

    /// Read the global property `name`; unknown names read as `Undefined`.
    pub fn get(&self, name: &str) -> Result<Value> {
        let shared = &self.shared;
        shared.enter(|scope| {
            let tc = pin!(v8::TryCatch::new(scope));
            let tc = &mut tc.init();

            let global = tc.get_current_context().global(tc);
            let key = property_name(tc, name)?;
            match global.get(tc, key.into()) {
                Some(value) => from_js(tc, shared, value),
                None => Err(caught!(tc, shared, Phase::Run)),
            }
        })
    }

    /// The context's global object.
    pub fn global(&self) -> Result<JsObject> {
        let shared = &self.shared;
        shared.enter(|scope| {
            let global = scope.get_current_context().global(scope);
            Ok(JsObject::from_local(scope, shared, global))
        })
    }

    /// Compile `source` without running it; see [`Script::new`].
    pub fn compile(&self, source: &str, filename: &str) -> Result<Script> {
        Script::new(self, source, filename)
    }

    /// Serialize `value` to JSON and bind the parsed result to `name`.
    pub fn set_serialized<T: Serialize>(&self, name: &str, value: &T) -> Result<()> {
        let shared = &self.shared;
        shared.enter(|scope| {
            let tc = pin!(v8::TryCatch::new(scope));
            let tc = &mut tc.init();

            let global = tc.get_current_context().global(tc);
            let key = property_name(tc, name)?;
            let value = to_v8_value(tc, value)?;
            match global.set(tc, key.into(), value) {
                Some(_) => Ok(()),
                None => Err(caught!(tc, shared, Phase::Run)),
            }
        })
    }

    /// Evaluate `source` and deserialize the JSON form of its result.
    pub fn eval_as<T: DeserializeOwned>(&self, source: &str) -> Result<T> {
        self.eval_with(source, |scope, result| from_v8_value(scope, result))
    }

    /// A handle that can terminate running JavaScript from another thread.
    pub fn interrupt_handle(&self) -> InterruptHandle {
        InterruptHandle::new(self.shared.isolate_handle.clone())
    }

    /// Force a full garbage collection.
    ///
    /// Host callables and host objects whose JS side is no longer reachable
    /// are released afterwards.
    pub fn collect_garbage(&self) -> Result<()> {
        self.shared.enter(|scope| {
            scope.low_memory_notification();
            Ok(())
        })?;
        debug!(
            host_values = self.shared.bridge.callback_count(),
            host_errors = self.shared.bridge.host_error_count(),
            "collected garbage"
        );
        Ok(())
    }

    /// `true` if both handles refer to the same context.
    pub fn ptr_eq(&self, other: &Context) -> bool {
        self.shared.same(&other.shared)
    }
}

impl std::fmt::Debug for Context {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Context")
            .field("config", &self.shared.config)
            .finish_non_exhaustive()
    }
}

/// Script origin carrying `resource_name` for error messages.
pub(crate) fn script_origin<'s>(
    scope: &mut v8::PinScope<'s, '_>,
    resource_name: v8::Local<'s, v8::Value>,
) -> v8::ScriptOrigin<'s> {
    v8::ScriptOrigin::new(
        scope,
        resource_name,
        0,
        0,
        false,
        0,
        None,
        false,
        false,
        false,
        None,
    )
}

pub(crate) fn property_name<'s>(
    scope: &mut v8::PinScope<'s, '_>,
    name: &str,
) -> Result<v8::Local<'s, v8::String>> {
    v8::String::new(scope, name)
        .ok_or_else(|| Error::Conversion(format!("property name too long ({} bytes)", name.len())))
}
