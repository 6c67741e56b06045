//! Host <-> engine value conversion
//!
//! The [`Bridge`] is the per-context conversion state: identifiers resolved
//! once when the context is created, the host callables and host objects that
//! have been handed to JavaScript, and the host errors thrown through it.
//! Conversion itself is done by [`to_js`] and [`from_js`].
//!
//! Host callables become JS functions and host objects become JS objects
//! with property interceptors. Either way the data slot points at a boxed
//! [`HostCallback`] owned by the bridge. The same pointer is stored under a
//! private key on the JS side, which is how a value coming back from
//! JavaScript is recognized and unwrapped to the original host handle instead
//! of being wrapped as a [`JsObject`].
//!
//! The bridge only holds its JS wrappers weakly. Once the engine collects a
//! wrapper, its finalizer queues the entry and the next conversion drops it.

#![warn(clippy::all, rust_2018_idioms)]

use std::any::Any;
use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::ffi::c_void;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::rc::{Rc, Weak};
use std::sync::Arc;

use anyhow::anyhow;
use chrono::DateTime;
use tracing::{trace, warn};

use crate::context::{property_name, Shared};
use crate::error::{Error, Result};
use crate::object::JsObject;
use crate::value::{HostFunction, HostObjectRef, Value};

/// Description given to the private key marking host-backed JS values.
const HOST_VALUE_KEY: &str = "v8glue::HostValue";

/// Description given to the private key linking JS errors to host errors.
const HOST_ERROR_KEY: &str = "v8glue::HostError";

/// The host side of a JS wrapper.
#[derive(Clone)]
enum HostTarget {
    Function(HostFunction),
    Object(HostObjectRef),
}

impl HostTarget {
    fn addr(&self) -> usize {
        match self {
            HostTarget::Function(f) => f.addr(),
            HostTarget::Object(o) => o.addr(),
        }
    }

    fn to_value(&self) -> Value {
        match self {
            HostTarget::Function(f) => Value::Function(f.clone()),
            HostTarget::Object(o) => Value::HostObject(o.clone()),
        }
    }
}

/// What a host-backed JS value points at.
pub(crate) struct HostCallback {
    shared: Weak<Shared>,
    target: HostTarget,
}

struct Wrapper {
    id: u64,
    _callback: Box<HostCallback>,
    handle: v8::Weak<v8::Object>,
}

struct HostError {
    error: Arc<anyhow::Error>,
    _handle: v8::Weak<v8::Object>,
}

/// Registry entries whose JS side has been garbage collected.
enum Collected {
    Wrapper { addr: usize, id: u64 },
    Error(u64),
}

pub(crate) struct Bridge {
    host_value_key: v8::Global<v8::Private>,
    host_error_key: v8::Global<v8::Private>,
    /// Live wrappers, keyed by the address of their host target.
    wrappers: RefCell<HashMap<usize, Wrapper>>,
    errors: RefCell<HashMap<u64, HostError>>,
    /// Filled by weak handle finalizers, drained by [`Bridge::sweep`].
    collected: Rc<RefCell<Vec<Collected>>>,
    next_id: Cell<u64>,
}

impl Bridge {
    pub(crate) fn new(scope: &mut v8::PinScope<'_, '_>) -> Self {
        let value_name = v8::String::new(scope, HOST_VALUE_KEY);
        let value_key = v8::Private::new(scope, value_name);
        let error_name = v8::String::new(scope, HOST_ERROR_KEY);
        let error_key = v8::Private::new(scope, error_name);
        Self {
            host_value_key: v8::Global::new(scope, value_key),
            host_error_key: v8::Global::new(scope, error_key),
            wrappers: RefCell::new(HashMap::new()),
            errors: RefCell::new(HashMap::new()),
            collected: Rc::new(RefCell::new(Vec::new())),
            next_id: Cell::new(0),
        }
    }

    /// Number of host callables and host objects with a live JS wrapper.
    pub(crate) fn callback_count(&self) -> usize {
        self.sweep();
        self.wrappers.borrow().len()
    }

    /// Number of host errors still referenced from JavaScript.
    pub(crate) fn host_error_count(&self) -> usize {
        self.sweep();
        self.errors.borrow().len()
    }

    fn next_id(&self) -> u64 {
        let id = self.next_id.get();
        self.next_id.set(id + 1);
        id
    }

    /// Drop registry entries whose JS side was collected.
    pub(crate) fn sweep(&self) {
        let collected = match self.collected.try_borrow_mut() {
            Ok(mut collected) => std::mem::take(&mut *collected),
            Err(_) => return,
        };
        if collected.is_empty() {
            return;
        }

        // Dropped after the registry borrows are released: a host closure
        // may own wrappers or contexts of its own.
        let mut released_wrappers = Vec::new();
        let mut released_errors = Vec::new();
        {
            let mut wrappers = self.wrappers.borrow_mut();
            let mut errors = self.errors.borrow_mut();
            for entry in collected {
                match entry {
                    Collected::Wrapper { addr, id } => {
                        if wrappers.get(&addr).is_some_and(|w| w.id == id) {
                            released_wrappers.extend(wrappers.remove(&addr));
                        }
                    }
                    Collected::Error(id) => released_errors.extend(errors.remove(&id)),
                }
            }
        }
        trace!(
            wrappers = released_wrappers.len(),
            errors = released_errors.len(),
            "released collected host values"
        );
    }

    /// The JS wrapper for `target`, creating it on first use so a host value
    /// keeps a single identity inside the context.
    fn wrap<'s>(
        &self,
        scope: &mut v8::PinScope<'s, '_>,
        shared: &Rc<Shared>,
        target: &HostTarget,
    ) -> Result<v8::Local<'s, v8::Object>> {
        self.sweep();

        let addr = target.addr();
        let existing = match self.wrappers.borrow().get(&addr) {
            Some(wrapper) => wrapper.handle.to_local(scope),
            None => None,
        };
        if let Some(existing) = existing {
            return Ok(existing);
        }

        let callback = Box::new(HostCallback {
            shared: Rc::downgrade(shared),
            target: target.clone(),
        });
        let ptr = &*callback as *const HostCallback as *mut c_void;
        let data = v8::External::new(scope, ptr);

        let object: v8::Local<'s, v8::Object> = match target {
            HostTarget::Function(_) => v8::Function::builder(host_function_callback)
                .data(data.into())
                .build(scope)
                .ok_or_else(|| Error::Engine("failed to create function".to_string()))?
                .into(),
            HostTarget::Object(_) => host_object_instance(scope, data)?,
        };

        let key = v8::Local::new(scope, &self.host_value_key);
        object.set_private(scope, key, data.into());

        let id = self.next_id();
        let collected = Rc::clone(&self.collected);
        let handle = v8::Weak::with_finalizer(
            scope,
            object,
            Box::new(move |_| {
                if let Ok(mut collected) = collected.try_borrow_mut() {
                    collected.push(Collected::Wrapper { addr, id });
                }
            }),
        );

        // A stale entry for the same target only remains when its wrapper was
        // collected but not swept yet.
        let stale = self.wrappers.borrow_mut().insert(
            addr,
            Wrapper {
                id,
                _callback: callback,
                handle,
            },
        );
        drop(stale);
        trace!(addr, "exposed host value");

        Ok(object)
    }

    /// The host value behind `object`, if it wraps one.
    fn unwrap(
        &self,
        scope: &mut v8::PinScope<'_, '_>,
        object: v8::Local<'_, v8::Object>,
    ) -> Option<Value> {
        let key = v8::Local::new(scope, &self.host_value_key);
        let marker = object.get_private(scope, key)?;
        let external = v8::Local::<v8::External>::try_from(marker).ok()?;
        // SAFETY: only this bridge sets `host_value_key`, always to a pointer
        // into a `Box<HostCallback>` it keeps alive until the wrapper is
        // collected.
        let callback = unsafe { &*(external.value() as *const HostCallback) };
        Some(callback.target.to_value())
    }

    /// Link the JS error `exception` to the host error it reports.
    fn attach_host_error(
        &self,
        scope: &mut v8::PinScope<'_, '_>,
        exception: v8::Local<'_, v8::Object>,
        error: anyhow::Error,
    ) {
        let id = self.next_id();
        let key = v8::Local::new(scope, &self.host_error_key);
        let marker = v8::Number::new(scope, id as f64);
        exception.set_private(scope, key, marker.into());

        let collected = Rc::clone(&self.collected);
        let handle = v8::Weak::with_finalizer(
            scope,
            exception,
            Box::new(move |_| {
                if let Ok(mut collected) = collected.try_borrow_mut() {
                    collected.push(Collected::Error(id));
                }
            }),
        );
        self.errors.borrow_mut().insert(
            id,
            HostError {
                error: Arc::new(error),
                _handle: handle,
            },
        );
    }

    /// The host error a thrown JS value was created for, if any.
    pub(crate) fn host_error(
        &self,
        scope: &mut v8::PinScope<'_, '_>,
        exception: v8::Local<'_, v8::Value>,
    ) -> Option<Arc<anyhow::Error>> {
        let exception = v8::Local::<v8::Object>::try_from(exception).ok()?;
        let key = v8::Local::new(scope, &self.host_error_key);
        let marker = exception.get_private(scope, key)?;
        if !marker.is_number() {
            return None;
        }
        let id = marker.number_value(scope)? as u64;
        self.errors.borrow().get(&id).map(|e| Arc::clone(&e.error))
    }
}

/// Convert a host value into an engine value.
pub(crate) fn to_js<'s>(
    scope: &mut v8::PinScope<'s, '_>,
    shared: &Rc<Shared>,
    value: &Value,
) -> Result<v8::Local<'s, v8::Value>> {
    let js: v8::Local<'s, v8::Value> = match value {
        Value::Undefined => v8::undefined(scope).into(),
        Value::Null => v8::null(scope).into(),
        Value::Bool(b) => v8::Boolean::new(scope, *b).into(),
        Value::Number(n) => v8::Number::new(scope, *n).into(),
        Value::String(s) => v8::String::new(scope, s)
            .ok_or_else(|| Error::Conversion(format!("string too long ({} bytes)", s.len())))?
            .into(),
        Value::Date(date) => v8::Date::new(scope, date.timestamp_millis() as f64)
            .ok_or_else(|| Error::Conversion(format!("date {} out of range", date)))?
            .into(),
        Value::Array(items) => {
            let mut elements = Vec::with_capacity(items.len());
            for item in items {
                elements.push(to_js(scope, shared, item)?);
            }
            v8::Array::new_with_elements(scope, &elements).into()
        }
        Value::Map(entries) => {
            let object = v8::Object::new(scope);
            for (key, item) in entries {
                let name = property_name(scope, key)?;
                let item = to_js(scope, shared, item)?;
                // Own data properties: no setters run and `__proto__` stays a key.
                match object.create_data_property(scope, name.into(), item) {
                    Some(true) => {}
                    Some(false) => {
                        return Err(Error::Conversion(format!("could not define property '{}'", key)))
                    }
                    None if scope.is_execution_terminating() => return Err(Error::Terminated),
                    None => {
                        return Err(Error::Engine(format!("defining property '{}' threw", key)))
                    }
                }
            }
            object.into()
        }
        Value::Function(function) => shared
            .bridge
            .wrap(scope, shared, &HostTarget::Function(function.clone()))?
            .into(),
        Value::HostObject(object) => shared
            .bridge
            .wrap(scope, shared, &HostTarget::Object(object.clone()))?
            .into(),
        Value::Object(object) => {
            if !object.belongs_to(shared) {
                return Err(Error::ForeignObject);
            }
            object.local(scope).into()
        }
    };
    Ok(js)
}

/// Convert an engine value into a host value.
///
/// Objects, arrays and plain JS functions are wrapped, not copied. Wrappers
/// of host callables and host objects unwrap to the original host handle.
pub(crate) fn from_js(
    scope: &mut v8::PinScope<'_, '_>,
    shared: &Rc<Shared>,
    value: v8::Local<'_, v8::Value>,
) -> Result<Value> {
    if value.is_undefined() {
        return Ok(Value::Undefined);
    }
    if value.is_null() {
        return Ok(Value::Null);
    }
    if value.is_boolean() {
        return Ok(Value::Bool(value.is_true()));
    }
    if value.is_number() {
        let n = value
            .number_value(scope)
            .ok_or_else(|| Error::Engine("number without a value".to_string()))?;
        return Ok(Value::Number(n));
    }
    if value.is_string() {
        return Ok(Value::String(value.to_rust_string_lossy(scope)));
    }
    if value.is_date() {
        let date = v8::Local::<v8::Date>::try_from(value)
            .map_err(|e| Error::Conversion(e.to_string()))?;
        let millis = date.value_of();
        if !millis.is_finite() {
            return Err(Error::Conversion("invalid Date".to_string()));
        }
        return DateTime::from_timestamp_millis(millis as i64)
            .map(Value::Date)
            .ok_or_else(|| Error::Conversion(format!("Date {} out of range", millis)));
    }
    if value.is_object() && !value.is_symbol_object() && !value.is_big_int_object() {
        let object = v8::Local::<v8::Object>::try_from(value)
            .map_err(|e| Error::Conversion(e.to_string()))?;
        if let Some(host) = shared.bridge.unwrap(scope, object) {
            return Ok(host);
        }
        return Ok(Value::Object(JsObject::from_local(scope, shared, object)));
    }

    let type_of = value.type_of(scope).to_rust_string_lossy(scope);
    warn!(type_of = %type_of, "no host conversion for JavaScript value");
    Err(Error::Conversion(format!("no host conversion for JavaScript {}", type_of)))
}

/// Run host code, turning a panic into an error so it never unwinds into
/// the engine.
fn guarded<T>(what: &str, f: impl FnOnce() -> anyhow::Result<T>) -> anyhow::Result<T> {
    catch_unwind(AssertUnwindSafe(f)).unwrap_or_else(|payload| {
        let message = panic_message(payload.as_ref());
        warn!(what, message, "host code panicked");
        Err(anyhow!("{} panicked: {}", what, message))
    })
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(message) = payload.downcast_ref::<&'static str>() {
        message
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message
    } else {
        "non-string panic payload"
    }
}

/// The callback record behind an interceptor or function data slot.
fn host_callback<'a>(data: v8::Local<'_, v8::Value>) -> Option<&'a HostCallback> {
    let external = v8::Local::<v8::External>::try_from(data).ok()?;
    // SAFETY: data slots are only ever set by `Bridge::wrap`, to a
    // `HostCallback` that outlives the JS wrapper it was created for.
    Some(unsafe { &*(external.value() as *const HostCallback) })
}

/// Entry point for JS calls to host callables.
fn host_function_callback(
    scope: &mut v8::PinScope<'_, '_>,
    args: v8::FunctionCallbackArguments<'_>,
    mut rv: v8::ReturnValue<'_>,
) {
    let Some(callback) = host_callback(args.data()) else {
        throw_error(scope, "host function called without its data");
        return;
    };
    let HostTarget::Function(function) = &callback.target else {
        throw_error(scope, "host function data does not describe a function");
        return;
    };
    let Some(shared) = callback.shared.upgrade() else {
        throw_error(scope, "context was disposed");
        return;
    };

    let mut host_args = Vec::with_capacity(args.length().max(0) as usize);
    for i in 0..args.length() {
        match from_js(scope, &shared, args.get(i)) {
            Ok(value) => host_args.push(value),
            Err(e) => {
                let error = anyhow::Error::new(e).context(format!("argument {}", i));
                throw_host_error(scope, &shared, error);
                return;
            }
        }
    }

    let result = match guarded("host function", || function.call(&host_args)) {
        Ok(result) => result,
        Err(e) => {
            throw_host_error(scope, &shared, e);
            return;
        }
    };

    match to_js(scope, &shared, &result) {
        Ok(value) => rv.set(value),
        Err(e) => throw_host_error(scope, &shared, e.into()),
    }
}

/// Object instance whose property accesses are routed to a host object.
fn host_object_instance<'s>(
    scope: &mut v8::PinScope<'s, '_>,
    data: v8::Local<'s, v8::External>,
) -> Result<v8::Local<'s, v8::Object>> {
    let template = v8::ObjectTemplate::new(scope);
    template.set_named_property_handler(
        v8::NamedPropertyHandlerConfiguration::new()
            .getter(host_object_get)
            .setter(host_object_set)
            .enumerator(host_object_keys)
            .data(data.into())
            .flags(v8::PropertyHandlerFlags::ONLY_INTERCEPT_STRINGS),
    );
    template.set_indexed_property_handler(
        v8::IndexedPropertyHandlerConfiguration::new()
            .getter(host_object_get_index)
            .setter(host_object_set_index)
            .enumerator(host_object_indices)
            .data(data.into()),
    );
    template
        .new_instance(scope)
        .ok_or_else(|| Error::Engine("failed to instantiate host object".to_string()))
}

fn host_object_target(data: v8::Local<'_, v8::Value>) -> Option<(Rc<Shared>, HostObjectRef)> {
    let callback = host_callback(data)?;
    let HostTarget::Object(object) = &callback.target else {
        return None;
    };
    Some((callback.shared.upgrade()?, object.clone()))
}

/// Finish a host read: `Ok(None)` leaves the lookup to the JS object.
fn intercepted_read(
    scope: &mut v8::PinScope<'_, '_>,
    shared: &Rc<Shared>,
    result: anyhow::Result<Option<Value>>,
    rv: &mut v8::ReturnValue<'_, v8::Value>,
) -> v8::Intercepted {
    match result {
        Ok(Some(value)) => match to_js(scope, shared, &value) {
            Ok(value) => rv.set(value),
            Err(e) => throw_host_error(scope, shared, e.into()),
        },
        Ok(None) => return v8::Intercepted::No,
        Err(e) => throw_host_error(scope, shared, e),
    }
    v8::Intercepted::Yes
}

/// Finish a host write: `Ok(false)` leaves the store to the JS object.
fn intercepted_write(
    scope: &mut v8::PinScope<'_, '_>,
    shared: &Rc<Shared>,
    result: anyhow::Result<bool>,
) -> v8::Intercepted {
    match result {
        Ok(true) => v8::Intercepted::Yes,
        Ok(false) => v8::Intercepted::No,
        Err(e) => {
            throw_host_error(scope, shared, e);
            v8::Intercepted::Yes
        }
    }
}

fn host_object_get(
    scope: &mut v8::PinScope<'_, '_>,
    key: v8::Local<'_, v8::Name>,
    args: v8::PropertyCallbackArguments<'_>,
    mut rv: v8::ReturnValue<'_, v8::Value>,
) -> v8::Intercepted {
    let Some((shared, object)) = host_object_target(args.data()) else {
        return v8::Intercepted::No;
    };
    let name = key.to_rust_string_lossy(scope);
    let result = guarded("host object getter", || object.get(&name));
    intercepted_read(scope, &shared, result, &mut rv)
}

fn host_object_set(
    scope: &mut v8::PinScope<'_, '_>,
    key: v8::Local<'_, v8::Name>,
    value: v8::Local<'_, v8::Value>,
    args: v8::PropertyCallbackArguments<'_>,
    _rv: v8::ReturnValue<'_, ()>,
) -> v8::Intercepted {
    let Some((shared, object)) = host_object_target(args.data()) else {
        return v8::Intercepted::No;
    };
    let name = key.to_rust_string_lossy(scope);
    let value = match from_js(scope, &shared, value) {
        Ok(value) => value,
        Err(e) => {
            throw_host_error(scope, &shared, e.into());
            return v8::Intercepted::Yes;
        }
    };
    let result = guarded("host object setter", || object.set(&name, value));
    intercepted_write(scope, &shared, result)
}

fn host_object_get_index(
    scope: &mut v8::PinScope<'_, '_>,
    index: u32,
    args: v8::PropertyCallbackArguments<'_>,
    mut rv: v8::ReturnValue<'_, v8::Value>,
) -> v8::Intercepted {
    let Some((shared, object)) = host_object_target(args.data()) else {
        return v8::Intercepted::No;
    };
    let result = guarded("host object getter", || object.get_index(index));
    intercepted_read(scope, &shared, result, &mut rv)
}

fn host_object_set_index(
    scope: &mut v8::PinScope<'_, '_>,
    index: u32,
    value: v8::Local<'_, v8::Value>,
    args: v8::PropertyCallbackArguments<'_>,
    _rv: v8::ReturnValue<'_, ()>,
) -> v8::Intercepted {
    let Some((shared, object)) = host_object_target(args.data()) else {
        return v8::Intercepted::No;
    };
    let value = match from_js(scope, &shared, value) {
        Ok(value) => value,
        Err(e) => {
            throw_host_error(scope, &shared, e.into());
            return v8::Intercepted::Yes;
        }
    };
    let result = guarded("host object setter", || object.set_index(index, value));
    intercepted_write(scope, &shared, result)
}

fn host_object_keys(
    scope: &mut v8::PinScope<'_, '_>,
    args: v8::PropertyCallbackArguments<'_>,
    mut rv: v8::ReturnValue<'_, v8::Array>,
) {
    let Some((shared, object)) = host_object_target(args.data()) else {
        return;
    };
    let keys = match guarded("host object keys", || Ok(object.keys())) {
        Ok(keys) => keys,
        Err(e) => {
            throw_host_error(scope, &shared, e);
            return;
        }
    };
    let mut names: Vec<v8::Local<'_, v8::Value>> = Vec::with_capacity(keys.len());
    for key in &keys {
        if let Some(name) = v8::String::new(scope, key) {
            names.push(name.into());
        }
    }
    rv.set(v8::Array::new_with_elements(scope, &names));
}

fn host_object_indices(
    scope: &mut v8::PinScope<'_, '_>,
    args: v8::PropertyCallbackArguments<'_>,
    mut rv: v8::ReturnValue<'_, v8::Array>,
) {
    let Some((shared, object)) = host_object_target(args.data()) else {
        return;
    };
    let indices = match guarded("host object indices", || Ok(object.indices())) {
        Ok(indices) => indices,
        Err(e) => {
            throw_host_error(scope, &shared, e);
            return;
        }
    };
    let numbers: Vec<v8::Local<'_, v8::Value>> = indices
        .iter()
        .map(|&i| v8::Integer::new_from_unsigned(scope, i).into())
        .collect();
    rv.set(v8::Array::new_with_elements(scope, &numbers));
}

/// Throw a JS `Error` carrying `error`'s message, remembering `error` itself
/// so it comes back as the cause if the exception reaches the host.
fn throw_host_error(scope: &mut v8::PinScope<'_, '_>, shared: &Rc<Shared>, error: anyhow::Error) {
    let message = format!("{:#}", error);
    let msg = v8::String::new(scope, &message).unwrap_or_else(|| v8::String::empty(scope));
    let exception = v8::Exception::error(scope, msg);
    if let Ok(object) = v8::Local::<v8::Object>::try_from(exception) {
        shared.bridge.attach_host_error(scope, object, error);
    }
    scope.throw_exception(exception);
}

fn throw_error(scope: &mut v8::PinScope<'_, '_>, message: &str) {
    let msg = v8::String::new(scope, message).unwrap_or_else(|| v8::String::empty(scope));
    let error = v8::Exception::error(scope, msg);
    scope.throw_exception(error);
}
