//! Wrappers for JavaScript objects
//!
//! A [`JsObject`] holds a persistent handle to an engine object (plain
//! object, array or function). The engine object stays reachable for as long
//! as any clone of the wrapper exists, and the wrapper keeps its context alive
//! in turn.

#![warn(clippy::all, rust_2018_idioms)]

use std::fmt;
use std::pin::pin;
use std::rc::Rc;

use tracing::trace;

use crate::bridge::{from_js, to_js};
use crate::context::{property_name, Context, Shared};
use crate::error::{caught, Error, Phase, Result};
use crate::uint32::Uint32;
use crate::value::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObjectKind {
    Object,
    Array,
    Function,
}

impl ObjectKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ObjectKind::Object => "object",
            ObjectKind::Array => "array object",
            ObjectKind::Function => "function object",
        }
    }
}

/// A JavaScript object owned by host code.
///
/// Field order matters: the handle is released before the context reference.
#[derive(Clone)]
pub struct JsObject {
    handle: v8::Global<v8::Object>,
    kind: ObjectKind,
    shared: Rc<Shared>,
}

impl JsObject {
    pub(crate) fn from_local(
        scope: &mut v8::PinScope<'_, '_>,
        shared: &Rc<Shared>,
        object: v8::Local<'_, v8::Object>,
    ) -> Self {
        let kind = if object.is_function() {
            ObjectKind::Function
        } else if object.is_array() {
            ObjectKind::Array
        } else {
            ObjectKind::Object
        };
        Self {
            handle: v8::Global::new(scope, object),
            kind,
            shared: Rc::clone(shared),
        }
    }

    pub(crate) fn local<'s>(&self, scope: &mut v8::PinScope<'s, '_>) -> v8::Local<'s, v8::Object> {
        v8::Local::new(scope, &self.handle)
    }

    pub(crate) fn belongs_to(&self, shared: &Rc<Shared>) -> bool {
        self.shared.same(shared)
    }

    pub fn kind(&self) -> ObjectKind {
        self.kind
    }

    pub fn is_function(&self) -> bool {
        self.kind == ObjectKind::Function
    }

    pub fn is_array(&self) -> bool {
        self.kind == ObjectKind::Array
    }

    /// The context this object lives in.
    pub fn context(&self) -> Context {
        Context::from_shared(Rc::clone(&self.shared))
    }

    /// Read a property (host `[]`).
    ///
    /// Numeric keys that are exact `u32` values use indexed access; any
    /// other key is converted and used as a property key. Missing
    /// properties read as [`Value::Undefined`].
    pub fn get(&self, key: impl Into<Value>) -> Result<Value> {
        let key = key.into();
        let shared = &self.shared;
        shared.enter(|scope| {
            let tc = pin!(v8::TryCatch::new(scope));
            let tc = &mut tc.init();

            let object = self.local(tc);
            let value = match Uint32::index_of(&key) {
                Some(index) => object.get_index(tc, index),
                None => {
                    let key = to_js(tc, shared, &key)?;
                    object.get(tc, key)
                }
            };
            match value {
                Some(value) => from_js(tc, shared, value),
                None => Err(caught!(tc, shared, Phase::Run)),
            }
        })
    }

    /// Write a property (host `[]=`).
    pub fn set(&self, key: impl Into<Value>, value: impl Into<Value>) -> Result<()> {
        let key = key.into();
        let value = value.into();
        let shared = &self.shared;
        shared.enter(|scope| {
            let tc = pin!(v8::TryCatch::new(scope));
            let tc = &mut tc.init();

            let object = self.local(tc);
            let value = to_js(tc, shared, &value)?;
            let done = match Uint32::index_of(&key) {
                Some(index) => object.set_index(tc, index, value),
                None => {
                    let key = to_js(tc, shared, &key)?;
                    object.set(tc, key, value)
                }
            };
            match done {
                Some(_) => Ok(()),
                None => Err(caught!(tc, shared, Phase::Run)),
            }
        })
    }

    /// Invoke the method `name` with this object as the receiver.
    pub fn call_method(&self, name: &str, args: &[Value]) -> Result<Value> {
        trace!(name, argc = args.len(), "call method");
        let shared = &self.shared;
        shared.enter(|scope| {
            let tc = pin!(v8::TryCatch::new(scope));
            let tc = &mut tc.init();

            let object = self.local(tc);
            let key = property_name(tc, name)?;
            let property = match object.get(tc, key.into()) {
                Some(property) => property,
                None => return Err(caught!(tc, shared, Phase::Run)),
            };
            let function = v8::Local::<v8::Function>::try_from(property)
                .map_err(|_| Error::NotAFunction(name.to_string()))?;

            let mut js_args = Vec::with_capacity(args.len());
            for arg in args {
                js_args.push(to_js(tc, shared, arg)?);
            }

            match function.call(tc, object.into(), &js_args) {
                Some(result) => from_js(tc, shared, result),
                None => Err(caught!(tc, shared, Phase::Run)),
            }
        })
    }

    /// Invoke this object as a function with an `undefined` receiver.
    pub fn call(&self, args: &[Value]) -> Result<Value> {
        if !self.is_function() {
            return Err(Error::NotAFunction(self.kind.as_str().to_string()));
        }
        let shared = &self.shared;
        shared.enter(|scope| {
            let tc = pin!(v8::TryCatch::new(scope));
            let tc = &mut tc.init();

            let object: v8::Local<'_, v8::Value> = self.local(tc).into();
            let function = v8::Local::<v8::Function>::try_from(object)
                .map_err(|_| Error::NotAFunction("object".to_string()))?;

            let mut js_args = Vec::with_capacity(args.len());
            for arg in args {
                js_args.push(to_js(tc, shared, arg)?);
            }

            let receiver: v8::Local<'_, v8::Value> = v8::undefined(tc).into();
            match function.call(tc, receiver, &js_args) {
                Some(result) => from_js(tc, shared, result),
                None => Err(caught!(tc, shared, Phase::Run)),
            }
        })
    }

    /// Own enumerable property names, indices included, in engine order.
    pub fn keys(&self) -> Result<Vec<String>> {
        let shared = &self.shared;
        shared.enter(|scope| {
            let tc = pin!(v8::TryCatch::new(scope));
            let tc = &mut tc.init();

            let object = self.local(tc);
            let names = match object.get_own_property_names(tc, Default::default()) {
                Some(names) => names,
                None => return Err(caught!(tc, shared, Phase::Run)),
            };

            let mut keys = Vec::with_capacity(names.length() as usize);
            for i in 0..names.length() {
                if let Some(name) = names.get_index(tc, i) {
                    keys.push(name.to_rust_string_lossy(tc));
                }
            }
            Ok(keys)
        })
    }

    /// The `length` property as a `u32`; objects without one report 0.
    pub fn len(&self) -> Result<u32> {
        let length = self.get("length")?;
        Uint32::try_from(&length).map(Uint32::get)
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    /// Copy the elements `0..len()` out of an array-like object.
    pub fn to_vec(&self) -> Result<Vec<Value>> {
        let shared = &self.shared;
        shared.enter(|scope| {
            let tc = pin!(v8::TryCatch::new(scope));
            let tc = &mut tc.init();

            let object = self.local(tc);
            let key = property_name(tc, "length")?;
            let length = match object.get(tc, key.into()) {
                Some(length) => from_js(tc, shared, length)?,
                None => return Err(caught!(tc, shared, Phase::Run)),
            };
            let len = Uint32::try_from(&length)?.get();

            let mut items = Vec::with_capacity(len.min(4096) as usize);
            for i in 0..len {
                match object.get_index(tc, i) {
                    Some(item) => items.push(from_js(tc, shared, item)?),
                    None => return Err(caught!(tc, shared, Phase::Run)),
                }
            }
            Ok(items)
        })
    }
}

impl fmt::Debug for JsObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JsObject")
            .field("kind", &self.kind)
            .finish_non_exhaustive()
    }
}
