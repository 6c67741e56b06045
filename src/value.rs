//! Host-side value model
//!
//! [`Value`] is what crosses the bridge in either direction. Plain data
//! (numbers, strings, arrays, maps, dates) is copied into fresh engine values;
//! JavaScript objects come back wrapped as [`JsObject`] rather than copied,
//! host callables travel as [`HostFunction`] and host objects as
//! [`HostObjectRef`].

#![warn(clippy::all, rust_2018_idioms)]

use std::any::Any;
use std::collections::BTreeMap;
use std::fmt;
use std::rc::Rc;

use chrono::{DateTime, Utc};
use tracing::debug;

use crate::object::JsObject;

type HostFn = dyn Fn(&[Value]) -> anyhow::Result<Value>;

/// A host callable that JavaScript can invoke.
///
/// Arguments arrive converted to [`Value`]s; an `Err` is thrown inside
/// JavaScript as an `Error` carrying the error's message. Cloning is cheap
/// and clones compare equal under [`HostFunction::ptr_eq`].
#[derive(Clone)]
pub struct HostFunction(Rc<HostFn>);

impl HostFunction {
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(&[Value]) -> anyhow::Result<Value> + 'static,
    {
        Self(Rc::new(f))
    }

    pub fn call(&self, args: &[Value]) -> anyhow::Result<Value> {
        (self.0)(args)
    }

    /// `true` if both handles refer to the same callable.
    pub fn ptr_eq(&self, other: &HostFunction) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    pub(crate) fn addr(&self) -> usize {
        Rc::as_ptr(&self.0) as *const () as usize
    }
}

impl fmt::Debug for HostFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "HostFunction({:p})", Rc::as_ptr(&self.0))
    }
}

/// A host object exposed to JavaScript through property interceptors.
///
/// Named and indexed property reads and writes on the JS side are routed
/// here. Returning `Ok(None)` from a getter (or `Ok(false)` from a setter)
/// leaves the access to the JS object itself, so prototype methods such as
/// `toString` keep working. An `Err` is thrown inside JavaScript.
pub trait HostObject {
    fn get(&self, name: &str) -> anyhow::Result<Option<Value>>;

    fn set(&self, _name: &str, _value: Value) -> anyhow::Result<bool> {
        Ok(false)
    }

    /// Names reported to `Object.keys`, `for...in` and friends.
    fn keys(&self) -> Vec<String> {
        Vec::new()
    }

    fn get_index(&self, _index: u32) -> anyhow::Result<Option<Value>> {
        Ok(None)
    }

    fn set_index(&self, _index: u32, _value: Value) -> anyhow::Result<bool> {
        Ok(false)
    }

    fn indices(&self) -> Vec<u32> {
        Vec::new()
    }
}

/// Shared handle to a [`HostObject`].
///
/// A host object keeps one identity per context: passing the same handle to
/// JavaScript twice yields the same JS object, and that object converts back
/// to a handle for which [`HostObjectRef::ptr_eq`] holds.
#[derive(Clone)]
pub struct HostObjectRef {
    object: Rc<dyn HostObject>,
    any: Rc<dyn Any>,
}

impl HostObjectRef {
    pub fn new<T: HostObject + 'static>(object: T) -> Self {
        let object = Rc::new(object);
        Self {
            object: Rc::clone(&object) as Rc<dyn HostObject>,
            any: object,
        }
    }

    /// The concrete host object, if it is a `T`.
    pub fn downcast_ref<T: HostObject + 'static>(&self) -> Option<&T> {
        self.any.downcast_ref::<T>()
    }

    pub fn ptr_eq(&self, other: &HostObjectRef) -> bool {
        self.addr() == other.addr()
    }

    pub(crate) fn addr(&self) -> usize {
        Rc::as_ptr(&self.any) as *const () as usize
    }
}

impl std::ops::Deref for HostObjectRef {
    type Target = dyn HostObject;

    fn deref(&self) -> &Self::Target {
        &*self.object
    }
}

impl fmt::Debug for HostObjectRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "HostObjectRef({:#x})", self.addr())
    }
}

#[derive(Debug, Clone, Default)]
pub enum Value {
    #[default]
    Undefined,
    Null,
    Bool(bool),
    Number(f64),
    String(String),
    Date(DateTime<Utc>),
    Array(Vec<Value>),
    Map(BTreeMap<String, Value>),
    Function(HostFunction),
    HostObject(HostObjectRef),
    Object(JsObject),
}

impl Value {
    /// Short name of the value's kind, used in diagnostics and error messages.
    pub fn kind(&self) -> &'static str {
        match self {
            Value::Undefined => "undefined",
            Value::Null => "null",
            Value::Bool(_) => "boolean",
            Value::Number(_) => "number",
            Value::String(_) => "string",
            Value::Date(_) => "date",
            Value::Array(_) => "array",
            Value::Map(_) => "map",
            Value::Function(_) => "host function",
            Value::HostObject(_) => "host object",
            Value::Object(object) => object.kind().as_str(),
        }
    }

    pub fn is_undefined(&self) -> bool {
        matches!(self, Value::Undefined)
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_date(&self) -> Option<&DateTime<Utc>> {
        match self {
            Value::Date(d) => Some(d),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&JsObject> {
        match self {
            Value::Object(o) => Some(o),
            _ => None,
        }
    }

    pub fn into_object(self) -> Option<JsObject> {
        match self {
            Value::Object(o) => Some(o),
            _ => None,
        }
    }

    pub fn as_function(&self) -> Option<&HostFunction> {
        match self {
            Value::Function(f) => Some(f),
            _ => None,
        }
    }

    pub fn as_host_object(&self) -> Option<&HostObjectRef> {
        match self {
            Value::HostObject(o) => Some(o),
            _ => None,
        }
    }
}

/// Name the kind of a host value.
///
/// Diagnostic entry point: the kind is also logged at debug level.
pub fn what_is_this(value: &Value) -> &'static str {
    let kind = value.kind();
    debug!(kind, "what_is_this");
    kind
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Value::Number(n as f64)
    }
}

impl From<u32> for Value {
    fn from(n: u32) -> Self {
        Value::Number(n as f64)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<DateTime<Utc>> for Value {
    fn from(d: DateTime<Utc>) -> Self {
        Value::Date(d)
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Value::Array(items)
    }
}

impl From<BTreeMap<String, Value>> for Value {
    fn from(entries: BTreeMap<String, Value>) -> Self {
        Value::Map(entries)
    }
}

impl From<HostFunction> for Value {
    fn from(f: HostFunction) -> Self {
        Value::Function(f)
    }
}

impl From<HostObjectRef> for Value {
    fn from(o: HostObjectRef) -> Self {
        Value::HostObject(o)
    }
}

impl From<JsObject> for Value {
    fn from(o: JsObject) -> Self {
        Value::Object(o)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        value.map_or(Value::Null, Into::into)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kinds() {
        assert_eq!(Value::Undefined.kind(), "undefined");
        assert_eq!(Value::Null.kind(), "null");
        assert_eq!(Value::from(true).kind(), "boolean");
        assert_eq!(Value::from(1.5).kind(), "number");
        assert_eq!(Value::from("x").kind(), "string");
        assert_eq!(Value::from(Utc::now()).kind(), "date");
        assert_eq!(Value::from(vec![Value::Null]).kind(), "array");
        assert_eq!(Value::Map(BTreeMap::new()).kind(), "map");
        assert_eq!(
            Value::from(HostFunction::new(|_| Ok(Value::Undefined))).kind(),
            "host function"
        );
    }

    #[test]
    fn test_what_is_this_reports_kind() {
        assert_eq!(what_is_this(&Value::from(42)), "number");
        assert_eq!(what_is_this(&Value::Undefined), "undefined");
    }

    #[test]
    fn test_option_converts_to_null() {
        assert!(Value::from(None::<i32>).is_null());
        assert_eq!(Value::from(Some("a")).as_str(), Some("a"));
    }

    #[test]
    fn test_accessors() {
        assert_eq!(Value::from(2).as_f64(), Some(2.0));
        assert_eq!(Value::from(false).as_bool(), Some(false));
        assert_eq!(Value::from("s").as_f64(), None);
        assert!(Value::default().is_undefined());
        assert!(Value::Null.as_object().is_none());
    }

    #[test]
    fn test_host_function_call_and_identity() {
        let double = HostFunction::new(|args| {
            let n = args.first().and_then(Value::as_f64).unwrap_or(0.0);
            Ok(Value::Number(n * 2.0))
        });
        let same = double.clone();
        let other = HostFunction::new(|_| Ok(Value::Null));

        assert_eq!(double.call(&[Value::from(21)]).unwrap().as_f64(), Some(42.0));
        assert!(double.ptr_eq(&same));
        assert!(!double.ptr_eq(&other));
    }

    struct Counter(u32);

    impl HostObject for Counter {
        fn get(&self, name: &str) -> anyhow::Result<Option<Value>> {
            Ok((name == "count").then(|| Value::from(self.0)))
        }
    }

    #[test]
    fn test_host_object_ref_identity_and_downcast() {
        let counter = HostObjectRef::new(Counter(3));
        let same = counter.clone();
        let other = HostObjectRef::new(Counter(3));

        assert!(counter.ptr_eq(&same));
        assert!(!counter.ptr_eq(&other));
        assert_eq!(counter.downcast_ref::<Counter>().map(|c| c.0), Some(3));
        assert_eq!(counter.get("count").unwrap().and_then(|v| v.as_f64()), Some(3.0));
        assert!(counter.get("missing").unwrap().is_none());
        assert!(!counter.set("count", Value::from(1)).unwrap());
        assert_eq!(Value::from(counter).kind(), "host object");
    }
}
