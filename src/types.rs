//! Typed conversion through JSON
//!
//! Bridges serde types and engine values by going through JSON text, which
//! keeps typed injection ([`Context::set_serialized`]) and extraction
//! ([`Context::eval_as`]) independent of the [`Value`](crate::Value) model.
//!
//! [`Context::set_serialized`]: crate::Context::set_serialized
//! [`Context::eval_as`]: crate::Context::eval_as

#![warn(clippy::all, rust_2018_idioms)]

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::{Error, Result};

/// Serialize `value` to JSON, then parse that JSON in the engine.
pub(crate) fn to_v8_value<'s, T: Serialize + ?Sized>(
    scope: &mut v8::PinScope<'s, '_>,
    value: &T,
) -> Result<v8::Local<'s, v8::Value>> {
    let json_str = serde_json::to_string(value)?;

    let v8_str = v8::String::new(scope, &json_str)
        .ok_or_else(|| Error::Conversion(format!("JSON text too long ({} bytes)", json_str.len())))?;

    v8::json::parse(scope, v8_str)
        .ok_or_else(|| Error::Conversion("engine rejected serialized JSON".to_string()))
}

/// Stringify an engine value to JSON, then deserialize it.
///
/// `undefined` deserializes like JSON `null`; other values without a JSON
/// form (functions, symbols) fail.
pub(crate) fn from_v8_value<T: DeserializeOwned>(
    scope: &mut v8::PinScope<'_, '_>,
    value: v8::Local<'_, v8::Value>,
) -> Result<T> {
    if value.is_undefined() {
        return Ok(serde_json::from_value(serde_json::Value::Null)?);
    }

    let json_str = v8::json::stringify(scope, value)
        .ok_or_else(|| Error::Conversion("value cannot be stringified as JSON".to_string()))?;
    let json_rust_str = json_str.to_rust_string_lossy(scope);

    Ok(serde_json::from_str(&json_rust_str)?)
}
