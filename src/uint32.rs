//! Conversion between host numbers and `u32`.
//!
//! Several engine APIs (indexed property access, array lengths) take or
//! return a `uint32_t`. `Uint32` is the checked bridge between those and
//! [`Value`]:
//!
//! ```
//! use v8glue::{Uint32, Value};
//!
//! assert_eq!(Uint32::try_from(&Value::Number(5.0)).unwrap().get(), 5);
//! assert_eq!(Uint32::try_from(&Value::Null).unwrap().get(), 0);
//! assert!(matches!(Value::from(Uint32::from(7)), Value::Number(n) if n == 7.0));
//! ```

#![warn(clippy::all, rust_2018_idioms)]

use crate::error::{Error, Result};
use crate::value::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Uint32(u32);

impl Uint32 {
    pub fn get(self) -> u32 {
        self.0
    }

    /// Checked narrowing of a host number.
    ///
    /// The fractional part is truncated toward zero; NaN, infinities and
    /// anything outside `0..=u32::MAX` is rejected.
    pub fn from_f64(n: f64) -> Result<Self> {
        if !n.is_finite() {
            return Err(Error::Conversion(format!("{} is not a finite number", n)));
        }
        let truncated = n.trunc();
        if truncated < 0.0 || truncated > u32::MAX as f64 {
            return Err(Error::Conversion(format!("{} is out of range for u32", n)));
        }
        Ok(Self(truncated as u32))
    }

    /// The value as an array index, if it is exactly one.
    pub(crate) fn index_of(value: &Value) -> Option<u32> {
        match value {
            Value::Number(n) if n.fract() == 0.0 && *n >= 0.0 && *n <= u32::MAX as f64 => {
                Some(*n as u32)
            }
            _ => None,
        }
    }
}

impl TryFrom<&Value> for Uint32 {
    type Error = Error;

    fn try_from(value: &Value) -> Result<Self> {
        match value {
            Value::Undefined | Value::Null | Value::Bool(false) => Ok(Self(0)),
            Value::Number(n) => Self::from_f64(*n),
            other => Err(Error::Conversion(format!(
                "cannot convert {} to u32",
                other.kind()
            ))),
        }
    }
}

impl From<u32> for Uint32 {
    fn from(n: u32) -> Self {
        Self(n)
    }
}

impl From<Uint32> for u32 {
    fn from(n: Uint32) -> Self {
        n.0
    }
}

impl From<Uint32> for Value {
    fn from(n: Uint32) -> Self {
        Value::Number(n.0 as f64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn convert(value: Value) -> Result<u32> {
        Uint32::try_from(&value).map(Uint32::get)
    }

    #[test]
    fn test_false_like_values_are_zero() {
        assert_eq!(convert(Value::Undefined).unwrap(), 0);
        assert_eq!(convert(Value::Null).unwrap(), 0);
        assert_eq!(convert(Value::Bool(false)).unwrap(), 0);
    }

    #[test]
    fn test_round_trip_boundaries() {
        for n in [0u32, 1, 42, 65_535, 2_147_483_648, u32::MAX] {
            let value = Value::from(Uint32::from(n));
            assert_eq!(convert(value).unwrap(), n);
        }
    }

    #[test]
    fn test_fraction_is_truncated() {
        assert_eq!(convert(Value::Number(5.9)).unwrap(), 5);
        assert_eq!(convert(Value::Number(0.4)).unwrap(), 0);
    }

    #[test]
    fn test_out_of_range_is_rejected() {
        assert!(matches!(convert(Value::Number(-1.0)), Err(Error::Conversion(_))));
        assert!(matches!(
            convert(Value::Number(u32::MAX as f64 + 1.0)),
            Err(Error::Conversion(_))
        ));
        assert!(matches!(convert(Value::Number(f64::NAN)), Err(Error::Conversion(_))));
        assert!(matches!(
            convert(Value::Number(f64::INFINITY)),
            Err(Error::Conversion(_))
        ));
    }

    #[test]
    fn test_non_numbers_are_rejected() {
        assert!(matches!(convert(Value::Bool(true)), Err(Error::Conversion(_))));
        assert!(matches!(convert(Value::from("5")), Err(Error::Conversion(_))));
        assert!(matches!(convert(Value::Array(vec![])), Err(Error::Conversion(_))));
    }

    #[test]
    fn test_index_of_requires_exact_integers() {
        assert_eq!(Uint32::index_of(&Value::Number(3.0)), Some(3));
        assert_eq!(Uint32::index_of(&Value::Number(3.5)), None);
        assert_eq!(Uint32::index_of(&Value::Number(-1.0)), None);
        assert_eq!(Uint32::index_of(&Value::from("3")), None);
    }
}
