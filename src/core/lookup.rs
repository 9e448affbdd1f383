//! Decoding snapshot values into caller types.

use crate::core::snapshot::kind_name;
use crate::error::{ConfigError, Result};
use serde::de::DeserializeOwned;
use serde_yaml::Value;

/// Types that can be read out of a single configuration value without
/// going through serde.
///
/// Conversions are strict: an integer is not a float, a number is not a
/// string, and a sequence must contain only strings to become `Vec<String>`.
pub trait FromConfigValue: Sized {
    /// Description used in type-mismatch errors.
    const EXPECTED: &'static str;

    /// Convert `value`, or `None` if it has a different shape.
    fn from_config_value(value: &Value) -> Option<Self>;
}

impl FromConfigValue for String {
    const EXPECTED: &'static str = "a string";

    fn from_config_value(value: &Value) -> Option<Self> {
        value.as_str().map(str::to_string)
    }
}

impl FromConfigValue for i64 {
    const EXPECTED: &'static str = "an int";

    fn from_config_value(value: &Value) -> Option<Self> {
        match value {
            Value::Number(n) if !n.is_f64() => n.as_i64(),
            _ => None,
        }
    }
}

impl FromConfigValue for f64 {
    const EXPECTED: &'static str = "a float";

    fn from_config_value(value: &Value) -> Option<Self> {
        match value {
            Value::Number(n) if n.is_f64() => n.as_f64(),
            _ => None,
        }
    }
}

impl FromConfigValue for bool {
    const EXPECTED: &'static str = "a boolean";

    fn from_config_value(value: &Value) -> Option<Self> {
        value.as_bool()
    }
}

impl FromConfigValue for Vec<String> {
    const EXPECTED: &'static str = "an array of strings";

    fn from_config_value(value: &Value) -> Option<Self> {
        value
            .as_sequence()?
            .iter()
            .map(|item| item.as_str().map(str::to_string))
            .collect()
    }
}

/// Convert a looked-up value with [`FromConfigValue`].
pub(crate) fn convert<T: FromConfigValue>(name: &str, value: Option<Value>) -> Result<T> {
    let value = value.ok_or_else(|| ConfigError::NotFound(name.to_string()))?;
    T::from_config_value(&value).ok_or_else(|| ConfigError::TypeMismatch {
        name: name.to_string(),
        expected: T::EXPECTED,
    })
}

/// Decode a looked-up value into any deserializable type.
pub(crate) fn decode<T: DeserializeOwned>(name: &str, value: Option<Value>) -> Result<T> {
    let value = value.ok_or_else(|| ConfigError::NotFound(name.to_string()))?;
    let found = kind_name(&value);
    serde_yaml::from_value(value).map_err(|e| ConfigError::DecodeError {
        name: name.to_string(),
        reason: format!("{} (found {})", e, found),
    })
}
