#![allow(clippy::result_large_err)]

//! Typed accessors over component `params` objects. A missing key is `None`;
//! a key with the wrong type is a config error naming the key.

use crate::core::error::AppError;
use crate::core::types::ErrorCategory;
use regex::Regex;
use serde_json::{Map, Value};

fn wrong_type(key: &str, expected: &str) -> AppError {
    AppError::new(
        ErrorCategory::ConfigError,
        format!("param '{}' must be {}", key, expected),
    )
    .with_code("AS-LOAD-004")
}

fn lookup<'a>(params: &'a Value, key: &str) -> Option<&'a Value> {
    params.as_object().and_then(|map| map.get(key)).filter(|v| !v.is_null())
}

pub fn string_param(params: &Value, key: &str) -> Result<Option<String>, AppError> {
    match lookup(params, key) {
        None => Ok(None),
        Some(Value::String(s)) => Ok(Some(s.clone())),
        Some(_) => Err(wrong_type(key, "a string")),
    }
}

pub fn bool_param(params: &Value, key: &str) -> Result<Option<bool>, AppError> {
    match lookup(params, key) {
        None => Ok(None),
        Some(Value::Bool(b)) => Ok(Some(*b)),
        Some(_) => Err(wrong_type(key, "a boolean")),
    }
}

pub fn usize_param(params: &Value, key: &str) -> Result<Option<usize>, AppError> {
    match lookup(params, key) {
        None => Ok(None),
        Some(value) => value
            .as_u64()
            .and_then(|n| usize::try_from(n).ok())
            .map(Some)
            .ok_or_else(|| wrong_type(key, "a non-negative integer")),
    }
}

pub fn string_list_param(params: &Value, key: &str) -> Result<Option<Vec<String>>, AppError> {
    match lookup(params, key) {
        None => Ok(None),
        Some(Value::String(s)) => Ok(Some(vec![s.clone()])),
        Some(Value::Array(values)) => values
            .iter()
            .map(|v| {
                v.as_str()
                    .map(str::to_string)
                    .ok_or_else(|| wrong_type(key, "a list of strings"))
            })
            .collect::<Result<Vec<_>, _>>()
            .map(Some),
        Some(_) => Err(wrong_type(key, "a list of strings")),
    }
}

pub fn object_param<'a>(
    params: &'a Value,
    key: &str,
) -> Result<Option<&'a Map<String, Value>>, AppError> {
    match lookup(params, key) {
        None => Ok(None),
        Some(Value::Object(map)) => Ok(Some(map)),
        Some(_) => Err(wrong_type(key, "an object")),
    }
}

/// Compile a regex param, naming the pattern when it does not parse.
pub fn compile_regex(raw: &str) -> Result<Regex, AppError> {
    Regex::new(raw).map_err(|err| {
        AppError::new(
            ErrorCategory::ConfigError,
            format!("invalid regex '{}': {}", raw, err),
        )
        .with_code("AS-LOAD-004")
    })
}

pub fn required<T>(value: Option<T>, key: &str) -> Result<T, AppError> {
    value.ok_or_else(|| {
        AppError::new(
            ErrorCategory::ConfigError,
            format!("param '{}' is required", key),
        )
        .with_code("AS-LOAD-004")
    })
}
