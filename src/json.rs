//! JSON-array front-end.
//!
//! Programs are plain JSON arrays: `["+", 1, ["*", 2, 3]]`. Strings are
//! symbols, numbers are numbers and arrays are lists. `"nil"` and `"t"` (as
//! well as `true`, `false` and `null`) read as the markers. Single quotes are
//! accepted in place of double quotes so programs can be embedded in host
//! strings without escaping: `['car', ['quote', [1, 2]]]`.

use crate::MAX_PARSE_DEPTH;
use crate::ast::{Value, is_valid_symbol, sym};
use crate::error::Error;
use crate::{NIL_SYMBOL, TRUE_SYMBOL};

/// Parse a JSON-array program into an expression tree
pub fn parse_json(input: &str) -> Result<Value, Error> {
    let normalized = input.replace('\'', "\"");
    let json: serde_json::Value = serde_json::from_str(&normalized)
        .map_err(|e| Error::parse(format!("Invalid JSON: {e}")))?;

    json_to_value(json, 0)
}

fn json_to_value(json: serde_json::Value, depth: usize) -> Result<Value, Error> {
    if depth >= MAX_PARSE_DEPTH {
        return Err(Error::parse(format!(
            "JSON expression too deeply nested (max depth: {MAX_PARSE_DEPTH})"
        )));
    }

    match json {
        serde_json::Value::Null | serde_json::Value::Bool(false) => Ok(Value::Nil),
        serde_json::Value::Bool(true) => Ok(Value::True),
        serde_json::Value::Number(n) => n
            .as_f64()
            .map(Value::Number)
            .ok_or_else(|| Error::parse(format!("Unrepresentable number: {n}"))),
        serde_json::Value::String(s) => match s.as_str() {
            NIL_SYMBOL => Ok(Value::Nil),
            TRUE_SYMBOL => Ok(Value::True),
            name if is_valid_symbol(name) => Ok(sym(name)),
            _ => Err(Error::parse(format!("Invalid symbol: \"{s}\""))),
        },
        serde_json::Value::Array(elements) => elements
            .into_iter()
            .map(|element| json_to_value(element, depth + 1))
            .collect::<Result<Vec<_>, _>>()
            .map(Value::List),
        serde_json::Value::Object(_) => Err(Error::parse(
            "JSON objects are not supported, write operations as arrays",
        )),
    }
}

/// Deparse an expression tree back to JSON-array text.
///
/// Integral numbers are written without a fractional part. Callables have no
/// textual form and are rejected.
pub fn to_json(value: &Value) -> Result<String, Error> {
    let json = value_to_json(value)?;
    serde_json::to_string(&json).map_err(|e| Error::internal(format!("JSON serialization failed: {e}")))
}

fn value_to_json(value: &Value) -> Result<serde_json::Value, Error> {
    match value {
        Value::Number(n) => {
            if n.fract() == 0.0 && n.abs() < i64::MAX as f64 {
                Ok(serde_json::Value::from(*n as i64))
            } else {
                serde_json::Number::from_f64(*n)
                    .map(serde_json::Value::Number)
                    .ok_or_else(|| Error::type_error(format!("{n} has no JSON representation")))
            }
        }
        Value::Symbol(s) => Ok(serde_json::Value::String(s.clone())),
        Value::Nil => Ok(serde_json::Value::String(NIL_SYMBOL.into())),
        Value::True => Ok(serde_json::Value::String(TRUE_SYMBOL.into())),
        Value::List(elements) => elements
            .iter()
            .map(value_to_json)
            .collect::<Result<Vec<_>, _>>()
            .map(serde_json::Value::Array),
        Value::Callable(callable) => Err(Error::type_error(format!(
            "{callable} has no JSON representation"
        ))),
    }
}
