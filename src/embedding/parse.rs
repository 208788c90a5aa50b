//! Recovery of embedding vectors from untrusted generative-model output.
//!
//! A chat model asked to "respond with only a JSON array" frequently wraps
//! the array in prose or code fences, truncates it, or pads it with extra
//! values. [`parse_embedding`] accepts only output that contains an array
//! of exactly `dims` finite numbers in `[-1, 1]`:
//!
//! 1. Parse the trimmed output directly as JSON.
//! 2. Failing that, extract the first bracketed `[...]` substring and parse
//!    it.
//! 3. Anything else is an [`EmbeddingError::Format`] carrying the raw text.

use std::sync::OnceLock;

use regex::Regex;
use serde_json::Value;

use crate::error::EmbeddingError;

fn bracketed_array() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\[[^\[\]]*\]").expect("static regex"))
}

/// Parse and validate a `dims`-dimensional vector from raw model output.
pub fn parse_embedding(raw: &str, dims: usize) -> Result<Vec<f32>, EmbeddingError> {
    let trimmed = raw.trim();

    let direct_reason = match serde_json::from_str::<Value>(trimmed) {
        Ok(value) => match validate_embedding(&value, dims) {
            Ok(vec) => return Ok(vec),
            Err(reason) => reason,
        },
        Err(e) => format!("not valid JSON: {}", e),
    };

    let Some(found) = bracketed_array().find(trimmed) else {
        return Err(format_error(dims, direct_reason, raw));
    };

    let extracted = found.as_str();
    match serde_json::from_str::<Value>(extracted) {
        Ok(value) => validate_embedding(&value, dims).map_err(|reason| format_error(dims, reason, raw)),
        Err(e) => Err(format_error(
            dims,
            format!("extracted array is not valid JSON: {}", e),
            raw,
        )),
    }
}

/// Check shape and range of a parsed vector.
///
/// Returns the vector as `f32`, or a human-readable reason it was rejected.
pub fn validate_embedding(value: &Value, dims: usize) -> Result<Vec<f32>, String> {
    let items = value
        .as_array()
        .ok_or_else(|| format!("expected a JSON array, got {}", json_kind(value)))?;

    if items.len() != dims {
        return Err(format!("expected {} values, got {}", dims, items.len()));
    }

    items
        .iter()
        .enumerate()
        .map(|(i, item)| {
            let n = item
                .as_f64()
                .ok_or_else(|| format!("element {} is not a number", i))?;
            check_component(i, n)
        })
        .collect()
}

/// Validate an already-numeric vector (from a genuine embedding API).
pub fn validate_vector(vector: &[f32], dims: usize) -> Result<(), String> {
    if vector.len() != dims {
        return Err(format!("expected {} values, got {}", dims, vector.len()));
    }
    for (i, v) in vector.iter().enumerate() {
        check_component(i, *v as f64)?;
    }
    Ok(())
}

fn check_component(i: usize, n: f64) -> Result<f32, String> {
    if !n.is_finite() {
        return Err(format!("element {} is not finite", i));
    }
    if !(-1.0..=1.0).contains(&n) {
        return Err(format!("element {} = {} is outside [-1, 1]", i, n));
    }
    Ok(n as f32)
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

fn format_error(dims: usize, reason: String, raw: &str) -> EmbeddingError {
    EmbeddingError::Format {
        dims,
        reason,
        raw: raw.to_string(),
    }
}
