//! Conversions between structured data and V8 values.
//!
//! JSON-like values go through serde_v8; raw text goes straight to V8
//! strings. Nothing here holds handles past the caller's scope.

use deno_core::serde_v8;
use deno_core::v8;

use crate::error::EngineError;

/// Create a V8 string from UTF-8 bytes.
pub fn bytes_to_v8<'s>(
    scope: &mut v8::HandleScope<'s>,
    bytes: &[u8],
) -> Result<v8::Local<'s, v8::String>, EngineError> {
    v8::String::new_from_utf8(scope, bytes, v8::NewStringType::Normal).ok_or_else(|| {
        EngineError::Conversion(format!(
            "cannot allocate V8 string of {} bytes",
            bytes.len()
        ))
    })
}

/// Create a V8 string from a Rust string.
pub fn str_to_v8<'s>(
    scope: &mut v8::HandleScope<'s>,
    text: &str,
) -> Result<v8::Local<'s, v8::String>, EngineError> {
    bytes_to_v8(scope, text.as_bytes())
}

/// The UTF-8 bytes of `value` if it is a string, `None` otherwise.
pub fn string_bytes(scope: &mut v8::HandleScope, value: v8::Local<v8::Value>) -> Option<Vec<u8>> {
    if value.is_string() {
        Some(value.to_rust_string_lossy(scope).into_bytes())
    } else {
        None
    }
}

/// Convert a JSON value into a V8 value.
pub fn json_to_v8<'s>(
    scope: &mut v8::HandleScope<'s>,
    value: &serde_json::Value,
) -> Result<v8::Local<'s, v8::Value>, EngineError> {
    serde_v8::to_v8(scope, value).map_err(|e| EngineError::Conversion(e.to_string()))
}

/// Convert a V8 value into JSON. `undefined` becomes `null`.
pub fn v8_to_json(
    scope: &mut v8::HandleScope,
    value: v8::Local<v8::Value>,
) -> Result<serde_json::Value, EngineError> {
    if value.is_undefined() {
        return Ok(serde_json::Value::Null);
    }
    serde_v8::from_v8(scope, value).map_err(|e| EngineError::Conversion(e.to_string()))
}
