//! Field decoders that never fail on a wrong JSON type.
//!
//! Peers are scripts running in someone else's runtime, so a field with an unexpected type is
//! treated like an absent one instead of rejecting the whole frame.

use serde::{Deserialize, Deserializer};
use serde_json::Value;

/// Keeps non-empty strings, drops everything else.
pub(crate) fn non_empty_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
	D: Deserializer<'de>,
{
	Ok(match Value::deserialize(deserializer)? {
		Value::String(text) if !text.is_empty() => Some(text),
		_ => None,
	})
}

/// Like [`non_empty_string`] but yields an empty string instead of `None`.
pub(crate) fn text<'de, D>(deserializer: D) -> Result<String, D::Error>
where
	D: Deserializer<'de>,
{
	non_empty_string(deserializer).map(Option::unwrap_or_default)
}

/// Request ids: strings as-is, scalars and composites in their JSON text form.
pub(crate) fn loose_id<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
	D: Deserializer<'de>,
{
	Ok(match Value::deserialize(deserializer)? {
		Value::Null => None,
		Value::String(text) if text.is_empty() => None,
		Value::String(text) => Some(text),
		other => Some(other.to_string()),
	})
}

/// Same as [`loose_id`], empty when absent.
pub(crate) fn loose_id_text<'de, D>(deserializer: D) -> Result<String, D::Error>
where
	D: Deserializer<'de>,
{
	loose_id(deserializer).map(Option::unwrap_or_default)
}

/// Truthiness of an arbitrary JSON value.
pub(crate) fn truthy<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
	D: Deserializer<'de>,
{
	Ok(match Value::deserialize(deserializer)? {
		Value::Null => false,
		Value::Bool(flag) => flag,
		Value::Number(number) => number.as_f64().is_some_and(|n| n != 0.0 && !n.is_nan()),
		Value::String(text) => !text.is_empty(),
		Value::Array(_) | Value::Object(_) => true,
	})
}

/// Distinguishes an explicit `null` from an absent field (the latter hits `#[serde(default)]`).
pub(crate) fn present<'de, D>(deserializer: D) -> Result<Option<Value>, D::Error>
where
	D: Deserializer<'de>,
{
	Value::deserialize(deserializer).map(Some)
}

/// Captured log lines; anything but an array decodes as no lines.
pub(crate) fn log_lines<'de, D>(deserializer: D) -> Result<Vec<Value>, D::Error>
where
	D: Deserializer<'de>,
{
	Ok(match Value::deserialize(deserializer)? {
		Value::Array(lines) => lines,
		_ => Vec::new(),
	})
}
