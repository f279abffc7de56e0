use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

/// Why an inbound text frame could not be turned into a [`ClientFrame`](crate::ClientFrame).
#[derive(Debug, Error)]
pub enum FrameError {
	#[error("invalid json: {0}")]
	Malformed(#[source] serde_json::Error),

	#[error("frame is not a json object")]
	NotAnObject,

	#[error("frame has no type")]
	MissingType,

	#[error("unknown frame type: {0}")]
	UnknownType(String),

	#[error("invalid {kind} frame: {source}")]
	InvalidFields {
		kind: String,
		#[source]
		source: serde_json::Error,
	},
}

/// Structured failure carried in the `error` field of an eval response.
///
/// Script hosts emit `{name, message, stack?}`; the broker uses the same shape for the failures
/// it synthesizes (timeouts, disconnects, resolution errors).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorDescriptor {
	pub name: String,
	pub message: String,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub stack: Option<String>,
}

impl ErrorDescriptor {
	pub fn new(name: impl Into<String>, message: impl Into<String>) -> Self {
		Self {
			name: name.into(),
			message: message.into(),
			stack: None,
		}
	}
}

impl From<ErrorDescriptor> for Value {
	fn from(descriptor: ErrorDescriptor) -> Self {
		let mut object = Map::new();
		object.insert("name".to_string(), Value::String(descriptor.name));
		object.insert("message".to_string(), Value::String(descriptor.message));
		if let Some(stack) = descriptor.stack {
			object.insert("stack".to_string(), Value::String(stack));
		}
		Value::Object(object)
	}
}
