use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{ErrorDescriptor, FrameError};
use crate::lenient;
use crate::status::StatusResponse;

/// Role a peer claims in its [`Hello`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
	/// Issues eval requests (the command-line tool).
	Driver,
	/// Runs scripts inside the sandboxed runtime and answers eval requests.
	Host,
}

impl Role {
	pub fn as_str(self) -> &'static str {
		match self {
			Role::Driver => "driver",
			Role::Host => "host",
		}
	}

	/// Parses a wire role name. Unknown names yield `None`.
	pub fn parse(raw: &str) -> Option<Self> {
		match raw {
			"driver" => Some(Role::Driver),
			"host" => Some(Role::Host),
			_ => None,
		}
	}
}

impl fmt::Display for Role {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

/// Frame sent by a driver or a host to the broker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientFrame {
	/// Handshake assigning the connection its role.
	Hello(Hello),
	/// Host label change.
	ClientUpdate(ClientUpdate),
	/// Driver asking for a script to be run.
	EvalRequest(EvalRequest),
	/// Host reporting the outcome of a forwarded request.
	EvalResponse(EvalResponse),
	/// Introspection query.
	StatusRequest(StatusRequest),
}

impl ClientFrame {
	/// Parses one inbound text frame.
	///
	/// Field types are decoded leniently; only broken JSON, non-object payloads and missing or
	/// unknown `type` values are errors.
	pub fn parse(text: &str) -> Result<Self, FrameError> {
		let value: Value = serde_json::from_str(text).map_err(FrameError::Malformed)?;
		let kind = match value.as_object().map(|object| object.get("type")) {
			None => return Err(FrameError::NotAnObject),
			Some(None | Some(Value::Null)) => return Err(FrameError::MissingType),
			Some(Some(Value::String(kind))) => kind.clone(),
			Some(Some(other)) => return Err(FrameError::UnknownType(other.to_string())),
		};

		match kind.as_str() {
			"hello" | "client_update" | "eval_request" | "eval_response" | "status_request" => {
				serde_json::from_value(value).map_err(|source| FrameError::InvalidFields { kind, source })
			}
			_ => Err(FrameError::UnknownType(kind)),
		}
	}

	/// Serializes the frame for sending.
	pub fn to_text(&self) -> serde_json::Result<String> {
		serde_json::to_string(self)
	}
}

/// Handshake frame.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Hello {
	/// Raw role name as sent; see [`Hello::role`].
	#[serde(default, deserialize_with = "lenient::non_empty_string", skip_serializing_if = "Option::is_none")]
	pub role: Option<String>,
	/// Stable host identifier; required for hosts.
	#[serde(default, deserialize_with = "lenient::non_empty_string", skip_serializing_if = "Option::is_none")]
	pub client_id: Option<String>,
	#[serde(default, deserialize_with = "lenient::non_empty_string", skip_serializing_if = "Option::is_none")]
	pub label: Option<String>,
}

impl Hello {
	pub fn driver() -> Self {
		Self {
			role: Some(Role::Driver.as_str().to_string()),
			..Self::default()
		}
	}

	pub fn host(client_id: impl Into<String>, label: Option<String>) -> Self {
		Self {
			role: Some(Role::Host.as_str().to_string()),
			client_id: Some(client_id.into()),
			label,
		}
	}

	/// The claimed role, if it is one the broker knows.
	pub fn role(&self) -> Option<Role> {
		self.role.as_deref().and_then(Role::parse)
	}
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientUpdate {
	#[serde(default, deserialize_with = "lenient::non_empty_string", skip_serializing_if = "Option::is_none")]
	pub client_id: Option<String>,
	#[serde(default, deserialize_with = "lenient::non_empty_string", skip_serializing_if = "Option::is_none")]
	pub label: Option<String>,
}

/// Eval request as submitted by a driver.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EvalRequest {
	/// Caller-chosen request id; the broker generates one when absent.
	#[serde(default, deserialize_with = "lenient::loose_id", skip_serializing_if = "Option::is_none")]
	pub id: Option<String>,
	/// Target host; may be omitted when exactly one host is connected.
	#[serde(default, deserialize_with = "lenient::non_empty_string", skip_serializing_if = "Option::is_none")]
	pub client_id: Option<String>,
	#[serde(default, deserialize_with = "lenient::text")]
	pub script: String,
}

impl EvalRequest {
	pub fn new(id: impl Into<String>, client_id: Option<String>, script: impl Into<String>) -> Self {
		Self {
			id: Some(id.into()),
			client_id,
			script: script.into(),
		}
	}
}

/// Eval request as forwarded by the broker to a host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvalForward {
	pub id: String,
	pub script: String,
}

/// Outcome of one eval request.
///
/// Sent by hosts to the broker and relayed unchanged to the originating driver.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EvalResponse {
	/// Request id; empty when the sender omitted it.
	#[serde(default, deserialize_with = "lenient::loose_id_text")]
	pub id: String,
	#[serde(default, deserialize_with = "lenient::truthy")]
	pub ok: bool,
	#[serde(default, deserialize_with = "lenient::present", skip_serializing_if = "Option::is_none")]
	pub result: Option<Value>,
	#[serde(default, deserialize_with = "lenient::present", skip_serializing_if = "Option::is_none")]
	pub error: Option<Value>,
	#[serde(default, deserialize_with = "lenient::log_lines")]
	pub logs: Vec<Value>,
}

impl EvalResponse {
	pub fn success(id: impl Into<String>, result: Value, logs: Vec<Value>) -> Self {
		Self {
			id: id.into(),
			ok: true,
			result: Some(result),
			error: None,
			logs,
		}
	}

	/// A failed outcome with no captured logs.
	pub fn failure(id: impl Into<String>, error: ErrorDescriptor) -> Self {
		Self {
			id: id.into(),
			ok: false,
			result: None,
			error: Some(error.into()),
			logs: Vec::new(),
		}
	}

	/// Decodes `error` as an [`ErrorDescriptor`] when it has that shape.
	pub fn error_descriptor(&self) -> Option<ErrorDescriptor> {
		self.error
			.as_ref()
			.and_then(|error| serde_json::from_value(error.clone()).ok())
	}
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusRequest {
	#[serde(default, deserialize_with = "lenient::loose_id", skip_serializing_if = "Option::is_none")]
	pub id: Option<String>,
}

/// Frame sent by the broker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerFrame {
	HelloAck,
	EvalRequest(EvalForward),
	EvalResponse(EvalResponse),
	StatusResponse(StatusResponse),
}

impl ServerFrame {
	pub fn to_text(&self) -> serde_json::Result<String> {
		serde_json::to_string(self)
	}

	/// Parses a broker frame; used by drivers and test hosts.
	pub fn parse(text: &str) -> serde_json::Result<Self> {
		serde_json::from_str(text)
	}
}
