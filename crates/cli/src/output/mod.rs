//! JSON documents printed on stdout.
//!
//! Every command prints exactly one line:
//!
//! ```json
//! {"daemon":{"pid":4242,"listening":true},"clients":[{"clientId":"file-1","label":"Draft"}]}
//! ```
//!
//! `eval` prints the outcome instead:
//!
//! ```json
//! {"ok":true,"result":42,"logs":["computing"]}
//! ```


use std::io::{self, Write};

use evalbridge_protocol::{ClientInfo, DaemonInfo, ErrorDescriptor, EvalResponse, StatusResponse};
use serde::Serialize;
use serde_json::Value;

/// Broker status as reported by `status`, `start`, `stop` and `restart`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusReport {
	pub daemon: DaemonInfo,
	pub clients: Vec<ClientInfo>,
}

impl StatusReport {
	pub fn stopped() -> Self {
		Self {
			daemon: DaemonInfo::stopped(),
			clients: Vec::new(),
		}
	}

	/// A broker process exists but did not answer.
	pub fn unresponsive(pid: u32) -> Self {
		Self {
			daemon: DaemonInfo {
				pid: Some(pid),
				listening: false,
			},
			clients: Vec::new(),
		}
	}

	/// Builds a report from a broker answer, falling back to `pid` when the broker sent none.
	pub fn from_response(response: StatusResponse, pid: Option<u32>) -> Self {
		Self {
			daemon: DaemonInfo {
				pid: response.daemon.pid.or(pid),
				listening: response.daemon.listening,
			},
			clients: response
				.clients
				.into_iter()
				.filter(|client| !client.client_id.is_empty())
				.collect(),
		}
	}
}

/// Outcome printed by `eval`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EvalOutput {
	pub ok: bool,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub result: Option<Value>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub error: Option<Value>,
	pub logs: Vec<Value>,
}

impl EvalOutput {
	/// Failure produced by the CLI itself, before or instead of a broker answer.
	pub fn local_failure(name: &str, message: impl Into<String>) -> Self {
		Self {
			ok: false,
			result: None,
			error: Some(ErrorDescriptor::new(name, message).into()),
			logs: Vec::new(),
		}
	}
}

impl From<EvalResponse> for EvalOutput {
	fn from(response: EvalResponse) -> Self {
		Self {
			ok: response.ok,
			result: response.result,
			error: response.error,
			logs: response.logs,
		}
	}
}

pub fn print_json<T: Serialize>(value: &T) -> io::Result<()> {
	let text = serde_json::to_string(value).map_err(io::Error::other)?;
	let mut stdout = io::stdout().lock();
	writeln!(stdout, "{text}")?;
	stdout.flush()
}
