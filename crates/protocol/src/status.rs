use serde::{Deserialize, Serialize};

use crate::lenient;

/// Answer to a status request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusResponse {
	#[serde(default, deserialize_with = "lenient::loose_id_text")]
	pub id: String,
	pub daemon: DaemonInfo,
	#[serde(default)]
	pub clients: Vec<ClientInfo>,
}

/// Broker process details.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DaemonInfo {
	/// Broker process id; `null` when no broker is known to run.
	pub pid: Option<u32>,
	pub listening: bool,
}

impl DaemonInfo {
	pub const fn stopped() -> Self {
		Self {
			pid: None,
			listening: false,
		}
	}
}

/// One registered host as listed by the broker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientInfo {
	#[serde(default, deserialize_with = "lenient::text")]
	pub client_id: String,
	#[serde(default, deserialize_with = "lenient::text")]
	pub label: String,
}
