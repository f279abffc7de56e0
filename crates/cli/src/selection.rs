//! Picks the target host for `eval --client`.

use evalbridge_protocol::ClientInfo;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SelectionError {
	#[error("no hosts connected")]
	NoHosts,

	#[error("multiple hosts connected; use --client <id|index>")]
	MultipleHosts,

	#[error("client index out of range (0-{last})")]
	IndexOutOfRange { last: usize },

	#[error("unknown identifier: {0}")]
	UnknownIdentifier(String),
}

/// Resolves `requested` against `clients` and returns the host identifier.
///
/// An all-digit value is an index into `clients`; anything else must match an identifier exactly.
/// Without a request the single connected host is picked.
pub fn resolve_client(clients: &[ClientInfo], requested: Option<&str>) -> Result<String, SelectionError> {
	if clients.is_empty() {
		return Err(SelectionError::NoHosts);
	}

	let Some(requested) = requested.filter(|value| !value.is_empty()) else {
		return match clients {
			[only] => Ok(only.client_id.clone()),
			_ => Err(SelectionError::MultipleHosts),
		};
	};

	if requested.bytes().all(|byte| byte.is_ascii_digit()) {
		let last = clients.len() - 1;
		return requested
			.parse::<usize>()
			.ok()
			.and_then(|index| clients.get(index))
			.map(|client| client.client_id.clone())
			.ok_or(SelectionError::IndexOutOfRange { last });
	}

	clients
		.iter()
		.find(|client| client.client_id == requested)
		.map(|client| client.client_id.clone())
		.ok_or_else(|| SelectionError::UnknownIdentifier(requested.to_string()))
}
