use std::time::Duration;

use evalbridge_protocol::ErrorDescriptor;
use thiserror::Error;

/// Why no target host could be picked for an eval request.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResolutionError {
	#[error("no hosts connected")]
	NoHosts,

	#[error("multiple hosts connected; identifier required")]
	MultipleHosts,

	#[error("unknown identifier: {0}")]
	UnknownIdentifier(String),
}

/// Failures the broker reports to a driver as an `ok: false` eval response.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DispatchError {
	#[error("hosts cannot submit eval requests")]
	HostSubmission,

	#[error(transparent)]
	Resolution(#[from] ResolutionError),

	#[error("duplicate request id: {0}")]
	DuplicateRequest(String),

	#[error("request timed out after {}ms", .0.as_millis())]
	Timeout(Duration),

	#[error("host disconnected: {0}")]
	HostDisconnected(String),
}

impl DispatchError {
	/// Error name placed in the descriptor's `name` field.
	pub fn kind(&self) -> &'static str {
		match self {
			DispatchError::HostSubmission => "ValidationError",
			DispatchError::Resolution(_) => "ResolutionError",
			DispatchError::DuplicateRequest(_) => "DuplicateRequestError",
			DispatchError::Timeout(_) => "TimeoutError",
			DispatchError::HostDisconnected(_) => "DisconnectError",
		}
	}

	pub fn descriptor(&self) -> ErrorDescriptor {
		ErrorDescriptor::new(self.kind(), self.to_string())
	}
}
