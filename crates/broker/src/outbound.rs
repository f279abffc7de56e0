use evalbridge_protocol::{EvalResponse, ServerFrame};

use crate::error::DispatchError;
use crate::registry::ConnId;

/// Why the broker closes a connection on its own.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseReason {
	/// Host handshake without an identifier.
	MissingClientId,
	/// Another connection registered the same host identifier.
	Replaced,
}

impl CloseReason {
	/// WebSocket close code.
	pub fn code(self) -> u16 {
		match self {
			CloseReason::MissingClientId => 1008,
			CloseReason::Replaced => 1000,
		}
	}

	pub fn message(self) -> &'static str {
		match self {
			CloseReason::MissingClientId => "missing clientId",
			CloseReason::Replaced => "replaced by new client",
		}
	}
}

/// Effect the transport must carry out after an event was handled.
#[derive(Debug, Clone, PartialEq)]
pub enum Outbound {
	Send { to: ConnId, frame: ServerFrame },
	Close { conn: ConnId, reason: CloseReason },
}

/// Ordered list of effects produced while handling one event.
#[derive(Debug, Default)]
pub struct Effects(Vec<Outbound>);

impl Effects {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn send(&mut self, to: ConnId, frame: ServerFrame) {
		self.0.push(Outbound::Send { to, frame });
	}

	/// Queues an `ok: false` eval response built from `error`.
	pub fn fail(&mut self, to: ConnId, request_id: impl Into<String>, error: &DispatchError) {
		self.send(
			to,
			ServerFrame::EvalResponse(EvalResponse::failure(request_id, error.descriptor())),
		);
	}

	pub fn close(&mut self, conn: ConnId, reason: CloseReason) {
		self.0.push(Outbound::Close { conn, reason });
	}

	pub fn into_vec(self) -> Vec<Outbound> {
		self.0
	}
}
