//! In-flight eval requests and their terminal outcomes.
//!
//! A request enters the pending set only after it was admitted and forwarded. It leaves through
//! exactly one of: matching reply, deadline, target host closing, origin closing. Every removal
//! disarms the request's deadline.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use evalbridge_protocol::{EvalForward, EvalRequest, EvalResponse, ServerFrame};
use tracing::{debug, info, warn};

use crate::clock::{Clock, DeadlineKey};
use crate::directory::ClientDirectory;
use crate::error::DispatchError;
use crate::outbound::Effects;
use crate::registry::{ConnId, Connection};

#[derive(Debug, Clone)]
pub struct PendingRequest {
	pub id: String,
	pub origin: ConnId,
	/// Identifier of the host the request was routed to.
	pub client_id: String,
	pub created_at: Instant,
	deadline: DeadlineKey,
}

#[derive(Debug)]
pub struct Correlator {
	pending: HashMap<String, PendingRequest>,
	timeout: Duration,
	next_seq: u64,
	next_generated: u64,
}

impl Correlator {
	pub fn new(timeout: Duration) -> Self {
		Self {
			pending: HashMap::new(),
			timeout,
			next_seq: 0,
			next_generated: 0,
		}
	}

	pub fn len(&self) -> usize {
		self.pending.len()
	}

	pub fn is_empty(&self) -> bool {
		self.pending.is_empty()
	}

	pub fn get(&self, request_id: &str) -> Option<&PendingRequest> {
		self.pending.get(request_id)
	}

	/// Fresh id not used by any pending request.
	fn generate_id(&mut self) -> String {
		loop {
			self.next_generated += 1;
			let id = format!("req-{}", self.next_generated);
			if !self.pending.contains_key(&id) {
				return id;
			}
		}
	}

	/// Admits, registers and forwards an eval request, or answers the origin with a failure.
	pub fn submit<C: Clock>(
		&mut self,
		origin: &Connection,
		request: EvalRequest,
		directory: &ClientDirectory,
		clock: &mut C,
		effects: &mut Effects,
	) {
		let EvalRequest { id, client_id, script } = request;
		let id = id.unwrap_or_else(|| self.generate_id());

		let (client_id, host) = match self.admit(origin, &id, client_id.as_deref(), directory) {
			Ok(target) => target,
			Err(err) => {
				warn!(target = "evalbridge.correlator", conn = %origin.id(), request_id = %id, error = %err, "eval request rejected");
				effects.fail(origin.id(), id, &err);
				return;
			}
		};

		self.next_seq += 1;
		let deadline = DeadlineKey {
			request_id: id.clone(),
			seq: self.next_seq,
		};
		clock.arm(deadline.clone(), self.timeout);
		self.pending.insert(
			id.clone(),
			PendingRequest {
				id: id.clone(),
				origin: origin.id(),
				client_id: client_id.clone(),
				created_at: clock.now(),
				deadline,
			},
		);

		debug!(target = "evalbridge.correlator", conn = %origin.id(), request_id = %id, client_id = %client_id, "forwarding eval request");
		effects.send(host, ServerFrame::EvalRequest(EvalForward { id, script }));
	}

	fn admit(
		&self,
		origin: &Connection,
		request_id: &str,
		requested: Option<&str>,
		directory: &ClientDirectory,
	) -> Result<(String, ConnId), DispatchError> {
		if origin.role().is_host() {
			return Err(DispatchError::HostSubmission);
		}
		let target = directory.resolve(requested)?;
		if self.pending.contains_key(request_id) {
			return Err(DispatchError::DuplicateRequest(request_id.to_string()));
		}
		Ok(target)
	}

	/// Relays a host's eval response to the driver that asked.
	pub fn reply<C: Clock>(&mut self, from: &Connection, response: EvalResponse, clock: &mut C, effects: &mut Effects) {
		if !from.role().is_host() {
			warn!(target = "evalbridge.correlator", conn = %from.id(), "eval response rejected: non-host peer");
			return;
		}
		if response.id.is_empty() {
			debug!(target = "evalbridge.correlator", conn = %from.id(), "eval response without id dropped");
			return;
		}
		let Some(pending) = self.pending.remove(&response.id) else {
			warn!(target = "evalbridge.correlator", conn = %from.id(), request_id = %response.id, "eval response with unknown id");
			return;
		};

		clock.disarm(&pending.deadline);
		debug!(target = "evalbridge.correlator", request_id = %pending.id, ok = response.ok, "relaying eval response");
		effects.send(pending.origin, ServerFrame::EvalResponse(response));
	}

	/// Handles an elapsed deadline. Stale keys (already resolved or reused ids) are ignored.
	pub fn expire<C: Clock>(&mut self, key: &DeadlineKey, clock: &mut C, effects: &mut Effects) {
		clock.disarm(key);
		let current = self
			.pending
			.get(&key.request_id)
			.is_some_and(|pending| pending.deadline == *key);
		if !current {
			debug!(target = "evalbridge.correlator", request_id = %key.request_id, "stale deadline ignored");
			return;
		}
		let Some(pending) = self.pending.remove(&key.request_id) else {
			return;
		};

		info!(target = "evalbridge.correlator", request_id = %pending.id, client_id = %pending.client_id, "eval request timed out");
		effects.fail(pending.origin, pending.id, &DispatchError::Timeout(self.timeout));
	}

	/// Fails every request routed to `client_id`. Returns how many were cancelled.
	pub fn cancel_for_host<C: Clock>(&mut self, client_id: &str, clock: &mut C, effects: &mut Effects) -> usize {
		let mut affected: Vec<PendingRequest> = self
			.pending
			.values()
			.filter(|pending| pending.client_id == client_id)
			.cloned()
			.collect();
		affected.sort_by_key(|pending| pending.deadline.seq);

		let error = DispatchError::HostDisconnected(client_id.to_string());
		for pending in &affected {
			self.pending.remove(&pending.id);
			clock.disarm(&pending.deadline);
			effects.fail(pending.origin, pending.id.clone(), &error);
		}
		if !affected.is_empty() {
			info!(target = "evalbridge.correlator", client_id, cancelled = affected.len(), "cancelled requests for disconnected host");
		}
		affected.len()
	}

	/// Drops every request `origin` submitted, without replying. Returns how many were dropped.
	pub fn cancel_for_origin<C: Clock>(&mut self, origin: ConnId, clock: &mut C) -> usize {
		let before = self.pending.len();
		self.pending.retain(|_, pending| {
			if pending.origin == origin {
				clock.disarm(&pending.deadline);
				return false;
			}
			true
		});
		let dropped = before - self.pending.len();
		if dropped > 0 {
			debug!(target = "evalbridge.correlator", conn = %origin, dropped, "dropped requests of closed origin");
		}
		dropped
	}
}
