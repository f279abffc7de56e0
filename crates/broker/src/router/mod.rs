//! Event dispatch for the broker state machine.
//!
//! [`Broker`] owns all broker state. The transport turns socket activity and elapsed timers
//! into [`Event`]s, feeds them to [`Broker::handle`] one at a time and carries out the returned
//! [`Outbound`] effects. Nothing in here performs I/O.

#[cfg(test)]
mod tests;

use std::time::Duration;

use evalbridge_protocol::{ClientFrame, ClientUpdate, Hello, Role, ServerFrame};
use tracing::{debug, info, warn};

use crate::clock::{Clock, DeadlineKey};
use crate::correlator::Correlator;
use crate::directory::ClientDirectory;
use crate::outbound::{CloseReason, Effects, Outbound};
use crate::registry::{Assignment, ConnId, ConnectionRegistry};
use crate::status;

/// Something that happened on the transport side.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
	Opened(ConnId),
	Frame { conn: ConnId, text: String },
	Closed(ConnId),
	DeadlineFired(DeadlineKey),
}

#[derive(Debug, Clone, Copy)]
pub struct BrokerSettings {
	/// How long a forwarded request may wait for its reply.
	pub request_timeout: Duration,
	/// Reported in status responses.
	pub process_id: u32,
}

impl Default for BrokerSettings {
	fn default() -> Self {
		Self {
			request_timeout: crate::config::DEFAULT_REQUEST_TIMEOUT,
			process_id: std::process::id(),
		}
	}
}

pub struct Broker<C: Clock> {
	process_id: u32,
	registry: ConnectionRegistry,
	directory: ClientDirectory,
	correlator: Correlator,
	clock: C,
	next_status_id: u64,
}

impl<C: Clock> Broker<C> {
	pub fn new(settings: BrokerSettings, clock: C) -> Self {
		Self {
			process_id: settings.process_id,
			registry: ConnectionRegistry::new(),
			directory: ClientDirectory::new(),
			correlator: Correlator::new(settings.request_timeout),
			clock,
			next_status_id: 0,
		}
	}

	/// Applies one event and returns what the transport has to do next, in order.
	pub fn handle(&mut self, event: Event) -> Vec<Outbound> {
		let mut effects = Effects::new();
		match event {
			Event::Opened(conn) => {
				self.registry.open(conn, self.clock.now());
				debug!(target = "evalbridge.router", %conn, total = self.registry.len(), "socket opened");
			}
			Event::Frame { conn, text } => self.route(conn, &text, &mut effects),
			Event::Closed(conn) => self.disconnect(conn, &mut effects),
			Event::DeadlineFired(key) => self.correlator.expire(&key, &mut self.clock, &mut effects),
		}
		effects.into_vec()
	}

	pub fn registry(&self) -> &ConnectionRegistry {
		&self.registry
	}

	pub fn directory(&self) -> &ClientDirectory {
		&self.directory
	}

	pub fn correlator(&self) -> &Correlator {
		&self.correlator
	}

	pub fn clock_mut(&mut self) -> &mut C {
		&mut self.clock
	}

	fn route(&mut self, conn: ConnId, text: &str, effects: &mut Effects) {
		let Some(peer) = self.registry.get(conn) else {
			debug!(target = "evalbridge.router", %conn, "frame from unknown connection dropped");
			return;
		};

		let frame = match ClientFrame::parse(text) {
			Ok(frame) => frame,
			Err(err) => {
				warn!(target = "evalbridge.router", %conn, error = %err, "dropping invalid frame");
				return;
			}
		};

		match frame {
			ClientFrame::Hello(hello) => self.handshake(conn, hello, effects),
			ClientFrame::ClientUpdate(update) => self.client_update(conn, update),
			ClientFrame::EvalRequest(request) => {
				self.correlator
					.submit(peer, request, &self.directory, &mut self.clock, effects);
			}
			ClientFrame::EvalResponse(response) => {
				self.correlator.reply(peer, response, &mut self.clock, effects);
			}
			ClientFrame::StatusRequest(request) => {
				let id = request.id.unwrap_or_else(|| {
					self.next_status_id += 1;
					format!("status-{}", self.next_status_id)
				});
				let report = status::report(id, self.process_id, &self.directory);
				effects.send(conn, ServerFrame::StatusResponse(report));
			}
		}
	}

	fn handshake(&mut self, conn: ConnId, hello: Hello, effects: &mut Effects) {
		match hello.role() {
			Some(Role::Host) => {
				let Some(client_id) = hello.client_id else {
					warn!(target = "evalbridge.router", %conn, "host hello missing clientId");
					effects.send(conn, ServerFrame::HelloAck);
					self.retire(conn, CloseReason::MissingClientId, effects);
					return;
				};
				let label = hello.label.unwrap_or_default();

				match self.registry.assign_host(conn, &client_id, &label) {
					Assignment::Assigned | Assignment::Refreshed => {}
					Assignment::Conflict => {
						warn!(target = "evalbridge.router", %conn, client_id, "hello ignored: role already assigned");
						effects.send(conn, ServerFrame::HelloAck);
						return;
					}
					Assignment::Unknown => return,
				}

				if let Some(replaced) = self.directory.register(&client_id, conn, &label) {
					info!(target = "evalbridge.router", %conn, %replaced, client_id, "replacing existing host");
					self.retire(replaced, CloseReason::Replaced, effects);
				}
				info!(target = "evalbridge.router", %conn, client_id, "host connected");
				effects.send(conn, ServerFrame::HelloAck);
			}
			Some(Role::Driver) => {
				if self.registry.assign_driver(conn) == Assignment::Conflict {
					warn!(target = "evalbridge.router", %conn, "hello ignored: role already assigned");
				} else {
					info!(target = "evalbridge.router", %conn, "driver connected");
				}
				effects.send(conn, ServerFrame::HelloAck);
			}
			None => {
				warn!(target = "evalbridge.router", %conn, role = ?hello.role, "hello with unknown role");
				effects.send(conn, ServerFrame::HelloAck);
			}
		}
	}

	fn client_update(&mut self, conn: ConnId, update: ClientUpdate) {
		let Some(client_id) = update.client_id else {
			return;
		};
		let label = update.label.unwrap_or_default();

		if let Some(entry) = self.directory.get(&client_id) {
			let registered = entry.conn;
			self.directory.relabel(&client_id, &label);
			self.registry.relabel(registered, &client_id, &label);
		}
		self.registry.relabel(conn, &client_id, &label);
	}

	/// Closes a connection from the broker side. It leaves broker state immediately, so frames the
	/// peer sends before its socket goes away are dropped and its later `Closed` event is a no-op.
	fn retire(&mut self, conn: ConnId, reason: CloseReason, effects: &mut Effects) {
		effects.close(conn, reason);
		self.disconnect(conn, effects);
	}

	fn disconnect(&mut self, conn: ConnId, effects: &mut Effects) {
		let Some(closed) = self.registry.close(conn) else {
			return;
		};

		if let Some(client_id) = closed.client_id() {
			if self.directory.remove_if_current(client_id, conn) {
				info!(target = "evalbridge.router", %conn, client_id, "host disconnected");
				self.correlator
					.cancel_for_host(client_id, &mut self.clock, effects);
			} else {
				debug!(target = "evalbridge.router", %conn, client_id, "replaced host connection closed");
			}
		}
		self.correlator.cancel_for_origin(conn, &mut self.clock);

		let open_for = self.clock.now().saturating_duration_since(closed.connected_at());
		debug!(
			target = "evalbridge.router",
			%conn,
			role = closed.role().wire_role().map(|role| role.as_str()),
			open_ms = open_for.as_millis() as u64,
			total = self.registry.len(),
			"socket closed"
		);
	}
}
