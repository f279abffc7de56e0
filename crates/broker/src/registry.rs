//! Every open socket and the role it was assigned.

use std::collections::HashMap;
use std::fmt;
use std::time::Instant;

use evalbridge_protocol::Role;

/// Opaque handle for one socket connection, assigned by the transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnId(u64);

impl ConnId {
	pub const fn new(raw: u64) -> Self {
		Self(raw)
	}
}

impl fmt::Display for ConnId {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "conn-{}", self.0)
	}
}

/// Role of a connection as seen by the broker. Starts as `Unassigned` until a handshake.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PeerRole {
	Unassigned,
	Driver,
	Host { client_id: String },
}

impl PeerRole {
	pub fn is_host(&self) -> bool {
		matches!(self, PeerRole::Host { .. })
	}

	pub fn wire_role(&self) -> Option<Role> {
		match self {
			PeerRole::Unassigned => None,
			PeerRole::Driver => Some(Role::Driver),
			PeerRole::Host { .. } => Some(Role::Host),
		}
	}
}

#[derive(Debug, Clone)]
pub struct Connection {
	id: ConnId,
	role: PeerRole,
	label: String,
	connected_at: Instant,
}

impl Connection {
	pub fn id(&self) -> ConnId {
		self.id
	}

	pub fn role(&self) -> &PeerRole {
		&self.role
	}

	/// Host identifier, `None` unless the connection registered as a host.
	pub fn client_id(&self) -> Option<&str> {
		match &self.role {
			PeerRole::Host { client_id } => Some(client_id),
			_ => None,
		}
	}

	pub fn label(&self) -> &str {
		&self.label
	}

	pub fn connected_at(&self) -> Instant {
		self.connected_at
	}
}

/// Outcome of a role assignment attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Assignment {
	/// Role (and identifier) set for the first time.
	Assigned,
	/// Same role and identifier repeated; only the label changed.
	Refreshed,
	/// Connection already holds a different role or identifier; nothing changed.
	Conflict,
	/// No such connection.
	Unknown,
}

/// Tracks open connections. Role and identifier change only through the `assign_*` methods.
#[derive(Debug, Default)]
pub struct ConnectionRegistry {
	connections: HashMap<ConnId, Connection>,
}

impl ConnectionRegistry {
	pub fn new() -> Self {
		Self::default()
	}

	/// Records a freshly opened, unassigned connection.
	pub fn open(&mut self, id: ConnId, now: Instant) -> &Connection {
		self.connections.entry(id).or_insert(Connection {
			id,
			role: PeerRole::Unassigned,
			label: String::new(),
			connected_at: now,
		})
	}

	/// Removes a connection. Closing twice returns `None` the second time.
	pub fn close(&mut self, id: ConnId) -> Option<Connection> {
		self.connections.remove(&id)
	}

	pub fn get(&self, id: ConnId) -> Option<&Connection> {
		self.connections.get(&id)
	}

	pub fn len(&self) -> usize {
		self.connections.len()
	}

	pub fn is_empty(&self) -> bool {
		self.connections.is_empty()
	}

	pub fn assign_driver(&mut self, id: ConnId) -> Assignment {
		let Some(conn) = self.connections.get_mut(&id) else {
			return Assignment::Unknown;
		};
		match &conn.role {
			PeerRole::Unassigned => {}
			PeerRole::Driver => return Assignment::Refreshed,
			PeerRole::Host { .. } => return Assignment::Conflict,
		}
		conn.role = PeerRole::Driver;
		Assignment::Assigned
	}

	pub fn assign_host(&mut self, id: ConnId, client_id: &str, label: &str) -> Assignment {
		let Some(conn) = self.connections.get_mut(&id) else {
			return Assignment::Unknown;
		};
		let outcome = match &conn.role {
			PeerRole::Unassigned => Assignment::Assigned,
			PeerRole::Host { client_id: current } if current == client_id => Assignment::Refreshed,
			PeerRole::Host { .. } | PeerRole::Driver => return Assignment::Conflict,
		};
		if outcome == Assignment::Assigned {
			conn.role = PeerRole::Host {
				client_id: client_id.to_string(),
			};
		}
		conn.label = label.to_string();
		outcome
	}

	/// Updates the label of a host connection registered under `client_id`.
	pub fn relabel(&mut self, id: ConnId, client_id: &str, label: &str) -> bool {
		match self.connections.get_mut(&id) {
			Some(conn) if conn.client_id() == Some(client_id) => {
				conn.label = label.to_string();
				true
			}
			_ => false,
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn open_starts_unassigned_and_close_is_idempotent() {
		let mut registry = ConnectionRegistry::new();
		let id = ConnId::new(1);

		assert_eq!(registry.open(id, Instant::now()).role(), &PeerRole::Unassigned);
		assert_eq!(registry.len(), 1);

		assert!(registry.close(id).is_some());
		assert!(registry.close(id).is_none());
		assert!(registry.is_empty());
	}

	#[test]
	fn host_identifier_is_set_once() {
		let mut registry = ConnectionRegistry::new();
		let id = ConnId::new(7);
		registry.open(id, Instant::now());

		assert_eq!(registry.assign_host(id, "file-1", "Draft"), Assignment::Assigned);
		assert_eq!(registry.assign_host(id, "file-1", "Renamed"), Assignment::Refreshed);
		assert_eq!(registry.assign_host(id, "file-2", "Other"), Assignment::Conflict);
		assert_eq!(registry.assign_driver(id), Assignment::Conflict);

		let conn = registry.get(id).unwrap();
		assert_eq!(conn.client_id(), Some("file-1"));
		assert_eq!(conn.label(), "Renamed");
	}

	#[test]
	fn relabel_requires_matching_host() {
		let mut registry = ConnectionRegistry::new();
		let host = ConnId::new(1);
		let driver = ConnId::new(2);
		registry.open(host, Instant::now());
		registry.open(driver, Instant::now());
		registry.assign_host(host, "file-1", "");
		registry.assign_driver(driver);

		assert!(registry.relabel(host, "file-1", "New"));
		assert!(!registry.relabel(host, "file-9", "Nope"));
		assert!(!registry.relabel(driver, "file-1", "Nope"));
		assert_eq!(registry.get(host).unwrap().label(), "New");
	}

	#[test]
	fn assigning_unknown_connection_is_reported() {
		let mut registry = ConnectionRegistry::new();
		assert_eq!(registry.assign_driver(ConnId::new(3)), Assignment::Unknown);
	}
}
