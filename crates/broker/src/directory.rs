//! Host identifier to live connection mapping.

use std::collections::BTreeMap;

use evalbridge_protocol::ClientInfo;

use crate::error::ResolutionError;
use crate::registry::ConnId;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectoryEntry {
	pub conn: ConnId,
	pub label: String,
}

/// Holds at most one connection per host identifier; the latest registration wins.
///
/// Ordered by identifier so listings (and index-based selection on the driver side) are stable.
#[derive(Debug, Default)]
pub struct ClientDirectory {
	entries: BTreeMap<String, DirectoryEntry>,
}

impl ClientDirectory {
	pub fn new() -> Self {
		Self::default()
	}

	/// Points `client_id` at `conn`.
	///
	/// Returns the connection previously registered under the same identifier when it differs
	/// from `conn`; the caller is expected to close it.
	pub fn register(&mut self, client_id: &str, conn: ConnId, label: &str) -> Option<ConnId> {
		let previous = self.entries.insert(
			client_id.to_string(),
			DirectoryEntry {
				conn,
				label: label.to_string(),
			},
		);
		previous.map(|entry| entry.conn).filter(|old| *old != conn)
	}

	pub fn get(&self, client_id: &str) -> Option<&DirectoryEntry> {
		self.entries.get(client_id)
	}

	/// Changes the label of a registered host. Unknown identifiers are ignored.
	pub fn relabel(&mut self, client_id: &str, label: &str) -> bool {
		match self.entries.get_mut(client_id) {
			Some(entry) => {
				entry.label = label.to_string();
				true
			}
			None => false,
		}
	}

	/// Removes the entry only while `conn` is still the registered connection.
	pub fn remove_if_current(&mut self, client_id: &str, conn: ConnId) -> bool {
		if self.entries.get(client_id).is_some_and(|entry| entry.conn == conn) {
			self.entries.remove(client_id);
			return true;
		}
		false
	}

	/// Picks the target host for an eval request.
	///
	/// With an identifier it must be registered. Without one exactly one host must be connected.
	pub fn resolve(&self, requested: Option<&str>) -> Result<(String, ConnId), ResolutionError> {
		if let Some(client_id) = requested {
			return self
				.entries
				.get(client_id)
				.map(|entry| (client_id.to_string(), entry.conn))
				.ok_or_else(|| ResolutionError::UnknownIdentifier(client_id.to_string()));
		}

		let mut hosts = self.entries.iter();
		match (hosts.next(), hosts.next()) {
			(None, _) => Err(ResolutionError::NoHosts),
			(Some((client_id, entry)), None) => Ok((client_id.clone(), entry.conn)),
			(Some(_), Some(_)) => Err(ResolutionError::MultipleHosts),
		}
	}

	/// Current contents as wire client records.
	pub fn clients(&self) -> Vec<ClientInfo> {
		self.entries
			.iter()
			.map(|(client_id, entry)| ClientInfo {
				client_id: client_id.clone(),
				label: entry.label.clone(),
			})
			.collect()
	}

	pub fn len(&self) -> usize {
		self.entries.len()
	}

	pub fn is_empty(&self) -> bool {
		self.entries.is_empty()
	}
}
