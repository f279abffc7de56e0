//! Broker settings and the well-known paths shared with the driver CLI.

use std::path::PathBuf;
use std::time::Duration;

use evalbridge_protocol::{DEFAULT_HOST, DEFAULT_PORT};

/// How long a forwarded eval request may stay unanswered.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

pub const PID_FILE_NAME: &str = "evalbridge.pid";
pub const LOG_FILE_NAME: &str = "evalbridge.log";

#[derive(Debug, Clone)]
pub struct BrokerConfig {
	pub host: String,
	/// `0` picks a free port.
	pub port: u16,
	pub request_timeout: Duration,
	/// Written after the listener is bound and removed on shutdown.
	pub pid_file: Option<PathBuf>,
}

impl Default for BrokerConfig {
	fn default() -> Self {
		Self {
			host: DEFAULT_HOST.to_string(),
			port: DEFAULT_PORT,
			request_timeout: DEFAULT_REQUEST_TIMEOUT,
			pid_file: None,
		}
	}
}

impl BrokerConfig {
	pub fn with_port(mut self, port: u16) -> Self {
		self.port = port;
		self
	}

	pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
		self.request_timeout = timeout;
		self
	}

	pub fn with_pid_file(mut self, path: impl Into<PathBuf>) -> Self {
		self.pid_file = Some(path.into());
		self
	}

	pub fn bind_addr(&self) -> String {
		format!("{}:{}", self.host, self.port)
	}
}

/// WebSocket URL of a broker on the loopback interface.
pub fn ws_url(port: u16) -> String {
	format!("ws://{DEFAULT_HOST}:{port}")
}

/// Per-user runtime directory.
///
/// Uses `$XDG_RUNTIME_DIR` when available (already user-permissioned) and falls back to the
/// temp dir.
pub fn runtime_dir() -> PathBuf {
	dirs::runtime_dir().unwrap_or_else(std::env::temp_dir)
}

pub fn default_pid_file() -> PathBuf {
	runtime_dir().join(PID_FILE_NAME)
}

pub fn default_log_file() -> PathBuf {
	runtime_dir().join(LOG_FILE_NAME)
}
