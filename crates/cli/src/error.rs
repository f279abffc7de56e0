use thiserror::Error;

pub type Result<T> = std::result::Result<T, CliError>;

#[derive(Debug, Error)]
pub enum CliError {
	#[error("daemon did not start")]
	DaemonDidNotStart,

	#[error("failed to spawn daemon: {0}")]
	Spawn(#[source] std::io::Error),

	#[error("status request timed out")]
	StatusTimeout,

	#[error("broker socket closed")]
	SocketClosed,

	#[error(transparent)]
	WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

	#[error(transparent)]
	Io(#[from] std::io::Error),

	#[error(transparent)]
	Json(#[from] serde_json::Error),

	#[error(transparent)]
	Anyhow(#[from] anyhow::Error),
}
