//! Driver side of the broker socket.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use evalbridge_broker::config::ws_url;
use evalbridge_protocol::{ClientFrame, EvalRequest, EvalResponse, Hello, ServerFrame, StatusRequest, StatusResponse};
use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tracing::debug;

use crate::error::{CliError, Result};

static NEXT_ID: AtomicU64 = AtomicU64::new(0);

/// Request id unlikely to collide with other drivers talking to the same broker.
pub fn unique_id(prefix: &str) -> String {
	let nanos = SystemTime::now()
		.duration_since(UNIX_EPOCH)
		.map(|elapsed| elapsed.as_nanos())
		.unwrap_or_default();
	let seq = NEXT_ID.fetch_add(1, Ordering::Relaxed);
	format!("{prefix}-{}-{nanos:x}-{seq}", std::process::id())
}

/// One driver connection that has already sent its hello.
pub struct BrokerClient {
	socket: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

impl BrokerClient {
	pub async fn connect(port: u16) -> Result<Self> {
		let (socket, _) = connect_async(ws_url(port)).await?;
		let mut client = Self { socket };
		client.send(&ClientFrame::Hello(Hello::driver())).await?;
		Ok(client)
	}

	pub async fn status(&mut self) -> Result<StatusResponse> {
		let id = unique_id("status");
		self.send(&ClientFrame::StatusRequest(StatusRequest { id: Some(id.clone()) }))
			.await?;
		loop {
			match self.next_frame().await? {
				Some(ServerFrame::StatusResponse(status)) if status.id == id => return Ok(status),
				Some(_) => continue,
				None => return Err(CliError::SocketClosed),
			}
		}
	}

	/// Sends `request` and waits for the response carrying its id.
	pub async fn eval(&mut self, request: EvalRequest) -> Result<EvalResponse> {
		let id = request.id.clone().unwrap_or_default();
		debug!(target = "evalbridge.client", request_id = %id, client_id = ?request.client_id, "sending eval request");
		self.send(&ClientFrame::EvalRequest(request)).await?;
		loop {
			match self.next_frame().await? {
				Some(ServerFrame::EvalResponse(response)) if response.id == id => return Ok(response),
				Some(_) => continue,
				None => return Err(CliError::SocketClosed),
			}
		}
	}

	pub async fn close(mut self) {
		let _ = self.socket.close(None).await;
	}

	async fn send(&mut self, frame: &ClientFrame) -> Result<()> {
		let text = frame.to_text()?;
		self.socket.send(Message::Text(text)).await?;
		Ok(())
	}

	/// Next decodable broker frame, or `None` once the socket is closed.
	async fn next_frame(&mut self) -> Result<Option<ServerFrame>> {
		while let Some(message) = self.socket.next().await {
			match message? {
				Message::Text(text) => match ServerFrame::parse(&text) {
					Ok(frame) => return Ok(Some(frame)),
					Err(err) => debug!(target = "evalbridge.client", error = %err, "skipping undecodable frame"),
				},
				Message::Close(_) => return Ok(None),
				_ => {}
			}
		}
		Ok(None)
	}
}

/// Connects, asks for status and disconnects, all within `timeout`.
pub async fn request_status(port: u16, timeout: Duration) -> Result<StatusResponse> {
	let probe = async {
		let mut client = BrokerClient::connect(port).await?;
		let status = client.status().await;
		client.close().await;
		status
	};
	tokio::time::timeout(timeout, probe)
		.await
		.map_err(|_| CliError::StatusTimeout)?
}
