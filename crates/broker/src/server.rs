//! WebSocket transport around the [`Broker`] state machine.
//!
//! Every socket gets a reader task and a writer task. Readers forward frames into one event loop
//! that owns the broker, so broker state is never shared between tasks. Writers drain a
//! per-connection outbox the event loop pushes into.

use std::collections::HashMap;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use anyhow::{Context, Result};
use axum::Router;
use axum::extract::State;
use axum::extract::ws::rejection::WebSocketUpgradeRejection;
use axum::extract::ws::{CloseFrame, Message, WebSocket, WebSocketUpgrade};
use axum::response::{IntoResponse, Response};
use evalbridge_protocol::BANNER;
use futures::{SinkExt, StreamExt};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tracing::{debug, info, warn};

use crate::clock::{DeadlineKey, TokioClock};
use crate::config::BrokerConfig;
use crate::outbound::Outbound;
use crate::pidfile;
use crate::registry::ConnId;
use crate::router::{Broker, BrokerSettings, Event};

type Outbox = mpsc::UnboundedSender<Message>;

enum LoopMessage {
	Opened { conn: ConnId, outbox: Outbox },
	Frame { conn: ConnId, text: String },
	Closed(ConnId),
}

#[derive(Clone)]
struct Gateway {
	events: mpsc::UnboundedSender<LoopMessage>,
	next_conn: Arc<AtomicU64>,
}

impl Gateway {
	fn next_conn(&self) -> ConnId {
		ConnId::new(self.next_conn.fetch_add(1, Ordering::Relaxed) + 1)
	}
}

/// A bound but not yet serving broker.
pub struct BrokerServer {
	listener: TcpListener,
	config: BrokerConfig,
}

impl BrokerServer {
	pub async fn bind(config: BrokerConfig) -> Result<Self> {
		let addr = config.bind_addr();
		let listener = TcpListener::bind(&addr)
			.await
			.with_context(|| format!("Failed to bind broker to {addr}"))?;
		Ok(Self { listener, config })
	}

	pub fn local_addr(&self) -> Result<SocketAddr> {
		self.listener
			.local_addr()
			.context("Failed to read broker listen address")
	}

	/// Serves until SIGTERM or SIGINT.
	pub async fn run(self) -> Result<()> {
		let stop = shutdown_signal()?;
		self.run_until(stop).await
	}

	/// Serves until `shutdown` completes.
	pub async fn run_until<F>(self, shutdown: F) -> Result<()>
	where
		F: Future<Output = ()> + Send + 'static,
	{
		let addr = self.local_addr()?;
		let (events_tx, events_rx) = mpsc::unbounded_channel();
		let (fired_tx, fired_rx) = mpsc::unbounded_channel();

		let settings = BrokerSettings {
			request_timeout: self.config.request_timeout,
			process_id: std::process::id(),
		};
		let broker = Broker::new(settings, TokioClock::new(fired_tx));
		let event_loop = tokio::spawn(run_event_loop(broker, events_rx, fired_rx));

		let gateway = Gateway {
			events: events_tx,
			next_conn: Arc::new(AtomicU64::new(0)),
		};
		let app = Router::new().fallback(accept).with_state(gateway);

		if let Some(path) = &self.config.pid_file {
			pidfile::write(path, std::process::id())?;
		}
		info!(target = "evalbridge.server", %addr, timeout_ms = self.config.request_timeout.as_millis() as u64, "broker listening");

		let served = axum::serve(self.listener, app.into_make_service())
			.with_graceful_shutdown(shutdown)
			.await
			.context("Broker server error");

		event_loop.abort();
		if let Some(path) = &self.config.pid_file {
			if let Err(err) = pidfile::remove(path) {
				warn!(target = "evalbridge.server", path = %path.display(), error = %err, "failed to remove pid file");
			}
		}
		info!(target = "evalbridge.server", "broker stopped");
		served
	}
}

#[cfg(unix)]
fn shutdown_signal() -> Result<impl Future<Output = ()> + Send + 'static> {
	use tokio::signal::unix::{SignalKind, signal};

	let mut sigterm = signal(SignalKind::terminate()).context("Failed to install SIGTERM handler")?;
	let mut sigint = signal(SignalKind::interrupt()).context("Failed to install SIGINT handler")?;
	Ok(async move {
		tokio::select! {
			_ = sigterm.recv() => info!(target = "evalbridge.server", "received SIGTERM, shutting down"),
			_ = sigint.recv() => info!(target = "evalbridge.server", "received SIGINT, shutting down"),
		}
	})
}

#[cfg(not(unix))]
fn shutdown_signal() -> Result<impl Future<Output = ()> + Send + 'static> {
	Ok(async {
		if tokio::signal::ctrl_c().await.is_ok() {
			info!(target = "evalbridge.server", "received Ctrl+C, shutting down");
		}
	})
}

/// Upgrades WebSocket requests; anything else gets the plaintext banner.
async fn accept(
	State(gateway): State<Gateway>,
	upgrade: Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
) -> Response {
	match upgrade {
		Ok(ws) => ws.on_upgrade(move |socket| serve_socket(socket, gateway)),
		Err(_) => BANNER.into_response(),
	}
}

async fn serve_socket(socket: WebSocket, gateway: Gateway) {
	let conn = gateway.next_conn();
	let (outbox, outbox_rx) = mpsc::unbounded_channel();
	if gateway
		.events
		.send(LoopMessage::Opened { conn, outbox })
		.is_err()
	{
		return;
	}

	let (mut ws_tx, mut ws_rx) = socket.split();
	let mut outbox_rx = UnboundedReceiverStream::new(outbox_rx);
	let writer = tokio::spawn(async move {
		while let Some(message) = outbox_rx.next().await {
			let closing = matches!(message, Message::Close(_));
			if ws_tx.send(message).await.is_err() || closing {
				break;
			}
		}
	});

	while let Some(message) = ws_rx.next().await {
		let text = match message {
			Ok(Message::Text(text)) => text.as_str().to_owned(),
			Ok(Message::Binary(bytes)) => match String::from_utf8(bytes.to_vec()) {
				Ok(text) => text,
				Err(_) => {
					debug!(target = "evalbridge.server", %conn, "dropping non-utf8 binary frame");
					continue;
				}
			},
			Ok(Message::Close(_)) => break,
			Ok(_) => continue,
			Err(err) => {
				debug!(target = "evalbridge.server", %conn, error = %err, "websocket error");
				break;
			}
		};
		if gateway.events.send(LoopMessage::Frame { conn, text }).is_err() {
			break;
		}
	}

	let _ = gateway.events.send(LoopMessage::Closed(conn));
	writer.abort();
}

async fn run_event_loop(
	mut broker: Broker<TokioClock>,
	mut inbound: mpsc::UnboundedReceiver<LoopMessage>,
	mut fired: mpsc::UnboundedReceiver<DeadlineKey>,
) {
	let mut outboxes: HashMap<ConnId, Outbox> = HashMap::new();

	loop {
		let event = tokio::select! {
			message = inbound.recv() => match message {
				Some(LoopMessage::Opened { conn, outbox }) => {
					outboxes.insert(conn, outbox);
					Event::Opened(conn)
				}
				Some(LoopMessage::Frame { conn, text }) => Event::Frame { conn, text },
				Some(LoopMessage::Closed(conn)) => {
					outboxes.remove(&conn);
					Event::Closed(conn)
				}
				None => break,
			},
			Some(key) = fired.recv() => Event::DeadlineFired(key),
		};

		for outbound in broker.handle(event) {
			deliver(&mut outboxes, outbound);
		}
	}
}

fn deliver(outboxes: &mut HashMap<ConnId, Outbox>, outbound: Outbound) {
	match outbound {
		Outbound::Send { to, frame } => {
			let Some(outbox) = outboxes.get(&to) else {
				debug!(target = "evalbridge.server", conn = %to, "dropping frame for closed connection");
				return;
			};
			match frame.to_text() {
				Ok(text) => {
					let _ = outbox.send(Message::Text(text.into()));
				}
				Err(err) => warn!(target = "evalbridge.server", conn = %to, error = %err, "failed to encode frame"),
			}
		}
		Outbound::Close { conn, reason } => {
			if let Some(outbox) = outboxes.remove(&conn) {
				let _ = outbox.send(Message::Close(Some(CloseFrame {
					code: reason.code(),
					reason: reason.message().into(),
				})));
			}
		}
	}
}
