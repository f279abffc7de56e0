//! Wire frames exchanged over the evalbridge broker socket.
//!
//! Every frame is a JSON text message carrying a snake_case `type` discriminant.
//! Drivers and script hosts both speak to the broker, never to each other:
//!
//! 1. A peer connects and sends [`ClientFrame::Hello`] naming its [`Role`]
//! 2. The broker answers [`ServerFrame::HelloAck`]
//! 3. A driver sends [`ClientFrame::EvalRequest`]; the broker forwards it to a host as
//!    [`ServerFrame::EvalRequest`]
//! 4. The host answers [`ClientFrame::EvalResponse`]; the broker relays it to the driver as
//!    [`ServerFrame::EvalResponse`]
//!
//! # Main Types
//!
//! - [`ClientFrame`] - Frames sent by drivers and hosts to the broker
//! - [`ServerFrame`] - Frames sent by the broker
//! - [`StatusResponse`] - Point-in-time view of connected hosts
//! - [`ErrorDescriptor`] - Structured failure carried in an [`EvalResponse`]

mod error;
mod frames;
mod lenient;
mod status;


pub use error::{ErrorDescriptor, FrameError};
pub use frames::{
	ClientFrame, ClientUpdate, EvalForward, EvalRequest, EvalResponse, Hello, Role, ServerFrame,
	StatusRequest,
};
pub use status::{ClientInfo, DaemonInfo, StatusResponse};

/// Loopback address the broker binds by default.
pub const DEFAULT_HOST: &str = "127.0.0.1";

/// Port the broker listens on by default.
pub const DEFAULT_PORT: u16 = 7017;

/// Plaintext body returned to HTTP requests that do not ask for a WebSocket upgrade.
pub const BANNER: &str = "evalbridge\n";
