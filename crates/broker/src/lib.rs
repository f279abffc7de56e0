//! Local broker relaying eval requests between driver CLIs and sandboxed script hosts.
//!
//! The broker is split into a pure state machine and a thin transport:
//!
//! - [`Broker`] consumes [`Event`]s and returns [`Outbound`] effects. Connection roles, the host
//!   directory, pending requests and deadlines all live here.
//! - [`BrokerServer`] binds the WebSocket listener, feeds socket activity into a single event
//!   loop and performs the effects.
//!
//! Deadlines go through the [`Clock`] trait so the state machine can be driven with
//! [`ManualClock`] in tests.

pub mod clock;
pub mod config;
pub mod correlator;
pub mod directory;
pub mod error;
pub mod outbound;
pub mod pidfile;
pub mod registry;
pub mod router;
pub mod server;
pub mod status;

pub use clock::{Clock, DeadlineKey, ManualClock, TokioClock};
pub use config::{BrokerConfig, DEFAULT_REQUEST_TIMEOUT};
pub use error::{DispatchError, ResolutionError};
pub use outbound::{CloseReason, Outbound};
pub use registry::ConnId;
pub use router::{Broker, BrokerSettings, Event};
pub use server::BrokerServer;
