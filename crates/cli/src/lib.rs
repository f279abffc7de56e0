//! Driver CLI for the evalbridge broker.
//!
//! Manages the broker process (`status`, `start`, `stop`, `restart`) and submits scripts read
//! from stdin to a connected host (`eval`). Every command prints a single JSON document.

pub mod cli;
pub mod client;
pub mod commands;
pub mod error;
pub mod lifecycle;
pub mod logging;
pub mod output;
pub mod selection;
