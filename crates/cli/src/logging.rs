use std::fs::OpenOptions;
use std::path::Path;
use std::sync::Mutex;

use anyhow::{Context, Result};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::writer::{BoxMakeWriter, MakeWriterExt};

/// Installs the global subscriber. `RUST_LOG` overrides the verbosity flag.
pub fn init_logging(verbosity: u8, log_file: Option<&Path>) -> Result<()> {
	// 0 = warnings only, 1 (-v) = info, 2+ (-vv) = debug
	let filter = match verbosity {
		0 => "warn",
		1 => "info",
		_ => "debug",
	};
	let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

	let (writer, ansi) = match log_file {
		Some(path) => {
			let file = OpenOptions::new()
				.create(true)
				.append(true)
				.open(path)
				.with_context(|| format!("Failed to open log file: {}", path.display()))?;
			(BoxMakeWriter::new(Mutex::new(file)), false)
		}
		None => (
			BoxMakeWriter::new(std::io::stderr.with_max_level(tracing::Level::TRACE)),
			true,
		),
	};

	tracing_subscriber::fmt()
		.with_env_filter(env_filter)
		.with_writer(writer)
		.with_ansi(ansi)
		.with_target(true)
		.with_level(true)
		.compact()
		.try_init()
		.map_err(|err| anyhow::anyhow!(err))
		.context("Failed to install log subscriber")
}
