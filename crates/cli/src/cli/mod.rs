
use std::path::PathBuf;
use std::time::Duration;

use clap::builder::Styles;
use clap::builder::styling::AnsiColor;
use clap::{Args, Parser, Subcommand};
use evalbridge_broker::config;
use evalbridge_protocol::DEFAULT_PORT;

/// Drive scripts into sandboxed hosts through the local evalbridge broker.
#[derive(Parser, Debug)]
#[command(name = "evalbridge")]
#[command(about = "Relay eval requests to sandboxed script hosts through a local broker")]
#[command(version)]
#[command(styles = help_styles())]
pub struct Cli {
	/// Increase verbosity (-v info, -vv debug)
	#[arg(short, long, global = true, action = clap::ArgAction::Count)]
	pub verbose: u8,

	/// Broker port on 127.0.0.1
	#[arg(long, global = true, env = "EVALBRIDGE_PORT", default_value_t = DEFAULT_PORT)]
	pub port: u16,

	/// Broker pid file [default: $XDG_RUNTIME_DIR/evalbridge.pid]
	#[arg(long, global = true, env = "EVALBRIDGE_PID_FILE", value_name = "PATH")]
	pub pid_file: Option<PathBuf>,

	#[command(subcommand)]
	pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
	/// Print broker status and connected hosts.
	Status,
	/// Start the broker unless it is already running.
	Start(StartArgs),
	/// Stop a running broker.
	Stop,
	/// Stop, then start the broker.
	Restart(StartArgs),
	/// Run a script read from stdin on a connected host.
	Eval(EvalArgs),
}

#[derive(Args, Debug, Clone, Default)]
pub struct StartArgs {
	/// Run the broker in this process until SIGINT/SIGTERM.
	#[arg(long)]
	pub foreground: bool,

	/// Append broker logs to this file instead of stderr.
	#[arg(long, value_name = "PATH")]
	pub log_file: Option<PathBuf>,

	/// How long the broker waits for a host to answer an eval request.
	#[arg(long, value_name = "MS", env = "EVALBRIDGE_REQUEST_TIMEOUT_MS")]
	pub request_timeout_ms: Option<u64>,
}

impl StartArgs {
	pub fn request_timeout(&self) -> Option<Duration> {
		self.request_timeout_ms.map(Duration::from_millis)
	}
}

#[derive(Args, Debug, Clone, Default)]
pub struct EvalArgs {
	/// Target host, by identifier or by index in the status client list.
	#[arg(long, value_name = "ID|INDEX")]
	pub client: Option<String>,
}

impl Cli {
	pub fn pid_file(&self) -> PathBuf {
		self.pid_file.clone().unwrap_or_else(config::default_pid_file)
	}

	/// Log destination for this invocation. Only a foreground broker writes to a file.
	pub fn log_file(&self) -> Option<&PathBuf> {
		match &self.command {
			Commands::Start(args) | Commands::Restart(args) if args.foreground => args.log_file.as_ref(),
			_ => None,
		}
	}
}

fn help_styles() -> Styles {
	Styles::styled()
		.header(AnsiColor::Yellow.on_default().bold())
		.usage(AnsiColor::Yellow.on_default().bold())
		.literal(AnsiColor::Green.on_default())
		.placeholder(AnsiColor::Cyan.on_default())
}
