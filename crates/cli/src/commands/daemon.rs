use tracing::info;

use crate::cli::StartArgs;
use crate::error::Result;
use crate::lifecycle::Daemon;
use crate::output::print_json;

pub async fn status(daemon: &Daemon) -> Result<()> {
	print_json(&daemon.status().await)?;
	Ok(())
}

pub async fn start(daemon: Daemon, args: StartArgs) -> Result<()> {
	let daemon = daemon.with_request_timeout(args.request_timeout());

	if args.foreground {
		info!(target = "evalbridge.cli", port = daemon.port(), "running broker in foreground");
		return daemon.run_foreground().await;
	}

	let daemon = daemon.with_log_file(args.log_file);
	daemon.ensure_running().await?;
	status(&daemon).await
}

pub async fn stop(daemon: &Daemon) -> Result<()> {
	daemon.stop().await;
	status(daemon).await
}

pub async fn restart(daemon: Daemon, args: StartArgs) -> Result<()> {
	daemon.stop().await;
	start(daemon, args).await
}
