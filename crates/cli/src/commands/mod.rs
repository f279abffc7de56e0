pub mod daemon;
pub mod eval;

use crate::cli::{Cli, Commands};
use crate::error::Result;
use crate::lifecycle::Daemon;

/// Runs the parsed command. `Ok(false)` means the command printed a failure and the process
/// should exit non-zero.
pub async fn dispatch(cli: Cli) -> Result<bool> {
	let broker = Daemon::new(cli.port, cli.pid_file());

	match cli.command {
		Commands::Status => daemon::status(&broker).await.map(|_| true),
		Commands::Start(args) => daemon::start(broker, args).await.map(|_| true),
		Commands::Stop => daemon::stop(&broker).await.map(|_| true),
		Commands::Restart(args) => daemon::restart(broker, args).await.map(|_| true),
		Commands::Eval(args) => eval::run(&broker, args).await,
	}
}
