use std::process::ExitCode;

use clap::Parser;
use evalbridge_cli::{cli::Cli, commands, logging};

#[tokio::main]
async fn main() -> ExitCode {
	let cli = Cli::parse();
	if let Err(err) = logging::init_logging(cli.verbose, cli.log_file().map(|path| path.as_path())) {
		eprintln!("error: {err:#}");
		return ExitCode::FAILURE;
	}

	match commands::dispatch(cli).await {
		Ok(true) => ExitCode::SUCCESS,
		Ok(false) => ExitCode::FAILURE,
		Err(err) => {
			eprintln!("error: {err}");
			ExitCode::FAILURE
		}
	}
}
