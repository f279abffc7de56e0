use std::time::Duration;

use evalbridge_protocol::EvalRequest;
use tokio::io::AsyncReadExt;
use tracing::{debug, warn};

use crate::cli::EvalArgs;
use crate::client::{BrokerClient, unique_id};
use crate::error::Result;
use crate::lifecycle::Daemon;
use crate::output::{EvalOutput, print_json};
use crate::selection::resolve_client;

/// Upper bound on waiting for the host, above the broker's own request deadline.
pub const EVAL_TIMEOUT: Duration = Duration::from_secs(35);

pub async fn run(daemon: &Daemon, args: EvalArgs) -> Result<bool> {
	let script = read_stdin().await;
	let output = evaluate(daemon, &script, args.client.as_deref(), EVAL_TIMEOUT).await?;
	print_json(&output)?;
	Ok(output.ok)
}

/// Ensures a broker is running and evaluates `script` on the selected host.
///
/// Only lifecycle failures are errors; everything that happens once a broker is up ends in an
/// [`EvalOutput`].
pub async fn evaluate(daemon: &Daemon, script: &str, requested: Option<&str>, timeout: Duration) -> Result<EvalOutput> {
	let status = daemon.ensure_running().await?;
	if let Err(err) = resolve_client(&status.clients, requested) {
		return Ok(EvalOutput::local_failure("Error", err.to_string()));
	}

	match tokio::time::timeout(timeout, submit(daemon.port(), script, requested)).await {
		Ok(Ok(output)) => Ok(output),
		Ok(Err(err)) => {
			debug!(target = "evalbridge.cli", error = %err, "eval socket failed");
			Ok(EvalOutput::local_failure("Error", "eval socket closed"))
		}
		Err(_) => Ok(EvalOutput::local_failure("TimeoutError", "eval request timed out")),
	}
}

/// Re-resolves the target on a fresh status snapshot, then sends the request on the same socket.
async fn submit(port: u16, script: &str, requested: Option<&str>) -> Result<EvalOutput> {
	let mut client = BrokerClient::connect(port).await?;
	let status = client.status().await?;
	let client_id = match resolve_client(&status.clients, requested) {
		Ok(client_id) => client_id,
		Err(err) => {
			client.close().await;
			return Ok(EvalOutput::local_failure("Error", err.to_string()));
		}
	};

	let request = EvalRequest::new(unique_id("eval"), Some(client_id), script);
	let response = client.eval(request).await?;
	client.close().await;
	Ok(EvalOutput::from(response))
}

async fn read_stdin() -> String {
	let mut script = String::new();
	if let Err(err) = tokio::io::stdin().read_to_string(&mut script).await {
		warn!(target = "evalbridge.cli", error = %err, "failed to read script from stdin");
		script.clear();
	}
	script
}
