//! Broker process lifecycle as seen from the CLI: pid file, liveness, detached start and stop.

use std::path::PathBuf;
use std::process::{Child, Command, Stdio};
use std::time::{Duration, Instant};

use evalbridge_broker::{BrokerConfig, BrokerServer, config, pidfile};
use tracing::{debug, info, warn};

use crate::client::request_status;
use crate::error::{CliError, Result};
use crate::output::StatusReport;

const STATUS_TIMEOUT: Duration = Duration::from_millis(800);
const START_TIMEOUT: Duration = Duration::from_secs(2);
const START_PROBE_TIMEOUT: Duration = Duration::from_millis(400);
const START_POLL_INTERVAL: Duration = Duration::from_millis(100);
const STOP_TIMEOUT: Duration = Duration::from_secs(2);
const STOP_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Handle on the broker identified by a port and a pid file.
#[derive(Debug, Clone)]
pub struct Daemon {
	port: u16,
	pid_file: PathBuf,
	log_file: Option<PathBuf>,
	request_timeout: Option<Duration>,
}

impl Daemon {
	pub fn new(port: u16, pid_file: impl Into<PathBuf>) -> Self {
		Self {
			port,
			pid_file: pid_file.into(),
			log_file: None,
			request_timeout: None,
		}
	}

	/// Log file handed to a detached broker. Defaults to the runtime dir.
	pub fn with_log_file(mut self, path: Option<PathBuf>) -> Self {
		self.log_file = path;
		self
	}

	pub fn with_request_timeout(mut self, timeout: Option<Duration>) -> Self {
		self.request_timeout = timeout;
		self
	}

	pub fn port(&self) -> u16 {
		self.port
	}

	pub fn pid(&self) -> Option<u32> {
		pidfile::read(&self.pid_file)
	}

	pub async fn status(&self) -> StatusReport {
		let Some(pid) = self.pid() else {
			return StatusReport::stopped();
		};
		if !process_alive(pid) {
			self.clear_pid_file();
			return StatusReport::stopped();
		}

		match request_status(self.port, STATUS_TIMEOUT).await {
			Ok(response) => StatusReport::from_response(response, Some(pid)),
			Err(err) => {
				debug!(target = "evalbridge.lifecycle", pid, error = %err, "broker did not answer status");
				StatusReport::unresponsive(pid)
			}
		}
	}

	/// Returns a listening broker's status, restarting or starting it as needed.
	pub async fn ensure_running(&self) -> Result<StatusReport> {
		match self.pid() {
			Some(pid) if process_alive(pid) => {
				match request_status(self.port, STATUS_TIMEOUT).await {
					Ok(response) if response.daemon.listening => {
						return Ok(StatusReport::from_response(response, Some(pid)));
					}
					Ok(_) => info!(target = "evalbridge.lifecycle", pid, "broker not listening, restarting"),
					Err(err) => info!(target = "evalbridge.lifecycle", pid, error = %err, "broker unresponsive, restarting"),
				}
				self.stop().await;
			}
			Some(pid) => {
				debug!(target = "evalbridge.lifecycle", pid, "removing stale pid file");
				self.clear_pid_file();
			}
			None => {}
		}
		self.start().await
	}

	/// Spawns a detached broker and waits for it to answer.
	pub async fn start(&self) -> Result<StatusReport> {
		let exe = std::env::current_exe().map_err(CliError::Spawn)?;
		let log_file = self.log_file.clone().unwrap_or_else(config::default_log_file);

		let mut command = Command::new(exe);
		command
			.arg("--port")
			.arg(self.port.to_string())
			.arg("--pid-file")
			.arg(&self.pid_file)
			.arg("start")
			.arg("--foreground")
			.arg("--log-file")
			.arg(&log_file);
		if let Some(timeout) = self.request_timeout {
			command
				.arg("--request-timeout-ms")
				.arg(timeout.as_millis().to_string());
		}
		command
			.stdin(Stdio::null())
			.stdout(Stdio::null())
			.stderr(Stdio::null());
		detach(&mut command);

		let mut child = command.spawn().map_err(CliError::Spawn)?;
		info!(target = "evalbridge.lifecycle", pid = child.id(), log_file = %log_file.display(), "spawned broker");

		self.wait_ready(&mut child).await
	}

	/// Polls until the broker answers, giving up early if `child` exits first.
	async fn wait_ready(&self, child: &mut Child) -> Result<StatusReport> {
		let started = Instant::now();
		while started.elapsed() < START_TIMEOUT {
			if let Some(exit) = child.try_wait()? {
				warn!(target = "evalbridge.lifecycle", pid = child.id(), %exit, "broker exited during startup");
				return Err(CliError::DaemonDidNotStart);
			}
			match request_status(self.port, START_PROBE_TIMEOUT).await {
				Ok(response) if response.daemon.listening => {
					return Ok(StatusReport::from_response(response, self.pid()));
				}
				Ok(_) => {}
				Err(err) => debug!(target = "evalbridge.lifecycle", error = %err, "broker not ready yet"),
			}
			tokio::time::sleep(START_POLL_INTERVAL).await;
		}
		Err(CliError::DaemonDidNotStart)
	}

	/// Sends SIGTERM and waits briefly for the broker to exit. The pid file is removed either way.
	pub async fn stop(&self) {
		let Some(pid) = self.pid() else {
			return;
		};
		if !process_alive(pid) {
			self.clear_pid_file();
			return;
		}

		terminate(pid);
		let started = Instant::now();
		while started.elapsed() < STOP_TIMEOUT && process_alive(pid) {
			tokio::time::sleep(STOP_POLL_INTERVAL).await;
		}
		if process_alive(pid) {
			warn!(target = "evalbridge.lifecycle", pid, "broker still running after SIGTERM");
		}
		self.clear_pid_file();
	}

	/// Runs the broker in this process until SIGINT or SIGTERM.
	pub async fn run_foreground(&self) -> Result<()> {
		let mut config = BrokerConfig::default()
			.with_port(self.port)
			.with_pid_file(&self.pid_file);
		if let Some(timeout) = self.request_timeout {
			config = config.with_request_timeout(timeout);
		}
		let server = BrokerServer::bind(config).await?;
		server.run().await?;
		Ok(())
	}

	fn clear_pid_file(&self) {
		if let Err(err) = pidfile::remove(&self.pid_file) {
			warn!(target = "evalbridge.lifecycle", path = %self.pid_file.display(), error = %err, "failed to remove pid file");
		}
	}
}

/// Whether a process with this id exists.
#[cfg(unix)]
pub fn process_alive(pid: u32) -> bool {
	let Ok(pid) = libc::pid_t::try_from(pid) else {
		return false;
	};
	if pid <= 0 {
		return false;
	}
	// SAFETY: signal 0 only performs the existence and permission check.
	if unsafe { libc::kill(pid, 0) } == 0 {
		return true;
	}
	std::io::Error::last_os_error().raw_os_error() == Some(libc::EPERM)
}

#[cfg(not(unix))]
pub fn process_alive(_pid: u32) -> bool {
	false
}

#[cfg(unix)]
fn terminate(pid: u32) {
	let Ok(pid) = libc::pid_t::try_from(pid) else {
		return;
	};
	// SAFETY: plain kill(2) on a pid read from our own pid file.
	if unsafe { libc::kill(pid, libc::SIGTERM) } != 0 {
		debug!(target = "evalbridge.lifecycle", pid, error = %std::io::Error::last_os_error(), "SIGTERM failed");
	}
}

#[cfg(not(unix))]
fn terminate(_pid: u32) {}

/// Puts the child in its own process group so it outlives the invoking shell.
#[cfg(unix)]
fn detach(command: &mut Command) {
	use std::os::unix::process::CommandExt;

	command.process_group(0);
}

#[cfg(not(unix))]
fn detach(_command: &mut Command) {}
