//! Deadline timers behind a swappable capability.
//!
//! The broker never sleeps itself. It asks a [`Clock`] to arm a deadline and later receives a
//! `DeadlineFired` event carrying the same [`DeadlineKey`]. [`TokioClock`] backs this with tokio
//! sleep tasks; [`ManualClock`] lets tests decide when time passes.

use std::collections::{BTreeMap, HashMap};
use std::time::{Duration, Instant};

use tokio::sync::mpsc;
use tokio::task::AbortHandle;

/// Identifies one armed deadline.
///
/// `seq` is unique per arm, so a timer left over from a resolved request cannot expire a newer
/// request that reuses the same id.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DeadlineKey {
	pub request_id: String,
	pub seq: u64,
}

pub trait Clock {
	fn now(&self) -> Instant;

	/// Schedules a `DeadlineFired(key)` event after `after` has elapsed.
	fn arm(&mut self, key: DeadlineKey, after: Duration);

	/// Cancels a scheduled deadline. Unknown keys are ignored.
	fn disarm(&mut self, key: &DeadlineKey);
}

/// Deadlines as tokio tasks that report back through a channel.
#[derive(Debug)]
pub struct TokioClock {
	fired: mpsc::UnboundedSender<DeadlineKey>,
	timers: HashMap<DeadlineKey, AbortHandle>,
}

impl TokioClock {
	pub fn new(fired: mpsc::UnboundedSender<DeadlineKey>) -> Self {
		Self {
			fired,
			timers: HashMap::new(),
		}
	}
}

impl Clock for TokioClock {
	fn now(&self) -> Instant {
		Instant::now()
	}

	fn arm(&mut self, key: DeadlineKey, after: Duration) {
		let fired = self.fired.clone();
		let fired_key = key.clone();
		let task = tokio::spawn(async move {
			tokio::time::sleep(after).await;
			let _ = fired.send(fired_key);
		});
		if let Some(previous) = self.timers.insert(key, task.abort_handle()) {
			previous.abort();
		}
	}

	fn disarm(&mut self, key: &DeadlineKey) {
		if let Some(timer) = self.timers.remove(key) {
			timer.abort();
		}
	}
}

impl Drop for TokioClock {
	fn drop(&mut self) {
		for (_, timer) in self.timers.drain() {
			timer.abort();
		}
	}
}

/// Clock whose time only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
	now: Instant,
	armed: BTreeMap<DeadlineKey, Instant>,
}

impl Default for ManualClock {
	fn default() -> Self {
		Self::new()
	}
}

impl ManualClock {
	pub fn new() -> Self {
		Self {
			now: Instant::now(),
			armed: BTreeMap::new(),
		}
	}

	/// Moves time forward and returns the deadlines that elapsed, earliest first.
	///
	/// Returned keys are no longer armed; feed them back as `DeadlineFired` events.
	pub fn advance(&mut self, by: Duration) -> Vec<DeadlineKey> {
		self.now += by;
		let now = self.now;
		let mut due: Vec<(Instant, DeadlineKey)> = self
			.armed
			.iter()
			.filter(|(_, deadline)| **deadline <= now)
			.map(|(key, deadline)| (*deadline, key.clone()))
			.collect();
		due.sort();
		for (_, key) in &due {
			self.armed.remove(key);
		}
		due.into_iter().map(|(_, key)| key).collect()
	}

	pub fn armed_count(&self) -> usize {
		self.armed.len()
	}

	pub fn is_armed(&self, request_id: &str) -> bool {
		self.armed.keys().any(|key| key.request_id == request_id)
	}
}

impl Clock for ManualClock {
	fn now(&self) -> Instant {
		self.now
	}

	fn arm(&mut self, key: DeadlineKey, after: Duration) {
		self.armed.insert(key, self.now + after);
	}

	fn disarm(&mut self, key: &DeadlineKey) {
		self.armed.remove(key);
	}
}
