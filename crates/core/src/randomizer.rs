//! Reorders the ensemble member list after sustained connection flapping.
//!
//! Every `Suspended` notification is a check. Checks are recorded in a ring
//! of the last six; once the ring is full and its oldest entry is within ten
//! minutes of now, the member list is reshuffled and the ring cleared. No
//! check is recorded for a minute after a reshuffle, the minute included.

use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use zk_protocol::ConnectionState;
use zk_runtime::EnsembleProvider;

const CAPACITY: usize = 6;
const WINDOW: Duration = Duration::from_secs(10 * 60);
const COOLDOWN: Duration = Duration::from_secs(60);

pub struct EnsembleStringRandomizer {
	provider: Arc<dyn EnsembleProvider>,
	state: Mutex<RandomizerState>,
}

#[derive(Default)]
struct RandomizerState {
	checks: [Option<Instant>; CAPACITY],
	next: usize,
	last_randomization: Option<Instant>,
}

impl RandomizerState {
	fn record(&mut self, now: Instant) {
		self.checks[self.next] = Some(now);
		self.next = (self.next + 1) % CAPACITY;
	}

	fn is_full_within(&self, now: Instant) -> bool {
		self.checks.iter().all(|check| check.is_some_and(|at| now.saturating_duration_since(at) <= WINDOW))
	}

	fn clear(&mut self) {
		self.checks = [None; CAPACITY];
		self.next = 0;
	}
}

impl EnsembleStringRandomizer {
	pub fn new(provider: Arc<dyn EnsembleProvider>) -> Self {
		Self {
			provider,
			state: Mutex::new(RandomizerState::default()),
		}
	}

	/// Feeds one connection-state notification. Returns `true` when the
	/// member list was reshuffled.
	pub fn on_state(&self, state: ConnectionState) -> bool {
		state == ConnectionState::Suspended && self.randomize_if_needed()
	}

	pub fn randomize_if_needed(&self) -> bool {
		self.randomize_if_needed_at(Instant::now())
	}

	/// Runs one check as of `now`.
	pub fn randomize_if_needed_at(&self, now: Instant) -> bool {
		let Some(provider) = self.provider.as_randomized() else {
			return false;
		};

		let mut state = self.state.lock();
		if state.last_randomization.is_some_and(|at| now.saturating_duration_since(at) <= COOLDOWN) {
			return false;
		}

		state.record(now);
		if !state.is_full_within(now) {
			return false;
		}

		provider.randomize();
		state.last_randomization = Some(now);
		state.clear();
		true
	}
}
