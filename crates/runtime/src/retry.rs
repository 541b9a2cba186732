//! Retry policy applied by the connection layer to retryable faults.

use std::time::Duration;

/// Retries a failed call a fixed number of times with a fixed sleep in between.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
	max_retries: Option<u32>,
	sleep_between: Duration,
}

impl RetryPolicy {
	/// Allows up to `max_retries` retries after the first attempt.
	pub fn n_times(max_retries: u32, sleep_between: Duration) -> Self {
		Self {
			max_retries: Some(max_retries),
			sleep_between,
		}
	}

	/// Never stops retrying.
	pub fn forever(sleep_between: Duration) -> Self {
		Self {
			max_retries: None,
			sleep_between,
		}
	}

	/// Returns the retry limit, or `None` when unbounded.
	pub fn max_retries(&self) -> Option<u32> {
		self.max_retries
	}

	pub fn sleep_between(&self) -> Duration {
		self.sleep_between
	}

	/// Returns the sleep before retry number `retry_count` (zero-based), or
	/// `None` once the policy is exhausted.
	pub fn allow_retry(&self, retry_count: u32) -> Option<Duration> {
		match self.max_retries {
			Some(max) if retry_count >= max => None,
			_ => Some(self.sleep_between),
		}
	}
}
