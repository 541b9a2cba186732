//! Retry configuration handed to the connection layer.

use std::time::Duration;

use serde::{Deserialize, Deserializer, Serialize};
use zk_runtime::RetryPolicy;

const DEFAULT_ATTEMPTS: u32 = 3;
const DEFAULT_DELAY: Duration = Duration::from_secs(5);

/// Attempt count, per-attempt timeout and delay between attempts.
///
/// `max_attempts` of `None` retries forever. A bounded count is at least 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RetryStrategy {
	#[serde(deserialize_with = "at_least_one")]
	max_attempts: Option<u32>,
	#[serde(rename = "attemptTimeoutMs", with = "duration_ms")]
	attempt_timeout: Duration,
	#[serde(rename = "attemptDelayMs", with = "duration_ms")]
	attempt_delay: Duration,
}

impl RetryStrategy {
	pub fn new(max_attempts: u32, attempt_timeout: Duration, attempt_delay: Duration) -> Self {
		Self {
			max_attempts: Some(max_attempts.max(1)),
			attempt_timeout,
			attempt_delay,
		}
	}

	pub fn unbounded(attempt_timeout: Duration, attempt_delay: Duration) -> Self {
		Self {
			max_attempts: None,
			attempt_timeout,
			attempt_delay,
		}
	}

	/// Three attempts, each bounded by the session timeout, 5 s apart.
	pub fn default_for(session_timeout: Duration) -> Self {
		Self::new(DEFAULT_ATTEMPTS, session_timeout, DEFAULT_DELAY)
	}

	/// Unbounded attempts, each bounded by the session timeout, 5 s apart.
	pub fn infinite(session_timeout: Duration) -> Self {
		Self::unbounded(session_timeout, DEFAULT_DELAY)
	}

	pub fn max_attempts(&self) -> Option<u32> {
		self.max_attempts
	}

	pub fn attempt_timeout(&self) -> Duration {
		self.attempt_timeout
	}

	pub fn attempt_delay(&self) -> Duration {
		self.attempt_delay
	}

	/// Policy for the connection layer: one retry per attempt beyond the first.
	pub fn retry_policy(&self) -> RetryPolicy {
		match self.max_attempts {
			Some(attempts) => RetryPolicy::n_times(attempts.saturating_sub(1), self.attempt_delay),
			None => RetryPolicy::forever(self.attempt_delay),
		}
	}

	/// How long one attempt waits for a live connection.
	pub fn connection_timeout(&self) -> Duration {
		self.attempt_timeout
	}
}

fn at_least_one<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<u32>, D::Error> {
	Ok(Option::<u32>::deserialize(deserializer)?.map(|attempts| attempts.max(1)))
}

pub(crate) mod duration_ms {
	use std::time::Duration;

	use serde::{Deserialize, Deserializer, Serializer};

	pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
		serializer.serialize_u64(duration.as_millis() as u64)
	}

	pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
		u64::deserialize(deserializer).map(Duration::from_millis)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn presets() {
		let timeout = Duration::from_secs(10);
		let default = RetryStrategy::default_for(timeout);
		assert_eq!(default.max_attempts(), Some(3));
		assert_eq!(default.attempt_timeout(), timeout);
		assert_eq!(default.attempt_delay(), Duration::from_secs(5));

		let infinite = RetryStrategy::infinite(timeout);
		assert_eq!(infinite.max_attempts(), None);
		assert_ne!(default, infinite);
		assert_eq!(default, RetryStrategy::new(3, timeout, Duration::from_secs(5)));
	}

	#[test]
	fn attempts_are_clamped() {
		let strategy = RetryStrategy::new(0, Duration::from_secs(1), Duration::ZERO);
		assert_eq!(strategy.max_attempts(), Some(1));
		assert_eq!(strategy.retry_policy().allow_retry(0), None);
	}

	#[test]
	fn retry_policy_mirrors_attempts() {
		let strategy = RetryStrategy::new(3, Duration::from_secs(2), Duration::from_millis(50));
		let policy = strategy.retry_policy();
		assert_eq!(policy.max_retries(), Some(2));
		assert_eq!(policy.sleep_between(), Duration::from_millis(50));
		assert_eq!(strategy.connection_timeout(), Duration::from_secs(2));
		assert_eq!(RetryStrategy::infinite(Duration::from_secs(1)).retry_policy().max_retries(), None);
	}

	#[test]
	fn default_preset_makes_three_attempts() {
		let policy = RetryStrategy::default_for(Duration::from_secs(10)).retry_policy();
		assert_eq!(policy.max_retries(), Some(2));
		assert_eq!(RetryStrategy::new(1, Duration::from_secs(1), Duration::ZERO).retry_policy().max_retries(), Some(0));
	}

	#[test]
	fn json_shape() {
		let strategy: RetryStrategy = serde_json::from_str(r#"{"maxAttempts":0,"attemptTimeoutMs":1500,"attemptDelayMs":20}"#).unwrap();
		assert_eq!(strategy, RetryStrategy::new(1, Duration::from_millis(1500), Duration::from_millis(20)));

		let unbounded: RetryStrategy = serde_json::from_str(r#"{"maxAttempts":null,"attemptTimeoutMs":1,"attemptDelayMs":2}"#).unwrap();
		assert_eq!(unbounded.max_attempts(), None);

		let json = serde_json::to_value(strategy).unwrap();
		assert_eq!(json["attemptTimeoutMs"], 1500);
	}
}
