//! Client configuration.
//!
//! Settings can be built in code or read from JSON:
//!
//! ```json
//! {
//!   "connectionString": "zk1:2181,zk2:2181",
//!   "sessionTimeoutMs": 10000,
//!   "retry": { "maxAttempts": 3, "attemptTimeoutMs": 10000, "attemptDelayMs": 5000 },
//!   "namespace": "/service",
//!   "canBeReadOnly": false
//! }
//! ```
//!
//! Only `connectionString` is required.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::retry::{RetryStrategy, duration_ms};

/// Session timeout used when none is configured.
pub const DEFAULT_SESSION_TIMEOUT: Duration = Duration::from_secs(10);

fn default_session_timeout() -> Duration {
	DEFAULT_SESSION_TIMEOUT
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientSettings {
	connection_string: String,
	#[serde(rename = "sessionTimeoutMs", with = "duration_ms", default = "default_session_timeout")]
	session_timeout: Duration,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	retry: Option<RetryStrategy>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	namespace: Option<String>,
	#[serde(default)]
	can_be_read_only: bool,
}

impl ClientSettings {
	pub fn new(connection_string: impl Into<String>) -> Self {
		Self {
			connection_string: connection_string.into(),
			session_timeout: DEFAULT_SESSION_TIMEOUT,
			retry: None,
			namespace: None,
			can_be_read_only: false,
		}
	}

	pub fn with_session_timeout(mut self, session_timeout: Duration) -> Self {
		self.session_timeout = session_timeout;
		self
	}

	pub fn with_retry_strategy(mut self, retry: RetryStrategy) -> Self {
		self.retry = Some(retry);
		self
	}

	pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
		self.namespace = Some(namespace.into());
		self
	}

	pub fn with_read_only(mut self, can_be_read_only: bool) -> Self {
		self.can_be_read_only = can_be_read_only;
		self
	}

	pub fn from_json_str(json: &str) -> Result<Self> {
		Ok(serde_json::from_str(json)?)
	}

	/// Reads settings from a JSON file.
	pub fn load(path: impl AsRef<Path>) -> Result<Self> {
		let path = path.as_ref();
		let json = std::fs::read_to_string(path).map_err(|source| Error::Io {
			path: path.to_path_buf(),
			source,
		})?;
		Self::from_json_str(&json)
	}

	/// Connection string with surrounding whitespace removed.
	pub fn connection_string(&self) -> &str {
		self.connection_string.trim()
	}

	pub fn session_timeout(&self) -> Duration {
		self.session_timeout
	}

	/// Configured strategy, or the default preset for the session timeout.
	pub fn retry_strategy(&self) -> RetryStrategy {
		self.retry.unwrap_or_else(|| RetryStrategy::default_for(self.session_timeout))
	}

	/// Namespace without its leading slash; blank means none.
	pub fn namespace(&self) -> Option<&str> {
		normalize_namespace(self.namespace.as_deref())
	}

	pub fn can_be_read_only(&self) -> bool {
		self.can_be_read_only
	}
}

pub(crate) fn normalize_namespace(namespace: Option<&str>) -> Option<&str> {
	let namespace = namespace?.trim().trim_start_matches('/');
	(!namespace.is_empty()).then_some(namespace)
}
