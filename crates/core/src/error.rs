//! Errors raised by the client core.
//!
//! Node operations never raise: they return an [`OpResult`](crate::OpResult)
//! whose status describes the outcome. [`Error`] is reserved for callers who
//! assert success, for the explicit waits, and for loading settings.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;
use zk_runtime::Fault;

use crate::status::ResultStatus;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
	/// Success was asserted on a failed result.
	#[error("ZooKeeper operation has failed with status '{status}' for path '{path}'.")]
	OperationFailed { status: ResultStatus, path: String },

	#[error("{0}")]
	Timeout(String),

	/// Raised by the connection layer outside a node operation.
	#[error("connection layer fault: {0}")]
	Session(#[from] Fault),

	/// The client was started outside a tokio runtime.
	#[error("no tokio runtime to run connection-state dispatch: {0}")]
	Runtime(#[from] tokio::runtime::TryCurrentError),

	#[error("invalid client settings: {0}")]
	Settings(#[from] serde_json::Error),

	#[error("failed to read {}: {source}", .path.display())]
	Io {
		path: PathBuf,
		#[source]
		source: std::io::Error,
	},
}

impl Error {
	pub(crate) fn kill_timeout(timeout: Duration) -> Self {
		Self::Timeout(format!("Expected to kill session within {timeout:?}, but failed to do so."))
	}

	pub(crate) fn connect_timeout(timeout: Duration) -> Self {
		Self::Timeout(format!("Expected to connect within {timeout:?}, but failed to do so."))
	}

	/// Returns the failed status when this is an assertion failure.
	pub fn status(&self) -> Option<ResultStatus> {
		match self {
			Self::OperationFailed { status, .. } => Some(*status),
			_ => None,
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn operation_failed_names_status_and_path() {
		let err = Error::OperationFailed {
			status: ResultStatus::NoNode,
			path: "/a/b".into(),
		};
		assert_eq!(err.to_string(), "ZooKeeper operation has failed with status 'NoNode' for path '/a/b'.");
		assert_eq!(err.status(), Some(ResultStatus::NoNode));
	}

	#[test]
	fn timeouts_name_the_deadline() {
		let err = Error::kill_timeout(Duration::from_secs(3));
		assert_eq!(err.to_string(), "Expected to kill session within 3s, but failed to do so.");
		assert_eq!(err.status(), None);
	}
}
