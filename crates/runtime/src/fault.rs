//! Faults raised by the connection layer.

use thiserror::Error;
use zk_protocol::KeeperCode;

/// Result alias for connection-layer calls.
pub type FaultResult<T> = std::result::Result<T, Fault>;

/// A fault raised while executing a call against the ensemble.
///
/// The client core classifies these into result statuses; nothing above the
/// core sees a `Fault` from an ordinary operation.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum Fault {
	/// The server (or the transport on its behalf) answered with a response code.
	#[error("{code} for path {}", .path.as_deref().unwrap_or("<none>"))]
	Keeper { code: KeeperCode, path: Option<String> },

	/// A call argument was rejected before reaching the server.
	#[error("illegal argument: {0}")]
	IllegalArgument(String),

	/// The connection is not in a state that permits the call.
	#[error("illegal state: {0}")]
	IllegalState(String),

	/// The call is not supported by this handle.
	#[error("unsupported operation: {0}")]
	Unsupported(String),

	/// Anything else.
	#[error("{0}")]
	Other(String),
}

impl Fault {
	/// Builds a response-code fault for `path`.
	pub fn keeper(code: KeeperCode, path: impl Into<String>) -> Self {
		Self::Keeper {
			code,
			path: Some(path.into()),
		}
	}

	/// Builds a connection-loss fault with no path.
	pub fn connection_loss() -> Self {
		Self::Keeper {
			code: KeeperCode::ConnectionLoss,
			path: None,
		}
	}

	/// Returns the server response code, if this fault carries one.
	pub fn code(&self) -> Option<KeeperCode> {
		match self {
			Self::Keeper { code, .. } => Some(*code),
			_ => None,
		}
	}

	/// Returns `true` for faults a retry policy may attempt again.
	pub fn is_retryable(&self) -> bool {
		matches!(
			self.code(),
			Some(KeeperCode::ConnectionLoss | KeeperCode::OperationTimeout | KeeperCode::SessionMoved | KeeperCode::SessionExpired)
		)
	}
}
