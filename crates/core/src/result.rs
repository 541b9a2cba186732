//! Per-call outcome carrying status, path and optional payload.

use std::fmt;

use crate::error::{Error, Result};
use crate::status::ResultStatus;

/// Outcome of one client operation.
///
/// The payload of a failed result is never exposed; [`payload`](Self::payload)
/// asserts success first. Results are immutable once built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpResult<T = ()> {
	status: ResultStatus,
	path: String,
	payload: Option<T>,
}

impl<T> OpResult<T> {
	pub fn ok(path: impl Into<String>, payload: T) -> Self {
		Self {
			status: ResultStatus::Ok,
			path: path.into(),
			payload: Some(payload),
		}
	}

	/// Builds a failed result. `Ok` is accepted but leaves the payload empty.
	pub fn failed(status: ResultStatus, path: impl Into<String>) -> Self {
		Self {
			status,
			path: path.into(),
			payload: None,
		}
	}

	pub fn status(&self) -> ResultStatus {
		self.status
	}

	pub fn path(&self) -> &str {
		&self.path
	}

	pub fn is_successful(&self) -> bool {
		self.status == ResultStatus::Ok
	}

	pub fn is_system_error(&self) -> bool {
		self.status.is_system_error()
	}

	pub fn is_api_error(&self) -> bool {
		self.status.is_api_error()
	}

	/// Fails with [`Error::OperationFailed`] unless the status is `Ok`.
	pub fn ensure_success(&self) -> Result<()> {
		if self.is_successful() {
			Ok(())
		} else {
			Err(Error::OperationFailed {
				status: self.status,
				path: self.path.clone(),
			})
		}
	}

	/// Chaining form of [`ensure_success`](Self::ensure_success).
	pub fn check(self) -> Result<Self> {
		self.ensure_success()?;
		Ok(self)
	}

	/// Returns the payload of a successful result.
	pub fn payload(&self) -> Result<&T> {
		self.ensure_success()?;
		self.payload.as_ref().ok_or_else(|| self.missing())
	}

	pub fn into_payload(self) -> Result<T> {
		self.ensure_success()?;
		match self.payload {
			Some(payload) => Ok(payload),
			None => Err(Error::OperationFailed {
				status: self.status,
				path: self.path,
			}),
		}
	}

	/// Maps the payload, keeping status and path.
	pub fn map<U>(self, f: impl FnOnce(T) -> U) -> OpResult<U> {
		OpResult {
			status: self.status,
			path: self.path,
			payload: self.payload.map(f),
		}
	}

	fn missing(&self) -> Error {
		Error::OperationFailed {
			status: self.status,
			path: self.path.clone(),
		}
	}
}

impl<T> fmt::Display for OpResult<T> {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "'{}' for path '{}'", self.status, self.path)
	}
}
