//! Closed taxonomy of operation outcomes.
//!
//! Statuses fall into three bands, in this order:
//!
//! 1. client/system errors raised on this side of the wire
//!    (`UnclassifiedError`, `ClientNotRunning`) and connection-layer codes
//!    from `SystemError` down to the `ApiError` marker,
//! 2. `Ok`,
//! 3. API errors, from `NoNode` downwards.
//!
//! The band a status belongs to is decided by its position in
//! [`ResultStatus::ORDERED`], never by comparing discriminants. Adding a
//! status means placing it in that list; the boundaries are `Ok` and
//! `NoNode`.

use std::fmt;

use serde::{Deserialize, Serialize};
use zk_protocol::KeeperCode;

/// Outcome of a client operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(i32)]
pub enum ResultStatus {
	/// A fault the client could not classify.
	UnclassifiedError = 2,
	/// The client was not started, or already disposed.
	ClientNotRunning = 1,
	Ok = 0,
	SystemError = -1,
	RuntimeInconsistency = -2,
	DataInconsistency = -3,
	ConnectionLoss = -4,
	MarshallingError = -5,
	Unimplemented = -6,
	OperationTimeout = -7,
	/// Arguments rejected by the client or the server.
	BadArguments = -8,
	UnknownSession = -12,
	NewConfigNoQuorum = -13,
	ReconfigInProgress = -14,
	ApiError = -100,
	NoNode = -101,
	NoAuth = -102,
	BadVersion = -103,
	NoChildrenForEphemerals = -108,
	NodeExists = -110,
	NotEmpty = -111,
	SessionExpired = -112,
	InvalidCallback = -113,
	InvalidAcl = -114,
	AuthFailed = -115,
	SessionMoved = -118,
	NotReadOnly = -119,
	EphemeralOnLocalSession = -120,
	NoWatcher = -121,
	ReconfigDisabled = -123,
	SessionClosedRequireSaslAuth = -124,
	QuotaExceeded = -125,
	ThrottledOp = -127,
}

/// Classification band of a [`ResultStatus`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StatusBand {
	SystemError,
	Ok,
	ApiError,
}

impl ResultStatus {
	/// Every status, in band order: system errors, `Ok`, API errors.
	pub const ORDERED: [ResultStatus; 33] = [
		ResultStatus::UnclassifiedError,
		ResultStatus::ClientNotRunning,
		ResultStatus::Ok,
		ResultStatus::SystemError,
		ResultStatus::RuntimeInconsistency,
		ResultStatus::DataInconsistency,
		ResultStatus::ConnectionLoss,
		ResultStatus::MarshallingError,
		ResultStatus::Unimplemented,
		ResultStatus::OperationTimeout,
		ResultStatus::BadArguments,
		ResultStatus::UnknownSession,
		ResultStatus::NewConfigNoQuorum,
		ResultStatus::ReconfigInProgress,
		ResultStatus::ApiError,
		ResultStatus::NoNode,
		ResultStatus::NoAuth,
		ResultStatus::BadVersion,
		ResultStatus::NoChildrenForEphemerals,
		ResultStatus::NodeExists,
		ResultStatus::NotEmpty,
		ResultStatus::SessionExpired,
		ResultStatus::InvalidCallback,
		ResultStatus::InvalidAcl,
		ResultStatus::AuthFailed,
		ResultStatus::SessionMoved,
		ResultStatus::NotReadOnly,
		ResultStatus::EphemeralOnLocalSession,
		ResultStatus::NoWatcher,
		ResultStatus::ReconfigDisabled,
		ResultStatus::SessionClosedRequireSaslAuth,
		ResultStatus::QuotaExceeded,
		ResultStatus::ThrottledOp,
	];

	/// Returns the numeric code. Server codes keep the server's encoding.
	pub fn code(self) -> i32 {
		self as i32
	}

	/// Returns the band this status belongs to.
	pub fn band(self) -> StatusBand {
		let rank = self.rank();
		let ok = Self::Ok.rank();
		if rank == ok {
			StatusBand::Ok
		} else if rank < Self::NoNode.rank() {
			StatusBand::SystemError
		} else {
			StatusBand::ApiError
		}
	}

	pub fn is_ok(self) -> bool {
		self == Self::Ok
	}

	pub fn is_system_error(self) -> bool {
		self.band() == StatusBand::SystemError
	}

	pub fn is_api_error(self) -> bool {
		self.band() == StatusBand::ApiError
	}

	fn rank(self) -> usize {
		Self::ORDERED.iter().position(|status| *status == self).unwrap_or(0)
	}
}

impl From<KeeperCode> for ResultStatus {
	fn from(code: KeeperCode) -> Self {
		match code {
			KeeperCode::Ok => Self::Ok,
			KeeperCode::SystemError => Self::SystemError,
			KeeperCode::RuntimeInconsistency => Self::RuntimeInconsistency,
			KeeperCode::DataInconsistency => Self::DataInconsistency,
			KeeperCode::ConnectionLoss => Self::ConnectionLoss,
			KeeperCode::MarshallingError => Self::MarshallingError,
			KeeperCode::Unimplemented => Self::Unimplemented,
			KeeperCode::OperationTimeout => Self::OperationTimeout,
			KeeperCode::BadArguments => Self::BadArguments,
			KeeperCode::UnknownSession => Self::UnknownSession,
			KeeperCode::NewConfigNoQuorum => Self::NewConfigNoQuorum,
			KeeperCode::ReconfigInProgress => Self::ReconfigInProgress,
			KeeperCode::ApiError => Self::ApiError,
			KeeperCode::NoNode => Self::NoNode,
			KeeperCode::NoAuth => Self::NoAuth,
			KeeperCode::BadVersion => Self::BadVersion,
			KeeperCode::NoChildrenForEphemerals => Self::NoChildrenForEphemerals,
			KeeperCode::NodeExists => Self::NodeExists,
			KeeperCode::NotEmpty => Self::NotEmpty,
			KeeperCode::SessionExpired => Self::SessionExpired,
			KeeperCode::InvalidCallback => Self::InvalidCallback,
			KeeperCode::InvalidAcl => Self::InvalidAcl,
			KeeperCode::AuthFailed => Self::AuthFailed,
			KeeperCode::SessionMoved => Self::SessionMoved,
			KeeperCode::NotReadOnly => Self::NotReadOnly,
			KeeperCode::EphemeralOnLocalSession => Self::EphemeralOnLocalSession,
			KeeperCode::NoWatcher => Self::NoWatcher,
			KeeperCode::ReconfigDisabled => Self::ReconfigDisabled,
			KeeperCode::SessionClosedRequireSaslAuth => Self::SessionClosedRequireSaslAuth,
			KeeperCode::QuotaExceeded => Self::QuotaExceeded,
			KeeperCode::ThrottledOp => Self::ThrottledOp,
		}
	}
}

impl fmt::Display for ResultStatus {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		fmt::Debug::fmt(self, f)
	}
}
