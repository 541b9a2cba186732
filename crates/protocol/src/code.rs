//! Server response codes.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Response code carried by a failed server round trip.
///
/// Discriminants are the server's own encoding. Codes above `ApiError`
/// (`-100`) describe transport and server-side system failures; codes at or
/// below it describe rejected API calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(i32)]
pub enum KeeperCode {
	Ok = 0,
	SystemError = -1,
	RuntimeInconsistency = -2,
	DataInconsistency = -3,
	ConnectionLoss = -4,
	MarshallingError = -5,
	Unimplemented = -6,
	OperationTimeout = -7,
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

impl KeeperCode {
	/// Every known code, in declaration order.
	pub const ALL: [KeeperCode; 31] = [
		KeeperCode::Ok,
		KeeperCode::SystemError,
		KeeperCode::RuntimeInconsistency,
		KeeperCode::DataInconsistency,
		KeeperCode::ConnectionLoss,
		KeeperCode::MarshallingError,
		KeeperCode::Unimplemented,
		KeeperCode::OperationTimeout,
		KeeperCode::BadArguments,
		KeeperCode::UnknownSession,
		KeeperCode::NewConfigNoQuorum,
		KeeperCode::ReconfigInProgress,
		KeeperCode::ApiError,
		KeeperCode::NoNode,
		KeeperCode::NoAuth,
		KeeperCode::BadVersion,
		KeeperCode::NoChildrenForEphemerals,
		KeeperCode::NodeExists,
		KeeperCode::NotEmpty,
		KeeperCode::SessionExpired,
		KeeperCode::InvalidCallback,
		KeeperCode::InvalidAcl,
		KeeperCode::AuthFailed,
		KeeperCode::SessionMoved,
		KeeperCode::NotReadOnly,
		KeeperCode::EphemeralOnLocalSession,
		KeeperCode::NoWatcher,
		KeeperCode::ReconfigDisabled,
		KeeperCode::SessionClosedRequireSaslAuth,
		KeeperCode::QuotaExceeded,
		KeeperCode::ThrottledOp,
	];

	/// Returns the numeric wire encoding.
	pub fn code(self) -> i32 {
		self as i32
	}

	/// Decodes a numeric wire code.
	pub fn from_code(code: i32) -> Option<Self> {
		Self::ALL.iter().copied().find(|candidate| candidate.code() == code)
	}
}

impl fmt::Display for KeeperCode {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{:?} ({})", self, self.code())
	}
}
