//! Create modes, connection states and watch event shapes.

use serde::{Deserialize, Serialize};

/// Version sentinel matching any current data version.
pub const ANY_VERSION: i32 = -1;

/// How a node is created and how long it lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[repr(i32)]
pub enum CreateMode {
	/// Survives the creating session.
	Persistent = 0,
	/// Removed when the creating session ends.
	Ephemeral = 1,
	/// Persistent, with a server-assigned monotonically increasing suffix.
	PersistentSequential = 2,
	/// Ephemeral, with a server-assigned monotonically increasing suffix.
	EphemeralSequential = 3,
}

impl CreateMode {
	/// Returns the numeric flag used on the wire.
	pub fn flag(self) -> i32 {
		self as i32
	}

	/// Decodes a numeric wire flag.
	pub fn from_flag(flag: i32) -> Option<Self> {
		match flag {
			0 => Some(Self::Persistent),
			1 => Some(Self::Ephemeral),
			2 => Some(Self::PersistentSequential),
			3 => Some(Self::EphemeralSequential),
			_ => None,
		}
	}

	pub fn is_ephemeral(self) -> bool {
		matches!(self, Self::Ephemeral | Self::EphemeralSequential)
	}

	pub fn is_sequential(self) -> bool {
		matches!(self, Self::PersistentSequential | Self::EphemeralSequential)
	}
}

/// Connection states reported by the connection layer.
///
/// Declaration order matches the layer's ordinals.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ConnectionState {
	/// First successful connection of a session.
	Connected,
	/// Connection dropped; the session may still be alive.
	Suspended,
	/// Connection re-established after a suspension or session loss.
	Reconnected,
	/// The session is gone.
	Lost,
	/// Connected to a server that only serves reads.
	ReadOnly,
}

impl ConnectionState {
	/// Returns `true` for states in which requests can be served.
	pub fn is_connected(self) -> bool {
		matches!(self, Self::Connected | Self::Reconnected | Self::ReadOnly)
	}

	/// Returns the layer's ordinal for this state.
	pub fn ordinal(self) -> u8 {
		match self {
			Self::Connected => 0,
			Self::Suspended => 1,
			Self::Reconnected => 2,
			Self::Lost => 3,
			Self::ReadOnly => 4,
		}
	}
}

/// Node-level change a user watcher is notified about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[repr(i32)]
pub enum EventType {
	NodeCreated = 1,
	NodeDeleted = 2,
	NodeDataChanged = 3,
	NodeChildrenChanged = 4,
}

/// Event type as delivered by the connection layer.
///
/// `None` carries pure session-state notifications and has no node path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum WatchedEventType {
	None,
	Node(EventType),
}

/// A fired watch as delivered by the connection layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WatchedEvent {
	pub event_type: WatchedEventType,
	pub path: Option<String>,
}

impl WatchedEvent {
	/// Builds a node event for `path`.
	pub fn node(event_type: EventType, path: impl Into<String>) -> Self {
		Self {
			event_type: WatchedEventType::Node(event_type),
			path: Some(path.into()),
		}
	}

	/// Builds a session-state event with no path.
	pub fn session() -> Self {
		Self {
			event_type: WatchedEventType::None,
			path: None,
		}
	}
}
