//! The connection-layer contract consumed by the client core.
//!
//! A [`Connection`] owns one session against an ensemble. It runs its own
//! background work: connection-state notifications and fired watches are
//! raised from that work, never from the caller's task. Node calls are
//! retried per the configured [`RetryPolicy`] and either return a value or
//! raise a [`Fault`].

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use zk_protocol::{ConnectionState, CreateMode, Stat, WatchedEvent};

use crate::ensemble::EnsembleProvider;
use crate::fault::FaultResult;
use crate::retry::RetryPolicy;

/// Callback invoked with every connection-state change.
pub type ConnectionListener = Arc<dyn Fn(ConnectionState) + Send + Sync>;

/// Handle returned by [`Connection::add_listener`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(pub u64);

/// Receives a fired watch.
///
/// Registrations are deduplicated per path by callback identity, so the
/// same `Arc` registered twice on one path fires once.
pub trait WatchCallback: Send + Sync {
	fn process(&self, event: WatchedEvent);
}

/// Lifecycle of a connection handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
	/// Built, not started.
	Latent,
	/// Started: connecting, connected, or reconnecting.
	Started,
	/// Closed for good.
	Stopped,
}

/// Identity of an established session.
#[derive(Clone, PartialEq, Eq)]
pub struct SessionInfo {
	pub id: i64,
	pub password: Vec<u8>,
	pub timeout: Duration,
}

impl fmt::Debug for SessionInfo {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("SessionInfo")
			.field("id", &format_args!("{:#x}", self.id))
			.field("password", &"<redacted>")
			.field("timeout", &self.timeout)
			.finish()
	}
}

/// Parameters for building a connection.
#[derive(Clone)]
pub struct ConnectionConfig {
	/// Source of the member list, consulted on every (re)connect.
	pub ensemble: Arc<dyn EnsembleProvider>,
	/// Requested session timeout.
	pub session_timeout: Duration,
	/// Longest time one attempt waits for a live connection.
	pub connection_timeout: Duration,
	/// Retry policy for retryable faults.
	pub retry_policy: RetryPolicy,
	/// Path prefix applied to every call, without a leading slash.
	pub namespace: Option<String>,
	/// Whether read-only servers are acceptable.
	pub can_be_read_only: bool,
}

impl fmt::Debug for ConnectionConfig {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("ConnectionConfig")
			.field("connection_string", &self.ensemble.connection_string())
			.field("session_timeout", &self.session_timeout)
			.field("connection_timeout", &self.connection_timeout)
			.field("retry_policy", &self.retry_policy)
			.field("namespace", &self.namespace)
			.field("can_be_read_only", &self.can_be_read_only)
			.finish()
	}
}

/// Options for a create call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CreateOptions {
	pub mode: CreateMode,
	/// Prefix the node name with a client-generated id so a create whose
	/// acknowledgement was lost can be found again.
	pub protected: bool,
	/// Create missing ancestors as empty persistent nodes.
	pub create_parents: bool,
}

impl CreateOptions {
	pub fn new(mode: CreateMode) -> Self {
		Self {
			mode,
			protected: false,
			create_parents: false,
		}
	}

	pub fn protected(mut self, protected: bool) -> Self {
		self.protected = protected;
		self
	}

	pub fn create_parents(mut self, create_parents: bool) -> Self {
		self.create_parents = create_parents;
		self
	}
}

/// A session-owning connection to an ensemble.
#[async_trait]
pub trait Connection: Send + Sync {
	/// Starts background work and begins connecting.
	///
	/// Raises `IllegalState` when called more than once.
	fn start(&self) -> FaultResult<()>;

	/// Closes the session and stops background work.
	fn close(&self) -> FaultResult<()>;

	fn lifecycle(&self) -> LifecycleState;

	/// Returns `true` while a live transport connection exists.
	fn is_connected(&self) -> bool;

	/// Returns the established session.
	///
	/// Raises `IllegalState` when no session has been established.
	fn session(&self) -> FaultResult<SessionInfo>;

	/// Returns the connection string used for the current connection.
	fn current_connection_string(&self) -> String;

	/// Registers a connection-state listener.
	///
	/// Listeners live on the shared connection, so one added through a
	/// namespace view outlives the view until removed.
	fn add_listener(&self, listener: ConnectionListener) -> ListenerId;

	/// Removes a listener. Returns `false` when it was not registered.
	fn remove_listener(&self, id: ListenerId) -> bool;

	/// Returns a view sharing this connection with a different path prefix.
	fn using_namespace(&self, namespace: Option<&str>) -> Arc<dyn Connection>;

	/// Creates a node and returns its final path.
	async fn create(&self, path: &str, data: &[u8], options: CreateOptions) -> FaultResult<String>;

	/// Deletes a node, optionally removing its descendants first.
	async fn delete(&self, path: &str, version: i32, recursive: bool) -> FaultResult<()>;

	/// Replaces a node's data.
	async fn set_data(&self, path: &str, data: &[u8], version: i32) -> FaultResult<Stat>;

	/// Returns the node's metadata, or `None` when it does not exist.
	async fn exists(&self, path: &str, watch: Option<Arc<dyn WatchCallback>>) -> FaultResult<Option<Stat>>;

	/// Returns immediate child names and the parent's metadata.
	async fn get_children(&self, path: &str, watch: Option<Arc<dyn WatchCallback>>) -> FaultResult<(Vec<String>, Stat)>;

	/// Returns the node's data and metadata.
	async fn get_data(&self, path: &str, watch: Option<Arc<dyn WatchCallback>>) -> FaultResult<(Vec<u8>, Stat)>;
}

/// A bare, short-lived session handle attached to an existing session.
pub trait SessionProbe: Send + Sync {
	/// Returns `true` once the handle has attached to the session.
	fn is_connected(&self) -> bool;

	/// Detaches and closes the session.
	fn close(&self);
}

/// Builds connections against an ensemble.
pub trait ConnectionFactory: Send + Sync {
	/// Builds an unstarted connection.
	fn connect(&self, config: ConnectionConfig) -> Arc<dyn Connection>;

	/// Opens a bare handle on an existing session identified by id and password.
	fn open_session(&self, connection_string: &str, session_timeout: Duration, session_id: i64, password: &[u8]) -> FaultResult<Box<dyn SessionProbe>>;
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn session_debug_redacts_password() {
		let session = SessionInfo {
			id: 0x1f,
			password: vec![1, 2, 3],
			timeout: Duration::from_secs(5),
		};
		let rendered = format!("{session:?}");
		assert!(rendered.contains("0x1f"));
		assert!(rendered.contains("<redacted>"));
		assert!(!rendered.contains("[1, 2, 3]"));
	}

	#[test]
	fn create_options_builders() {
		let options = CreateOptions::new(CreateMode::EphemeralSequential).protected(true).create_parents(true);
		assert!(options.protected);
		assert!(options.create_parents);
		assert_eq!(options.mode, CreateMode::EphemeralSequential);
	}
}
