//! In-process ensemble implementing the connection layer.
//!
//! [`MemoryEnsemble`] keeps a node tree, sessions and watch tables behind a
//! single lock and hands out [`MemoryConnection`]s that behave like a
//! retrying, session-owning client: they report connection-state changes
//! from a background task, deliver one-shot watches on the same task, and
//! renegotiate a fresh session after their session is expired.
//!
//! Outages are simulated with [`MemoryEnsemble::set_available`]; session
//! takeover and expiry go through [`ConnectionFactory::open_session`].
//!
//! # Example
//!
//! ```ignore
//! let ensemble = MemoryEnsemble::new();
//! let connection = ensemble.connect(config);
//! connection.start()?;
//! connection.create("/app", b"", CreateOptions::new(CreateMode::Persistent)).await?;
//! ```

mod connection;
mod tree;

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::{Mutex, MutexGuard};
use rand::Rng;
use tracing::{debug, info};

pub use self::connection::MemoryConnection;
use self::connection::ConnectionShared;
use self::tree::{NodeTree, Signal};
use crate::connection::{Connection, ConnectionConfig, ConnectionFactory, SessionInfo, SessionProbe};
use crate::fault::FaultResult;

const FIRST_SESSION_ID: i64 = 0x0100_0000_0000_0001;
const DEFAULT_MEMBERS: usize = 3;
const BASE_PORT: u16 = 2181;

/// An in-process ensemble shared by every connection built from it.
#[derive(Clone)]
pub struct MemoryEnsemble {
	shared: Arc<EnsembleShared>,
}

struct EnsembleShared {
	members: Vec<String>,
	state: Mutex<EnsembleState>,
	next_connection_id: AtomicU64,
}

struct SessionEntry {
	password: Vec<u8>,
	owner: Weak<ConnectionShared>,
	probe_attached: bool,
}

pub(crate) struct EnsembleState {
	pub(crate) tree: NodeTree,
	sessions: HashMap<i64, SessionEntry>,
	next_session_id: i64,
	available: bool,
	connections: Vec<Weak<ConnectionShared>>,
}

impl EnsembleState {
	pub(crate) fn is_available(&self) -> bool {
		self.available
	}

	/// Opens a session owned by `owner`.
	fn open_session(&mut self, owner: &Arc<ConnectionShared>, timeout: Duration) -> SessionInfo {
		let id = self.next_session_id;
		self.next_session_id += 1;

		let mut password = vec![0u8; 16];
		rand::rng().fill(&mut password[..]);

		self.sessions.insert(
			id,
			SessionEntry {
				password: password.clone(),
				owner: Arc::downgrade(owner),
				probe_attached: false,
			},
		);
		debug!(target = "zk.runtime", session_id = format_args!("{id:#x}"), "session opened");
		SessionInfo { id, password, timeout }
	}

	/// Returns `true` while the session exists and is served to its owner.
	pub(crate) fn session_usable(&self, id: i64) -> bool {
		self.sessions.get(&id).is_some_and(|entry| !entry.probe_attached)
	}

	/// Ends a session: removes its ephemeral nodes and pending watches.
	fn end_session(&mut self, id: i64) -> Option<Weak<ConnectionShared>> {
		let entry = self.sessions.remove(&id)?;
		self.tree.remove_ephemerals(id);
		self.tree.drop_watches(id);
		debug!(target = "zk.runtime", session_id = format_args!("{id:#x}"), "session ended");
		Some(entry.owner)
	}

	fn live_connections(&mut self) -> Vec<Arc<ConnectionShared>> {
		self.connections.retain(|connection| connection.strong_count() > 0);
		self.connections.iter().filter_map(Weak::upgrade).collect()
	}
}

impl MemoryEnsemble {
	/// Builds an ensemble with three members.
	pub fn new() -> Self {
		Self::with_members(DEFAULT_MEMBERS)
	}

	/// Builds an ensemble advertising `count` members on consecutive ports.
	pub fn with_members(count: usize) -> Self {
		let members = (0..count.max(1)).map(|index| format!("127.0.0.1:{}", BASE_PORT as usize + index)).collect();
		Self {
			shared: Arc::new(EnsembleShared {
				members,
				state: Mutex::new(EnsembleState {
					tree: NodeTree::new(),
					sessions: HashMap::new(),
					next_session_id: FIRST_SESSION_ID,
					available: true,
					connections: Vec::new(),
				}),
				next_connection_id: AtomicU64::new(1),
			}),
		}
	}

	/// Returns the comma-separated member list.
	pub fn connection_string(&self) -> String {
		self.shared.members.join(",")
	}

	/// Makes every member reachable or unreachable.
	///
	/// Going down suspends every connected connection; coming back up
	/// reconnects them, opening a session for connections that have none.
	pub fn set_available(&self, available: bool) {
		let mut state = self.lock();
		if state.available == available {
			return;
		}
		state.available = available;
		info!(target = "zk.runtime", available, "ensemble availability changed");

		for connection in state.live_connections() {
			if available {
				connection.on_available(&mut state);
			} else {
				connection.on_unavailable();
			}
		}
	}

	pub fn is_available(&self) -> bool {
		self.lock().available
	}

	/// Returns the number of live sessions.
	pub fn session_count(&self) -> usize {
		self.lock().sessions.len()
	}

	/// Returns `true` when a node exists at the absolute server path.
	pub fn contains(&self, path: &str) -> bool {
		self.lock().tree.contains(path)
	}

	/// Returns the number of state listeners registered across live connections.
	pub fn listener_count(&self) -> usize {
		self.lock().live_connections().iter().map(|connection| connection.listener_count()).sum()
	}

	/// Returns the number of nodes, including the root.
	pub fn node_count(&self) -> usize {
		self.lock().tree.len()
	}

	pub(crate) fn lock(&self) -> MutexGuard<'_, EnsembleState> {
		self.shared.state.lock()
	}

	fn next_connection_id(&self) -> u64 {
		self.shared.next_connection_id.fetch_add(1, Ordering::SeqCst)
	}

	fn register(&self, connection: &Arc<ConnectionShared>) {
		self.lock().connections.push(Arc::downgrade(connection));
	}
}

impl Default for MemoryEnsemble {
	fn default() -> Self {
		Self::new()
	}
}

impl ConnectionFactory for MemoryEnsemble {
	fn connect(&self, config: ConnectionConfig) -> Arc<dyn Connection> {
		Arc::new(MemoryConnection::new(self.clone(), config))
	}

	fn open_session(&self, connection_string: &str, session_timeout: Duration, session_id: i64, password: &[u8]) -> FaultResult<Box<dyn SessionProbe>> {
		let mut state = self.lock();
		let attached = state.available
			&& match state.sessions.get_mut(&session_id) {
				Some(entry) if entry.password == password && !entry.probe_attached => {
					entry.probe_attached = true;
					if let Some(owner) = entry.owner.upgrade() {
						owner.on_unavailable();
					}
					true
				}
				_ => false,
			};

		debug!(
			target = "zk.runtime",
			connection_string,
			timeout_ms = session_timeout.as_millis() as u64,
			session_id = format_args!("{session_id:#x}"),
			attached,
			"session probe opened"
		);

		Ok(Box::new(MemoryProbe {
			ensemble: self.clone(),
			session_id,
			attached: AtomicBool::new(attached),
			closed: AtomicBool::new(false),
		}))
	}
}

/// A bare handle attached to another connection's session.
///
/// Closing an attached probe expires the session: its ephemeral nodes are
/// removed and the owning connection negotiates a new session.
struct MemoryProbe {
	ensemble: MemoryEnsemble,
	session_id: i64,
	attached: AtomicBool,
	closed: AtomicBool,
}

impl SessionProbe for MemoryProbe {
	fn is_connected(&self) -> bool {
		self.attached.load(Ordering::SeqCst) && !self.closed.load(Ordering::SeqCst)
	}

	fn close(&self) {
		if self.closed.swap(true, Ordering::SeqCst) || !self.attached.load(Ordering::SeqCst) {
			return;
		}
		let owner = self.ensemble.lock().end_session(self.session_id);
		if let Some(owner) = owner.and_then(|owner| owner.upgrade()) {
			owner.signal(Signal::SessionExpired);
		}
	}
}

impl Drop for MemoryProbe {
	fn drop(&mut self) {
		self.close();
	}
}
