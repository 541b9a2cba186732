//! Connections handed out by [`MemoryEnsemble`](super::MemoryEnsemble).

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use async_trait::async_trait;
use parking_lot::Mutex;
use rand::Rng;
use tokio::sync::{mpsc, watch};
use tracing::debug;
use zk_protocol::{ConnectionState, KeeperCode, Stat};

use super::tree::{self, Signal, WatchRegistration};
use super::{EnsembleState, MemoryEnsemble};
use crate::connection::{Connection, ConnectionConfig, ConnectionListener, CreateOptions, LifecycleState, ListenerId, SessionInfo, WatchCallback};
use crate::fault::{Fault, FaultResult};

/// State shared by a connection and every namespace view of it.
pub(crate) struct ConnectionShared {
	id: u64,
	ensemble: MemoryEnsemble,
	config: ConnectionConfig,
	lifecycle: Mutex<LifecycleState>,
	connected: watch::Sender<bool>,
	ever_connected: AtomicBool,
	session: Mutex<Option<SessionInfo>>,
	listeners: Mutex<Vec<(ListenerId, ConnectionListener)>>,
	next_listener_id: AtomicU64,
	signals: Mutex<Option<mpsc::UnboundedSender<Signal>>>,
	connection_string: Mutex<String>,
}

impl ConnectionShared {
	fn is_started(&self) -> bool {
		*self.lifecycle.lock() == LifecycleState::Started
	}

	pub(crate) fn signal(&self, signal: Signal) {
		if let Some(sink) = self.signals.lock().as_ref() {
			let _ = sink.send(signal);
		}
	}

	fn sink(&self) -> Option<mpsc::UnboundedSender<Signal>> {
		self.signals.lock().clone()
	}

	/// Opens a fresh session and reports `Connected` or `Reconnected`.
	fn establish(self: &Arc<Self>, state: &mut EnsembleState) {
		*self.connection_string.lock() = self.config.ensemble.connection_string();
		let info = state.open_session(self, self.config.session_timeout);
		debug!(target = "zk.runtime", connection = self.id, session_id = format_args!("{:#x}", info.id), "connection established");
		*self.session.lock() = Some(info);
		self.connected.send_replace(true);

		let first = !self.ever_connected.swap(true, Ordering::SeqCst);
		self.signal(Signal::State(if first { ConnectionState::Connected } else { ConnectionState::Reconnected }));
	}

	pub(crate) fn on_available(self: &Arc<Self>, state: &mut EnsembleState) {
		if !self.is_started() || *self.connected.borrow() {
			return;
		}
		let session_id = self.session.lock().as_ref().map(|session| session.id);
		match session_id {
			Some(id) if state.session_usable(id) => {
				*self.connection_string.lock() = self.config.ensemble.connection_string();
				self.connected.send_replace(true);
				self.signal(Signal::State(ConnectionState::Reconnected));
			}
			// Held by a probe; the probe's close expires it.
			Some(_) => {}
			None => self.establish(state),
		}
	}

	pub(crate) fn on_unavailable(&self) {
		if self.connected.send_replace(false) {
			self.signal(Signal::State(ConnectionState::Suspended));
		}
	}

	/// Reports the loss of the current session and negotiates a new one.
	fn renew_session(self: &Arc<Self>) {
		self.connected.send_replace(false);
		*self.session.lock() = None;
		self.notify(ConnectionState::Lost);

		let mut state = self.ensemble.lock();
		if self.is_started() && state.is_available() {
			self.establish(&mut state);
		}
	}

	pub(crate) fn listener_count(&self) -> usize {
		self.listeners.lock().len()
	}

	fn notify(&self, state: ConnectionState) {
		let listeners: Vec<ConnectionListener> = self.listeners.lock().iter().map(|(_, listener)| Arc::clone(listener)).collect();
		for listener in listeners {
			listener(state);
		}
	}
}

/// Drains one connection's signals: state changes, watches, session expiry.
async fn run_events(shared: Weak<ConnectionShared>, mut signals: mpsc::UnboundedReceiver<Signal>) {
	while let Some(signal) = signals.recv().await {
		let Some(shared) = shared.upgrade() else {
			break;
		};
		match signal {
			Signal::State(state) => shared.notify(state),
			Signal::Watch(callback, event) => callback.process(event),
			Signal::SessionExpired => shared.renew_session(),
		}
	}
	debug!(target = "zk.runtime", "connection event loop ended");
}

/// A connection to a [`MemoryEnsemble`], optionally scoped to a namespace.
pub struct MemoryConnection {
	shared: Arc<ConnectionShared>,
	namespace: Option<String>,
	facade: bool,
}

impl MemoryConnection {
	pub(crate) fn new(ensemble: MemoryEnsemble, config: ConnectionConfig) -> Self {
		let namespace = normalize_namespace(config.namespace.as_deref());
		let (connected, _) = watch::channel(false);
		let shared = Arc::new(ConnectionShared {
			id: ensemble.next_connection_id(),
			ensemble: ensemble.clone(),
			connection_string: Mutex::new(config.ensemble.connection_string()),
			config,
			lifecycle: Mutex::new(LifecycleState::Latent),
			connected,
			ever_connected: AtomicBool::new(false),
			session: Mutex::new(None),
			listeners: Mutex::new(Vec::new()),
			next_listener_id: AtomicU64::new(1),
			signals: Mutex::new(None),
		});
		ensemble.register(&shared);

		Self {
			shared,
			namespace,
			facade: false,
		}
	}

	fn fix_path(&self, path: &str, sequential: bool) -> FaultResult<String> {
		tree::validate_path(path, sequential)?;
		Ok(match &self.namespace {
			None => path.to_string(),
			Some(namespace) if path == "/" => format!("/{namespace}"),
			Some(namespace) => format!("/{namespace}{path}"),
		})
	}

	fn unfix_path(&self, path: &str) -> String {
		tree::strip_namespace(self.namespace.as_deref(), path)
	}

	fn registration(&self, watch: Option<Arc<dyn WatchCallback>>, session_id: i64, sink: &mpsc::UnboundedSender<Signal>) -> Option<WatchRegistration> {
		watch.map(|callback| WatchRegistration {
			callback,
			session_id,
			namespace: self.namespace.clone(),
			sink: sink.clone(),
		})
	}

	/// Waits for a live connection and returns the session and signal sink.
	async fn ready(&self) -> FaultResult<(i64, mpsc::UnboundedSender<Signal>)> {
		if !self.shared.is_started() {
			return Err(Fault::IllegalState(format!("Expected state [Started] was [{:?}]", self.lifecycle())));
		}

		if !*self.shared.connected.borrow() {
			let mut connected = self.shared.connected.subscribe();
			let wait = connected.wait_for(|connected| *connected);
			match tokio::time::timeout(self.shared.config.connection_timeout, wait).await {
				Ok(Ok(_)) => {}
				_ => return Err(Fault::connection_loss()),
			}
		}

		let session_id = self.shared.session.lock().as_ref().map(|session| session.id);
		match (session_id, self.shared.sink()) {
			(Some(session_id), Some(sink)) => Ok((session_id, sink)),
			_ => Err(Fault::connection_loss()),
		}
	}

	/// Runs `attempt` under the ensemble lock, retrying retryable faults.
	async fn execute<T, F>(&self, mut attempt: F) -> FaultResult<T>
	where
		T: Send,
		F: FnMut(&mut EnsembleState, i64, &mpsc::UnboundedSender<Signal>) -> FaultResult<T> + Send,
	{
		let mut retries = 0;
		loop {
			let result = match self.ready().await {
				Ok((session_id, sink)) => {
					let mut state = self.shared.ensemble.lock();
					if state.session_usable(session_id) {
						attempt(&mut state, session_id, &sink)
					} else {
						Err(Fault::connection_loss())
					}
				}
				Err(fault) => Err(fault),
			};

			match result {
				Err(fault) if fault.is_retryable() => match self.shared.config.retry_policy.allow_retry(retries) {
					Some(delay) => {
						retries += 1;
						debug!(target = "zk.runtime", connection = self.shared.id, retries, error = %fault, "retrying call");
						tokio::time::sleep(delay).await;
					}
					None => return Err(fault),
				},
				other => return other,
			}
		}
	}
}

#[async_trait]
impl Connection for MemoryConnection {
	fn start(&self) -> FaultResult<()> {
		if self.facade {
			return Err(Fault::Unsupported("start() is not supported on a namespace view".into()));
		}
		{
			let mut lifecycle = self.shared.lifecycle.lock();
			if *lifecycle != LifecycleState::Latent {
				return Err(Fault::IllegalState("Cannot be started more than once".into()));
			}
			*lifecycle = LifecycleState::Started;
		}

		let (sink, signals) = mpsc::unbounded_channel();
		*self.shared.signals.lock() = Some(sink);
		tokio::spawn(run_events(Arc::downgrade(&self.shared), signals));

		let mut state = self.shared.ensemble.lock();
		if state.is_available() {
			self.shared.establish(&mut state);
		}
		debug!(target = "zk.runtime", connection = self.shared.id, "connection started");
		Ok(())
	}

	fn close(&self) -> FaultResult<()> {
		if self.facade {
			return Err(Fault::Unsupported("close() is not supported on a namespace view".into()));
		}
		{
			let mut lifecycle = self.shared.lifecycle.lock();
			if *lifecycle == LifecycleState::Stopped {
				return Ok(());
			}
			*lifecycle = LifecycleState::Stopped;
		}

		let session = self.shared.session.lock().take();
		if let Some(session) = session {
			self.shared.ensemble.lock().end_session(session.id);
		}
		self.shared.connected.send_replace(false);
		self.shared.signals.lock().take();
		self.shared.listeners.lock().clear();
		debug!(target = "zk.runtime", connection = self.shared.id, "connection closed");
		Ok(())
	}

	fn lifecycle(&self) -> LifecycleState {
		*self.shared.lifecycle.lock()
	}

	fn is_connected(&self) -> bool {
		*self.shared.connected.borrow()
	}

	fn session(&self) -> FaultResult<SessionInfo> {
		self.shared.session.lock().clone().ok_or_else(|| Fault::IllegalState("no session has been established".into()))
	}

	fn current_connection_string(&self) -> String {
		self.shared.connection_string.lock().clone()
	}

	fn add_listener(&self, listener: ConnectionListener) -> ListenerId {
		let id = ListenerId(self.shared.next_listener_id.fetch_add(1, Ordering::Relaxed));
		self.shared.listeners.lock().push((id, listener));
		id
	}

	fn remove_listener(&self, id: ListenerId) -> bool {
		let mut listeners = self.shared.listeners.lock();
		let before = listeners.len();
		listeners.retain(|(existing, _)| *existing != id);
		listeners.len() != before
	}

	fn using_namespace(&self, namespace: Option<&str>) -> Arc<dyn Connection> {
		Arc::new(MemoryConnection {
			shared: Arc::clone(&self.shared),
			namespace: normalize_namespace(namespace),
			facade: true,
		})
	}

	async fn create(&self, path: &str, data: &[u8], options: CreateOptions) -> FaultResult<String> {
		let path = self.fix_path(path, options.mode.is_sequential())?;
		let protection = options.protected.then(protection_id);

		let created = self
			.execute(|state, session_id, _| {
				if let Some(id) = &protection {
					if let Some(existing) = state.tree.find_protected(&path, id) {
						return Ok(existing);
					}
				}
				let target = match &protection {
					Some(id) => tree::protected_path(&path, id),
					None => path.clone(),
				};
				let owner = if options.mode.is_ephemeral() { session_id } else { 0 };
				match state.tree.create(&target, data, options.mode, owner) {
					Err(Fault::Keeper { code: KeeperCode::NoNode, .. }) if options.create_parents => {
						state.tree.create_parents(&target)?;
						state.tree.create(&target, data, options.mode, owner)
					}
					other => other,
				}
			})
			.await?;
		Ok(self.unfix_path(&created))
	}

	async fn delete(&self, path: &str, version: i32, recursive: bool) -> FaultResult<()> {
		let path = self.fix_path(path, false)?;
		self.execute(|state, _, _| match state.tree.delete(&path, version) {
			Err(Fault::Keeper { code: KeeperCode::NotEmpty, .. }) if recursive => {
				state.tree.delete_descendants(&path)?;
				state.tree.delete(&path, version)
			}
			other => other,
		})
		.await
	}

	async fn set_data(&self, path: &str, data: &[u8], version: i32) -> FaultResult<Stat> {
		let path = self.fix_path(path, false)?;
		self.execute(|state, _, _| state.tree.set_data(&path, data, version)).await
	}

	async fn exists(&self, path: &str, watch: Option<Arc<dyn WatchCallback>>) -> FaultResult<Option<Stat>> {
		let path = self.fix_path(path, false)?;
		self.execute(|state, session_id, sink| {
			let registration = self.registration(watch.clone(), session_id, sink);
			Ok(state.tree.exists(&path, registration))
		})
		.await
	}

	async fn get_children(&self, path: &str, watch: Option<Arc<dyn WatchCallback>>) -> FaultResult<(Vec<String>, Stat)> {
		let path = self.fix_path(path, false)?;
		self.execute(|state, session_id, sink| {
			let registration = self.registration(watch.clone(), session_id, sink);
			state.tree.get_children(&path, registration)
		})
		.await
	}

	async fn get_data(&self, path: &str, watch: Option<Arc<dyn WatchCallback>>) -> FaultResult<(Vec<u8>, Stat)> {
		let path = self.fix_path(path, false)?;
		self.execute(|state, session_id, sink| {
			let registration = self.registration(watch.clone(), session_id, sink);
			state.tree.get_data(&path, registration)
		})
		.await
	}
}

fn normalize_namespace(namespace: Option<&str>) -> Option<String> {
	let namespace = namespace?.trim().trim_start_matches('/');
	(!namespace.is_empty()).then(|| namespace.to_string())
}

fn protection_id() -> String {
	format!("{:032x}", rand::rng().random::<u128>())
}
