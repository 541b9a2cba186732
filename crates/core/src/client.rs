//! The client: session lifecycle and node operations.
//!
//! Every node operation goes through [`Client::execute`], the single point
//! where connection-layer faults are classified into a [`ResultStatus`].
//! Operations therefore never raise; they return an [`OpResult`].
//!
//! # Example
//!
//! ```ignore
//! let ensemble = MemoryEnsemble::new();
//! let client = Client::new(ClientSettings::new(ensemble.connection_string()), Arc::new(ensemble));
//! client.start()?;
//! client.create("/app/config", b"v1", CreateMode::Persistent).await.check()?;
//! let data = client.get_data("/app/config", None).await.into_payload()?;
//! ```

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, error, info, warn};
use zk_protocol::{ANY_VERSION, ConnectionState, CreateMode, Stat};
use zk_runtime::{
	Connection, ConnectionConfig, ConnectionFactory, CreateOptions, EnsembleProvider, Fault, FaultResult, FixedEnsembleProvider, LifecycleState, ListenerId,
};

use crate::error::{Error, Result};
use crate::events::{StateDispatcher, SubscriptionId};
use crate::randomizer::EnsembleStringRandomizer;
use crate::result::OpResult;
use crate::settings::{ClientSettings, normalize_namespace};
use crate::status::ResultStatus;
use crate::watcher::{Watcher, WatcherRegistry};

/// Largest payload accepted by `create` and `set_data`.
pub const MAX_DATA_LENGTH: usize = 1023 * 1024;

/// Session timeout requested by the transient handle of [`Client::kill_session`].
const KILL_PROBE_SESSION_TIMEOUT: Duration = Duration::from_secs(5);
const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Options for [`Client::delete`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeleteOptions {
	pub version: i32,
	pub delete_children_if_needed: bool,
}

impl DeleteOptions {
	pub fn new() -> Self {
		Self {
			version: ANY_VERSION,
			delete_children_if_needed: false,
		}
	}

	pub fn version(mut self, version: i32) -> Self {
		self.version = version;
		self
	}

	pub fn delete_children_if_needed(mut self, delete_children_if_needed: bool) -> Self {
		self.delete_children_if_needed = delete_children_if_needed;
		self
	}
}

impl Default for DeleteOptions {
	fn default() -> Self {
		Self::new()
	}
}

/// Child names with the parent's metadata, read atomically.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChildrenWithStat {
	pub children: Vec<String>,
	pub stat: Stat,
}

/// Node payload with its metadata, read atomically.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeData {
	pub data: Vec<u8>,
	pub stat: Stat,
}

/// A client bound to one connection for its whole life.
///
/// Connection-state dispatch runs on a task spawned on the current tokio
/// runtime; [`start`](Self::start) fails with [`Error::Runtime`] when there is
/// none. A disposed client answers every operation with
/// [`ResultStatus::ClientNotRunning`].
pub struct Client {
	connection: Arc<dyn Connection>,
	factory: Arc<dyn ConnectionFactory>,
	randomizer: Arc<EnsembleStringRandomizer>,
	watchers: Arc<WatcherRegistry>,
	dispatcher: Arc<StateDispatcher>,
	listener: ListenerId,
	namespace: Option<String>,
	disposed: AtomicBool,
}

impl Client {
	/// Builds an unstarted client over a fixed member list.
	pub fn new(settings: ClientSettings, factory: Arc<dyn ConnectionFactory>) -> Self {
		let provider = Arc::new(FixedEnsembleProvider::new(settings.connection_string()));
		Self::with_ensemble_provider(settings, provider, factory)
	}

	/// Builds an unstarted client whose member list comes from `provider`.
	///
	/// The settings' connection string is not consulted. Randomizable
	/// providers are reshuffled after sustained connection flapping.
	pub fn with_ensemble_provider(settings: ClientSettings, provider: Arc<dyn EnsembleProvider>, factory: Arc<dyn ConnectionFactory>) -> Self {
		let retry = settings.retry_strategy();
		let namespace = settings.namespace().map(str::to_string);
		let connection = factory.connect(ConnectionConfig {
			ensemble: Arc::clone(&provider),
			session_timeout: settings.session_timeout(),
			connection_timeout: retry.connection_timeout(),
			retry_policy: retry.retry_policy(),
			namespace: namespace.clone(),
			can_be_read_only: settings.can_be_read_only(),
		});

		let randomizer = Arc::new(EnsembleStringRandomizer::new(provider));
		let dispatcher = Arc::new(StateDispatcher::new(Some(Arc::clone(&randomizer))));
		let listener = attach(&*connection, &dispatcher);

		debug!(target = "zk.client", ?namespace, session_timeout_ms = settings.session_timeout().as_millis() as u64, "client created");
		Self {
			connection,
			factory,
			randomizer,
			watchers: Arc::new(WatcherRegistry::new()),
			dispatcher,
			listener,
			namespace,
			disposed: AtomicBool::new(false),
		}
	}

	/// Returns a client sharing this one's connection with every path
	/// prefixed by `namespace`.
	///
	/// The view has its own subscribers. Starting or disposing it never
	/// affects the shared connection, but the connection belongs to `self`:
	/// once this client is disposed or dropped, the view answers every
	/// operation with [`ResultStatus::ClientNotRunning`]. Keep the owner
	/// alive for as long as its views are in use.
	pub fn using_namespace(&self, namespace: &str) -> Client {
		let namespace = normalize_namespace(Some(namespace)).map(str::to_string);
		let connection = self.connection.using_namespace(namespace.as_deref());
		let dispatcher = Arc::new(StateDispatcher::new(None));
		let listener = attach(&*connection, &dispatcher);

		Client {
			connection,
			factory: Arc::clone(&self.factory),
			randomizer: Arc::clone(&self.randomizer),
			watchers: Arc::clone(&self.watchers),
			dispatcher,
			listener,
			namespace,
			disposed: AtomicBool::new(false),
		}
	}

	/// Starts connecting. Starting twice is a no-op.
	pub fn start(&self) -> Result<()> {
		if self.disposed.load(Ordering::SeqCst) {
			return Ok(());
		}
		self.dispatcher.ensure_running()?;
		match self.connection.start() {
			Ok(()) => {
				info!(target = "zk.client", "client started");
				Ok(())
			}
			// Already started, or a namespace view whose connection is started by its owner.
			Err(Fault::IllegalState(_) | Fault::Unsupported(_)) => Ok(()),
			Err(fault) => Err(fault.into()),
		}
	}

	/// Closes the connection and drops every subscriber. Idempotent.
	pub fn dispose(&self) {
		if self.disposed.swap(true, Ordering::SeqCst) {
			return;
		}
		self.connection.remove_listener(self.listener);
		self.dispatcher.close();
		match self.connection.close() {
			Ok(()) => info!(target = "zk.client", "client disposed"),
			Err(Fault::Unsupported(_)) => debug!(target = "zk.client", namespace = ?self.namespace, "namespace view disposed"),
			Err(fault) => warn!(target = "zk.client", error = %fault, "failed to close connection"),
		}
	}

	pub fn is_started(&self) -> bool {
		!self.disposed.load(Ordering::SeqCst) && self.connection.lifecycle() == LifecycleState::Started
	}

	pub fn is_connected(&self) -> bool {
		!self.disposed.load(Ordering::SeqCst) && self.connection.is_connected()
	}

	/// Path prefix applied to every operation, without a leading slash.
	pub fn namespace(&self) -> Option<&str> {
		self.namespace.as_deref()
	}

	pub fn randomizer(&self) -> &EnsembleStringRandomizer {
		&self.randomizer
	}

	/// Connection string used by the current connection.
	pub fn connection_string(&self) -> String {
		self.connection.current_connection_string()
	}

	pub fn session_id(&self) -> Result<i64> {
		Ok(self.connection.session()?.id)
	}

	pub fn session_password(&self) -> Result<Vec<u8>> {
		Ok(self.connection.session()?.password)
	}

	/// Session timeout negotiated for the current session.
	pub fn session_timeout(&self) -> Result<Duration> {
		Ok(self.connection.session()?.timeout)
	}

	/// Waits until the client is connected, polling at a short interval.
	pub async fn wait_until_connected(&self, timeout: Duration) -> Result<()> {
		let deadline = Instant::now() + timeout;
		while !self.is_connected() {
			if Instant::now() >= deadline {
				return Err(Error::connect_timeout(timeout));
			}
			tokio::time::sleep(POLL_INTERVAL).await;
		}
		Ok(())
	}

	/// Subscribes to connection-state changes.
	///
	/// Handlers run one at a time on the dispatch task, in the order the
	/// connection raised the states.
	pub fn subscribe(&self, handler: impl Fn(ConnectionState) + Send + Sync + 'static) -> SubscriptionId {
		self.dispatcher.subscribe(handler)
	}

	pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
		self.dispatcher.unsubscribe(id)
	}

	/// Creates a node, creating missing ancestors as empty persistent nodes.
	///
	/// The payload is the final path, which differs from `path` for
	/// sequential modes.
	pub async fn create(&self, path: &str, data: &[u8], mode: CreateMode) -> OpResult<String> {
		self.create_node(path, data, mode, false).await
	}

	/// Like [`create`](Self::create), but a sequential create whose
	/// acknowledgement is lost is recognized on retry instead of repeated.
	/// Non-sequential modes ignore the protection.
	pub async fn create_protected(&self, path: &str, data: &[u8], mode: CreateMode) -> OpResult<String> {
		self.create_node(path, data, mode, mode.is_sequential()).await
	}

	async fn create_node(&self, path: &str, data: &[u8], mode: CreateMode, protected: bool) -> OpResult<String> {
		if let Some(rejected) = self.reject_oversized(path, data) {
			return rejected;
		}
		debug!(target = "zk.client", "Trying to create node '{}' with mode '{:?}' and data length {}", path, mode, data.len());

		let options = CreateOptions::new(mode).protected(protected).create_parents(true);
		self.execute(path, self.connection.create(path, data, options)).await
	}

	pub async fn delete(&self, path: &str, options: DeleteOptions) -> OpResult {
		debug!(
			target = "zk.client",
			path,
			version = options.version,
			delete_children_if_needed = options.delete_children_if_needed,
			"deleting node"
		);
		self.execute(path, self.connection.delete(path, options.version, options.delete_children_if_needed)).await
	}

	/// Replaces a node's data if its version matches `version`
	/// ([`ANY_VERSION`] matches any).
	pub async fn set_data(&self, path: &str, data: &[u8], version: i32) -> OpResult<Stat> {
		if let Some(rejected) = self.reject_oversized(path, data) {
			return rejected;
		}
		debug!(target = "zk.client", path, version, data_length = data.len(), "setting node data");
		self.execute(path, self.connection.set_data(path, data, version)).await
	}

	/// Returns the node's metadata; a missing node yields `Ok` with `None`.
	///
	/// The watcher fires once on the next create, delete or data change.
	pub async fn exists(&self, path: &str, watcher: Option<&Arc<dyn Watcher>>) -> OpResult<Option<Stat>> {
		debug!(target = "zk.client", path, watching = watcher.is_some(), "checking node existence");
		let watch = watcher.map(|watcher| self.watchers.adapter_for(watcher));
		self.execute(path, self.connection.exists(path, watch)).await
	}

	/// Returns immediate child names, in no particular order.
	pub async fn get_children(&self, path: &str, watcher: Option<&Arc<dyn Watcher>>) -> OpResult<Vec<String>> {
		self.get_children_with_stat(path, watcher).await.map(|listing| listing.children)
	}

	pub async fn get_children_with_stat(&self, path: &str, watcher: Option<&Arc<dyn Watcher>>) -> OpResult<ChildrenWithStat> {
		debug!(target = "zk.client", path, watching = watcher.is_some(), "listing children");
		let watch = watcher.map(|watcher| self.watchers.adapter_for(watcher));
		self.execute(path, self.connection.get_children(path, watch))
			.await
			.map(|(children, stat)| ChildrenWithStat { children, stat })
	}

	pub async fn get_data(&self, path: &str, watcher: Option<&Arc<dyn Watcher>>) -> OpResult<NodeData> {
		debug!(target = "zk.client", path, watching = watcher.is_some(), "reading node data");
		let watch = watcher.map(|watcher| self.watchers.adapter_for(watcher));
		self.execute(path, self.connection.get_data(path, watch)).await.map(|(data, stat)| NodeData { data, stat })
	}

	/// Forces the current session to expire.
	///
	/// Opens a transient handle on the live session, waits up to `timeout`
	/// for it to attach, then closes it, which ends the session. The client
	/// negotiates a new session in the background; this call does not wait
	/// for that. A client that is not connected is left alone.
	pub async fn kill_session(&self, timeout: Duration) -> Result<()> {
		if !self.is_connected() {
			return Ok(());
		}
		let session = self.connection.session()?;
		let connection_string = self.connection.current_connection_string();
		info!(target = "zk.client", session_id = format_args!("{:#x}", session.id), "killing session");

		let probe = self.factory.open_session(&connection_string, KILL_PROBE_SESSION_TIMEOUT, session.id, &session.password)?;
		let deadline = Instant::now() + timeout;
		let outcome = loop {
			if probe.is_connected() {
				break Ok(());
			}
			if Instant::now() >= deadline {
				break Err(Error::kill_timeout(timeout));
			}
			tokio::time::sleep(POLL_INTERVAL).await;
		};
		probe.close();
		outcome
	}

	fn reject_oversized<T>(&self, path: &str, data: &[u8]) -> Option<OpResult<T>> {
		if data.len() <= MAX_DATA_LENGTH {
			return None;
		}
		error!(target = "zk.client", path, data_length = data.len(), limit = MAX_DATA_LENGTH, "Supplied data has unreasonably high length");
		Some(OpResult::failed(ResultStatus::BadArguments, path))
	}

	/// Runs one connection call and classifies its outcome.
	async fn execute<T>(&self, path: &str, call: impl Future<Output = FaultResult<T>>) -> OpResult<T> {
		let outcome = if self.disposed.load(Ordering::SeqCst) {
			Err(Fault::IllegalState("client has been disposed".into()))
		} else {
			call.await
		};
		match outcome {
			Ok(payload) => OpResult::ok(path, payload),
			Err(fault) => OpResult::failed(classify(path, &fault), path),
		}
	}
}

impl Drop for Client {
	fn drop(&mut self) {
		self.dispose();
	}
}

/// Feeds `connection`'s state changes into `dispatcher`.
fn attach(connection: &dyn Connection, dispatcher: &Arc<StateDispatcher>) -> ListenerId {
	let dispatcher: Weak<StateDispatcher> = Arc::downgrade(dispatcher);
	connection.add_listener(Arc::new(move |state: ConnectionState| {
		if let Some(dispatcher) = dispatcher.upgrade() {
			dispatcher.publish(state);
		}
	}))
}

fn classify(path: &str, fault: &Fault) -> ResultStatus {
	match fault {
		Fault::Keeper { code, .. } => {
			warn!(target = "zk.client", path, error = %fault, "Operation failed: {code}");
			ResultStatus::from(*code)
		}
		Fault::IllegalArgument(_) => {
			error!(target = "zk.client", path, error = %fault, "One or more argument(s) was invalid");
			ResultStatus::BadArguments
		}
		Fault::IllegalState(_) => {
			error!(target = "zk.client", path, error = %fault, "Operation is not allowed due to client state");
			ResultStatus::ClientNotRunning
		}
		Fault::Unsupported(_) | Fault::Other(_) => {
			error!(target = "zk.client", path, error = ?fault, "Unexpected error");
			ResultStatus::UnclassifiedError
		}
	}
}
