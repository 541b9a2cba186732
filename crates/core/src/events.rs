//! Serialized fan-out of connection-state changes.
//!
//! Notifications are queued and drained by one task, so subscribers never
//! run concurrently with each other and see states in the order the
//! connection raised them. The ensemble randomizer, when present, sees each
//! state before any subscriber does.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use tokio::runtime::{Handle, TryCurrentError};
use tokio::sync::mpsc;
use tracing::{debug, error, info};
use zk_protocol::ConnectionState;

use crate::randomizer::EnsembleStringRandomizer;

/// Handle returned by [`StateDispatcher::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

type Handler = Arc<dyn Fn(ConnectionState) + Send + Sync>;
type Subscribers = Arc<Mutex<Vec<(SubscriptionId, Handler)>>>;

/// Dispatch task inputs held until a runtime is available.
struct Pending {
	states: mpsc::UnboundedReceiver<ConnectionState>,
	randomizer: Option<Arc<EnsembleStringRandomizer>>,
}

pub struct StateDispatcher {
	sink: Mutex<Option<mpsc::UnboundedSender<ConnectionState>>>,
	pending: Mutex<Option<Pending>>,
	subscribers: Subscribers,
	next_id: AtomicU64,
}

impl StateDispatcher {
	/// Builds a dispatcher, spawning its task when called inside a tokio
	/// runtime. Otherwise states queue until [`ensure_running`](Self::ensure_running)
	/// succeeds.
	pub fn new(randomizer: Option<Arc<EnsembleStringRandomizer>>) -> Self {
		let (sink, states) = mpsc::unbounded_channel();
		let dispatcher = Self {
			sink: Mutex::new(Some(sink)),
			pending: Mutex::new(Some(Pending { states, randomizer })),
			subscribers: Arc::default(),
			next_id: AtomicU64::new(1),
		};
		let _ = dispatcher.ensure_running();
		dispatcher
	}

	/// Spawns the dispatch task on the current runtime if not yet running.
	pub fn ensure_running(&self) -> Result<(), TryCurrentError> {
		let mut pending = self.pending.lock();
		if pending.is_none() {
			return Ok(());
		}
		let handle = Handle::try_current()?;
		if let Some(Pending { states, randomizer }) = pending.take() {
			handle.spawn(dispatch(states, Arc::clone(&self.subscribers), randomizer));
		}
		Ok(())
	}

	pub fn is_running(&self) -> bool {
		self.pending.lock().is_none()
	}

	/// Queues a state for delivery. Ignored once closed.
	pub fn publish(&self, state: ConnectionState) {
		if let Some(sink) = self.sink.lock().as_ref() {
			let _ = sink.send(state);
		}
	}

	pub fn subscribe(&self, handler: impl Fn(ConnectionState) + Send + Sync + 'static) -> SubscriptionId {
		let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
		self.subscribers.lock().push((id, Arc::new(handler)));
		id
	}

	/// Removes a subscriber. Returns `false` when it was not registered.
	pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
		let mut subscribers = self.subscribers.lock();
		let before = subscribers.len();
		subscribers.retain(|(existing, _)| *existing != id);
		subscribers.len() != before
	}

	pub fn subscriber_count(&self) -> usize {
		self.subscribers.lock().len()
	}

	/// Drops every subscriber and stops the dispatch task.
	pub fn close(&self) {
		self.sink.lock().take();
		self.pending.lock().take();
		self.subscribers.lock().clear();
	}
}

async fn dispatch(mut states: mpsc::UnboundedReceiver<ConnectionState>, subscribers: Subscribers, randomizer: Option<Arc<EnsembleStringRandomizer>>) {
	while let Some(state) = states.recv().await {
		if let Some(randomizer) = &randomizer {
			if randomizer.on_state(state) {
				info!(target = "zk.client", "Randomized the order of replicas in connection string in response to disconnection event.");
			}
		}

		let handlers: Vec<Handler> = subscribers.lock().iter().map(|(_, handler)| Arc::clone(handler)).collect();
		debug!(target = "zk.client", ?state, subscribers = handlers.len(), "dispatching connection state");
		for handler in handlers {
			if catch_unwind(AssertUnwindSafe(|| handler(state))).is_err() {
				error!(target = "zk.client", ?state, "connection state subscriber panicked");
			}
		}
	}
}
