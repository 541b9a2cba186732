//! User watchers and their one-shot adapters.
//!
//! A [`Watcher`] is registered by handing an `Arc` to a read operation. The
//! registry maps each `Arc` (by pointer identity) to one adapter, so reusing
//! the same watcher on the same path yields a single server-side registration
//! while two distinct watchers with identical behavior stay separate.

use std::collections::HashMap;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::debug;
use zk_protocol::{EventType, WatchedEvent, WatchedEventType};
use zk_runtime::WatchCallback;

/// Receives node events for a path it was registered on.
///
/// Each registration fires at most once. Callbacks run on the connection's
/// event task; blocking there delays every other event.
pub trait Watcher: Send + Sync {
	fn process_event(&self, event_type: EventType, path: &str);
}

/// A [`Watcher`] backed by a closure.
pub struct FnWatcher<F>(F);

impl<F> FnWatcher<F> {
	pub fn new(f: F) -> Self {
		Self(f)
	}
}

impl<F> Watcher for FnWatcher<F>
where
	F: Fn(EventType, &str) + Send + Sync,
{
	fn process_event(&self, event_type: EventType, path: &str) {
		(self.0)(event_type, path)
	}
}

/// Wraps a closure as a shareable watcher.
pub fn from_fn<F>(f: F) -> Arc<dyn Watcher>
where
	F: Fn(EventType, &str) + Send + Sync + 'static,
{
	Arc::new(FnWatcher(f))
}

/// Bridges a [`Watcher`] to the connection layer, dropping session events.
pub struct WatcherAdapter {
	watcher: Arc<dyn Watcher>,
}

impl WatcherAdapter {
	pub fn new(watcher: Arc<dyn Watcher>) -> Self {
		Self { watcher }
	}
}

impl WatchCallback for WatcherAdapter {
	fn process(&self, event: WatchedEvent) {
		let WatchedEventType::Node(event_type) = event.event_type else {
			return;
		};
		let path = event.path.as_deref().unwrap_or("/");
		debug!(target = "zk.client", ?event_type, path, "watch fired");
		self.watcher.process_event(event_type, path);
	}
}

/// Identity key over a watcher handle: equal only to clones of the same `Arc`.
#[derive(Clone)]
pub struct WatcherKey(Arc<dyn Watcher>);

impl WatcherKey {
	pub fn new(watcher: &Arc<dyn Watcher>) -> Self {
		Self(Arc::clone(watcher))
	}

	fn addr(&self) -> *const () {
		Arc::as_ptr(&self.0) as *const ()
	}
}

impl PartialEq for WatcherKey {
	fn eq(&self, other: &Self) -> bool {
		self.addr() == other.addr()
	}
}

impl Eq for WatcherKey {}

impl Hash for WatcherKey {
	fn hash<H: Hasher>(&self, state: &mut H) {
		self.addr().hash(state);
	}
}

impl fmt::Debug for WatcherKey {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "WatcherKey({:p})", self.addr())
	}
}

/// Adapters created so far, one per watcher identity.
///
/// Entries live as long as the registry; the key keeps its watcher alive, so
/// an address is never reused for a different watcher while mapped.
#[derive(Default)]
pub struct WatcherRegistry {
	adapters: Mutex<HashMap<WatcherKey, Arc<WatcherAdapter>>>,
}

impl WatcherRegistry {
	pub fn new() -> Self {
		Self::default()
	}

	/// Returns the adapter for `watcher`, creating it on first use.
	pub fn adapter_for(&self, watcher: &Arc<dyn Watcher>) -> Arc<dyn WatchCallback> {
		let mut adapters = self.adapters.lock();
		let adapter = adapters.entry(WatcherKey::new(watcher)).or_insert_with(|| Arc::new(WatcherAdapter::new(Arc::clone(watcher))));
		Arc::clone(adapter) as Arc<dyn WatchCallback>
	}

	pub fn len(&self) -> usize {
		self.adapters.lock().len()
	}

	pub fn is_empty(&self) -> bool {
		self.len() == 0
	}
}

#[cfg(test)]
mod tests {
	use std::sync::atomic::{AtomicUsize, Ordering};

	use super::*;

	fn counting() -> (Arc<AtomicUsize>, Arc<dyn Watcher>) {
		let hits = Arc::new(AtomicUsize::new(0));
		let counter = Arc::clone(&hits);
		let watcher = from_fn(move |_, _| {
			counter.fetch_add(1, Ordering::SeqCst);
		});
		(hits, watcher)
	}

	#[test]
	fn same_watcher_maps_to_same_adapter() {
		let registry = WatcherRegistry::new();
		let (_, watcher) = counting();
		let first = registry.adapter_for(&watcher);
		let second = registry.adapter_for(&Arc::clone(&watcher));
		assert!(Arc::ptr_eq(&first, &second));
		assert_eq!(registry.len(), 1);
	}

	#[test]
	fn equal_behavior_distinct_watchers_stay_apart() {
		let registry = WatcherRegistry::new();
		let (_, a) = counting();
		let (_, b) = counting();
		let first = registry.adapter_for(&a);
		let second = registry.adapter_for(&b);
		assert!(!Arc::ptr_eq(&first, &second));
		assert_eq!(registry.len(), 2);
		assert_ne!(WatcherKey::new(&a), WatcherKey::new(&b));
	}

	#[test]
	fn concurrent_registration_keeps_one_adapter_per_identity() {
		const THREADS: usize = 8;
		const ROUNDS: usize = 50;

		let registry = Arc::new(WatcherRegistry::new());
		let (_, shared) = counting();
		let handles: Vec<_> = (0..THREADS)
			.map(|_| {
				let registry = Arc::clone(&registry);
				let shared = Arc::clone(&shared);
				std::thread::spawn(move || {
					let (_, own) = counting();
					let mut seen = Vec::with_capacity(ROUNDS);
					for _ in 0..ROUNDS {
						seen.push(registry.adapter_for(&shared));
						assert!(Arc::ptr_eq(&registry.adapter_for(&own), &registry.adapter_for(&own)));
					}
					seen
				})
			})
			.collect();

		let results: Vec<_> = handles.into_iter().map(|handle| handle.join().unwrap()).collect();
		let first = Arc::clone(&results[0][0]);
		for seen in &results {
			assert!(seen.iter().all(|adapter| Arc::ptr_eq(adapter, &first)));
		}
		assert_eq!(registry.len(), THREADS + 1);
		assert!(Arc::ptr_eq(&registry.adapter_for(&shared), &first));
	}

	#[test]
	fn adapter_drops_session_events() {
		let (hits, watcher) = counting();
		let adapter = WatcherAdapter::new(watcher);
		adapter.process(WatchedEvent::session());
		assert_eq!(hits.load(Ordering::SeqCst), 0);
		adapter.process(WatchedEvent::node(EventType::NodeCreated, "/a"));
		assert_eq!(hits.load(Ordering::SeqCst), 1);
	}

	#[test]
	fn adapter_forwards_type_and_path() {
		let seen = Arc::new(Mutex::new(Vec::new()));
		let sink = Arc::clone(&seen);
		let watcher = from_fn(move |event_type, path: &str| sink.lock().push((event_type, path.to_string())));
		WatcherAdapter::new(watcher).process(WatchedEvent::node(EventType::NodeDataChanged, "/x/y"));
		assert_eq!(*seen.lock(), vec![(EventType::NodeDataChanged, "/x/y".to_string())]);
	}
}
