// Shared fixtures for the client tests: an in-process ensemble and clients
// tuned for fast failure.

#![allow(dead_code)]

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use zk::{Client, ClientSettings, ConnectionState, EventType, MemoryEnsemble, RetryStrategy, Watcher};

pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

pub fn init_tracing() {
	let _ = tracing_subscriber::fmt().with_test_writer().with_max_level(tracing::Level::DEBUG).try_init();
}

/// Settings whose calls give up after two quick attempts.
pub fn fast_settings(ensemble: &MemoryEnsemble) -> ClientSettings {
	ClientSettings::new(ensemble.connection_string())
		.with_session_timeout(Duration::from_secs(5))
		.with_retry_strategy(RetryStrategy::new(2, Duration::from_millis(200), Duration::from_millis(20)))
}

pub async fn started_client(ensemble: &MemoryEnsemble) -> Client {
	started_with(ensemble, fast_settings(ensemble)).await
}

pub async fn started_with(ensemble: &MemoryEnsemble, settings: ClientSettings) -> Client {
	init_tracing();
	let client = Client::new(settings, Arc::new(ensemble.clone()));
	let connected = Arc::new(AtomicUsize::new(0));
	let flag = Arc::clone(&connected);
	let probe = client.subscribe(move |state| {
		if state == ConnectionState::Connected {
			flag.fetch_add(1, Ordering::SeqCst);
		}
	});

	client.start().expect("Failed to start client");
	client.wait_until_connected(CONNECT_TIMEOUT).await.expect("Client should connect");
	// Let the initial Connected notification drain so later subscribers
	// only observe what the test provokes.
	assert!(eventually(CONNECT_TIMEOUT, || connected.load(Ordering::SeqCst) == 1).await, "Connected should be published");
	client.unsubscribe(probe);
	client
}

/// Polls `condition` until it holds or `timeout` passes.
pub async fn eventually(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
	let deadline = tokio::time::Instant::now() + timeout;
	loop {
		if condition() {
			return true;
		}
		if tokio::time::Instant::now() >= deadline {
			return false;
		}
		tokio::time::sleep(Duration::from_millis(10)).await;
	}
}

/// Watcher recording every event it receives.
#[derive(Default)]
pub struct RecordingWatcher {
	events: Mutex<Vec<(EventType, String)>>,
	hits: AtomicUsize,
}

impl RecordingWatcher {
	pub fn new() -> Arc<Self> {
		Arc::new(Self::default())
	}

	pub fn hits(&self) -> usize {
		self.hits.load(Ordering::SeqCst)
	}

	pub fn events(&self) -> Vec<(EventType, String)> {
		self.events.lock().clone()
	}
}

impl Watcher for RecordingWatcher {
	fn process_event(&self, event_type: EventType, path: &str) {
		self.events.lock().push((event_type, path.to_string()));
		self.hits.fetch_add(1, Ordering::SeqCst);
	}
}

/// Collects connection states delivered to a subscriber.
pub fn record_states(client: &Client) -> Arc<Mutex<Vec<ConnectionState>>> {
	let states = Arc::new(Mutex::new(Vec::new()));
	let sink = Arc::clone(&states);
	client.subscribe(move |state| sink.lock().push(state));
	states
}
