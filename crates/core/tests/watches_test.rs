// One-shot watch delivery through the client.

mod test_ensemble;

use std::sync::Arc;
use std::time::Duration;

use test_ensemble::{RecordingWatcher, eventually, started_client};
use zk::{ANY_VERSION, CreateMode, DeleteOptions, EventType, MemoryEnsemble, Watcher};

const SETTLE: Duration = Duration::from_millis(150);
const DELIVERY: Duration = Duration::from_secs(2);

#[tokio::test]
async fn test_exists_watch_fires_exactly_once() -> anyhow::Result<()> {
	let ensemble = MemoryEnsemble::new();
	let client = started_client(&ensemble).await;
	let recorder = RecordingWatcher::new();
	let watcher: Arc<dyn Watcher> = recorder.clone();

	assert!(client.exists("/watched", Some(&watcher)).await.into_payload()?.is_none());
	client.create("/watched", b"", CreateMode::Persistent).await.check()?;
	assert!(eventually(DELIVERY, || recorder.hits() == 1).await, "watch should fire on create");
	assert_eq!(recorder.events(), [(EventType::NodeCreated, "/watched".to_string())]);

	client.set_data("/watched", b"again", ANY_VERSION).await.check()?;
	client.delete("/watched", DeleteOptions::new()).await.check()?;
	client.create("/watched", b"", CreateMode::Persistent).await.check()?;
	tokio::time::sleep(SETTLE).await;
	assert_eq!(recorder.hits(), 1, "a fired registration must not fire again");
	Ok(())
}

#[tokio::test]
async fn test_same_watcher_registered_twice_fires_once() -> anyhow::Result<()> {
	let ensemble = MemoryEnsemble::new();
	let client = started_client(&ensemble).await;
	client.create("/twice", b"", CreateMode::Persistent).await.check()?;
	let recorder = RecordingWatcher::new();
	let watcher: Arc<dyn Watcher> = recorder.clone();

	client.get_data("/twice", Some(&watcher)).await.check()?;
	client.exists("/twice", Some(&watcher)).await.check()?;
	client.set_data("/twice", b"changed", ANY_VERSION).await.check()?;

	assert!(eventually(DELIVERY, || recorder.hits() >= 1).await);
	tokio::time::sleep(SETTLE).await;
	assert_eq!(recorder.events(), [(EventType::NodeDataChanged, "/twice".to_string())]);
	Ok(())
}

#[tokio::test]
async fn test_distinct_watchers_each_fire() -> anyhow::Result<()> {
	let ensemble = MemoryEnsemble::new();
	let client = started_client(&ensemble).await;
	client.create("/shared", b"", CreateMode::Persistent).await.check()?;
	let first = RecordingWatcher::new();
	let second = RecordingWatcher::new();
	let (a, b): (Arc<dyn Watcher>, Arc<dyn Watcher>) = (first.clone(), second.clone());

	client.get_data("/shared", Some(&a)).await.check()?;
	client.get_data("/shared", Some(&b)).await.check()?;
	client.set_data("/shared", b"x", ANY_VERSION).await.check()?;

	assert!(eventually(DELIVERY, || first.hits() == 1 && second.hits() == 1).await);
	Ok(())
}

#[tokio::test]
async fn test_children_watch_fires_on_child_change() -> anyhow::Result<()> {
	let ensemble = MemoryEnsemble::new();
	let client = started_client(&ensemble).await;
	client.create("/parent", b"", CreateMode::Persistent).await.check()?;
	let recorder = RecordingWatcher::new();
	let watcher: Arc<dyn Watcher> = recorder.clone();

	assert!(client.get_children("/parent", Some(&watcher)).await.into_payload()?.is_empty());
	client.create("/parent/kid", b"", CreateMode::Persistent).await.check()?;

	assert!(eventually(DELIVERY, || recorder.hits() == 1).await);
	assert_eq!(recorder.events(), [(EventType::NodeChildrenChanged, "/parent".to_string())]);
	Ok(())
}

#[tokio::test]
async fn test_data_watch_fires_on_delete() -> anyhow::Result<()> {
	let ensemble = MemoryEnsemble::new();
	let client = started_client(&ensemble).await;
	client.create("/doomed", b"", CreateMode::Persistent).await.check()?;
	let recorder = RecordingWatcher::new();
	let watcher: Arc<dyn Watcher> = recorder.clone();

	client.get_data("/doomed", Some(&watcher)).await.check()?;
	client.delete("/doomed", DeleteOptions::new()).await.check()?;

	assert!(eventually(DELIVERY, || recorder.hits() == 1).await);
	assert_eq!(recorder.events(), [(EventType::NodeDeleted, "/doomed".to_string())]);
	Ok(())
}

#[tokio::test]
async fn test_closure_watcher_sees_namespace_relative_path() -> anyhow::Result<()> {
	let ensemble = MemoryEnsemble::new();
	let root = started_client(&ensemble).await;
	let tenant = root.using_namespace("/tenant");

	let seen = Arc::new(parking_lot::Mutex::new(Vec::new()));
	let sink = Arc::clone(&seen);
	let watcher = zk::from_fn(move |event_type, path: &str| sink.lock().push((event_type, path.to_string())));

	tenant.exists("/job", Some(&watcher)).await.check()?;
	root.create("/tenant/job", b"", CreateMode::Persistent).await.check()?;

	assert!(eventually(DELIVERY, || !seen.lock().is_empty()).await);
	assert_eq!(*seen.lock(), [(EventType::NodeCreated, "/job".to_string())]);
	Ok(())
}
