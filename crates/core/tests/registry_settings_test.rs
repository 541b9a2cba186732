// Client registry ownership and settings loaded from disk.

mod test_ensemble;

use std::io::Write;
use std::sync::Arc;
use std::time::Duration;

use test_ensemble::{CONNECT_TIMEOUT, init_tracing};
use zk::{Client, ClientRegistry, ClientSettings, CreateMode, Error, MemoryEnsemble, ResultStatus, RetryStrategy};

#[tokio::test]
async fn test_registry_reuses_client_per_connection_string() {
	init_tracing();
	let ensemble = MemoryEnsemble::new();
	let registry = ClientRegistry::new(Arc::new(ensemble.clone()));
	let connection_string = ensemble.connection_string();

	let first = registry.get_client(&connection_string);
	let second = registry.get_client(&format!("  {connection_string} "));
	assert!(Arc::ptr_eq(&first, &second));
	assert_eq!(registry.len(), 1);

	first.wait_until_connected(CONNECT_TIMEOUT).await.expect("registry clients are started");
	assert_eq!(first.session_timeout().expect("session established"), Duration::from_secs(10));
}

#[tokio::test]
async fn test_registry_remove_and_shutdown_dispose_clients() {
	init_tracing();
	let ensemble = MemoryEnsemble::new();
	let registry = ClientRegistry::new(Arc::new(ensemble.clone()));

	let removed = registry.get_client("127.0.0.1:2181");
	assert!(registry.remove(" 127.0.0.1:2181"));
	assert!(!registry.remove("127.0.0.1:2181"));
	assert!(!removed.is_started());

	let kept = registry.get_client(&ensemble.connection_string());
	kept.wait_until_connected(CONNECT_TIMEOUT).await.expect("connects");
	registry.shutdown();
	assert!(registry.is_empty());
	assert_eq!(kept.exists("/", None).await.status(), ResultStatus::ClientNotRunning);
	assert_eq!(ensemble.session_count(), 0);
}

#[tokio::test]
async fn test_dropping_registry_disposes_clients() {
	init_tracing();
	let ensemble = MemoryEnsemble::new();
	let client = {
		let registry = ClientRegistry::new(Arc::new(ensemble.clone()));
		registry.get_client(&ensemble.connection_string())
	};
	assert!(!client.is_started());
}

#[test]
fn test_registry_outside_runtime_keeps_unstarted_client() {
	let ensemble = MemoryEnsemble::new();
	let registry = ClientRegistry::new(Arc::new(ensemble.clone()));
	let client = registry.get_client(&ensemble.connection_string());

	assert!(!client.is_started());
	assert_eq!(registry.len(), 1);
	assert_eq!(ensemble.session_count(), 0);
}

#[tokio::test]
async fn test_settings_loaded_from_file_drive_the_client() -> anyhow::Result<()> {
	init_tracing();
	let ensemble = MemoryEnsemble::new();
	let mut file = tempfile::NamedTempFile::new()?;
	write!(
		file,
		r#"{{
			"connectionString": " {} ",
			"sessionTimeoutMs": 3000,
			"retry": {{ "maxAttempts": 2, "attemptTimeoutMs": 200, "attemptDelayMs": 10 }},
			"namespace": "/loaded"
		}}"#,
		ensemble.connection_string()
	)?;

	let settings = ClientSettings::load(file.path())?;
	assert_eq!(settings.connection_string(), ensemble.connection_string());
	assert_eq!(settings.retry_strategy(), RetryStrategy::new(2, Duration::from_millis(200), Duration::from_millis(10)));

	let client = Client::new(settings, Arc::new(ensemble.clone()));
	client.start()?;
	client.wait_until_connected(CONNECT_TIMEOUT).await?;
	assert_eq!(client.session_timeout()?, Duration::from_secs(3));

	client.create("/node", b"", CreateMode::Persistent).await.check()?;
	assert!(ensemble.contains("/loaded/node"));
	Ok(())
}

#[test]
fn test_missing_settings_file_is_an_io_error() {
	let dir = tempfile::tempdir().expect("temp dir");
	let err = ClientSettings::load(dir.path().join("absent.json")).expect_err("file is missing");
	assert!(matches!(err, Error::Io { .. }));
	assert!(err.to_string().contains("absent.json"));
}

#[test]
fn test_malformed_settings_are_rejected() {
	let err = ClientSettings::from_json_str(r#"{"connectionString": 42}"#).expect_err("wrong type");
	assert!(matches!(err, Error::Settings(_)));
}
