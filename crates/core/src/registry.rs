//! Caller-owned cache of shared clients keyed by connection string.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, info, warn};
use zk_runtime::ConnectionFactory;

use crate::client::Client;
use crate::settings::ClientSettings;

/// Hands out one started client per connection string.
///
/// Clients are built with default settings (10 s session timeout). The
/// registry owns them: [`shutdown`](Self::shutdown), or dropping the
/// registry, disposes every client it created, including those still
/// referenced elsewhere.
pub struct ClientRegistry {
	factory: Arc<dyn ConnectionFactory>,
	clients: Mutex<HashMap<String, Arc<Client>>>,
}

impl ClientRegistry {
	pub fn new(factory: Arc<dyn ConnectionFactory>) -> Self {
		Self {
			factory,
			clients: Mutex::new(HashMap::new()),
		}
	}

	/// Returns the client for `connection_string`, creating and starting it
	/// on first use. Outside a tokio runtime the client is registered
	/// unstarted and the failure is logged.
	pub fn get_client(&self, connection_string: &str) -> Arc<Client> {
		let key = connection_string.trim();
		let mut clients = self.clients.lock();
		if let Some(client) = clients.get(key) {
			return Arc::clone(client);
		}

		let client = Arc::new(Client::new(ClientSettings::new(key), Arc::clone(&self.factory)));
		if let Err(err) = client.start() {
			warn!(target = "zk.registry", connection_string = key, error = %err, "failed to start client");
		}
		debug!(target = "zk.registry", connection_string = key, "client registered");
		clients.insert(key.to_string(), Arc::clone(&client));
		client
	}

	/// Disposes and forgets the client for `connection_string`.
	pub fn remove(&self, connection_string: &str) -> bool {
		let removed = self.clients.lock().remove(connection_string.trim());
		match removed {
			Some(client) => {
				client.dispose();
				true
			}
			None => false,
		}
	}

	pub fn len(&self) -> usize {
		self.clients.lock().len()
	}

	pub fn is_empty(&self) -> bool {
		self.len() == 0
	}

	/// Disposes every client.
	pub fn shutdown(&self) {
		let clients: Vec<_> = self.clients.lock().drain().collect();
		if clients.is_empty() {
			return;
		}
		info!(target = "zk.registry", count = clients.len(), "shutting down clients");
		for (_, client) in clients {
			client.dispose();
		}
	}
}

impl Drop for ClientRegistry {
	fn drop(&mut self) {
		self.shutdown();
	}
}
