//! Ensemble providers: where a connection finds its member list.

use parking_lot::Mutex;
use rand::seq::SliceRandom;
use tracing::debug;

/// Supplies the connection string used when (re)connecting.
pub trait EnsembleProvider: Send + Sync {
	/// Returns the current comma-separated `host:port` list.
	fn connection_string(&self) -> String;

	/// Returns the randomizable view of this provider, if it has one.
	///
	/// Fixed providers return `None`, which turns ensemble randomization
	/// into a no-op.
	fn as_randomized(&self) -> Option<&dyn RandomizedEnsembleProvider> {
		None
	}
}

/// A provider whose member order can be reshuffled on demand.
pub trait RandomizedEnsembleProvider: EnsembleProvider {
	/// Reorders the member list.
	fn randomize(&self);
}

/// Splits a connection string into trimmed, non-empty members.
pub fn parse_members(connection_string: &str) -> Vec<String> {
	connection_string
		.split(',')
		.map(str::trim)
		.filter(|member| !member.is_empty())
		.map(str::to_string)
		.collect()
}

/// A provider that always returns the same connection string.
#[derive(Debug, Clone)]
pub struct FixedEnsembleProvider {
	connection_string: String,
}

impl FixedEnsembleProvider {
	pub fn new(connection_string: &str) -> Self {
		Self {
			connection_string: connection_string.trim().to_string(),
		}
	}
}

impl EnsembleProvider for FixedEnsembleProvider {
	fn connection_string(&self) -> String {
		self.connection_string.clone()
	}
}

/// A provider over a member list that can be shuffled.
#[derive(Debug)]
pub struct ShuffledEnsembleProvider {
	state: Mutex<ShuffleState>,
}

#[derive(Debug)]
struct ShuffleState {
	members: Vec<String>,
	randomizations: usize,
}

impl ShuffledEnsembleProvider {
	pub fn new(connection_string: &str) -> Self {
		Self {
			state: Mutex::new(ShuffleState {
				members: parse_members(connection_string),
				randomizations: 0,
			}),
		}
	}

	/// Returns the current member order.
	pub fn members(&self) -> Vec<String> {
		self.state.lock().members.clone()
	}

	/// Returns how many times the member list has been reshuffled.
	pub fn randomizations(&self) -> usize {
		self.state.lock().randomizations
	}
}

impl EnsembleProvider for ShuffledEnsembleProvider {
	fn connection_string(&self) -> String {
		self.state.lock().members.join(",")
	}

	fn as_randomized(&self) -> Option<&dyn RandomizedEnsembleProvider> {
		Some(self)
	}
}

impl RandomizedEnsembleProvider for ShuffledEnsembleProvider {
	fn randomize(&self) {
		let mut state = self.state.lock();
		state.members.shuffle(&mut rand::rng());
		state.randomizations += 1;
		debug!(target = "zk.runtime", members = %state.members.join(","), "ensemble members reshuffled");
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn parse_members_trims_and_skips_blanks() {
		assert_eq!(parse_members(" a:1, b:2 ,,c:3 "), vec!["a:1", "b:2", "c:3"]);
		assert!(parse_members("  ").is_empty());
	}

	#[test]
	fn fixed_provider_is_not_randomizable() {
		let provider = FixedEnsembleProvider::new("  zk1:2181,zk2:2181 ");
		assert_eq!(provider.connection_string(), "zk1:2181,zk2:2181");
		assert!(provider.as_randomized().is_none());
	}

	#[test]
	fn shuffled_provider_keeps_members_and_counts_reorders() {
		let provider = ShuffledEnsembleProvider::new("a:1,b:2,c:3,d:4");
		let randomized = provider.as_randomized().expect("shuffled provider is randomizable");
		randomized.randomize();
		randomized.randomize();

		let mut members = provider.members();
		members.sort();
		assert_eq!(members, vec!["a:1", "b:2", "c:3", "d:4"]);
		assert_eq!(provider.randomizations(), 2);
		assert_eq!(provider.connection_string().split(',').count(), 4);
	}
}
