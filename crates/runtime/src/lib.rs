//! Connection layer for the coordination-service client.
//!
//! The client core in `zk-client` talks to an ensemble exclusively through
//! the traits in [`connection`]: a session-owning [`Connection`] built by a
//! [`ConnectionFactory`], which raises [`Fault`]s and retries them per a
//! [`RetryPolicy`]. Member lists come from an [`EnsembleProvider`].
//!
//! [`MemoryEnsemble`] is a complete in-process implementation of the layer,
//! used by the test suites and by embedders that want a local namespace.

pub mod connection;
pub mod ensemble;
pub mod fault;
pub mod memory;
pub mod retry;

pub use connection::{
	Connection, ConnectionConfig, ConnectionFactory, ConnectionListener, CreateOptions, LifecycleState, ListenerId, SessionInfo, SessionProbe, WatchCallback,
};
pub use ensemble::{EnsembleProvider, FixedEnsembleProvider, RandomizedEnsembleProvider, ShuffledEnsembleProvider, parse_members};
pub use fault::{Fault, FaultResult};
pub use memory::{MemoryConnection, MemoryEnsemble};
pub use retry::RetryPolicy;
