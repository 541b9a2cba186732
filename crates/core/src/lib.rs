//! Client for a ZooKeeper-style coordination service.
//!
//! [`Client`] owns one session-bearing connection and exposes node CRUD,
//! one-shot watches and connection-state subscriptions. Every node operation
//! returns an [`OpResult`]: faults from the connection layer are classified
//! into a [`ResultStatus`] and never escape as errors. Callers either inspect
//! the status or assert success with [`OpResult::check`] /
//! [`OpResult::into_payload`].
//!
//! The connection layer is pluggable through
//! [`ConnectionFactory`](zk_runtime::ConnectionFactory);
//! [`MemoryEnsemble`](zk_runtime::MemoryEnsemble) serves tests and embedding.
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use zk::{Client, ClientSettings, CreateMode, MemoryEnsemble};
//!
//! let ensemble = MemoryEnsemble::new();
//! let client = Client::new(ClientSettings::new(ensemble.connection_string()), Arc::new(ensemble));
//! client.start()?;
//! let path = client.create("/jobs/job-", b"payload", CreateMode::PersistentSequential).await.into_payload()?;
//! ```

mod client;
pub mod error;
pub mod events;
pub mod randomizer;
pub mod registry;
pub mod result;
pub mod retry;
pub mod settings;
pub mod status;
pub mod watcher;

pub use client::{ChildrenWithStat, Client, DeleteOptions, MAX_DATA_LENGTH, NodeData};
pub use error::{Error, Result};
pub use events::{StateDispatcher, SubscriptionId};
pub use randomizer::EnsembleStringRandomizer;
pub use registry::ClientRegistry;
pub use result::OpResult;
pub use retry::RetryStrategy;
pub use settings::{ClientSettings, DEFAULT_SESSION_TIMEOUT};
pub use status::{ResultStatus, StatusBand};
pub use watcher::{FnWatcher, Watcher, WatcherAdapter, WatcherKey, WatcherRegistry, from_fn};
pub use zk_protocol::{ANY_VERSION, ConnectionState, CreateMode, EventType, Stat};
pub use zk_runtime::{ConnectionFactory, EnsembleProvider, FixedEnsembleProvider, MemoryEnsemble, ShuffledEnsembleProvider};
