//! Wire types for the coordination-service protocol.
//!
//! This crate contains the plain data shapes exchanged between the client
//! core and the connection layer: node metadata, create modes, server
//! response codes, connection states and watch events.
//!
//! # Design Philosophy
//!
//! Types in this crate are:
//! * Pure data: No behavior beyond small classification predicates
//! * 1:1 with protocol: Numeric encodings match the server's own
//! * Stable: Changes only when the wire protocol changes
//!
//! Higher-level ergonomic APIs are built on top of these types in `zk-client`.

pub mod code;
pub mod stat;
pub mod types;

pub use code::*;
pub use stat::*;
pub use types::*;
