//! Node metadata returned alongside reads.

use serde::{Deserialize, Serialize};

/// Metadata describing a single node.
///
/// Values are produced by the connection layer from a server response and
/// never mutated afterwards. Equality is structural over every counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Stat {
	/// Zxid of the transaction that created the node.
	pub czxid: i64,
	/// Zxid of the transaction that last modified the node's data.
	pub mzxid: i64,
	/// Creation time in milliseconds since the epoch.
	pub ctime: i64,
	/// Last modification time in milliseconds since the epoch.
	pub mtime: i64,
	/// Number of changes to the node's data.
	pub version: i32,
	/// Number of changes to the node's children.
	pub cversion: i32,
	/// Number of changes to the node's ACL.
	pub aversion: i32,
	/// Owning session id for ephemeral nodes, `0` otherwise.
	pub ephemeral_owner: i64,
	/// Length of the node's data in bytes.
	pub data_length: i32,
	/// Number of immediate children.
	pub num_children: i32,
	/// Zxid of the last change to the node's children.
	pub pzxid: i64,
}

impl Stat {
	/// Returns `true` when the node is owned by a session.
	pub fn is_ephemeral(&self) -> bool {
		self.ephemeral_owner != 0
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn equality_is_structural() {
		let a = Stat {
			czxid: 1,
			mzxid: 2,
			version: 3,
			..Default::default()
		};
		let b = Stat {
			czxid: 1,
			mzxid: 2,
			version: 3,
			..Default::default()
		};
		assert_eq!(a, b);
		assert_ne!(a, Stat { version: 4, ..b });
	}

	#[test]
	fn serializes_camel_case() {
		let stat = Stat {
			ephemeral_owner: 42,
			num_children: 2,
			..Default::default()
		};
		let json = serde_json::to_value(stat).unwrap();
		assert_eq!(json["ephemeralOwner"], 42);
		assert_eq!(json["numChildren"], 2);
		assert!(stat.is_ephemeral());
	}
}
