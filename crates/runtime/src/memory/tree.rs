//! Node tree and watch tables of the in-process ensemble.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use tokio::sync::mpsc;
use tracing::warn;
use zk_protocol::{ANY_VERSION, ConnectionState, CreateMode, EventType, KeeperCode, Stat, WatchedEvent};

use crate::connection::WatchCallback;
use crate::fault::{Fault, FaultResult};

const PROTECTED_PREFIX: &str = "_c_";

/// Work item for a connection's event task.
pub(crate) enum Signal {
	State(ConnectionState),
	Watch(Arc<dyn WatchCallback>, WatchedEvent),
	SessionExpired,
}

/// One pending watch on one path.
#[derive(Clone)]
pub(crate) struct WatchRegistration {
	pub(crate) callback: Arc<dyn WatchCallback>,
	pub(crate) session_id: i64,
	pub(crate) namespace: Option<String>,
	pub(crate) sink: mpsc::UnboundedSender<Signal>,
}

impl WatchRegistration {
	fn key(&self) -> (*const (), i64) {
		(Arc::as_ptr(&self.callback) as *const (), self.session_id)
	}

	fn deliver(&self, event_type: EventType, path: &str) {
		let path = strip_namespace(self.namespace.as_deref(), path);
		let _ = self.sink.send(Signal::Watch(Arc::clone(&self.callback), WatchedEvent::node(event_type, path)));
	}
}

#[derive(Debug, Clone, Copy)]
enum WatchKind {
	Data,
	Child,
}

struct Node {
	data: Vec<u8>,
	stat: Stat,
	children: BTreeSet<String>,
}

/// The hierarchical namespace.
pub(crate) struct NodeTree {
	nodes: HashMap<String, Node>,
	zxid: i64,
	data_watches: HashMap<String, Vec<WatchRegistration>>,
	child_watches: HashMap<String, Vec<WatchRegistration>>,
}

impl NodeTree {
	pub(crate) fn new() -> Self {
		let mut nodes = HashMap::new();
		nodes.insert(
			"/".to_string(),
			Node {
				data: Vec::new(),
				stat: Stat::default(),
				children: BTreeSet::new(),
			},
		);
		Self {
			nodes,
			zxid: 0,
			data_watches: HashMap::new(),
			child_watches: HashMap::new(),
		}
	}

	pub(crate) fn contains(&self, path: &str) -> bool {
		self.nodes.contains_key(path)
	}

	pub(crate) fn len(&self) -> usize {
		self.nodes.len()
	}

	/// Creates one node. The parent must exist.
	pub(crate) fn create(&mut self, path: &str, data: &[u8], mode: CreateMode, owner: i64) -> FaultResult<String> {
		if path == "/" {
			return Err(Fault::keeper(KeeperCode::NodeExists, path));
		}

		let parent_path = parent_of(path).to_string();
		let parent = self.nodes.get(&parent_path).ok_or_else(|| Fault::keeper(KeeperCode::NoNode, path))?;
		if parent.stat.is_ephemeral() {
			return Err(Fault::keeper(KeeperCode::NoChildrenForEphemerals, path));
		}

		let path = if mode.is_sequential() {
			format!("{path}{:010}", parent.stat.cversion)
		} else {
			path.to_string()
		};
		if self.nodes.contains_key(&path) {
			return Err(Fault::keeper(KeeperCode::NodeExists, path));
		}

		let zxid = self.next_zxid();
		let now = now_millis();
		self.nodes.insert(
			path.clone(),
			Node {
				data: data.to_vec(),
				stat: Stat {
					czxid: zxid,
					mzxid: zxid,
					ctime: now,
					mtime: now,
					ephemeral_owner: owner,
					data_length: data.len() as i32,
					pzxid: zxid,
					..Stat::default()
				},
				children: BTreeSet::new(),
			},
		);

		if let Some(parent) = self.nodes.get_mut(&parent_path) {
			parent.children.insert(name_of(&path).to_string());
			parent.stat.cversion += 1;
			parent.stat.num_children += 1;
			parent.stat.pzxid = zxid;
		}

		self.fire(&[(WatchKind::Data, &path, EventType::NodeCreated), (WatchKind::Child, &parent_path, EventType::NodeChildrenChanged)]);
		Ok(path)
	}

	/// Creates every missing ancestor of `path` as an empty persistent node.
	pub(crate) fn create_parents(&mut self, path: &str) -> FaultResult<()> {
		let parent = parent_of(path);
		let mut current = String::new();
		for segment in parent.split('/').filter(|segment| !segment.is_empty()) {
			current.push('/');
			current.push_str(segment);
			if self.nodes.contains_key(&current) {
				continue;
			}
			match self.create(&current, &[], CreateMode::Persistent, 0) {
				Ok(_) | Err(Fault::Keeper { code: KeeperCode::NodeExists, .. }) => {}
				Err(fault) => return Err(fault),
			}
		}
		Ok(())
	}

	/// Returns the child of `path`'s parent carrying the protection id, if any.
	pub(crate) fn find_protected(&self, path: &str, protection_id: &str) -> Option<String> {
		let parent_path = parent_of(path);
		let prefix = format!("{PROTECTED_PREFIX}{protection_id}-");
		let parent = self.nodes.get(parent_path)?;
		parent.children.iter().find(|name| name.starts_with(&prefix)).map(|name| join(parent_path, name))
	}

	pub(crate) fn delete(&mut self, path: &str, version: i32) -> FaultResult<()> {
		if path == "/" {
			return Err(Fault::keeper(KeeperCode::BadArguments, path));
		}
		let node = self.nodes.get(path).ok_or_else(|| Fault::keeper(KeeperCode::NoNode, path))?;
		if version != ANY_VERSION && node.stat.version != version {
			return Err(Fault::keeper(KeeperCode::BadVersion, path));
		}
		if !node.children.is_empty() {
			return Err(Fault::keeper(KeeperCode::NotEmpty, path));
		}

		self.nodes.remove(path);
		let zxid = self.next_zxid();
		let parent_path = parent_of(path).to_string();
		if let Some(parent) = self.nodes.get_mut(&parent_path) {
			parent.children.remove(name_of(path));
			parent.stat.cversion += 1;
			parent.stat.num_children -= 1;
			parent.stat.pzxid = zxid;
		}

		self.fire(&[
			(WatchKind::Data, path, EventType::NodeDeleted),
			(WatchKind::Child, path, EventType::NodeDeleted),
			(WatchKind::Child, &parent_path, EventType::NodeChildrenChanged),
		]);
		Ok(())
	}

	/// Deletes every descendant of `path`, deepest first.
	pub(crate) fn delete_descendants(&mut self, path: &str) -> FaultResult<()> {
		let prefix = if path == "/" { "/".to_string() } else { format!("{path}/") };
		let mut descendants: Vec<String> = self.nodes.keys().filter(|candidate| candidate.starts_with(&prefix) && candidate.as_str() != "/").cloned().collect();
		descendants.sort_by_key(|candidate| std::cmp::Reverse(depth(candidate)));

		for descendant in descendants {
			match self.delete(&descendant, ANY_VERSION) {
				Ok(()) | Err(Fault::Keeper { code: KeeperCode::NoNode, .. }) => {}
				Err(fault) => return Err(fault),
			}
		}
		Ok(())
	}

	pub(crate) fn set_data(&mut self, path: &str, data: &[u8], version: i32) -> FaultResult<Stat> {
		let current = self.nodes.get(path).ok_or_else(|| Fault::keeper(KeeperCode::NoNode, path))?;
		if version != ANY_VERSION && current.stat.version != version {
			return Err(Fault::keeper(KeeperCode::BadVersion, path));
		}

		let zxid = self.next_zxid();
		let stat = match self.nodes.get_mut(path) {
			Some(node) => {
				node.data = data.to_vec();
				node.stat.version += 1;
				node.stat.mzxid = zxid;
				node.stat.mtime = now_millis();
				node.stat.data_length = data.len() as i32;
				node.stat
			}
			None => return Err(Fault::keeper(KeeperCode::NoNode, path)),
		};

		self.fire(&[(WatchKind::Data, path, EventType::NodeDataChanged)]);
		Ok(stat)
	}

	/// Returns metadata when present. The watch is registered either way.
	pub(crate) fn exists(&mut self, path: &str, watch: Option<WatchRegistration>) -> Option<Stat> {
		if let Some(watch) = watch {
			register(&mut self.data_watches, path, watch);
		}
		self.nodes.get(path).map(|node| node.stat)
	}

	pub(crate) fn get_data(&mut self, path: &str, watch: Option<WatchRegistration>) -> FaultResult<(Vec<u8>, Stat)> {
		let node = self.nodes.get(path).ok_or_else(|| Fault::keeper(KeeperCode::NoNode, path))?;
		let result = (node.data.clone(), node.stat);
		if let Some(watch) = watch {
			register(&mut self.data_watches, path, watch);
		}
		Ok(result)
	}

	pub(crate) fn get_children(&mut self, path: &str, watch: Option<WatchRegistration>) -> FaultResult<(Vec<String>, Stat)> {
		let node = self.nodes.get(path).ok_or_else(|| Fault::keeper(KeeperCode::NoNode, path))?;
		let result = (node.children.iter().cloned().collect(), node.stat);
		if let Some(watch) = watch {
			register(&mut self.child_watches, path, watch);
		}
		Ok(result)
	}

	/// Deletes every node owned by `session_id`.
	pub(crate) fn remove_ephemerals(&mut self, session_id: i64) {
		let mut owned: Vec<String> = self.nodes.iter().filter(|(_, node)| node.stat.ephemeral_owner == session_id).map(|(path, _)| path.clone()).collect();
		owned.sort_by_key(|path| std::cmp::Reverse(depth(path)));
		for path in owned {
			if let Err(fault) = self.delete(&path, ANY_VERSION) {
				warn!(target = "zk.runtime", %path, error = %fault, "failed to remove ephemeral node");
			}
		}
	}

	/// Forgets every pending watch registered by `session_id`.
	pub(crate) fn drop_watches(&mut self, session_id: i64) {
		for table in [&mut self.data_watches, &mut self.child_watches] {
			table.retain(|_, registrations| {
				registrations.retain(|registration| registration.session_id != session_id);
				!registrations.is_empty()
			});
		}
	}

	fn next_zxid(&mut self) -> i64 {
		self.zxid += 1;
		self.zxid
	}

	fn fire(&mut self, triggers: &[(WatchKind, &str, EventType)]) {
		let mut seen = Vec::new();
		for (kind, path, event_type) in triggers {
			let table = match kind {
				WatchKind::Data => &mut self.data_watches,
				WatchKind::Child => &mut self.child_watches,
			};
			let Some(registrations) = table.remove(*path) else {
				continue;
			};
			for registration in registrations {
				let key = (registration.key(), *path);
				if seen.contains(&key) {
					continue;
				}
				seen.push(key);
				registration.deliver(*event_type, path);
			}
		}
	}
}

fn register(table: &mut HashMap<String, Vec<WatchRegistration>>, path: &str, watch: WatchRegistration) {
	let registrations = table.entry(path.to_string()).or_default();
	if !registrations.iter().any(|existing| existing.key() == watch.key()) {
		registrations.push(watch);
	}
}

/// Validates an absolute node path.
///
/// Sequential creates may end in `/`; the server appends the suffix.
pub(crate) fn validate_path(path: &str, sequential: bool) -> FaultResult<()> {
	let candidate = if sequential { format!("{path}1") } else { path.to_string() };
	if candidate.is_empty() {
		return Err(Fault::IllegalArgument("Path length must be > 0".into()));
	}
	if !candidate.starts_with('/') {
		return Err(Fault::IllegalArgument(format!("Path must start with / character: {path}")));
	}
	if candidate.len() == 1 {
		return Ok(());
	}
	if candidate.ends_with('/') {
		return Err(Fault::IllegalArgument(format!("Path must not end with / character: {path}")));
	}
	if candidate.contains('\0') {
		return Err(Fault::IllegalArgument(format!("null character not allowed in path: {path}")));
	}
	for segment in candidate[1..].split('/') {
		if segment.is_empty() {
			return Err(Fault::IllegalArgument(format!("empty node name specified in path: {path}")));
		}
		if segment == "." || segment == ".." {
			return Err(Fault::IllegalArgument(format!("relative paths not allowed: {path}")));
		}
	}
	Ok(())
}

/// Builds the protected form of `path`: `<parent>/_c_<id>-<name>`.
pub(crate) fn protected_path(path: &str, protection_id: &str) -> String {
	join(parent_of(path), &format!("{PROTECTED_PREFIX}{protection_id}-{}", name_of(path)))
}

/// Removes the `/<namespace>` prefix from a server path.
pub(crate) fn strip_namespace(namespace: Option<&str>, path: &str) -> String {
	let Some(namespace) = namespace else {
		return path.to_string();
	};
	let prefix = format!("/{namespace}");
	if path == prefix {
		return "/".to_string();
	}
	match path.strip_prefix(&prefix) {
		Some(rest) if rest.starts_with('/') => rest.to_string(),
		_ => path.to_string(),
	}
}

pub(crate) fn parent_of(path: &str) -> &str {
	match path.rfind('/') {
		Some(0) | None => "/",
		Some(index) => &path[..index],
	}
}

fn name_of(path: &str) -> &str {
	path.rsplit('/').next().unwrap_or(path)
}

fn join(parent: &str, name: &str) -> String {
	if parent == "/" { format!("/{name}") } else { format!("{parent}/{name}") }
}

fn depth(path: &str) -> usize {
	path.matches('/').count()
}

fn now_millis() -> i64 {
	SystemTime::now().duration_since(UNIX_EPOCH).map(|elapsed| elapsed.as_millis() as i64).unwrap_or_default()
}

#[cfg(test)]
mod tests {
	use super::*;
	use parking_lot::Mutex;

	struct Recorder(Mutex<Vec<WatchedEvent>>);

	impl WatchCallback for Recorder {
		fn process(&self, event: WatchedEvent) {
			self.0.lock().push(event);
		}
	}

	fn registration(callback: &Arc<Recorder>, sink: &mpsc::UnboundedSender<Signal>) -> WatchRegistration {
		WatchRegistration {
			callback: Arc::clone(callback) as Arc<dyn WatchCallback>,
			session_id: 7,
			namespace: None,
			sink: sink.clone(),
		}
	}

	fn drain(rx: &mut mpsc::UnboundedReceiver<Signal>) -> Vec<WatchedEvent> {
		let mut events = Vec::new();
		while let Ok(signal) = rx.try_recv() {
			if let Signal::Watch(_, event) = signal {
				events.push(event);
			}
		}
		events
	}

	#[test]
	fn validate_path_rules() {
		assert!(validate_path("/", false).is_ok());
		assert!(validate_path("/a/b", false).is_ok());
		assert!(validate_path("/a/", true).is_ok());
		assert!(matches!(validate_path("", false), Err(Fault::IllegalArgument(_))));
		assert!(matches!(validate_path("a", false), Err(Fault::IllegalArgument(_))));
		assert!(matches!(validate_path("/a/", false), Err(Fault::IllegalArgument(_))));
		assert!(matches!(validate_path("/a//b", false), Err(Fault::IllegalArgument(_))));
		assert!(matches!(validate_path("/a/../b", false), Err(Fault::IllegalArgument(_))));
	}

	#[test]
	fn path_helpers() {
		assert_eq!(parent_of("/a"), "/");
		assert_eq!(parent_of("/a/b/c"), "/a/b");
		assert_eq!(protected_path("/a/lock-", "ff"), "/a/_c_ff-lock-");
		assert_eq!(strip_namespace(Some("app"), "/app/x"), "/x");
		assert_eq!(strip_namespace(Some("app"), "/app"), "/");
		assert_eq!(strip_namespace(Some("app"), "/application"), "/application");
		assert_eq!(strip_namespace(None, "/app/x"), "/app/x");
	}

	#[test]
	fn create_requires_parent_and_updates_parent_stat() {
		let mut tree = NodeTree::new();
		assert_eq!(tree.create("/a/b", b"", CreateMode::Persistent, 0).unwrap_err().code(), Some(KeeperCode::NoNode));

		tree.create("/a", b"x", CreateMode::Persistent, 0).unwrap();
		tree.create("/a/b", b"", CreateMode::Persistent, 0).unwrap();
		let (children, stat) = tree.get_children("/a", None).unwrap();
		assert_eq!(children, vec!["b"]);
		assert_eq!(stat.cversion, 1);
		assert_eq!(stat.num_children, 1);
		assert_eq!(stat.data_length, 1);
	}

	#[test]
	fn sequential_suffix_follows_parent_cversion() {
		let mut tree = NodeTree::new();
		tree.create("/q", b"", CreateMode::Persistent, 0).unwrap();
		let first = tree.create("/q/item-", b"", CreateMode::PersistentSequential, 0).unwrap();
		let second = tree.create("/q/item-", b"", CreateMode::PersistentSequential, 0).unwrap();
		assert_eq!(first, "/q/item-0000000000");
		assert_eq!(second, "/q/item-0000000001");
	}

	#[test]
	fn ephemeral_nodes_cannot_have_children_and_vanish_with_session() {
		let mut tree = NodeTree::new();
		tree.create("/e", b"", CreateMode::Ephemeral, 9).unwrap();
		assert_eq!(tree.create("/e/c", b"", CreateMode::Persistent, 0).unwrap_err().code(), Some(KeeperCode::NoChildrenForEphemerals));

		tree.remove_ephemerals(9);
		assert!(!tree.contains("/e"));
	}

	#[test]
	fn delete_checks_version_and_children() {
		let mut tree = NodeTree::new();
		tree.create("/d", b"", CreateMode::Persistent, 0).unwrap();
		tree.create("/d/c", b"", CreateMode::Persistent, 0).unwrap();
		assert_eq!(tree.delete("/d", ANY_VERSION).unwrap_err().code(), Some(KeeperCode::NotEmpty));
		assert_eq!(tree.delete("/d/c", 3).unwrap_err().code(), Some(KeeperCode::BadVersion));

		tree.delete_descendants("/d").unwrap();
		tree.delete("/d", 0).unwrap();
		assert!(!tree.contains("/d"));
		assert_eq!(tree.len(), 1);
	}

	#[test]
	fn set_data_bumps_version() {
		let mut tree = NodeTree::new();
		tree.create("/s", b"", CreateMode::Persistent, 0).unwrap();
		let stat = tree.set_data("/s", b"abc", ANY_VERSION).unwrap();
		assert_eq!(stat.version, 1);
		assert_eq!(stat.data_length, 3);
		assert_eq!(tree.set_data("/s", b"", 0).unwrap_err().code(), Some(KeeperCode::BadVersion));
	}

	#[test]
	fn watches_fire_once_and_dedupe_by_identity() {
		let (tx, mut rx) = mpsc::unbounded_channel();
		let recorder = Arc::new(Recorder(Mutex::new(Vec::new())));
		let mut tree = NodeTree::new();

		assert!(tree.exists("/w", Some(registration(&recorder, &tx))).is_none());
		assert!(tree.exists("/w", Some(registration(&recorder, &tx))).is_none());
		tree.create("/w", b"", CreateMode::Persistent, 0).unwrap();
		tree.delete("/w", ANY_VERSION).unwrap();

		let events = drain(&mut rx);
		assert_eq!(events, vec![WatchedEvent::node(EventType::NodeCreated, "/w")]);
	}

	#[test]
	fn dropped_watches_do_not_fire() {
		let (tx, mut rx) = mpsc::unbounded_channel();
		let recorder = Arc::new(Recorder(Mutex::new(Vec::new())));
		let mut tree = NodeTree::new();
		tree.exists("/w", Some(registration(&recorder, &tx)));
		tree.drop_watches(7);
		tree.create("/w", b"", CreateMode::Persistent, 0).unwrap();
		assert!(drain(&mut rx).is_empty());
	}
}
