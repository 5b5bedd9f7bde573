//! In-memory reference store.
//!
//! [`MemoryStore`] hashes each node's canonical serialisation with BLAKE3
//! and keeps an append-only log of everything ever saved. The handle is
//! cheap to clone and clones share state, so multiple replicas in one
//! process can gossip through a single store.
//!
//! `delete` is advisory reclamation: the entry is marked reclaimed (visible
//! through [`MemoryStore::live_len`] and [`MemoryStore::is_reclaimed`]) but
//! `find` keeps serving it from the log. Two replicas with identical loose
//! ends synthesise hash-identical Aggregates, so a hard delete by one would
//! dangle a digest the other has already published. Re-saving a reclaimed
//! hash revives it.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::trace;

use crate::canonical::canonical_node_form;
use crate::hash::Hash;
use crate::node::Node;
use crate::storage::{Storage, StorageError};

#[derive(Debug, Default)]
struct Inner {
    /// Save order, append-only. Diagnostic.
    log: Vec<Hash>,
    /// Every node ever saved, keyed by its label.
    nodes: HashMap<Hash, Node>,
    /// Labels whose mappings have been reclaimed by `delete`.
    reclaimed: HashSet<Hash>,
}

/// Shared-handle in-memory content-addressed store.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    inner: Arc<Mutex<Inner>>,
}

impl MemoryStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of distinct nodes ever saved (reclaimed entries included).
    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().nodes.len()
    }

    /// Returns `true` if nothing has ever been saved.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lock().nodes.is_empty()
    }

    /// Number of nodes saved and not currently reclaimed.
    #[must_use]
    pub fn live_len(&self) -> usize {
        let inner = self.lock();
        inner.nodes.len() - inner.reclaimed.len()
    }

    /// Returns `true` if `hash` has been saved (reclaimed or not).
    #[must_use]
    pub fn contains(&self, hash: &Hash) -> bool {
        self.lock().nodes.contains_key(hash)
    }

    /// Returns `true` if `hash` is currently reclaimed.
    #[must_use]
    pub fn is_reclaimed(&self, hash: &Hash) -> bool {
        self.lock().reclaimed.contains(hash)
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        // A poisoned lock means another panic is already unwinding; keep
        // the data rather than double-panicking.
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Storage for MemoryStore {
    fn save(&self, node: &Node, tree: Option<&str>) -> Result<Hash, StorageError> {
        let form = canonical_node_form(node)?;
        let digest = blake3::hash(form.as_bytes());
        let hash = Hash::from(format!("blake3:{digest}"));

        let mut inner = self.lock();
        if inner.nodes.contains_key(&hash) {
            // Identical content: same label. A re-save revives a reclaimed
            // mapping.
            inner.reclaimed.remove(&hash);
            return Ok(hash);
        }

        let mut stored = node.clone();
        stored.hash = hash.clone();
        inner.log.push(hash.clone());
        inner.nodes.insert(hash.clone(), stored);
        trace!(
            tree = tree.unwrap_or("-"),
            hash = hash.short(),
            "saved node"
        );
        Ok(hash)
    }

    fn find(&self, hash: &Hash, _tree: Option<&str>) -> Result<Node, StorageError> {
        self.lock()
            .nodes
            .get(hash)
            .cloned()
            .ok_or_else(|| StorageError::NotFound { hash: hash.clone() })
    }

    fn delete(&self, hash: &Hash, tree: Option<&str>) -> Result<(), StorageError> {
        let mut inner = self.lock();
        if inner.nodes.contains_key(hash) {
            inner.reclaimed.insert(hash.clone());
            trace!(
                tree = tree.unwrap_or("-"),
                hash = hash.short(),
                "reclaimed node"
            );
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn save_stamps_a_blake3_label() {
        let store = MemoryStore::new();
        let node = Node::content(b"hello".to_vec(), None);
        let hash = store.save(&node, None).expect("save");
        assert!(hash.as_str().starts_with("blake3:"));
        assert!(hash.is_set());
    }

    #[test]
    fn same_content_same_label() {
        let store = MemoryStore::new();
        let node = Node::content(b"hello".to_vec(), None);
        let first = store.save(&node, None).expect("save");
        let second = store.save(&node, None).expect("save");
        assert_eq!(first, second);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn label_ignores_prior_stamp() {
        let store = MemoryStore::new();
        let node = Node::content(b"hello".to_vec(), None);
        let hash = store.save(&node, None).expect("save");

        let mut stamped = node.clone();
        stamped.hash = hash.clone();
        let restamped = store.save(&stamped, None).expect("save");
        assert_eq!(hash, restamped);
    }

    #[test]
    fn different_payload_different_label() {
        let store = MemoryStore::new();
        let a = store
            .save(&Node::content(b"a".to_vec(), None), None)
            .expect("save");
        let b = store
            .save(&Node::content(b"b".to_vec(), None), None)
            .expect("save");
        assert_ne!(a, b);
    }

    #[test]
    fn predecessor_order_is_canonicalised_by_constructor() {
        let store = MemoryStore::new();
        let forward = Node::aggregate(vec![Hash::from("blake3:aa"), Hash::from("blake3:bb")]);
        let reversed = Node::aggregate(vec![Hash::from("blake3:bb"), Hash::from("blake3:aa")]);
        let first = store.save(&forward, None).expect("save");
        let second = store.save(&reversed, None).expect("save");
        assert_eq!(first, second);
    }

    #[test]
    fn find_returns_stamped_node() {
        let store = MemoryStore::new();
        let node = Node::content(b"hello".to_vec(), None);
        let hash = store.save(&node, None).expect("save");

        let found = store.find(&hash, None).expect("find");
        assert_eq!(found.hash, hash);
        assert_eq!(found.payload(), node.payload());
    }

    #[test]
    fn find_unknown_is_not_found() {
        let store = MemoryStore::new();
        let err = store
            .find(&Hash::from("blake3:missing"), None)
            .expect_err("should fail");
        assert!(matches!(err, StorageError::NotFound { .. }));
    }

    #[test]
    fn delete_is_advisory() {
        let store = MemoryStore::new();
        let node = Node::aggregate(vec![Hash::from("blake3:aa"), Hash::from("blake3:bb")]);
        let hash = store.save(&node, None).expect("save");

        store.delete(&hash, None).expect("delete");
        assert!(store.is_reclaimed(&hash));
        assert_eq!(store.live_len(), 0);

        // The mapping still resolves; held digests never dangle.
        let found = store.find(&hash, None).expect("find after delete");
        assert_eq!(found.hash, hash);
    }

    #[test]
    fn delete_of_absent_hash_is_ok() {
        let store = MemoryStore::new();
        store
            .delete(&Hash::from("blake3:missing"), None)
            .expect("delete absent");
    }

    #[test]
    fn resave_revives_reclaimed_mapping() {
        let store = MemoryStore::new();
        let node = Node::aggregate(vec![Hash::from("blake3:aa"), Hash::from("blake3:bb")]);
        let hash = store.save(&node, None).expect("save");
        store.delete(&hash, None).expect("delete");

        let revived = store.save(&node, None).expect("resave");
        assert_eq!(revived, hash);
        assert!(!store.is_reclaimed(&hash));
        assert_eq!(store.live_len(), 1);
    }

    #[test]
    fn clones_share_state() {
        let store = MemoryStore::new();
        let clone = store.clone();
        let hash = store
            .save(&Node::content(b"shared".to_vec(), None), None)
            .expect("save");
        let found = clone.find(&hash, None).expect("find through clone");
        assert_eq!(found.payload(), Some(&b"shared"[..]));
    }
}
