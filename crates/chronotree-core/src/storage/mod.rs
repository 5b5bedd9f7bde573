//! Content-addressable storage contract.
//!
//! The engine treats Storage as an external capability: a hash→node mapping
//! that assigns labels at save time. The engine never constructs a content
//! hash itself and never inspects label bytes beyond equality and ordering.
//!
//! All three methods take an optional `tree` label. It is a diagnostic
//! passthrough for tracing output and has no semantic effect; implementations
//! may ignore it.

pub mod memory;

pub use memory::MemoryStore;

use crate::hash::Hash;
use crate::node::Node;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Machine-readable codes for [`StorageError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageErrorCode {
    /// The requested hash has never been stored.
    NotFound,
    /// The node could not be serialised into its canonical form.
    SerializeFailure,
}

/// Errors surfaced by a [`Storage`] implementation.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// No node is stored under the requested hash.
    #[error("no node stored under {hash}")]
    NotFound {
        /// The hash that could not be resolved.
        hash: Hash,
    },

    /// The node failed to serialise into its canonical form.
    #[error("failed to serialise node for hashing: {0}")]
    Serialize(#[from] serde_json::Error),
}

impl StorageError {
    /// Return the machine-readable error code for this error.
    #[must_use]
    pub fn code(&self) -> StorageErrorCode {
        match self {
            StorageError::NotFound { .. } => StorageErrorCode::NotFound,
            StorageError::Serialize(_) => StorageErrorCode::SerializeFailure,
        }
    }
}

// ---------------------------------------------------------------------------
// Contract
// ---------------------------------------------------------------------------

/// A content-addressable node store.
///
/// # Contract
///
/// - `save` must clear the node's own hash field before hashing, so the
///   label is a pure function of the remaining fields; saving the same
///   logical content twice returns equal labels.
/// - `find` returns the node previously saved under `hash`, with its hash
///   field stamped.
/// - `delete` reclaims a mapping and MAY be a no-op. It never invalidates
///   `Node` values previously returned to callers, and deleting an absent
///   hash is not an error (Content nodes live forever; only transient
///   Aggregates are ever reclaimed).
pub trait Storage {
    /// Persist `node` and return its content-address label.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Serialize`] when the canonical form cannot
    /// be produced.
    fn save(&self, node: &Node, tree: Option<&str>) -> Result<Hash, StorageError>;

    /// Retrieve the node stored under `hash`.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::NotFound`] when the hash is absent.
    fn find(&self, hash: &Hash, tree: Option<&str>) -> Result<Node, StorageError>;

    /// Reclaim the mapping for `hash`, if any.
    ///
    /// # Errors
    ///
    /// Implementations may fail for backend-specific reasons; an absent
    /// hash is not one of them.
    fn delete(&self, hash: &Hash, tree: Option<&str>) -> Result<(), StorageError>;
}
