//! Node model for the ChronoTree DAG.
//!
//! Two node shapes share one representation:
//!
//! - **Content** — an immutable, user-authored post carrying opaque payload
//!   bytes. Content nodes live forever.
//! - **Aggregate** — a content-free summary whose sole purpose is to name a
//!   set of loose ends under one hash. Aggregates are transient; a replica
//!   deletes its aggregate as soon as a newer frontier replaces it.
//!
//! A node's `parent` is the Content node it replies to (`None` for root
//! posts and for all Aggregates). Its `predecessors` are the loose ends that
//! existed when it was created, always kept sorted so the content hash is
//! independent of discovery order.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::canonical::hex_bytes;
use crate::hash::Hash;

/// Payload-bearing discriminant between the two node shapes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum NodeKind {
    /// User-authored post. The engine never inspects the payload; it only
    /// participates in hashing through the canonical serialisation.
    Content {
        /// Application payload bytes, hex-encoded on the wire.
        #[serde(with = "hex_bytes")]
        payload: Vec<u8>,
    },
    /// Frontier summary. Carries no payload so that two aggregates over the
    /// same predecessor list hash identically.
    Aggregate,
}

/// A single node in the DAG.
///
/// Only `{hash, type, parent, predecessors}` (plus the Content payload) is
/// observable; the hash is a pure function of every other field, so
/// predecessor ordering matters and is canonically sorted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Node {
    /// This node's own label. [`Hash::unset`] until Storage stamps it on
    /// save.
    pub hash: Hash,

    /// Content vs Aggregate.
    #[serde(flatten)]
    pub kind: NodeKind,

    /// The Content node this one replies to. `None` for root posts and for
    /// Aggregates.
    pub parent: Option<Hash>,

    /// The loose ends that existed immediately before this node was
    /// created, sorted lexicographically.
    pub predecessors: Vec<Hash>,
}

impl Node {
    /// Build a fresh Content node.
    ///
    /// The hash starts unset and the predecessor list empty; both are
    /// overwritten when the node is published through
    /// [`ChronoTree::add`](crate::tree::ChronoTree::add).
    #[must_use]
    pub fn content(payload: impl Into<Vec<u8>>, parent: Option<Hash>) -> Self {
        Self {
            hash: Hash::unset(),
            kind: NodeKind::Content {
                payload: payload.into(),
            },
            parent,
            predecessors: Vec::new(),
        }
    }

    /// Build an Aggregate over the given loose ends.
    ///
    /// The predecessor list is sorted here so the canonical form never
    /// depends on the caller's iteration order.
    #[must_use]
    pub fn aggregate(mut predecessors: Vec<Hash>) -> Self {
        predecessors.sort();
        Self {
            hash: Hash::unset(),
            kind: NodeKind::Aggregate,
            parent: None,
            predecessors,
        }
    }

    /// Returns `true` for Content nodes.
    #[must_use]
    pub fn is_content(&self) -> bool {
        matches!(self.kind, NodeKind::Content { .. })
    }

    /// Returns `true` for Aggregate nodes.
    #[must_use]
    pub fn is_aggregate(&self) -> bool {
        matches!(self.kind, NodeKind::Aggregate)
    }

    /// The payload bytes of a Content node, `None` for Aggregates.
    #[must_use]
    pub fn payload(&self) -> Option<&[u8]> {
        match &self.kind {
            NodeKind::Content { payload } => Some(payload),
            NodeKind::Aggregate => None,
        }
    }

    /// Every hash this node references: its parent (if any) followed by its
    /// predecessors.
    pub fn references(&self) -> impl Iterator<Item = &Hash> {
        self.parent.iter().chain(self.predecessors.iter())
    }
}

impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = if self.is_content() { "content" } else { "aggregate" };
        write!(f, "{} {}", kind, self.hash.short())?;
        if let Some(parent) = &self.parent {
            write!(f, " parent={}", parent.short())?;
        }
        if !self.predecessors.is_empty() {
            write!(f, " predecessors={}", self.predecessors.len())?;
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
