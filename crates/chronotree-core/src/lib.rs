#![forbid(unsafe_code)]
//! ChronoTree: a content-addressed, append-only DAG of immutable posts with
//! convergent merging.
//!
//! Each replica summarises its current frontier (the *loose ends*) under a
//! single digest (the *bitter end*). Replicas that have observed the same
//! content publish bit-identical digests regardless of the order they
//! learned about it, which makes merging commutative, associative, and
//! idempotent — strong eventual consistency for threaded discussions,
//! collaborative notes, or offline-first feeds.
//!
//! # Conventions
//!
//! - **Errors**: typed `thiserror` enums with machine-readable codes;
//!   Storage failures propagate to callers untouched.
//! - **Logging**: `tracing` macros (`debug!`, `trace!`, `warn!`) with
//!   truncated hashes; correctness never depends on logging.

pub mod canonical;
pub mod error;
pub mod hash;
pub mod node;
pub mod storage;
pub mod tree;

pub use error::{TreeError, TreeErrorCode};
pub use hash::Hash;
pub use node::{Node, NodeKind};
pub use storage::{MemoryStore, Storage, StorageError, StorageErrorCode};
pub use tree::ChronoTree;
