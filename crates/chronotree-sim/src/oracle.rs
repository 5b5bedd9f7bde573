//! Convergence oracle for replica fleets.
//!
//! After a gossip round, every replica must agree on the bitter end and on
//! the BLAKE3 fingerprints of its sorted loose-end and known-node views —
//! not just on digest equality, but on the full observable state.

use anyhow::Result;
use chronotree_core::canonical::canonical_node_form;
use chronotree_core::{ChronoTree, Hash, Storage};

/// Convergence check output for one fleet snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConvergenceReport {
    /// Whether all replicas are observably identical.
    pub converged: bool,
    /// Indices of replicas that diverged from the first one.
    pub divergent_replicas: Vec<usize>,
    /// The agreed digest (the first replica's, when any exist).
    pub bitter_end: Option<Hash>,
    /// BLAKE3 fingerprint of the first replica's sorted loose ends.
    pub loose_fingerprint: Option<String>,
    /// BLAKE3 fingerprint of the first replica's sorted known nodes.
    pub known_fingerprint: Option<String>,
}

/// Stateless evaluator comparing replica snapshots.
pub struct ConvergenceOracle;

impl ConvergenceOracle {
    /// Compare all replicas against the first and report divergence.
    ///
    /// # Errors
    ///
    /// Fails only if a node cannot be canonically serialised.
    pub fn evaluate<S: Storage>(replicas: &[ChronoTree<S>]) -> Result<ConvergenceReport> {
        let Some(first) = replicas.first() else {
            return Ok(ConvergenceReport {
                converged: true,
                divergent_replicas: Vec::new(),
                bitter_end: None,
                loose_fingerprint: None,
                known_fingerprint: None,
            });
        };

        let canonical = Snapshot::of(first)?;
        let mut divergent_replicas = Vec::new();
        for (index, replica) in replicas.iter().enumerate().skip(1) {
            if Snapshot::of(replica)? != canonical {
                divergent_replicas.push(index);
            }
        }

        Ok(ConvergenceReport {
            converged: divergent_replicas.is_empty(),
            divergent_replicas,
            bitter_end: Some(canonical.bitter_end),
            loose_fingerprint: Some(canonical.loose_fingerprint),
            known_fingerprint: Some(canonical.known_fingerprint),
        })
    }
}

/// The observable state of one replica, reduced to comparable digests.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Snapshot {
    bitter_end: Hash,
    loose_fingerprint: String,
    known_fingerprint: String,
}

impl Snapshot {
    fn of<S: Storage>(replica: &ChronoTree<S>) -> Result<Self> {
        let mut loose = blake3::Hasher::new();
        for hash in replica.loose_ends() {
            loose.update(hash.as_str().as_bytes());
            loose.update(b"\n");
        }

        let mut known = blake3::Hasher::new();
        for (hash, node) in replica.known_nodes() {
            known.update(hash.as_str().as_bytes());
            known.update(b"\t");
            known.update(canonical_node_form(node)?.as_bytes());
            known.update(b"\n");
        }

        Ok(Self {
            bitter_end: replica.bitter_end().clone(),
            loose_fingerprint: format!("blake3:{}", loose.finalize()),
            known_fingerprint: format!("blake3:{}", known.finalize()),
        })
    }
}
