//! The merge/bitter-end engine.
//!
//! A [`ChronoTree`] is one replica's view of a content-addressed,
//! append-only DAG of immutable posts. The replica tracks:
//!
//! - `known_nodes` — every Content node ever reachable from its digest;
//! - `loose_ends` — the current leaves: hashes no other known node names as
//!   parent or predecessor;
//! - `bitter_end` — a single hash summarising the frontier: the sole
//!   Content leaf when there is exactly one, otherwise a synthesised
//!   Aggregate whose predecessors are exactly the loose ends.
//!
//! Because predecessor lists are sorted before hashing and Aggregates carry
//! no payload, two replicas with equal loose-end sets publish bit-identical
//! digests — merging is commutative, associative, and idempotent.
//!
//! # Failure atomicity
//!
//! Traversals stage fetched nodes and the recomputed loose-end set
//! privately and commit only after every Storage call has succeeded, so a
//! mid-operation Storage failure leaves the replica exactly as it was. The
//! only possible residue is orphaned bytes in the store.

use std::collections::{BTreeSet, HashMap, HashSet, VecDeque};
use std::fmt;

use tracing::{debug, trace};

use crate::error::TreeError;
use crate::hash::Hash;
use crate::node::Node;
use crate::storage::Storage;

/// Nodes and loose ends produced by a traversal, not yet visible.
struct Staged {
    nodes: Vec<Node>,
    loose: BTreeSet<Hash>,
}

/// One replica of a convergent post DAG.
#[derive(Debug)]
pub struct ChronoTree<S: Storage> {
    storage: S,
    name: Option<String>,
    known: HashMap<Hash, Node>,
    loose: BTreeSet<Hash>,
    bitter_end: Hash,
}

impl<S: Storage> ChronoTree<S> {
    /// Create a fresh replica with no history.
    ///
    /// Synthesises an empty Aggregate (no predecessors), saves it, and
    /// adopts its hash as the initial bitter end.
    ///
    /// # Errors
    ///
    /// Propagates Storage failures from saving the empty Aggregate.
    pub fn new(storage: S, name: Option<&str>) -> Result<Self, TreeError> {
        let mut tree = Self {
            storage,
            name: name.map(str::to_owned),
            known: HashMap::new(),
            loose: BTreeSet::new(),
            bitter_end: Hash::unset(),
        };
        tree.commit_frontier(Vec::new(), BTreeSet::new())?;
        debug!(
            tree = tree.label(),
            bitter_end = tree.bitter_end.short(),
            "created empty replica"
        );
        Ok(tree)
    }

    /// Attach a replica to an existing digest.
    ///
    /// Walks the ancestor DAG rooted at `head` through Storage, indexing
    /// every Content node and recomputing the loose-end set. A Content head
    /// becomes the bitter end directly; an Aggregate head is re-synthesised
    /// from its predecessors (content addressing makes the result
    /// hash-identical to `head`).
    ///
    /// # Errors
    ///
    /// Any ancestor that cannot be retrieved is fatal
    /// ([`StorageNotFound`](crate::error::TreeErrorCode::StorageNotFound));
    /// no replica is constructed.
    pub fn attach(storage: S, head: &Hash, name: Option<&str>) -> Result<Self, TreeError> {
        let mut tree = Self {
            storage,
            name: name.map(str::to_owned),
            known: HashMap::new(),
            loose: BTreeSet::new(),
            bitter_end: Hash::unset(),
        };
        let staged = tree.walk_ancestors(head)?;
        let node_count = staged.nodes.len();
        tree.commit_frontier(staged.nodes, staged.loose)?;
        debug!(
            tree = tree.label(),
            head = head.short(),
            nodes = node_count,
            bitter_end = tree.bitter_end.short(),
            "attached to existing digest"
        );
        Ok(tree)
    }

    // -----------------------------------------------------------------------
    // Accessors
    // -----------------------------------------------------------------------

    /// The digest summarising this replica's current frontier.
    #[must_use]
    pub fn bitter_end(&self) -> &Hash {
        &self.bitter_end
    }

    /// The current leaves, sorted lexicographically.
    #[must_use]
    pub fn loose_ends(&self) -> Vec<Hash> {
        self.loose.iter().cloned().collect()
    }

    /// Every known node, sorted by hash.
    #[must_use]
    pub fn known_nodes(&self) -> Vec<(&Hash, &Node)> {
        let mut entries: Vec<(&Hash, &Node)> = self.known.iter().collect();
        entries.sort_by_key(|(hash, _)| *hash);
        entries
    }

    /// The diagnostic label this replica was constructed with.
    #[must_use]
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// The storage handle this replica publishes through.
    #[must_use]
    pub fn storage(&self) -> &S {
        &self.storage
    }

    /// Look up a known node by hash.
    ///
    /// # Errors
    ///
    /// Returns [`TreeError::UnknownHash`] when the hash is not known to
    /// this replica.
    pub fn get_node(&self, hash: &Hash) -> Result<&Node, TreeError> {
        self.known
            .get(hash)
            .ok_or_else(|| TreeError::UnknownHash { hash: hash.clone() })
    }

    /// Write a human-readable dump of the replica to stdout.
    pub fn print(&self) {
        println!("{self}");
    }

    // -----------------------------------------------------------------------
    // Mutating operations
    // -----------------------------------------------------------------------

    /// Publish a new Content node rooted at the current frontier.
    ///
    /// `node.hash` and `node.predecessors` are ignored on input: the
    /// predecessors become the current loose ends minus the node's parent
    /// (sorted), and Storage stamps the hash. The new node supersedes every
    /// loose end, so the frontier collapses to the node itself.
    ///
    /// # Errors
    ///
    /// Returns [`TreeError::InvalidInput`] for a non-Content node or a
    /// parent that is unknown or not a Content node; propagates Storage
    /// failures. The replica is unchanged on error.
    pub fn add(&mut self, node: Node) -> Result<&mut Self, TreeError> {
        if !node.is_content() {
            return Err(TreeError::InvalidInput {
                reason: "only content nodes can be added".to_owned(),
            });
        }
        if let Some(parent) = &node.parent {
            match self.known.get(parent) {
                Some(existing) if existing.is_content() => {}
                Some(_) => {
                    return Err(TreeError::InvalidInput {
                        reason: format!("parent {} is not a content node", parent.short()),
                    });
                }
                None => {
                    return Err(TreeError::InvalidInput {
                        reason: format!("parent {} is not known to this replica", parent.short()),
                    });
                }
            }
        }

        let mut node = node;
        node.hash = Hash::unset();
        node.predecessors = self
            .loose
            .iter()
            .filter(|hash| Some(*hash) != node.parent.as_ref())
            .cloned()
            .collect();

        let hash = self.storage.save(&node, self.name.as_deref())?;
        node.hash = hash.clone();

        // Frontier arithmetic: (loose \ predecessors \ {parent}) ∪ {hash}.
        // Since the predecessors are exactly the loose ends minus the
        // parent, this always collapses to the new node alone.
        let mut loose = self.loose.clone();
        for predecessor in &node.predecessors {
            loose.remove(predecessor);
        }
        if let Some(parent) = &node.parent {
            loose.remove(parent);
        }
        loose.insert(hash.clone());

        debug!(
            tree = self.label(),
            hash = hash.short(),
            predecessors = node.predecessors.len(),
            "published content node"
        );
        self.commit_frontier(vec![node], loose)?;
        Ok(self)
    }

    /// Fold a foreign digest into this replica.
    ///
    /// Fetches the unknown part of `other`'s ancestor DAG, recomputes the
    /// loose-end set over the combined graph, and publishes a new bitter
    /// end. Merging a digest this replica already covers is a no-op.
    ///
    /// # Errors
    ///
    /// Propagates Storage failures; the replica is unchanged on error.
    pub fn merge(&mut self, other: &Hash) -> Result<&mut Self, TreeError> {
        if *other == self.bitter_end {
            trace!(
                tree = self.label(),
                other = other.short(),
                "merge fast exit: digest already current"
            );
            return Ok(self);
        }

        let staged = self.walk_ancestors(other)?;
        if staged.nodes.is_empty() {
            // Everything reachable from `other` was already folded in.
            trace!(
                tree = self.label(),
                other = other.short(),
                "merge no-op: ancestry already known"
            );
            return Ok(self);
        }

        debug!(
            tree = self.label(),
            other = other.short(),
            new_nodes = staged.nodes.len(),
            loose_ends = staged.loose.len(),
            "merged foreign digest"
        );
        self.commit_frontier(staged.nodes, staged.loose)?;
        Ok(self)
    }

    // -----------------------------------------------------------------------
    // Internals
    // -----------------------------------------------------------------------

    fn label(&self) -> &str {
        self.name.as_deref().unwrap_or("-")
    }

    /// BFS the ancestor closure of `head`, staging previously-unknown
    /// Content nodes, then recompute the loose-end set over the combined
    /// graph: every staged hash joins the current set, then every hash any
    /// staged node references leaves it. (A staged hash can never be
    /// referenced by an already-known node — the known set is
    /// ancestor-closed.)
    ///
    /// Known hashes are pruned without refetching — equal hash means equal
    /// subtree. Aggregates are frontier summaries, not DAG members: they
    /// can only appear at the traversal root, are walked for their
    /// predecessors, and never count as referrers.
    fn walk_ancestors(&self, head: &Hash) -> Result<Staged, TreeError> {
        let mut nodes: Vec<Node> = Vec::new();
        let mut visited: HashSet<Hash> = HashSet::new();
        let mut queue: VecDeque<Hash> = VecDeque::new();
        queue.push_back(head.clone());

        while let Some(hash) = queue.pop_front() {
            if self.known.contains_key(&hash) || !visited.insert(hash.clone()) {
                continue;
            }
            let node = self.storage.find(&hash, self.name.as_deref())?;

            if node.is_aggregate() {
                debug_assert_eq!(
                    &hash, head,
                    "aggregates are never referenced, so only the root can be one"
                );
                for predecessor in &node.predecessors {
                    queue.push_back(predecessor.clone());
                }
                continue;
            }

            for reference in node.references() {
                queue.push_back(reference.clone());
            }
            nodes.push(node);
        }

        let mut loose = self.loose.clone();
        for node in &nodes {
            loose.insert(node.hash.clone());
        }
        for node in &nodes {
            for reference in node.references() {
                loose.remove(reference);
            }
        }

        Ok(Staged { nodes, loose })
    }

    /// Make a staged traversal visible and recompute the bitter end.
    ///
    /// A single loose end is the bitter end itself (no Aggregate
    /// materialised); any other count synthesises an Aggregate over the
    /// sorted loose ends and saves it. All Storage writes happen before any
    /// replica mutation. The replaced Aggregate, if any, is evicted from
    /// the known nodes and deleted from Storage last.
    fn commit_frontier(
        &mut self,
        new_nodes: Vec<Node>,
        loose: BTreeSet<Hash>,
    ) -> Result<(), TreeError> {
        let sole = if loose.len() == 1 { loose.first() } else { None };
        let (new_bitter, aggregate) = match sole {
            Some(sole) => (sole.clone(), None),
            None => {
                let mut aggregate = Node::aggregate(loose.iter().cloned().collect());
                let hash = self.storage.save(&aggregate, self.name.as_deref())?;
                aggregate.hash = hash.clone();
                (hash, Some(aggregate))
            }
        };

        // Every Storage write has succeeded; commit.
        for node in new_nodes {
            self.known.insert(node.hash.clone(), node);
        }
        if let Some(aggregate) = aggregate {
            self.known.insert(aggregate.hash.clone(), aggregate);
        }
        self.loose = loose;
        let previous = std::mem::replace(&mut self.bitter_end, new_bitter);

        // Aggregate churn: the replaced summary is always evicted.
        if previous.is_set() && previous != self.bitter_end {
            let was_aggregate = self
                .known
                .get(&previous)
                .is_some_and(Node::is_aggregate);
            if was_aggregate {
                self.known.remove(&previous);
                trace!(
                    tree = self.label(),
                    previous = previous.short(),
                    bitter_end = self.bitter_end.short(),
                    "replaced aggregate"
                );
                self.storage.delete(&previous, self.name.as_deref())?;
            }
        }

        if cfg!(debug_assertions) {
            self.check_invariants();
        }
        Ok(())
    }

    /// Debug-build verification of the replica invariants.
    fn check_invariants(&self) {
        let Some(bitter) = self.known.get(&self.bitter_end) else {
            debug_assert!(false, "bitter end must be a known node");
            return;
        };

        if bitter.is_content() {
            debug_assert_eq!(
                self.loose.len(),
                1,
                "a content bitter end is the sole loose end"
            );
            debug_assert!(self.loose.contains(&self.bitter_end));
        } else {
            let summarised: BTreeSet<Hash> = bitter.predecessors.iter().cloned().collect();
            debug_assert_eq!(
                summarised, self.loose,
                "an aggregate bitter end summarises exactly the loose ends"
            );
        }

        // Aggregate transience: the bitter end is the only aggregate.
        for (hash, node) in &self.known {
            if node.is_aggregate() {
                debug_assert_eq!(hash, &self.bitter_end, "aggregates are transient");
            }
        }

        // Leaf property: a loose end is a known hash no other node (bar the
        // bitter-end aggregate) references.
        let mut referenced: HashSet<&Hash> = HashSet::new();
        for (hash, node) in &self.known {
            if node.is_aggregate() && hash == &self.bitter_end {
                continue;
            }
            referenced.extend(node.references());
        }
        for (hash, node) in &self.known {
            if node.is_aggregate() {
                continue;
            }
            let is_leaf = !referenced.contains(hash);
            debug_assert_eq!(
                is_leaf,
                self.loose.contains(hash),
                "loose ends are exactly the unreferenced known hashes"
            );
        }
    }
}

impl<S: Storage> fmt::Display for ChronoTree<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "chronotree '{}' bitter_end={} loose_ends={} known_nodes={}",
            self.label(),
            self.bitter_end.short(),
            self.loose.len(),
            self.known.len()
        )?;
        for hash in &self.loose {
            writeln!(f, "  loose {}", hash.short())?;
        }
        for (_, node) in self.known_nodes() {
            writeln!(f, "  {node}")?;
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
