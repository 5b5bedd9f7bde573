//! Property tests for the merge algebra: commutativity, associativity,
//! idempotence, and the replica invariants, over randomly generated posts.

use chronotree_core::{ChronoTree, Hash, MemoryStore, Node, Storage};
use proptest::prelude::*;
use proptest::test_runner::{Config, RngSeed};

fn proptest_config() -> Config {
    let cases = std::env::var("PROPTEST_CASES")
        .ok()
        .and_then(|value| value.parse::<u32>().ok())
        .unwrap_or(256);

    let mut config = Config::with_cases(cases);
    config.failure_persistence = None;

    // Allow deterministic replay with a project-level env var.
    if let Some(seed) = std::env::var("PROPTEST_SEED")
        .ok()
        .and_then(|value| value.parse::<u64>().ok())
    {
        config.rng_seed = RngSeed::Fixed(seed);
    }

    config
}

/// A replica's worth of posts: payloads plus whether each replies to the
/// shared root or to the replica's own previous post.
fn arb_batch() -> impl Strategy<Value = Vec<(Vec<u8>, bool)>> {
    prop::collection::vec(
        (prop::collection::vec(any::<u8>(), 0..8), any::<bool>()),
        1..4,
    )
}

fn grow(
    store: &MemoryStore,
    root: &Hash,
    name: &str,
    batch: &[(Vec<u8>, bool)],
) -> ChronoTree<MemoryStore> {
    let mut tree = ChronoTree::attach(store.clone(), root, Some(name)).expect("attach");
    for (payload, reply_to_previous) in batch {
        let parent = if *reply_to_previous && tree.get_node(tree.bitter_end()).is_ok_and(Node::is_content)
        {
            tree.bitter_end().clone()
        } else {
            root.clone()
        };
        tree.add(Node::content(payload.clone(), Some(parent)))
            .expect("add");
    }
    tree
}

fn assert_invariants<S: Storage>(tree: &ChronoTree<S>) {
    tree.get_node(tree.bitter_end()).expect("bitter end is known");
    for hash in tree.loose_ends() {
        tree.get_node(&hash).expect("loose end is known");
    }
    for (hash, node) in tree.known_nodes() {
        if node.is_aggregate() {
            assert_eq!(hash, tree.bitter_end(), "stray aggregate");
        }
    }
}

fn states_equal<S: Storage, T: Storage>(a: &ChronoTree<S>, b: &ChronoTree<T>) -> bool {
    a.bitter_end() == b.bitter_end()
        && a.loose_ends() == b.loose_ends()
        && a.known_nodes() == b.known_nodes()
}

proptest! {
    #![proptest_config(proptest_config())]

    #[test]
    fn merge_commutative(left_batch in arb_batch(), right_batch in arb_batch()) {
        let store = MemoryStore::new();
        let root = store
            .save(&Node::content(b"root".to_vec(), None), None)
            .expect("presave root");

        let mut left = grow(&store, &root, "left", &left_batch);
        let mut right = grow(&store, &root, "right", &right_batch);
        let left_digest = left.bitter_end().clone();
        let right_digest = right.bitter_end().clone();

        left.merge(&right_digest).expect("merge");
        right.merge(&left_digest).expect("merge");

        prop_assert!(states_equal(&left, &right));
        assert_invariants(&left);
        assert_invariants(&right);
    }

    #[test]
    fn merge_associative(
        batch_a in arb_batch(),
        batch_b in arb_batch(),
        batch_c in arb_batch(),
    ) {
        let store = MemoryStore::new();
        let root = store
            .save(&Node::content(b"root".to_vec(), None), None)
            .expect("presave root");

        let a = grow(&store, &root, "a", &batch_a);
        let b = grow(&store, &root, "b", &batch_b);
        let c = grow(&store, &root, "c", &batch_c);
        let digests = [
            a.bitter_end().clone(),
            b.bitter_end().clone(),
            c.bitter_end().clone(),
        ];

        let mut first = ChronoTree::attach(store.clone(), &root, Some("first")).expect("attach");
        let mut second = ChronoTree::attach(store.clone(), &root, Some("second")).expect("attach");
        for digest in &digests {
            first.merge(digest).expect("merge");
        }
        for digest in digests.iter().rev() {
            second.merge(digest).expect("merge");
        }

        prop_assert!(states_equal(&first, &second));
        assert_invariants(&first);
    }

    #[test]
    fn merge_idempotent(left_batch in arb_batch(), right_batch in arb_batch()) {
        let store = MemoryStore::new();
        let root = store
            .save(&Node::content(b"root".to_vec(), None), None)
            .expect("presave root");

        let mut left = grow(&store, &root, "left", &left_batch);
        let right = grow(&store, &root, "right", &right_batch);
        let digest = right.bitter_end().clone();

        left.merge(&digest).expect("first merge");
        let bitter = left.bitter_end().clone();
        let loose = left.loose_ends();

        left.merge(&digest).expect("second merge");
        prop_assert_eq!(left.bitter_end(), &bitter);
        prop_assert_eq!(left.loose_ends(), loose);
        assert_invariants(&left);
    }
}
