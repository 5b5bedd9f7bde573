//! Opaque content-address labels.
//!
//! A [`Hash`] is the identity of a node in the ChronoTree DAG. The engine
//! never computes hashes itself — Storage is the sole authority and stamps
//! them at save time. Equality is bit-exact and ordering is lexicographic on
//! the label bytes, which is what makes sorted predecessor lists agree
//! across replicas.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Sentinel label for a node hash that Storage has not yet assigned.
///
/// Store-assigned labels must never collide with this value; the engine only
/// ever tests equality against it.
pub const HASH_NOT_SET: &str = "HASH_NOT_SET";

/// How many characters of a label [`Hash::short`] keeps for log output.
const SHORT_LEN: usize = 19;

/// Opaque content-address label assigned by Storage.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Hash(String);

impl Hash {
    /// The unset sentinel, used for a node's own hash field prior to save.
    #[must_use]
    pub fn unset() -> Self {
        Self(HASH_NOT_SET.to_owned())
    }

    /// Returns `true` once Storage has stamped this label.
    #[must_use]
    pub fn is_set(&self) -> bool {
        self.0 != HASH_NOT_SET
    }

    /// Full label as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Truncated label for log output. Never used for identity.
    #[must_use]
    pub fn short(&self) -> &str {
        self.0.get(..SHORT_LEN).unwrap_or(&self.0)
    }
}

impl From<String> for Hash {
    fn from(label: String) -> Self {
        Self(label)
    }
}

impl From<&str> for Hash {
    fn from(label: &str) -> Self {
        Self(label.to_owned())
    }
}

impl fmt::Display for Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unset_sentinel_is_not_set() {
        let hash = Hash::unset();
        assert!(!hash.is_set());
        assert_eq!(hash.as_str(), HASH_NOT_SET);
    }

    #[test]
    fn store_labels_are_set() {
        let hash = Hash::from("blake3:a1b2c3");
        assert!(hash.is_set());
    }

    #[test]
    fn equality_is_bit_exact() {
        assert_eq!(Hash::from("blake3:aa"), Hash::from("blake3:aa"));
        assert_ne!(Hash::from("blake3:aa"), Hash::from("blake3:ab"));
    }

    #[test]
    fn ordering_is_lexicographic() {
        let mut hashes = vec![
            Hash::from("blake3:c"),
            Hash::from("blake3:a"),
            Hash::from("blake3:b"),
        ];
        hashes.sort();
        let labels: Vec<&str> = hashes.iter().map(Hash::as_str).collect();
        assert_eq!(labels, vec!["blake3:a", "blake3:b", "blake3:c"]);
    }

    #[test]
    fn short_truncates_long_labels() {
        let hash = Hash::from(
            "blake3:0123456789abcdef0123456789abcdef0123456789abcdef0123456789abcdef",
        );
        assert_eq!(hash.short().len(), SHORT_LEN);
        assert!(hash.short().starts_with("blake3:"));
    }

    #[test]
    fn short_keeps_short_labels_whole() {
        let hash = Hash::from("tiny");
        assert_eq!(hash.short(), "tiny");
    }

    #[test]
    fn serde_is_transparent() {
        let hash = Hash::from("blake3:aa");
        let json = serde_json::to_string(&hash).expect("serialize");
        assert_eq!(json, "\"blake3:aa\"");
        let back: Hash = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(back, hash);
    }
}
