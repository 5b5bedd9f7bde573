//! Engine error taxonomy.

use crate::hash::Hash;
use crate::storage::{StorageError, StorageErrorCode};

/// Machine-readable codes for [`TreeError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TreeErrorCode {
    /// A hash was looked up that is not in this replica's known nodes.
    UnknownHash,
    /// An input node failed validation.
    InvalidInput,
    /// An ancestor hash could not be retrieved from Storage.
    StorageNotFound,
    /// A node could not be saved to Storage.
    StorageSaveFailure,
}

/// Errors surfaced by [`ChronoTree`](crate::tree::ChronoTree) operations.
///
/// Storage failures are propagated, never caught or retried. Every failing
/// operation leaves the replica state exactly as it was before the call.
#[derive(Debug, thiserror::Error)]
pub enum TreeError {
    /// The hash is not in this replica's known nodes.
    #[error("hash {hash} is not known to this replica")]
    UnknownHash {
        /// The unresolvable hash.
        hash: Hash,
    },

    /// The input node failed validation.
    #[error("invalid input node: {reason}")]
    InvalidInput {
        /// What was wrong with the node.
        reason: String,
    },

    /// A Storage operation failed.
    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl TreeError {
    /// Return the machine-readable error code for this error.
    #[must_use]
    pub fn code(&self) -> TreeErrorCode {
        match self {
            TreeError::UnknownHash { .. } => TreeErrorCode::UnknownHash,
            TreeError::InvalidInput { .. } => TreeErrorCode::InvalidInput,
            TreeError::Storage(err) => match err.code() {
                StorageErrorCode::NotFound => TreeErrorCode::StorageNotFound,
                StorageErrorCode::SerializeFailure => TreeErrorCode::StorageSaveFailure,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_hash_code() {
        let err = TreeError::UnknownHash {
            hash: Hash::from("blake3:missing"),
        };
        assert_eq!(err.code(), TreeErrorCode::UnknownHash);
        assert!(err.to_string().contains("blake3:missing"));
    }

    #[test]
    fn storage_not_found_maps_through() {
        let err = TreeError::from(StorageError::NotFound {
            hash: Hash::from("blake3:gone"),
        });
        assert_eq!(err.code(), TreeErrorCode::StorageNotFound);
    }

    #[test]
    fn invalid_input_names_the_reason() {
        let err = TreeError::InvalidInput {
            reason: "parent is unknown".to_owned(),
        };
        assert_eq!(err.code(), TreeErrorCode::InvalidInput);
        assert!(err.to_string().contains("parent is unknown"));
    }
}
