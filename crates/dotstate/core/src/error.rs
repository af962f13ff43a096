// Dotlanth
// Copyright (C) 2025 Synerthink

// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.

// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU Affero General Public License for more details.

// You should have received a copy of the GNU Affero General Public License
// along with this program.  If not, see <http://www.gnu.org/licenses/>.

//! Error types for the state engine
//!
//! Two layers of errors exist:
//!
//! - [`StoreError`]: failures raised by a storage backend. The engine never
//!   retries or reinterprets them; they surface to the caller unchanged.
//! - [`TrieError`]: everything the trie, the versioned tree, the roots index
//!   and the garbage collector can report.
//!
//! Proof verification is absent from this taxonomy: a proof that
//! does not check out is an expected outcome and is reported as `false`.

use crate::hashing::Hash;
use thiserror::Error;

/// Result type for storage backend operations
pub type StoreResult<T> = Result<T, StoreError>;

/// Result type for trie, tree, index and GC operations
pub type TrieResult<T> = Result<T, TrieError>;

/// Errors raised by a storage backend
#[derive(Error, Debug)]
pub enum StoreError {
    /// I/O error from the underlying medium
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The requested partition (column family / table) does not exist
    #[error("Unknown partition: {0}")]
    UnknownPartition(String),

    /// Error reported by the storage engine itself
    #[error("Backend error: {0}")]
    Backend(String),
}

#[cfg(feature = "rocksdb")]
impl From<rocksdb::Error> for StoreError {
    fn from(err: rocksdb::Error) -> Self {
        StoreError::Backend(err.into_string())
    }
}

/// Errors that can occur in engine operations
#[derive(Error, Debug)]
pub enum TrieError {
    /// A node referenced by hash is absent from the store
    #[error("Node not found: {}", hex::encode(.0))]
    NodeNotFound(Hash),

    /// No root is recorded for the requested version
    #[error("Version not found: {0}")]
    VersionNotFound(u64),

    /// Stored bytes do not decode to a valid node, or the decoded node does
    /// not hash to the key it was stored under
    #[error("Corrupt node at {}: {reason}", hex::encode(.key))]
    CorruptNode { key: Vec<u8>, reason: String },

    /// Invalid configuration, rejected before any I/O
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// A commit was attempted at a version that is not newer than the latest
    #[error("Invalid version {version}: latest committed version is {latest}")]
    InvalidVersion { version: u64, latest: u64 },

    /// Error during serialization/deserialization
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Storage backend failure, propagated unchanged
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl TrieError {
    /// Build a [`TrieError::CorruptNode`] for the given physical key
    pub fn corrupt(key: impl AsRef<[u8]>, reason: impl Into<String>) -> Self {
        TrieError::CorruptNode {
            key: key.as_ref().to_vec(),
            reason: reason.into(),
        }
    }

    /// Whether this error is one of the not-found conditions
    pub fn is_not_found(&self) -> bool {
        matches!(self, TrieError::NodeNotFound(_) | TrieError::VersionNotFound(_))
    }
}
