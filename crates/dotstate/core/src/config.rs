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

//! Tree configuration
//!
//! [`TreeConfig`] is the serializable description of one logical tree: where
//! it lives (partition and namespace), how it hashes, and how its history is
//! collected. It is validated as a whole before any store is opened.

use crate::error::{TrieError, TrieResult};
use crate::gc::{GcOptions, GcStrategy, RetentionPolicy};
use crate::hashing::{HashAlgorithm, TreeHasher};
use crate::storage::{MemoryDatabase, MemoryStore, Namespace, NamespacedStore, RESERVED_NAMESPACE};
use serde::{Deserialize, Serialize};
use tracing::info;

/// Partition used when none is configured
pub const DEFAULT_PARTITION: &str = "state";

/// Configuration for one logical tree
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TreeConfig {
    /// Key prefix isolating this tree inside its partition
    pub namespace: u8,
    /// Physical partition (column family) holding the tree
    pub partition: String,
    /// Digest used for key paths and node commitments
    pub hash_algorithm: HashAlgorithm,
    /// History retained by garbage collection; `None` keeps every version
    pub retention: Option<RetentionPolicy>,
    pub gc_strategy: GcStrategy,
    /// Dropped versions swept per atomic batch
    pub gc_batch_size: usize,
}

impl Default for TreeConfig {
    fn default() -> Self {
        Self {
            namespace: 0,
            partition: DEFAULT_PARTITION.to_string(),
            hash_algorithm: HashAlgorithm::default(),
            retention: None,
            gc_strategy: GcStrategy::default(),
            gc_batch_size: 1,
        }
    }
}

impl TreeConfig {
    /// Check every field without touching a store
    ///
    /// # Errors
    ///
    /// [`TrieError::Configuration`] for a reserved namespace, an empty
    /// partition name, a zero GC batch size or an invalid retention policy
    pub fn validate(&self) -> TrieResult<()> {
        if self.namespace == RESERVED_NAMESPACE {
            return Err(TrieError::Configuration(format!("namespace 0x{:02x} is reserved", self.namespace)));
        }
        if self.partition.is_empty() {
            return Err(TrieError::Configuration("partition name must not be empty".to_string()));
        }
        if self.gc_batch_size == 0 {
            return Err(TrieError::Configuration("gc batch size must be at least 1".to_string()));
        }
        if let Some(policy) = &self.retention {
            policy.validate()?;
        }
        Ok(())
    }

    pub fn namespace(&self) -> TrieResult<Namespace> {
        Namespace::new(self.namespace)
    }

    /// GC options derived from this config
    pub fn gc_options(&self) -> GcOptions {
        GcOptions {
            batch_size: self.gc_batch_size,
            ..GcOptions::default()
        }
    }

    /// Wrap `store` in this tree's namespace
    pub fn namespaced<S>(&self, store: S) -> TrieResult<NamespacedStore<S>> {
        self.validate()?;
        let namespace = self.namespace()?;
        info!(namespace = namespace.byte(), partition = %self.partition, hash = self.hash_algorithm.name(), "opened tree namespace");
        Ok(NamespacedStore::new(store, namespace))
    }

    /// Open this tree inside an in-memory database
    pub fn open_memory(&self, database: &MemoryDatabase) -> TrieResult<NamespacedStore<MemoryStore>> {
        self.validate()?;
        self.namespaced(database.partition(&self.partition))
    }

    /// Open this tree inside a RocksDB database at `path`
    #[cfg(feature = "rocksdb")]
    pub fn open_rocks<P: AsRef<std::path::Path>>(&self, path: P) -> TrieResult<NamespacedStore<crate::storage::RocksStore>> {
        self.validate()?;
        let store = crate::storage::RocksStore::open(path, &self.partition)?;
        self.namespaced(store)
    }
}
