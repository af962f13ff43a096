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

//! In-memory backend
//!
//! [`MemoryDatabase`] owns a set of named partitions; each [`MemoryStore`] is
//! a handle on one partition. Handles are cheap to clone and share the same
//! data. A batch is applied while holding the partition's write lock, so
//! readers see either none or all of it.

use super::{KeyValue, NodeStore, ReadStore, WriteBatch, key_range};
use crate::error::{StoreError, StoreResult};
use parking_lot::RwLock;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

type Table = BTreeMap<Vec<u8>, Vec<u8>>;

/// Name of the partition used by [`MemoryStore::new`]
pub const DEFAULT_PARTITION: &str = "default";

/// Operation counters for monitoring
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StoreStats {
    pub get_count: u64,
    pub put_count: u64,
    pub delete_count: u64,
    pub batch_count: u64,
    pub scan_count: u64,
}

/// Lock-free counters behind [`StoreStats`]; readers never serialize on them
#[derive(Debug, Default)]
struct StatCounters {
    gets: AtomicU64,
    puts: AtomicU64,
    deletes: AtomicU64,
    batches: AtomicU64,
    scans: AtomicU64,
}

impl StatCounters {
    fn load(&self) -> StoreStats {
        StoreStats {
            get_count: self.gets.load(Ordering::Relaxed),
            put_count: self.puts.load(Ordering::Relaxed),
            delete_count: self.deletes.load(Ordering::Relaxed),
            batch_count: self.batches.load(Ordering::Relaxed),
            scan_count: self.scans.load(Ordering::Relaxed),
        }
    }
}

/// A set of named in-memory partitions
#[derive(Debug, Clone, Default)]
pub struct MemoryDatabase {
    partitions: Arc<RwLock<HashMap<String, MemoryStore>>>,
}

impl MemoryDatabase {
    pub fn new() -> Self {
        Self::default()
    }

    /// Handle on partition `name`, created on first use
    pub fn partition(&self, name: &str) -> MemoryStore {
        if let Some(store) = self.partitions.read().get(name) {
            return store.clone();
        }
        self.partitions
            .write()
            .entry(name.to_string())
            .or_insert_with(|| MemoryStore::with_name(name))
            .clone()
    }

    /// Handle on an existing partition
    pub fn existing_partition(&self, name: &str) -> StoreResult<MemoryStore> {
        self.partitions.read().get(name).cloned().ok_or_else(|| StoreError::UnknownPartition(name.to_string()))
    }

    /// Names of all partitions, sorted
    pub fn partition_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.partitions.read().keys().cloned().collect();
        names.sort();
        names
    }

    /// Drop a partition and all its data
    pub fn drop_partition(&self, name: &str) -> bool {
        self.partitions.write().remove(name).is_some()
    }
}

/// Handle on one in-memory partition
#[derive(Debug, Clone)]
pub struct MemoryStore {
    name: Arc<str>,
    data: Arc<RwLock<Table>>,
    stats: Arc<StatCounters>,
}

impl MemoryStore {
    /// A standalone store holding a single default partition
    pub fn new() -> Self {
        Self::with_name(DEFAULT_PARTITION)
    }

    fn with_name(name: &str) -> Self {
        Self {
            name: Arc::from(name),
            data: Arc::new(RwLock::new(BTreeMap::new())),
            stats: Arc::new(StatCounters::default()),
        }
    }

    /// Partition name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Number of stored keys
    pub fn len(&self) -> usize {
        self.data.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.read().is_empty()
    }

    /// All stored keys, in order
    pub fn keys(&self) -> Vec<Vec<u8>> {
        self.data.read().keys().cloned().collect()
    }

    /// Total bytes held in keys and values
    pub fn size_bytes(&self) -> usize {
        self.data.read().iter().map(|(k, v)| k.len() + v.len()).sum()
    }

    /// Get database statistics
    pub fn stats(&self) -> StoreStats {
        self.stats.load()
    }

    /// Remove every key
    pub fn clear(&self) {
        self.data.write().clear();
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

fn scan_table(table: &Table, start: &[u8], end: Option<&[u8]>) -> Vec<KeyValue> {
    table.range(key_range(start, end)).map(|(k, v)| (k.clone(), v.clone())).collect()
}

impl ReadStore for MemoryStore {
    fn get(&self, key: &[u8]) -> StoreResult<Option<Vec<u8>>> {
        let value = self.data.read().get(key).cloned();
        self.stats.gets.fetch_add(1, Ordering::Relaxed);
        Ok(value)
    }

    fn scan(&self, start: &[u8], end: Option<&[u8]>) -> StoreResult<Vec<KeyValue>> {
        let pairs = scan_table(&self.data.read(), start, end);
        self.stats.scans.fetch_add(1, Ordering::Relaxed);
        Ok(pairs)
    }
}

impl NodeStore for MemoryStore {
    fn write(&self, batch: WriteBatch) -> StoreResult<()> {
        let puts = batch.put_count() as u64;
        let deletes = batch.delete_count() as u64;
        {
            let mut data = self.data.write();
            for (key, value) in batch.iter() {
                match value {
                    Some(value) => {
                        data.insert(key.to_vec(), value.to_vec());
                    }
                    None => {
                        data.remove(key);
                    }
                }
            }
        }

        self.stats.puts.fetch_add(puts, Ordering::Relaxed);
        self.stats.deletes.fetch_add(deletes, Ordering::Relaxed);
        self.stats.batches.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    fn snapshot(&self) -> StoreResult<Box<dyn ReadStore + '_>> {
        Ok(Box::new(MemorySnapshot { data: self.data.read().clone() }))
    }
}

/// Point-in-time copy of a partition
#[derive(Debug, Clone)]
pub struct MemorySnapshot {
    data: Table,
}

impl ReadStore for MemorySnapshot {
    fn get(&self, key: &[u8]) -> StoreResult<Option<Vec<u8>>> {
        Ok(self.data.get(key).cloned())
    }

    fn scan(&self, start: &[u8], end: Option<&[u8]>) -> StoreResult<Vec<KeyValue>> {
        Ok(scan_table(&self.data, start, end))
    }
}
