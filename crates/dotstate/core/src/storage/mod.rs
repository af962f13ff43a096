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

//! Node store contract
//!
//! The engine depends only on the traits in this module. A backend is any
//! ordered byte-keyed store that can:
//!
//! - read a key ([`ReadStore::get`]) and scan a key range in lexicographic
//!   order ([`ReadStore::scan`]),
//! - apply a [`WriteBatch`] of puts and deletes all-or-nothing
//!   ([`NodeStore::write`]),
//! - hand out a point-in-time read view ([`NodeStore::snapshot`]).
//!
//! Backends must satisfy three properties: `get` after `put` of the same key
//! returns identical bytes, `delete` then `get` returns `None`, and a reader
//! running alongside a single writer never observes part of a batch.
//!
//! # Backends
//!
//! - [`MemoryStore`]: `BTreeMap` behind a `parking_lot::RwLock`, with
//!   named partitions through [`MemoryDatabase`]
//! - `RocksStore` (feature `rocksdb`): embedded ordered engine, one column
//!   family per partition
//!
//! Two adapters wrap any backend: [`NamespacedStore`] isolates logical trees
//! sharing one partition, and [`OverlayStore`] stages writes in memory until
//! they are committed as a single batch.

pub mod memory;
pub mod namespace;
pub mod overlay;
#[cfg(feature = "rocksdb")]
pub mod rocks;

pub use memory::{MemoryDatabase, MemorySnapshot, MemoryStore, StoreStats};
pub use namespace::{KeySpace, Namespace, NamespacedStore, RESERVED_NAMESPACE};
pub use overlay::OverlayStore;
#[cfg(feature = "rocksdb")]
pub use rocks::RocksStore;

use crate::error::StoreResult;
use std::collections::BTreeMap;
use std::collections::btree_map;
use std::ops::Bound;
use std::sync::Arc;

/// A single key/value pair returned by a scan
pub type KeyValue = (Vec<u8>, Vec<u8>);

/// Read half of the store contract
pub trait ReadStore {
    /// Get a value by key
    fn get(&self, key: &[u8]) -> StoreResult<Option<Vec<u8>>>;

    /// All pairs with `start <= key < end` in ascending key order.
    /// `end = None` scans to the end of the key space.
    fn scan(&self, start: &[u8], end: Option<&[u8]>) -> StoreResult<Vec<KeyValue>>;

    /// Check if a key exists
    fn contains(&self, key: &[u8]) -> StoreResult<bool> {
        Ok(self.get(key)?.is_some())
    }

    /// All pairs whose key starts with `prefix`
    fn scan_prefix(&self, prefix: &[u8]) -> StoreResult<Vec<KeyValue>> {
        let end = prefix_successor(prefix);
        self.scan(prefix, end.as_deref())
    }
}

/// Full store contract: reads, atomic batched writes and snapshots
pub trait NodeStore: ReadStore + Send + Sync {
    /// Apply every operation of `batch` atomically
    fn write(&self, batch: WriteBatch) -> StoreResult<()>;

    /// Point-in-time read view, unaffected by later writes
    fn snapshot(&self) -> StoreResult<Box<dyn ReadStore + '_>>;

    /// Put a single key-value pair
    fn put(&self, key: &[u8], value: Vec<u8>) -> StoreResult<()> {
        let mut batch = WriteBatch::new();
        batch.put(key, value);
        self.write(batch)
    }

    /// Delete a single key
    fn delete(&self, key: &[u8]) -> StoreResult<()> {
        let mut batch = WriteBatch::new();
        batch.delete(key);
        self.write(batch)
    }
}

/// Smallest key greater than every key starting with `prefix`, or `None` if
/// the prefix is empty or all `0xFF`
pub fn prefix_successor(prefix: &[u8]) -> Option<Vec<u8>> {
    let mut end = prefix.to_vec();
    while let Some(last) = end.pop() {
        if last < 0xFF {
            end.push(last + 1);
            return Some(end);
        }
    }
    None
}

/// Bounds for `start <= key < end`, clamped so that an inverted range is empty
pub(crate) fn key_range(start: &[u8], end: Option<&[u8]>) -> (Bound<Vec<u8>>, Bound<Vec<u8>>) {
    match end {
        Some(end) if end <= start => (Bound::Included(start.to_vec()), Bound::Excluded(start.to_vec())),
        Some(end) => (Bound::Included(start.to_vec()), Bound::Excluded(end.to_vec())),
        None => (Bound::Included(start.to_vec()), Bound::Unbounded),
    }
}

/// Batch operation, as handed to a backend
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BatchOp {
    Put { key: Vec<u8>, value: Vec<u8> },
    Delete { key: Vec<u8> },
}

/// An all-or-nothing set of puts and deletes.
///
/// Operations are keyed: a later operation on the same key replaces an
/// earlier one, so the batch doubles as a read overlay ([`WriteBatch::lookup`]).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WriteBatch {
    ops: BTreeMap<Vec<u8>, Option<Vec<u8>>>,
}

impl WriteBatch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stage a put
    pub fn put(&mut self, key: &[u8], value: Vec<u8>) {
        self.ops.insert(key.to_vec(), Some(value));
    }

    /// Stage a delete
    pub fn delete(&mut self, key: &[u8]) {
        self.ops.insert(key.to_vec(), None);
    }

    /// Staged state of `key`: `Some(Some(v))` put, `Some(None)` deleted,
    /// `None` untouched by this batch
    pub fn lookup(&self, key: &[u8]) -> Option<Option<&[u8]>> {
        self.ops.get(key).map(|op| op.as_deref())
    }

    /// Number of staged operations
    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    /// Number of staged puts
    pub fn put_count(&self) -> usize {
        self.ops.values().filter(|op| op.is_some()).count()
    }

    /// Number of staged deletes
    pub fn delete_count(&self) -> usize {
        self.ops.values().filter(|op| op.is_none()).count()
    }

    /// Fold `other` into this batch; `other` wins on conflicting keys
    pub fn merge(&mut self, other: WriteBatch) {
        self.ops.extend(other.ops);
    }

    /// Keep only the operations whose key satisfies `keep`
    pub fn retain(&mut self, mut keep: impl FnMut(&[u8], Option<&[u8]>) -> bool) {
        self.ops.retain(|key, op| keep(key, op.as_deref()));
    }

    /// Iterate staged operations in key order
    pub fn iter(&self) -> impl Iterator<Item = (&[u8], Option<&[u8]>)> {
        self.ops.iter().map(|(key, op)| (key.as_slice(), op.as_deref()))
    }

    /// Staged operations with `start <= key < end`
    pub fn range(&self, start: &[u8], end: Option<&[u8]>) -> btree_map::Range<'_, Vec<u8>, Option<Vec<u8>>> {
        self.ops.range(key_range(start, end))
    }

    /// A copy of this batch with `prefix` prepended to every key
    pub fn prefixed(self, prefix: &[u8]) -> WriteBatch {
        let ops = self
            .ops
            .into_iter()
            .map(|(key, op)| {
                let mut full = Vec::with_capacity(prefix.len() + key.len());
                full.extend_from_slice(prefix);
                full.extend_from_slice(&key);
                (full, op)
            })
            .collect();
        WriteBatch { ops }
    }

    /// Convert into backend operations in key order
    pub fn into_ops(self) -> Vec<BatchOp> {
        self.ops
            .into_iter()
            .map(|(key, op)| match op {
                Some(value) => BatchOp::Put { key, value },
                None => BatchOp::Delete { key },
            })
            .collect()
    }
}

/// Merge a sorted base scan with the staged operations of `batch` in the same range
pub(crate) fn merge_scan(base: Vec<KeyValue>, batch: &WriteBatch, start: &[u8], end: Option<&[u8]>) -> Vec<KeyValue> {
    let mut merged: BTreeMap<Vec<u8>, Vec<u8>> = base.into_iter().collect();
    for (key, op) in batch.range(start, end) {
        match op {
            Some(value) => {
                merged.insert(key.clone(), value.clone());
            }
            None => {
                merged.remove(key);
            }
        }
    }
    merged.into_iter().collect()
}

impl<T: ReadStore + ?Sized> ReadStore for &T {
    fn get(&self, key: &[u8]) -> StoreResult<Option<Vec<u8>>> {
        (**self).get(key)
    }

    fn scan(&self, start: &[u8], end: Option<&[u8]>) -> StoreResult<Vec<KeyValue>> {
        (**self).scan(start, end)
    }
}

impl<T: ReadStore + ?Sized> ReadStore for Box<T> {
    fn get(&self, key: &[u8]) -> StoreResult<Option<Vec<u8>>> {
        (**self).get(key)
    }

    fn scan(&self, start: &[u8], end: Option<&[u8]>) -> StoreResult<Vec<KeyValue>> {
        (**self).scan(start, end)
    }
}

impl<T: ReadStore + ?Sized> ReadStore for Arc<T> {
    fn get(&self, key: &[u8]) -> StoreResult<Option<Vec<u8>>> {
        (**self).get(key)
    }

    fn scan(&self, start: &[u8], end: Option<&[u8]>) -> StoreResult<Vec<KeyValue>> {
        (**self).scan(start, end)
    }
}

impl<T: NodeStore + ?Sized> NodeStore for &T {
    fn write(&self, batch: WriteBatch) -> StoreResult<()> {
        (**self).write(batch)
    }

    fn snapshot(&self) -> StoreResult<Box<dyn ReadStore + '_>> {
        (**self).snapshot()
    }
}

impl<T: NodeStore + ?Sized> NodeStore for Arc<T> {
    fn write(&self, batch: WriteBatch) -> StoreResult<()> {
        (**self).write(batch)
    }

    fn snapshot(&self) -> StoreResult<Box<dyn ReadStore + '_>> {
        (**self).snapshot()
    }
}
