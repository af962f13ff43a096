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

//! Embedded ordered backend on RocksDB
//!
//! Each partition is a column family. Batches are applied with a native
//! RocksDB write batch, which the engine commits atomically; snapshots are
//! native RocksDB snapshots.

use super::{KeyValue, NodeStore, ReadStore, WriteBatch};
use crate::error::{StoreError, StoreResult};
use rocksdb::{ColumnFamily, ColumnFamilyDescriptor, DB, Direction, IteratorMode, Options, Snapshot};
use std::path::Path;
use std::sync::Arc;
use tracing::info;

/// Handle on one column family of a RocksDB database
#[derive(Clone)]
pub struct RocksStore {
    db: Arc<DB>,
    partition: Arc<str>,
}

impl RocksStore {
    /// Open (or create) the database at `path` with a single partition
    pub fn open<P: AsRef<Path>>(path: P, partition: &str) -> StoreResult<Self> {
        let mut stores = Self::open_partitions(path, &[partition])?;
        stores.pop().ok_or_else(|| StoreError::UnknownPartition(partition.to_string()))
    }

    /// Open (or create) the database at `path` and return one handle per
    /// requested partition, in order. Column families already present on
    /// disk are opened as well so the database remains readable.
    pub fn open_partitions<P: AsRef<Path>>(path: P, partitions: &[&str]) -> StoreResult<Vec<Self>> {
        let path = path.as_ref();
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);

        // CURRENT is written when the database is created; without it there is nothing to list
        let mut names: Vec<String> = if path.join("CURRENT").exists() { DB::list_cf(&opts, path)? } else { Vec::new() };
        for partition in partitions {
            if !names.iter().any(|n| n == partition) {
                names.push(partition.to_string());
            }
        }
        let descriptors = names.iter().map(|name| ColumnFamilyDescriptor::new(name, Options::default()));
        let db = Arc::new(DB::open_cf_descriptors(&opts, path, descriptors)?);
        info!(path = %path.display(), partitions = ?partitions, "opened rocksdb store");

        Ok(partitions
            .iter()
            .map(|partition| Self {
                db: Arc::clone(&db),
                partition: Arc::from(*partition),
            })
            .collect())
    }

    /// Partition name
    pub fn partition(&self) -> &str {
        &self.partition
    }

    /// Flush memtables to disk
    pub fn flush(&self) -> StoreResult<()> {
        self.db.flush_cf(self.cf()?)?;
        Ok(())
    }

    fn cf(&self) -> StoreResult<&ColumnFamily> {
        self.db.cf_handle(&self.partition).ok_or_else(|| StoreError::UnknownPartition(self.partition.to_string()))
    }
}

fn collect_range<I>(iter: I, end: Option<&[u8]>) -> StoreResult<Vec<KeyValue>>
where
    I: Iterator<Item = Result<(Box<[u8]>, Box<[u8]>), rocksdb::Error>>,
{
    let mut pairs = Vec::new();
    for item in iter {
        let (key, value) = item?;
        if end.is_some_and(|end| key.as_ref() >= end) {
            break;
        }
        pairs.push((key.into_vec(), value.into_vec()));
    }
    Ok(pairs)
}

impl ReadStore for RocksStore {
    fn get(&self, key: &[u8]) -> StoreResult<Option<Vec<u8>>> {
        Ok(self.db.get_cf(self.cf()?, key)?)
    }

    fn scan(&self, start: &[u8], end: Option<&[u8]>) -> StoreResult<Vec<KeyValue>> {
        let iter = self.db.iterator_cf(self.cf()?, IteratorMode::From(start, Direction::Forward));
        collect_range(iter, end)
    }
}

impl NodeStore for RocksStore {
    fn write(&self, batch: WriteBatch) -> StoreResult<()> {
        let cf = self.cf()?;
        let mut native = rocksdb::WriteBatch::default();
        for (key, value) in batch.iter() {
            match value {
                Some(value) => native.put_cf(cf, key, value),
                None => native.delete_cf(cf, key),
            }
        }
        self.db.write(native)?;
        Ok(())
    }

    fn snapshot(&self) -> StoreResult<Box<dyn ReadStore + '_>> {
        let cf = self.cf()?;
        Ok(Box::new(RocksSnapshot { snapshot: self.db.snapshot(), cf }))
    }
}

/// Point-in-time view of one column family
pub struct RocksSnapshot<'a> {
    snapshot: Snapshot<'a>,
    cf: &'a ColumnFamily,
}

impl ReadStore for RocksSnapshot<'_> {
    fn get(&self, key: &[u8]) -> StoreResult<Option<Vec<u8>>> {
        Ok(self.snapshot.get_cf(self.cf, key)?)
    }

    fn scan(&self, start: &[u8], end: Option<&[u8]>) -> StoreResult<Vec<KeyValue>> {
        let iter = self.snapshot.iterator_cf(self.cf, IteratorMode::From(start, Direction::Forward));
        collect_range(iter, end)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_put_get_delete_roundtrip() {
        let dir = TempDir::new().unwrap();
        let store = RocksStore::open(dir.path(), "nodes").unwrap();

        store.put(b"key", b"value".to_vec()).unwrap();
        assert_eq!(store.get(b"key").unwrap(), Some(b"value".to_vec()));
        store.delete(b"key").unwrap();
        assert_eq!(store.get(b"key").unwrap(), None);
    }

    #[test]
    fn test_partitions_and_snapshot() {
        let dir = TempDir::new().unwrap();
        let stores = RocksStore::open_partitions(dir.path(), &["a", "b"]).unwrap();
        stores[0].put(b"k", vec![1]).unwrap();
        stores[1].put(b"k", vec![2]).unwrap();

        let snapshot = stores[0].snapshot().unwrap();
        stores[0].put(b"k", vec![3]).unwrap();
        assert_eq!(snapshot.get(b"k").unwrap(), Some(vec![1]));
        assert_eq!(stores[1].get(b"k").unwrap(), Some(vec![2]));
    }

    #[test]
    fn test_reopen_keeps_existing_partitions() {
        let dir = TempDir::new().unwrap();
        {
            let stores = RocksStore::open_partitions(dir.path(), &["a", "b"]).unwrap();
            stores[1].put(b"k", vec![2]).unwrap();
        }
        let a = RocksStore::open(dir.path(), "a").unwrap();
        assert_eq!(a.get(b"k").unwrap(), None);
        drop(a);
        let b = RocksStore::open(dir.path(), "b").unwrap();
        assert_eq!(b.get(b"k").unwrap(), Some(vec![2]));
    }

    #[test]
    fn test_unreadable_database_is_an_error() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("CURRENT"), b"MANIFEST-missing\n").unwrap();
        assert!(matches!(RocksStore::open(dir.path(), "nodes"), Err(StoreError::Backend(_))));
    }

    #[test]
    fn test_scan_respects_end_bound() {
        let dir = TempDir::new().unwrap();
        let store = RocksStore::open(dir.path(), "nodes").unwrap();
        for key in [b"a", b"b", b"c"] {
            store.put(key, key.to_vec()).unwrap();
        }
        let pairs = store.scan(b"a", Some(b"c")).unwrap();
        assert_eq!(pairs.len(), 2);
    }
}
