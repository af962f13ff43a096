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

//! Roots index: version to root-hash mapping
//!
//! Each committed version records the root hash of the tree at that version
//! under `KeySpace::Root || version (8 bytes, big-endian)`. Big-endian keys
//! sort numerically, so range queries are plain ordered scans.
//!
//! The index is append-only in normal operation. Only the garbage collector
//! removes entries, when it drops a version entirely.

use crate::error::{TrieError, TrieResult};
use crate::hashing::{HASH_LEN, Hash};
use crate::path::{Version, decode_version, encode_version};
use crate::storage::{KeySpace, NodeStore, WriteBatch, prefix_successor};
use std::collections::BTreeMap;
use tracing::debug;

/// Version-keyed index of committed roots
#[derive(Debug, Clone)]
pub struct RootsIndex<S> {
    store: S,
}

impl<S> RootsIndex<S> {
    /// Create a roots index over a store
    pub fn new(store: S) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn into_store(self) -> S {
        self.store
    }

    /// Physical key of the entry for `version`
    pub fn key(version: Version) -> Vec<u8> {
        KeySpace::Root.key(&encode_version(version))
    }

    /// Add a `version -> root` entry to `batch` without writing it
    pub fn stage_put(batch: &mut WriteBatch, version: Version, root: Hash) {
        batch.put(&Self::key(version), root.to_vec());
    }

    /// Add the removal of `version`'s entry to `batch` without writing it
    pub fn stage_remove(batch: &mut WriteBatch, version: Version) {
        batch.delete(&Self::key(version));
    }
}

fn decode_entry(key: &[u8], value: &[u8]) -> TrieResult<(Version, Hash)> {
    let body = KeySpace::Root.strip(key).ok_or_else(|| TrieError::corrupt(key, "not a roots index key"))?;
    let version = decode_version(body).map_err(|e| TrieError::corrupt(key, e.to_string()))?;
    let root: Hash = value
        .try_into()
        .map_err(|_| TrieError::corrupt(key, format!("root entry must be {HASH_LEN} bytes, got {}", value.len())))?;
    Ok((version, root))
}

impl<S: NodeStore> RootsIndex<S> {
    /// Record the root of `version`
    ///
    /// # Arguments
    ///
    /// * `version` - The committed version
    /// * `root` - Root hash of the tree at that version
    pub fn put(&self, version: Version, root: Hash) -> TrieResult<()> {
        let mut batch = WriteBatch::new();
        Self::stage_put(&mut batch, version, root);
        self.store.write(batch)?;
        debug!(version, root = %hex::encode(root), "recorded root");
        Ok(())
    }

    /// Root recorded for `version`, if any
    pub fn get(&self, version: Version) -> TrieResult<Option<Hash>> {
        let key = Self::key(version);
        match self.store.get(&key)? {
            Some(value) => Ok(Some(decode_entry(&key, &value)?.1)),
            None => Ok(None),
        }
    }

    /// Root recorded for `version`
    ///
    /// # Errors
    ///
    /// [`TrieError::VersionNotFound`] if no entry exists
    pub fn require(&self, version: Version) -> TrieResult<Hash> {
        self.get(version)?.ok_or(TrieError::VersionNotFound(version))
    }

    /// Root of the highest recorded version
    pub fn latest(&self) -> TrieResult<Option<Hash>> {
        Ok(self.latest_entry()?.map(|(_, root)| root))
    }

    /// Highest recorded version
    pub fn latest_version(&self) -> TrieResult<Option<Version>> {
        Ok(self.latest_entry()?.map(|(version, _)| version))
    }

    /// Highest recorded version together with its root
    pub fn latest_entry(&self) -> TrieResult<Option<(Version, Hash)>> {
        let entries = self.store.scan_prefix(&[KeySpace::Root.tag()])?;
        entries.last().map(|(key, value)| decode_entry(key, value)).transpose()
    }

    /// Every entry, ordered by version
    pub fn list_all(&self) -> TrieResult<BTreeMap<Version, Hash>> {
        self.store
            .scan_prefix(&[KeySpace::Root.tag()])?
            .iter()
            .map(|(key, value)| decode_entry(key, value))
            .collect()
    }

    /// Entries with `from <= version <= to`, ordered by version
    pub fn list_range(&self, from: Version, to: Version) -> TrieResult<BTreeMap<Version, Hash>> {
        if from > to {
            return Ok(BTreeMap::new());
        }
        let start = Self::key(from);
        let end = match to.checked_add(1) {
            Some(next) => Some(Self::key(next)),
            None => prefix_successor(&[KeySpace::Root.tag()]),
        };
        self.store
            .scan(&start, end.as_deref())?
            .iter()
            .map(|(key, value)| decode_entry(key, value))
            .collect()
    }

    /// Recorded versions in ascending order
    pub fn versions(&self) -> TrieResult<Vec<Version>> {
        Ok(self.list_all()?.into_keys().collect())
    }

    /// Remove the entry for `version`
    ///
    /// Reserved for garbage collection: the nodes under the removed root stay
    /// in the store until a collector reclaims them.
    pub fn remove(&self, version: Version) -> TrieResult<()> {
        let mut batch = WriteBatch::new();
        Self::stage_remove(&mut batch, version);
        self.store.write(batch)?;
        debug!(version, "removed root entry");
        Ok(())
    }

    /// Number of recorded versions
    pub fn len(&self) -> TrieResult<usize> {
        Ok(self.store.scan_prefix(&[KeySpace::Root.tag()])?.len())
    }

    pub fn is_empty(&self) -> TrieResult<bool> {
        Ok(self.len()? == 0)
    }
}
