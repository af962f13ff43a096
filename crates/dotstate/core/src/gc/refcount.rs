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

//! Reference counting over committed roots
//!
//! A node's reference count is the number of roots index entries whose tree
//! reaches it. Counts live next to the nodes under `KeySpace::RefCount` as
//! 8-byte big-endian integers.
//!
//! - [`RefCountCollector::increment_all`] runs at commit time, in the same
//!   batch that publishes the new root.
//! - [`RefCountCollector::decrement_all`] runs when a version is dropped;
//!   nodes reaching zero are deleted together with their count entry.
//!
//! Traversals are breadth-first over an explicit queue with a visited set,
//! so a node shared by many branches of one tree is counted once per root.

use crate::error::{StoreResult, TrieError, TrieResult};
use crate::hashing::{EMPTY_ROOT, Hash, TreeHasher};
use crate::mpt::node::Node;
use crate::storage::{KeySpace, KeyValue, ReadStore, WriteBatch, merge_scan};
use std::collections::{HashSet, VecDeque};
use tracing::{trace, warn};

/// Reads through a pending batch into a store
pub(crate) struct BatchView<'a, R: ?Sized> {
    store: &'a R,
    batch: &'a WriteBatch,
}

impl<'a, R: ReadStore + ?Sized> BatchView<'a, R> {
    pub(crate) fn new(store: &'a R, batch: &'a WriteBatch) -> Self {
        Self { store, batch }
    }
}

impl<R: ReadStore + ?Sized> ReadStore for BatchView<'_, R> {
    fn get(&self, key: &[u8]) -> StoreResult<Option<Vec<u8>>> {
        match self.batch.lookup(key) {
            Some(staged) => Ok(staged.map(<[u8]>::to_vec)),
            None => self.store.get(key),
        }
    }

    fn scan(&self, start: &[u8], end: Option<&[u8]>) -> StoreResult<Vec<KeyValue>> {
        Ok(merge_scan(self.store.scan(start, end)?, self.batch, start, end))
    }
}

/// Physical key of the reference count of `hash`
pub fn refcount_key(hash: &Hash) -> Vec<u8> {
    KeySpace::RefCount.key(hash)
}

/// Reference count of `hash` as seen by `store`; missing entries count as zero
pub fn read_refcount<R: ReadStore + ?Sized>(store: &R, hash: &Hash) -> TrieResult<u64> {
    let key = refcount_key(hash);
    match store.get(&key)? {
        None => Ok(0),
        Some(bytes) => {
            let raw: [u8; 8] = bytes
                .as_slice()
                .try_into()
                .map_err(|_| TrieError::corrupt(&key, format!("reference count must be 8 bytes, got {}", bytes.len())))?;
            Ok(u64::from_be_bytes(raw))
        }
    }
}

/// Every node hash reachable from `root`, in breadth-first order
pub fn reachable<R, H>(source: &R, hasher: &H, root: &Hash) -> TrieResult<Vec<Hash>>
where
    R: ReadStore + ?Sized,
    H: TreeHasher,
{
    let mut order = Vec::new();
    if *root == EMPTY_ROOT {
        return Ok(order);
    }
    let mut visited = HashSet::new();
    let mut queue = VecDeque::from([*root]);
    visited.insert(*root);
    while let Some(hash) = queue.pop_front() {
        let node = Node::load(source, hasher, &hash)?;
        for child in node.child_hashes() {
            if visited.insert(child) {
                queue.push_back(child);
            }
        }
        order.push(hash);
    }
    Ok(order)
}

/// Reference-counting garbage collector for the Patricia trie
#[derive(Debug, Clone)]
pub struct RefCountCollector<H> {
    hasher: H,
}

impl<H: TreeHasher> RefCountCollector<H> {
    pub fn new(hasher: H) -> Self {
        Self { hasher }
    }

    /// Stage a `+1` for every node reachable from `root`
    ///
    /// Nodes and counts are read through `batch`, so the nodes of a commit
    /// that is being assembled in the same batch are visible.
    ///
    /// # Returns
    ///
    /// Number of nodes touched
    pub fn increment_all<R: ReadStore + ?Sized>(&self, store: &R, root: &Hash, batch: &mut WriteBatch) -> TrieResult<usize> {
        let nodes = reachable(&BatchView::new(store, batch), &self.hasher, root)?;
        for hash in &nodes {
            let count = read_refcount(&BatchView::new(store, batch), hash)?;
            batch.put(&refcount_key(hash), (count + 1).to_be_bytes().to_vec());
        }
        trace!(root = %hex::encode(root), touched = nodes.len(), "incremented reference counts");
        Ok(nodes.len())
    }

    /// Stage a `-1` for every node reachable from `root`, deleting nodes
    /// that reach zero together with their count entry
    ///
    /// # Arguments
    ///
    /// * `store` - Live store; reference counts are always read from it
    ///   through `batch`
    /// * `snapshot` - Point-in-time view used for the tree traversal, if any
    /// * `root` - Root of the dropped version
    /// * `batch` - Batch collecting the decrements and deletions
    ///
    /// # Returns
    ///
    /// `(nodes touched, nodes deleted)`
    pub fn decrement_all<R: ReadStore + ?Sized>(
        &self,
        store: &R,
        snapshot: Option<&dyn ReadStore>,
        root: &Hash,
        batch: &mut WriteBatch,
    ) -> TrieResult<(usize, usize)> {
        let nodes = match snapshot {
            Some(snapshot) => reachable(snapshot, &self.hasher, root)?,
            None => reachable(store, &self.hasher, root)?,
        };

        let mut deleted = 0;
        for hash in &nodes {
            let count = read_refcount(&BatchView::new(store, batch), hash)?;
            if count == 0 {
                warn!(node = %hex::encode(hash), "reachable node has no reference count");
            }
            match count.saturating_sub(1) {
                0 => {
                    batch.delete(&Node::storage_key(hash));
                    batch.delete(&refcount_key(hash));
                    deleted += 1;
                }
                remaining => batch.put(&refcount_key(hash), remaining.to_be_bytes().to_vec()),
            }
        }
        trace!(root = %hex::encode(root), touched = nodes.len(), deleted, "decremented reference counts");
        Ok((nodes.len(), deleted))
    }
}
