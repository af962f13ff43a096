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

//! Mark-and-sweep collection
//!
//! The non-incremental alternative to reference counting: mark every node
//! reachable from a retained root, then scan the node key space and delete
//! whatever was not marked. This also reclaims nodes that were written but
//! never published under any root.
//!
//! While marking, the sweep recomputes each surviving node's reference count
//! (one per retained root reaching it) and rewrites entries that disagree, so
//! the store stays usable by [`RefCountCollector`](super::RefCountCollector)
//! afterwards.

use crate::error::{TrieError, TrieResult};
use crate::gc::refcount::{reachable, read_refcount, refcount_key};
use crate::hashing::{Hash, TreeHasher};
use crate::mpt::node::Node;
use crate::storage::{KeySpace, ReadStore, WriteBatch};
use std::collections::HashMap;
use tracing::trace;

/// Mark-and-sweep collector for the Patricia trie
#[derive(Debug, Clone)]
pub struct MarkAndSweep<H> {
    hasher: H,
}

impl<H: TreeHasher> MarkAndSweep<H> {
    pub fn new(hasher: H) -> Self {
        Self { hasher }
    }

    /// Mark phase: for every node reachable from `roots`, the number of
    /// roots reaching it
    pub fn mark<'r, R: ReadStore + ?Sized>(&self, source: &R, roots: impl IntoIterator<Item = &'r Hash>) -> TrieResult<HashMap<Hash, u64>> {
        let mut marks = HashMap::new();
        for root in roots {
            for hash in reachable(source, &self.hasher, root)? {
                *marks.entry(hash).or_insert(0) += 1;
            }
        }
        trace!(marked = marks.len(), "mark phase complete");
        Ok(marks)
    }

    /// Sweep phase: stage deletion of every unmarked node and the count
    /// corrections of marked ones
    ///
    /// # Returns
    ///
    /// `(nodes scanned, nodes deleted)`
    pub fn sweep<R: ReadStore + ?Sized>(&self, source: &R, marks: &HashMap<Hash, u64>, batch: &mut WriteBatch) -> TrieResult<(usize, usize)> {
        let nodes = source.scan_prefix(&[KeySpace::Node.tag()])?;
        let mut deleted = 0;
        for (key, _) in &nodes {
            let hash = hash_from_key(KeySpace::Node, key)?;
            match marks.get(&hash) {
                Some(count) => {
                    if read_refcount(source, &hash)? != *count {
                        batch.put(&refcount_key(&hash), count.to_be_bytes().to_vec());
                    }
                }
                None => {
                    batch.delete(key);
                    batch.delete(&refcount_key(&hash));
                    deleted += 1;
                }
            }
        }

        // count entries left behind by nodes that no longer exist
        for (key, _) in source.scan_prefix(&[KeySpace::RefCount.tag()])? {
            let hash = hash_from_key(KeySpace::RefCount, &key)?;
            if !marks.contains_key(&hash) && !source.contains(&Node::storage_key(&hash))? {
                batch.delete(&key);
            }
        }
        Ok((nodes.len(), deleted))
    }
}

fn hash_from_key(space: KeySpace, key: &[u8]) -> TrieResult<Hash> {
    space
        .strip(key)
        .and_then(|body| body.try_into().ok())
        .ok_or_else(|| TrieError::corrupt(key, "key does not hold a node hash"))
}
