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

//! Stale-node pruning for the versioned tree
//!
//! Every commit of the versioned tree records the nodes it replaced, keyed
//! by the version they became stale at. A node created at version `c` and
//! stale since `s` belongs to the trees of versions `c..s` only, so it can be
//! deleted as soon as no retained version falls in that range. No tree
//! traversal is needed.

use crate::error::TrieResult;
use crate::jmt::node::StaleNodeIndex;
use crate::path::Version;
use crate::storage::{KeySpace, ReadStore, WriteBatch};
use std::collections::BTreeSet;
use tracing::trace;

/// Pruner driven by stale-node entries
#[derive(Debug, Clone, Copy, Default)]
pub struct StaleNodePruner;

impl StaleNodePruner {
    pub fn new() -> Self {
        Self
    }

    /// Stage deletion of every stale node no retained version needs
    ///
    /// # Returns
    ///
    /// `(stale entries examined, nodes deleted)`
    pub fn prune<R: ReadStore + ?Sized>(&self, source: &R, retained: &BTreeSet<Version>, batch: &mut WriteBatch) -> TrieResult<(usize, usize)> {
        let entries = source.scan_prefix(&[KeySpace::Stale.tag()])?;
        let mut deleted = 0;
        for (key, _) in &entries {
            let index = StaleNodeIndex::from_storage_key(key)?;
            if index.is_needed_by(retained) {
                continue;
            }
            batch.delete(&index.node_key.storage_key());
            batch.delete(key);
            deleted += 1;
        }
        trace!(examined = entries.len(), deleted, "stale-node pass complete");
        Ok((entries.len(), deleted))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hashing::Keccak256Hasher;
    use crate::jmt::JellyfishTree;
    use crate::storage::{MemoryStore, NodeStore};

    #[test]
    fn test_prunes_only_unneeded_nodes() {
        let store = MemoryStore::new();
        let tree = JellyfishTree::new(store.clone(), Keccak256Hasher);
        for version in 1..=4u64 {
            tree.put(version, vec![(b"k".to_vec(), Some(version.to_be_bytes().to_vec())), (b"fixed".to_vec(), Some(vec![0]))]).unwrap();
        }

        let mut batch = WriteBatch::new();
        let (examined, deleted) = StaleNodePruner::new().prune(&store, &BTreeSet::from([2, 4]), &mut batch).unwrap();
        assert_eq!(examined, tree.stale_nodes(None).unwrap().len());
        assert!(deleted > 0 && deleted < examined);
        store.write(batch).unwrap();

        assert_eq!(tree.get(b"k", 2).unwrap(), Some(2u64.to_be_bytes().to_vec()));
        assert_eq!(tree.get(b"k", 4).unwrap(), Some(4u64.to_be_bytes().to_vec()));
        assert_eq!(tree.get(b"fixed", 2).unwrap(), Some(vec![0]));
        assert!(tree.get(b"k", 1).is_err());
        assert!(tree.get(b"k", 3).is_err());
    }
}
