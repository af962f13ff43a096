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

//! Versioned database over the Patricia trie
//!
//! [`TrieDatabase`] ties the trie, the roots index and reference counting
//! together. A commit:
//!
//! 1. applies the updates to the trie at the latest root, staging every new
//!    node in an [`OverlayStore`]
//! 2. drops staged nodes the new root does not reach (intermediate states of
//!    a multi-key batch)
//! 3. adds the roots index entry and the reference count increments for the
//!    new root
//! 4. writes all of it as one atomic batch
//!
//! Readers never observe a root whose nodes or counts are missing, and
//! reference counts cannot fall behind the roots they describe.

use crate::error::{TrieError, TrieResult};
use crate::gc::refcount::{BatchView, RefCountCollector, reachable};
use crate::gc::{GarbageCollector, GcOptions, GcReport, GcStrategy, RetentionPolicy};
use crate::hashing::{EMPTY_ROOT, Hash, TreeHasher};
use crate::mpt::node::{Node, Value};
use crate::mpt::proof::{Proof, verify_proof};
use crate::mpt::MerklePatriciaTrie;
use crate::path::Version;
use crate::roots::RootsIndex;
use crate::storage::{KeySpace, NodeStore, OverlayStore};
use std::collections::HashSet;
use tracing::debug;

/// Outcome of a commit
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitResult<N> {
    pub version: Version,
    /// Root of the tree at `version`; [`EMPTY_ROOT`] if it holds no keys
    pub new_root_hash: Hash,
    /// Nodes written by the commit
    pub nodes_written: usize,
    /// Nodes the new root no longer reaches; older versions may still need them
    pub stale_nodes: Vec<N>,
}

/// Versioned key-value database backed by a Merkle Patricia Trie
#[derive(Debug, Clone)]
pub struct TrieDatabase<S, H> {
    roots: RootsIndex<S>,
    hasher: H,
}

impl<S: NodeStore, H: TreeHasher> TrieDatabase<S, H> {
    /// Create a database over `store`
    ///
    /// # Arguments
    ///
    /// * `store` - Backend holding nodes, counts and the roots index
    /// * `hasher` - Hash function for key paths and commitments
    pub fn new(store: S, hasher: H) -> Self {
        Self {
            roots: RootsIndex::new(store),
            hasher,
        }
    }

    pub fn store(&self) -> &S {
        self.roots.store()
    }

    pub fn hasher(&self) -> &H {
        &self.hasher
    }

    pub fn roots(&self) -> &RootsIndex<S> {
        &self.roots
    }

    pub fn latest_version(&self) -> TrieResult<Option<Version>> {
        self.roots.latest_version()
    }

    /// Root hash recorded for `version`
    pub fn root_hash(&self, version: Version) -> TrieResult<Hash> {
        self.roots.require(version)
    }

    /// Read-only trie view at `version`
    ///
    /// # Errors
    ///
    /// [`TrieError::VersionNotFound`] if `version` has no recorded root
    pub fn trie_at(&self, version: Version) -> TrieResult<MerklePatriciaTrie<&S, H>> {
        let root = self.root_hash(version)?;
        Ok(MerklePatriciaTrie::at_root(self.store(), self.hasher.clone(), Some(root).filter(|r| *r != EMPTY_ROOT)))
    }

    /// Value of `key` at `version`
    pub fn get(&self, key: &[u8], version: Version) -> TrieResult<Option<Value>> {
        self.trie_at(version)?.get(key)
    }

    /// Proof for `key` against the root of `version`
    pub fn get_proof(&self, key: &[u8], version: Version) -> TrieResult<Proof> {
        self.trie_at(version)?.get_proof(key)
    }

    /// Verify `proof` against the root recorded for `version`
    pub fn verify_proof(&self, key: &[u8], value: Option<&[u8]>, inclusion: bool, version: Version, proof: &Proof) -> TrieResult<bool> {
        let root = self.root_hash(version)?;
        Ok(verify_proof(&self.hasher, Some(&root), key, value, inclusion, proof))
    }

    /// Commit a batch of updates as `version`
    ///
    /// # Arguments
    ///
    /// * `version` - Must be greater than every committed version
    /// * `updates` - `(key, Some(value))` upserts and `(key, None)` deletes,
    ///   applied in order
    ///
    /// # Returns
    ///
    /// The new root, the number of nodes written and the hashes of nodes the
    /// new root no longer reaches
    pub fn commit<K, I>(&self, version: Version, updates: I) -> TrieResult<CommitResult<Hash>>
    where
        K: AsRef<[u8]>,
        I: IntoIterator<Item = (K, Option<Value>)>,
    {
        let previous = self.roots.latest_entry()?;
        if let Some((latest, _)) = previous {
            if version <= latest {
                return Err(TrieError::InvalidVersion { version, latest });
            }
        }
        let base_root = previous.map(|(_, root)| root).filter(|root| *root != EMPTY_ROOT);

        let staging = OverlayStore::new(self.store());
        let (root, superseded) = {
            let mut trie = MerklePatriciaTrie::at_root(&staging, self.hasher.clone(), base_root);
            for (key, value) in updates {
                match value {
                    Some(value) => trie.put(key.as_ref(), value)?,
                    None => {
                        trie.delete(key.as_ref())?;
                    }
                }
            }
            (trie.root_hash().unwrap_or(EMPTY_ROOT), trie.take_superseded())
        };
        let mut batch = staging.into_batch();

        let live: HashSet<Hash> = reachable(&BatchView::new(self.store(), &batch), &self.hasher, &root)?.into_iter().collect();
        batch.retain(|key, _| match KeySpace::Node.strip(key).and_then(|body| Hash::try_from(body).ok()) {
            Some(hash) => live.contains(&hash),
            None => true,
        });
        let nodes_written = batch.put_count();

        let mut stale_nodes = Vec::new();
        let mut seen = HashSet::new();
        for hash in superseded {
            if !live.contains(&hash) && seen.insert(hash) && self.store().contains(&Node::storage_key(&hash))? {
                stale_nodes.push(hash);
            }
        }

        RefCountCollector::new(self.hasher.clone()).increment_all(self.store(), &root, &mut batch)?;
        RootsIndex::<S>::stage_put(&mut batch, version, root);
        self.store().write(batch)?;

        debug!(version, root = %hex::encode(root), nodes = nodes_written, stale = stale_nodes.len(), "committed trie");
        Ok(CommitResult {
            version,
            new_root_hash: root,
            nodes_written,
            stale_nodes,
        })
    }

    /// Run garbage collection over this database
    pub fn collect_garbage(&self, strategy: GcStrategy, policy: &RetentionPolicy, options: &GcOptions) -> TrieResult<GcReport> {
        GarbageCollector::new(self.hasher.clone(), strategy).run(self.store(), &self.roots, policy, options)
    }
}
