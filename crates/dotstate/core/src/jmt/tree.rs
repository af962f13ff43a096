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

//! Jellyfish-style versioned Merkle tree
//!
//! Every commit produces a new version. Nodes are keyed by
//! `(creating version, nibble path)` and never overwritten, so the tree at
//! any recorded version stays readable until its nodes are pruned.
//!
//! Layout rules:
//!
//! - internal nodes sit at every nibble level and are not path-compressed
//! - a subtree holding a single key collapses into a leaf at the highest
//!   position its key path allows
//! - the root is written at `(version, [])` for every version, even when a
//!   commit changes nothing
//!
//! Each commit also lists the nodes it replaced as stale-node entries, keyed
//! by the version they became stale at. The stale-node pruner uses these to
//! reclaim storage without traversing trees.

use crate::database::CommitResult;
use crate::error::{TrieError, TrieResult};
use crate::hashing::{EMPTY_ROOT, Hash, TreeHasher};
use crate::jmt::node::{Child, NodeKey, StaleNodeIndex, VersionedNode, child_hashes};
use crate::jmt::proof::{SparseProof, SparseStep, SparseTerminal, siblings_of};
use crate::mpt::node::{RADIX, Value};
use crate::path::{NibblePath, Version, encode_version};
use crate::roots::RootsIndex;
use crate::storage::{KeySpace, NodeStore, WriteBatch};
use std::collections::{BTreeMap, BTreeSet};
use tracing::debug;

/// Versioned tree over a node store
#[derive(Debug, Clone)]
pub struct JellyfishTree<S, H> {
    store: S,
    hasher: H,
}

impl<S: NodeStore, H: TreeHasher> JellyfishTree<S, H> {
    /// Create a tree handle over `store`
    ///
    /// # Arguments
    ///
    /// * `store` - Backend holding nodes, stale entries and the roots index
    /// * `hasher` - Hash function for key paths and commitments
    pub fn new(store: S, hasher: H) -> Self {
        Self { store, hasher }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn hasher(&self) -> &H {
        &self.hasher
    }

    /// Roots index shared with this tree's store
    pub fn roots(&self) -> RootsIndex<&S> {
        RootsIndex::new(&self.store)
    }

    pub fn latest_version(&self) -> TrieResult<Option<Version>> {
        self.roots().latest_version()
    }

    /// Root hash at `version`; [`EMPTY_ROOT`] for an empty tree
    pub fn root_hash(&self, version: Version) -> TrieResult<Hash> {
        self.roots().require(version)
    }

    /// Commit a batch of updates as `version`
    ///
    /// # Arguments
    ///
    /// * `version` - Must be greater than every committed version
    /// * `updates` - `(key, Some(value))` upserts, `(key, None)` deletes; the
    ///   last update of a repeated key wins
    ///
    /// # Returns
    ///
    /// The new root, the number of nodes written and the nodes this commit
    /// made stale
    pub fn put<K, I>(&self, version: Version, updates: I) -> TrieResult<CommitResult<StaleNodeIndex>>
    where
        K: AsRef<[u8]>,
        I: IntoIterator<Item = (K, Option<Value>)>,
    {
        let previous = self.roots().latest_entry()?;
        if let Some((latest, _)) = previous {
            if version <= latest {
                return Err(TrieError::InvalidVersion { version, latest });
            }
        }

        let updates: BTreeMap<Hash, Option<Value>> = updates
            .into_iter()
            .map(|(key, value)| (self.hasher.key_path(key.as_ref()), value))
            .collect();

        let mut cache = TreeCache::new(self, version, previous);
        for (key_hash, value) in updates {
            match value {
                Some(value) => cache.insert(key_hash, value)?,
                None => cache.delete(key_hash)?,
            }
        }
        let (root_hash, new_nodes, stale) = cache.finish()?;

        let mut batch = WriteBatch::new();
        for (key, node) in &new_nodes {
            batch.put(&key.storage_key(), node.encode()?);
        }
        let stale_nodes: Vec<StaleNodeIndex> = stale
            .into_iter()
            .map(|node_key| StaleNodeIndex {
                stale_since_version: version,
                node_key,
            })
            .collect();
        for index in &stale_nodes {
            batch.put(&index.storage_key(), Vec::new());
        }
        RootsIndex::<S>::stage_put(&mut batch, version, root_hash);
        self.store.write(batch)?;

        debug!(version, root = %hex::encode(root_hash), nodes = new_nodes.len(), stale = stale_nodes.len(), "committed versioned tree");
        Ok(CommitResult {
            version,
            new_root_hash: root_hash,
            nodes_written: new_nodes.len(),
            stale_nodes,
        })
    }

    /// Value of `key` in the tree at `version`
    ///
    /// # Errors
    ///
    /// [`TrieError::VersionNotFound`] if `version` has no recorded root
    pub fn get(&self, key: &[u8], version: Version) -> TrieResult<Option<Value>> {
        let key_hash = self.hasher.key_path(key);
        let path = NibblePath::from_bytes(&key_hash);
        let mut node_key = NodeKey::root(version);
        let mut hash = self.root_hash(version)?;

        loop {
            match VersionedNode::load(&self.store, &self.hasher, &node_key, &hash)? {
                VersionedNode::Null => return Ok(None),
                VersionedNode::Leaf { key_hash: found, value } => return Ok((found == key_hash).then_some(value)),
                VersionedNode::Internal { children } => {
                    let index = nibble_at(&path, &node_key)?;
                    match children[index as usize] {
                        Some(child) => {
                            node_key = node_key.child(child.version, index);
                            hash = child.hash;
                        }
                        None => return Ok(None),
                    }
                }
            }
        }
    }

    /// Proof for `key` against the root at `version`
    ///
    /// # Returns
    ///
    /// `None` if the tree at `version` is empty, otherwise an inclusion or
    /// non-inclusion proof
    pub fn get_proof(&self, key: &[u8], version: Version) -> TrieResult<Option<SparseProof>> {
        let root = self.root_hash(version)?;
        if root == EMPTY_ROOT {
            return Ok(None);
        }
        let key_hash = self.hasher.key_path(key);
        let path = NibblePath::from_bytes(&key_hash);
        let mut node_key = NodeKey::root(version);
        let mut hash = root;
        let mut steps = Vec::new();

        let terminal = loop {
            match VersionedNode::load(&self.store, &self.hasher, &node_key, &hash)? {
                VersionedNode::Null => break SparseTerminal::Empty,
                VersionedNode::Leaf { key_hash: found, value } => {
                    let value_hash = self.hasher.value_hash(&value);
                    if found == key_hash {
                        break SparseTerminal::Leaf { value_hash };
                    }
                    break SparseTerminal::DifferentLeaf { key_hash: found, value_hash };
                }
                VersionedNode::Internal { children } => {
                    let index = nibble_at(&path, &node_key)?;
                    steps.push(SparseStep {
                        index,
                        siblings: siblings_of(&child_hashes(&children), index),
                    });
                    match children[index as usize] {
                        Some(child) => {
                            node_key = node_key.child(child.version, index);
                            hash = child.hash;
                        }
                        None => break SparseTerminal::Empty,
                    }
                }
            }
        };
        Ok(Some(SparseProof::new(steps, terminal)))
    }

    /// Verify `proof` for `key` against the root recorded at `version`
    pub fn verify_proof(&self, key: &[u8], value: Option<&[u8]>, version: Version, proof: &SparseProof) -> TrieResult<bool> {
        let root = self.root_hash(version)?;
        Ok(proof.verify(&self.hasher, &root, key, value))
    }

    /// Stale-node entries, optionally limited to nodes stale since `up_to` or earlier
    pub fn stale_nodes(&self, up_to: Option<Version>) -> TrieResult<Vec<StaleNodeIndex>> {
        let prefix = [KeySpace::Stale.tag()];
        let entries = match up_to.and_then(|v| v.checked_add(1)) {
            Some(end) => self.store.scan(&prefix, Some(&KeySpace::Stale.key(&encode_version(end))))?,
            None => self.store.scan_prefix(&prefix)?,
        };
        entries.iter().map(|(key, _)| StaleNodeIndex::from_storage_key(key)).collect()
    }
}

fn nibble_at(path: &NibblePath, node_key: &NodeKey) -> TrieResult<u8> {
    path.get(node_key.depth())
        .ok_or_else(|| TrieError::corrupt(node_key.storage_key(), "tree is deeper than the key path"))
}

/// Working set of one commit: nodes created at the new version and nodes
/// they replaced
struct TreeCache<'a, S, H> {
    tree: &'a JellyfishTree<S, H>,
    version: Version,
    root_key: NodeKey,
    root_hash: Hash,
    new_nodes: BTreeMap<NodeKey, VersionedNode>,
    stale: BTreeSet<NodeKey>,
}

impl<'a, S: NodeStore, H: TreeHasher> TreeCache<'a, S, H> {
    fn new(tree: &'a JellyfishTree<S, H>, version: Version, previous: Option<(Version, Hash)>) -> Self {
        let mut cache = Self {
            tree,
            version,
            root_key: NodeKey::root(version),
            root_hash: EMPTY_ROOT,
            new_nodes: BTreeMap::new(),
            stale: BTreeSet::new(),
        };
        match previous {
            Some((latest, root_hash)) => {
                cache.root_key = NodeKey::root(latest);
                cache.root_hash = root_hash;
            }
            None => {
                cache.new_nodes.insert(NodeKey::root(version), VersionedNode::Null);
            }
        }
        cache
    }

    fn hasher(&self) -> &H {
        &self.tree.hasher
    }

    fn get_node(&self, key: &NodeKey, hash: &Hash) -> TrieResult<VersionedNode> {
        match self.new_nodes.get(key) {
            Some(node) => Ok(node.clone()),
            None => VersionedNode::load(&self.tree.store, &self.tree.hasher, key, hash),
        }
    }

    /// Remove a node from the working tree; nodes from earlier versions become stale
    fn take_node(&mut self, key: &NodeKey, hash: &Hash) -> TrieResult<VersionedNode> {
        if let Some(node) = self.new_nodes.remove(key) {
            return Ok(node);
        }
        let node = VersionedNode::load(&self.tree.store, &self.tree.hasher, key, hash)?;
        self.stale.insert(key.clone());
        Ok(node)
    }

    fn put_node(&mut self, path: NibblePath, node: VersionedNode) -> Child {
        let child = node.as_child(self.hasher(), self.version);
        self.new_nodes.insert(NodeKey::new(self.version, path), node);
        child
    }

    fn insert(&mut self, key_hash: Hash, value: Value) -> TrieResult<()> {
        let path = NibblePath::from_bytes(&key_hash);
        let (root_key, root_hash) = (self.root_key.clone(), self.root_hash);
        let root = self.insert_at(root_key, root_hash, &path, key_hash, value)?;
        self.root_key = NodeKey::root(self.version);
        self.root_hash = root.hash;
        Ok(())
    }

    fn insert_at(&mut self, key: NodeKey, hash: Hash, path: &NibblePath, key_hash: Hash, value: Value) -> TrieResult<Child> {
        let node = match self.take_node(&key, &hash)? {
            VersionedNode::Null => VersionedNode::new_leaf(key_hash, value),
            VersionedNode::Leaf { key_hash: existing, .. } if existing == key_hash => VersionedNode::new_leaf(key_hash, value),
            VersionedNode::Leaf { key_hash: existing, value: old } => {
                self.split_leaf(&key.path, VersionedNode::new_leaf(existing, old), VersionedNode::new_leaf(key_hash, value))?
            }
            VersionedNode::Internal { mut children } => {
                let index = nibble_at(path, &key)?;
                let child = match children[index as usize] {
                    Some(child) => self.insert_at(key.child(child.version, index), child.hash, path, key_hash, value)?,
                    None => self.put_node(key.path.child(index), VersionedNode::new_leaf(key_hash, value)),
                };
                children[index as usize] = Some(child);
                VersionedNode::Internal { children }
            }
        };
        Ok(self.put_node(key.path, node))
    }

    /// Replace a leaf at `at` with the internal nodes needed to hold both
    /// leaves; returns the node for position `at` and stores the rest
    fn split_leaf(&mut self, at: &NibblePath, existing: VersionedNode, incoming: VersionedNode) -> TrieResult<VersionedNode> {
        let (VersionedNode::Leaf { key_hash: a, .. }, VersionedNode::Leaf { key_hash: b, .. }) = (&existing, &incoming) else {
            return Err(TrieError::Serialization("only leaves can be split".to_string()));
        };
        let a_path = NibblePath::from_bytes(a);
        let b_path = NibblePath::from_bytes(b);
        let common = a_path.common_prefix_len(&b_path);
        let (Some(a_index), Some(b_index)) = (a_path.get(common), b_path.get(common)) else {
            return Err(TrieError::Serialization("cannot split identical key paths".to_string()));
        };

        let fork = a_path.prefix(common);
        let mut children = [None; RADIX];
        children[a_index as usize] = Some(self.put_node(fork.child(a_index), existing));
        children[b_index as usize] = Some(self.put_node(fork.child(b_index), incoming));
        let mut node = VersionedNode::Internal { children };

        for depth in (at.len()..common).rev() {
            let index = a_path.get(depth).unwrap_or_default();
            let child = self.put_node(a_path.prefix(depth + 1), node);
            let mut children = [None; RADIX];
            children[index as usize] = Some(child);
            node = VersionedNode::Internal { children };
        }
        Ok(node)
    }

    fn contains(&self, key_hash: &Hash) -> TrieResult<bool> {
        let path = NibblePath::from_bytes(key_hash);
        let mut key = self.root_key.clone();
        let mut hash = self.root_hash;
        loop {
            match self.get_node(&key, &hash)? {
                VersionedNode::Null => return Ok(false),
                VersionedNode::Leaf { key_hash: found, .. } => return Ok(found == *key_hash),
                VersionedNode::Internal { children } => {
                    let index = nibble_at(&path, &key)?;
                    match children[index as usize] {
                        Some(child) => {
                            key = key.child(child.version, index);
                            hash = child.hash;
                        }
                        None => return Ok(false),
                    }
                }
            }
        }
    }

    fn delete(&mut self, key_hash: Hash) -> TrieResult<()> {
        if !self.contains(&key_hash)? {
            return Ok(());
        }
        let path = NibblePath::from_bytes(&key_hash);
        let (root_key, root_hash) = (self.root_key.clone(), self.root_hash);
        self.root_hash = match self.delete_at(root_key, root_hash, &path)? {
            Some(root) => root.hash,
            None => self.put_node(NibblePath::empty(), VersionedNode::Null).hash,
        };
        self.root_key = NodeKey::root(self.version);
        Ok(())
    }

    /// Remove the key below `key`; `None` if the subtree became empty
    fn delete_at(&mut self, key: NodeKey, hash: Hash, path: &NibblePath) -> TrieResult<Option<Child>> {
        let mut children = match self.take_node(&key, &hash)? {
            VersionedNode::Leaf { .. } => return Ok(None),
            VersionedNode::Null => return Err(TrieError::corrupt(key.storage_key(), "empty node on the path of a present key")),
            VersionedNode::Internal { children } => children,
        };
        let index = nibble_at(path, &key)?;
        let child = children[index as usize].ok_or_else(|| TrieError::corrupt(key.storage_key(), "missing child on the path of a present key"))?;
        children[index as usize] = self.delete_at(key.child(child.version, index), child.hash, path)?;

        let mut remaining = children.iter().enumerate().filter_map(|(i, c)| c.map(|c| (i as u8, c)));
        let node = match (remaining.next(), remaining.next()) {
            (None, _) => return Ok(None),
            (Some((only_index, only)), None) if only.is_leaf => self.take_node(&key.child(only.version, only_index), &only.hash)?,
            _ => VersionedNode::Internal { children },
        };
        Ok(Some(self.put_node(key.path, node)))
    }

    /// Make sure the root exists at the commit version and hand back the
    /// working set
    fn finish(mut self) -> TrieResult<(Hash, BTreeMap<NodeKey, VersionedNode>, BTreeSet<NodeKey>)> {
        if self.root_key.version != self.version {
            let (root_key, root_hash) = (self.root_key.clone(), self.root_hash);
            let root = self.take_node(&root_key, &root_hash)?;
            self.put_node(NibblePath::empty(), root);
        }
        Ok((self.root_hash, self.new_nodes, self.stale))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hashing::Keccak256Hasher;
    use crate::jmt::proof::SparseTerminal;
    use crate::mpt::proof::ProofType;
    use crate::storage::MemoryStore;

    fn new_tree() -> JellyfishTree<MemoryStore, Keccak256Hasher> {
        JellyfishTree::new(MemoryStore::new(), Keccak256Hasher)
    }

    fn upsert(key: &str, value: &str) -> (Vec<u8>, Option<Value>) {
        (key.as_bytes().to_vec(), Some(value.as_bytes().to_vec()))
    }

    fn remove(key: &str) -> (Vec<u8>, Option<Value>) {
        (key.as_bytes().to_vec(), None)
    }

    #[test]
    fn test_empty_first_version() {
        let tree = new_tree();
        let result = tree.put(1, Vec::<(Vec<u8>, Option<Value>)>::new()).unwrap();
        assert_eq!(result.new_root_hash, EMPTY_ROOT);
        assert_eq!(result.nodes_written, 1);
        assert_eq!(tree.get(b"a", 1).unwrap(), None);
        assert!(tree.get_proof(b"a", 1).unwrap().is_none());
    }

    #[test]
    fn test_versioned_reads() {
        let tree = new_tree();
        tree.put(1, vec![upsert("alice", "100"), upsert("bob", "200")]).unwrap();
        tree.put(2, vec![upsert("alice", "150")]).unwrap();
        tree.put(3, vec![remove("bob")]).unwrap();

        assert_eq!(tree.get(b"alice", 1).unwrap(), Some(b"100".to_vec()));
        assert_eq!(tree.get(b"alice", 2).unwrap(), Some(b"150".to_vec()));
        assert_eq!(tree.get(b"bob", 2).unwrap(), Some(b"200".to_vec()));
        assert_eq!(tree.get(b"bob", 3).unwrap(), None);
        assert!(matches!(tree.get(b"alice", 9), Err(TrieError::VersionNotFound(9))));
    }

    #[test]
    fn test_versions_must_increase() {
        let tree = new_tree();
        tree.put(5, vec![upsert("a", "1")]).unwrap();
        assert!(matches!(tree.put(5, vec![upsert("a", "2")]), Err(TrieError::InvalidVersion { version: 5, latest: 5 })));
        assert!(matches!(tree.put(4, vec![upsert("a", "2")]), Err(TrieError::InvalidVersion { .. })));
        tree.put(6, vec![upsert("a", "2")]).unwrap();
    }

    #[test]
    fn test_noop_commit_rewrites_root() {
        let tree = new_tree();
        let first = tree.put(1, vec![upsert("a", "1"), upsert("b", "2")]).unwrap();
        let second = tree.put(2, vec![remove("missing")]).unwrap();
        assert_eq!(first.new_root_hash, second.new_root_hash);
        assert_eq!(second.nodes_written, 1);
        assert_eq!(second.stale_nodes.len(), 1);
        assert_eq!(second.stale_nodes[0].node_key, NodeKey::root(1));
        assert_eq!(tree.get(b"b", 2).unwrap(), Some(b"2".to_vec()));
    }

    #[test]
    fn test_root_is_history_independent() {
        let a = new_tree();
        a.put(1, vec![upsert("x", "1"), upsert("y", "2"), upsert("z", "3")]).unwrap();
        let b = new_tree();
        b.put(1, vec![upsert("z", "3")]).unwrap();
        b.put(2, vec![upsert("extra", "0"), upsert("x", "1")]).unwrap();
        b.put(3, vec![upsert("y", "2"), remove("extra")]).unwrap();
        assert_eq!(a.root_hash(1).unwrap(), b.root_hash(3).unwrap());
    }

    #[test]
    fn test_delete_all_keys_empties_tree() {
        let tree = new_tree();
        tree.put(1, (0..40u32).map(|i| (i.to_be_bytes().to_vec(), Some(vec![1])))).unwrap();
        let result = tree.put(2, (0..40u32).map(|i| (i.to_be_bytes().to_vec(), None))).unwrap();
        assert_eq!(result.new_root_hash, EMPTY_ROOT);
        assert_eq!(tree.get(&3u32.to_be_bytes(), 1).unwrap(), Some(vec![1]));
        assert_eq!(tree.get(&3u32.to_be_bytes(), 2).unwrap(), None);
    }

    #[test]
    fn test_last_update_of_repeated_key_wins() {
        let tree = new_tree();
        tree.put(1, vec![upsert("k", "1"), upsert("k", "2")]).unwrap();
        assert_eq!(tree.get(b"k", 1).unwrap(), Some(b"2".to_vec()));
    }

    #[test]
    fn test_stale_nodes_recorded() {
        let tree = new_tree();
        tree.put(1, vec![upsert("a", "1")]).unwrap();
        let result = tree.put(2, vec![upsert("a", "2")]).unwrap();
        assert_eq!(result.stale_nodes.len(), 1);
        assert_eq!(tree.stale_nodes(None).unwrap(), result.stale_nodes);
        assert!(tree.stale_nodes(Some(1)).unwrap().is_empty());
        assert_eq!(tree.stale_nodes(Some(2)).unwrap().len(), 1);
    }

    #[test]
    fn test_proofs_at_each_version() {
        let tree = new_tree();
        tree.put(1, (0..50u32).map(|i| (i.to_be_bytes().to_vec(), Some(i.to_le_bytes().to_vec())))).unwrap();
        tree.put(2, (0..50u32).step_by(2).map(|i| (i.to_be_bytes().to_vec(), None))).unwrap();

        for i in 0..50u32 {
            let key = i.to_be_bytes();
            let proof = tree.get_proof(&key, 1).unwrap().unwrap();
            assert_eq!(proof.proof_type(), ProofType::Inclusion);
            assert!(tree.verify_proof(&key, Some(&i.to_le_bytes()), 1, &proof).unwrap());

            let proof = tree.get_proof(&key, 2).unwrap().unwrap();
            if i % 2 == 0 {
                assert_ne!(proof.proof_type(), ProofType::Inclusion);
                assert!(tree.verify_proof(&key, None, 2, &proof).unwrap());
                assert!(!tree.verify_proof(&key, Some(&i.to_le_bytes()), 2, &proof).unwrap());
            } else {
                assert!(tree.verify_proof(&key, Some(&i.to_le_bytes()), 2, &proof).unwrap());
            }
        }
    }

    #[test]
    fn test_forged_sibling_rejected() {
        let tree = new_tree();
        tree.put(1, (0..20u32).map(|i| (i.to_be_bytes().to_vec(), Some(vec![i as u8])))).unwrap();
        let key = 4u32.to_be_bytes();
        let mut proof = tree.get_proof(&key, 1).unwrap().unwrap();
        assert!(matches!(proof.terminal, SparseTerminal::Leaf { .. }));
        let sibling = proof.steps[0].siblings.iter_mut().flatten().next().unwrap();
        sibling[31] ^= 0x80;
        assert!(!tree.verify_proof(&key, Some(&[4]), 1, &proof).unwrap());
    }

    #[test]
    fn test_corrupted_node_detected() {
        let store = MemoryStore::new();
        let tree = JellyfishTree::new(store.clone(), Keccak256Hasher);
        tree.put(1, vec![upsert("a", "1")]).unwrap();
        let forged = VersionedNode::new_leaf(Keccak256Hasher.key_path(b"a"), b"9".to_vec());
        store.put(&NodeKey::root(1).storage_key(), forged.encode().unwrap()).unwrap();
        assert!(matches!(tree.get(b"a", 1), Err(TrieError::CorruptNode { .. })));
    }
}
