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

//! Merkle Patricia Trie Implementation
//!
//! A path-compressed radix-16 trie over hashed keys. Every key is mapped to a
//! fixed-length nibble path by the trie's [`TreeHasher`], so leaves always sit
//! at the end of a full path and branches never carry a value.
//!
//! Nodes are content-addressed and never modified in place: an update writes
//! fresh nodes along the touched path and leaves the old ones untouched, so
//! any earlier root stays readable until the garbage collector reclaims it.
//! The hashes an operation replaced are collected and can be drained with
//! [`MerklePatriciaTrie::take_superseded`].
//!
//! Each `put`/`delete` stages its new nodes in one [`WriteBatch`] and hands
//! it to the store in a single write.

use crate::error::{TrieError, TrieResult};
use crate::hashing::{Hash, TreeHasher};
use crate::mpt::node::{Node, RADIX, Value};
use crate::mpt::proof::{Proof, ProofStep, ProofTerminal, verify_proof};
use crate::path::NibblePath;
use crate::storage::{NodeStore, WriteBatch};
use tracing::trace;

/// Outcome of removing a key below some node
enum Removal {
    /// The key was not present; nothing changed
    Absent,
    /// The key was removed; the subtree is now rooted at the given hash
    Removed(Option<Hash>),
}

/// Merkle Patricia Trie implementation
///
/// This is the main trie implementation that provides all the core functionality
/// for storing and retrieving key-value pairs in a cryptographically authenticated
/// manner.
pub struct MerklePatriciaTrie<S, H> {
    store: S,
    hasher: H,
    root: Option<Hash>,
    superseded: Vec<Hash>,
}

impl<S: NodeStore, H: TreeHasher> MerklePatriciaTrie<S, H> {
    /// Create a new, empty MPT over the given store
    ///
    /// # Arguments
    ///
    /// * `store` - The storage backend to use
    /// * `hasher` - Hash function for key paths and node commitments
    pub fn new(store: S, hasher: H) -> Self {
        Self::at_root(store, hasher, None)
    }

    /// Open the trie whose root is `root` (`None` for the empty trie)
    ///
    /// Nothing is read until the first operation; an unknown root surfaces
    /// as [`TrieError::NodeNotFound`] at that point.
    pub fn at_root(store: S, hasher: H, root: Option<Hash>) -> Self {
        Self {
            store,
            hasher,
            root,
            superseded: Vec::new(),
        }
    }

    /// Get the root hash
    ///
    /// # Returns
    ///
    /// The hash of the root node, or `None` if the trie is empty
    pub fn root_hash(&self) -> Option<Hash> {
        self.root
    }

    pub fn is_empty(&self) -> bool {
        self.root.is_none()
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn hasher(&self) -> &H {
        &self.hasher
    }

    pub fn into_store(self) -> S {
        self.store
    }

    /// Drain the hashes of nodes replaced since the last call
    ///
    /// These nodes are no longer reachable from the current root but may
    /// still be reachable from older roots.
    pub fn take_superseded(&mut self) -> Vec<Hash> {
        std::mem::take(&mut self.superseded)
    }

    /// Nibble path for a key
    pub fn key_path(&self, key: &[u8]) -> NibblePath {
        NibblePath::from_bytes(&self.hasher.key_path(key))
    }

    fn load(&self, hash: &Hash) -> TrieResult<Node> {
        Node::load(&self.store, &self.hasher, hash)
    }

    fn stage(&self, node: Node, batch: &mut WriteBatch) -> TrieResult<Hash> {
        let hash = node.hash(&self.hasher);
        batch.put(&Node::storage_key(&hash), node.encode()?);
        Ok(hash)
    }

    /// Get value for a key
    ///
    /// # Arguments
    ///
    /// * `key` - The key to look up
    ///
    /// # Returns
    ///
    /// A Result containing either the value or None if not found
    pub fn get(&self, key: &[u8]) -> TrieResult<Option<Value>> {
        let Some(mut hash) = self.root else {
            return Ok(None);
        };
        let path = self.key_path(key);
        let full = path.as_slice();
        let mut pos = 0;

        loop {
            match self.load(&hash)? {
                Node::Leaf { suffix, value } => {
                    return Ok((suffix.as_slice() == &full[pos..]).then_some(value));
                }
                Node::Branch { skip, children } => {
                    if !full[pos..].starts_with(skip.as_slice()) {
                        return Ok(None);
                    }
                    pos += skip.len();
                    let index = nibble_at(&path, pos, &hash)?;
                    match children[index as usize] {
                        Some(child) => {
                            hash = child;
                            pos += 1;
                        }
                        None => return Ok(None),
                    }
                }
            }
        }
    }

    /// Insert or update a key-value pair
    ///
    /// Writing a value identical to the current one leaves the root unchanged.
    pub fn put(&mut self, key: &[u8], value: Value) -> TrieResult<()> {
        let path = self.key_path(key);
        let mut batch = WriteBatch::new();
        let new_root = match self.root {
            None => self.stage(Node::new_leaf(path, value), &mut batch)?,
            Some(root) => self.insert_at(root, &path, value, &mut batch)?,
        };
        trace!(nodes = batch.len(), "mpt put");
        if !batch.is_empty() {
            self.store.write(batch)?;
        }
        self.root = Some(new_root);
        Ok(())
    }

    fn insert_at(&mut self, hash: Hash, path: &NibblePath, value: Value, batch: &mut WriteBatch) -> TrieResult<Hash> {
        match self.load(&hash)? {
            Node::Leaf { suffix, value: existing } => {
                if suffix == *path {
                    if existing == value {
                        return Ok(hash);
                    }
                    self.superseded.push(hash);
                    return self.stage(Node::new_leaf(suffix, value), batch);
                }

                // split the leaf at the first differing nibble
                let common = suffix.common_prefix_len(path);
                let old_index = nibble_at(&suffix, common, &hash)?;
                let new_index = nibble_at(path, common, &hash)?;
                let mut children = [None; RADIX];
                children[old_index as usize] = Some(self.stage(Node::new_leaf(suffix.skip(common + 1), existing), batch)?);
                children[new_index as usize] = Some(self.stage(Node::new_leaf(path.skip(common + 1), value), batch)?);
                self.superseded.push(hash);
                self.stage(Node::new_branch(path.prefix(common), children), batch)
            }
            Node::Branch { skip, mut children } => {
                let common = skip.common_prefix_len(path);
                if common < skip.len() {
                    // the key leaves the skip-path: push the branch one level down
                    let old_index = nibble_at(&skip, common, &hash)?;
                    let new_index = nibble_at(path, common, &hash)?;
                    let mut split = [None; RADIX];
                    split[old_index as usize] = Some(self.stage(Node::new_branch(skip.skip(common + 1), children), batch)?);
                    split[new_index as usize] = Some(self.stage(Node::new_leaf(path.skip(common + 1), value), batch)?);
                    self.superseded.push(hash);
                    return self.stage(Node::new_branch(skip.prefix(common), split), batch);
                }

                let index = nibble_at(path, skip.len(), &hash)? as usize;
                let rest = path.skip(skip.len() + 1);
                let child = match children[index] {
                    Some(child) => self.insert_at(child, &rest, value, batch)?,
                    None => self.stage(Node::new_leaf(rest, value), batch)?,
                };
                if children[index] == Some(child) {
                    return Ok(hash);
                }
                children[index] = Some(child);
                self.superseded.push(hash);
                self.stage(Node::new_branch(skip, children), batch)
            }
        }
    }

    /// Delete a key-value pair
    ///
    /// # Returns
    ///
    /// `true` if the key was present. Deleting an absent key is a no-op.
    pub fn delete(&mut self, key: &[u8]) -> TrieResult<bool> {
        let Some(root) = self.root else {
            return Ok(false);
        };
        let path = self.key_path(key);
        let mut batch = WriteBatch::new();
        match self.remove_at(root, &path, &mut batch)? {
            Removal::Absent => Ok(false),
            Removal::Removed(new_root) => {
                trace!(nodes = batch.len(), "mpt delete");
                if !batch.is_empty() {
                    self.store.write(batch)?;
                }
                self.root = new_root;
                Ok(true)
            }
        }
    }

    fn remove_at(&mut self, hash: Hash, path: &NibblePath, batch: &mut WriteBatch) -> TrieResult<Removal> {
        match self.load(&hash)? {
            Node::Leaf { suffix, .. } => {
                if suffix != *path {
                    return Ok(Removal::Absent);
                }
                self.superseded.push(hash);
                Ok(Removal::Removed(None))
            }
            Node::Branch { skip, mut children } => {
                if !path.starts_with(&skip) {
                    return Ok(Removal::Absent);
                }
                let index = nibble_at(path, skip.len(), &hash)? as usize;
                let Some(child) = children[index] else {
                    return Ok(Removal::Absent);
                };
                let replacement = match self.remove_at(child, &path.skip(skip.len() + 1), batch)? {
                    Removal::Absent => return Ok(Removal::Absent),
                    Removal::Removed(replacement) => replacement,
                };
                children[index] = replacement;
                self.superseded.push(hash);

                let mut remaining = children.iter().enumerate().filter_map(|(i, c)| c.map(|c| (i, c)));
                match (remaining.next(), remaining.next()) {
                    (None, _) => Ok(Removal::Removed(None)),
                    (Some((only_index, only)), None) => {
                        // one child left: merge it into this position
                        let merged = match self.load(&only)? {
                            Node::Leaf { suffix, value } => Node::new_leaf(skip.join(only_index as u8, &suffix), value),
                            Node::Branch { skip: inner, children } => Node::new_branch(skip.join(only_index as u8, &inner), children),
                        };
                        self.superseded.push(only);
                        Ok(Removal::Removed(Some(self.stage(merged, batch)?)))
                    }
                    _ => Ok(Removal::Removed(Some(self.stage(Node::new_branch(skip, children), batch)?))),
                }
            }
        }
    }

    /// Generate a proof for a key
    ///
    /// # Returns
    ///
    /// An inclusion proof if the key is present, otherwise a non-inclusion
    /// proof describing where the walk stopped
    pub fn get_proof(&self, key: &[u8]) -> TrieResult<Proof> {
        let mut steps = Vec::new();
        let Some(mut hash) = self.root else {
            return Ok(Proof::new(steps, ProofTerminal::Empty));
        };
        let path = self.key_path(key);
        let full = path.as_slice();
        let mut pos = 0;

        loop {
            match self.load(&hash)? {
                Node::Leaf { suffix, value } => {
                    let value_hash = self.hasher.value_hash(&value);
                    if suffix.as_slice() == &full[pos..] {
                        return Ok(Proof::new(steps, ProofTerminal::Leaf { suffix, value_hash }));
                    }
                    let mut other = path.prefix(pos).as_slice().to_vec();
                    other.extend_from_slice(suffix.as_slice());
                    let key_path: Hash = NibblePath::from_slice(&other)
                        .to_bytes()
                        .try_into()
                        .map_err(|_| TrieError::corrupt(Node::storage_key(&hash), "leaf path has the wrong length"))?;
                    return Ok(Proof::new(steps, ProofTerminal::DifferentLeaf { key_path, suffix, value_hash }));
                }
                Node::Branch { skip, children } => {
                    if !full[pos..].starts_with(skip.as_slice()) {
                        return Ok(Proof::new(steps, ProofTerminal::ForeignBranch { skip, children }));
                    }
                    pos += skip.len();
                    let index = nibble_at(&path, pos, &hash)?;
                    let mut neighbors = children;
                    neighbors[index as usize] = None;

                    let mut others = neighbors.iter().enumerate().filter_map(|(i, c)| c.map(|c| (i, c)));
                    let step = match (others.next(), others.next()) {
                        (Some((neighbor_index, neighbor)), None) => ProofStep::Fork {
                            skip,
                            index,
                            neighbor_index: neighbor_index as u8,
                            neighbor,
                        },
                        _ => ProofStep::Branch { skip, index, neighbors },
                    };
                    steps.push(step);

                    match children[index as usize] {
                        Some(child) => {
                            hash = child;
                            pos += 1;
                        }
                        None => return Ok(Proof::new(steps, ProofTerminal::Empty)),
                    }
                }
            }
        }
    }

    /// Verify a proof against this trie's current root
    pub fn verify_proof(&self, key: &[u8], value: Option<&[u8]>, inclusion: bool, proof: &Proof) -> bool {
        verify_proof(&self.hasher, self.root.as_ref(), key, value, inclusion, proof)
    }

    /// All `(key path, value)` pairs in path order
    ///
    /// Keys are stored hashed, so the original key bytes are not recoverable.
    pub fn entries(&self) -> TrieResult<Vec<(Hash, Value)>> {
        let mut entries = Vec::new();
        let Some(root) = self.root else {
            return Ok(entries);
        };
        let mut stack = vec![(root, NibblePath::empty())];
        while let Some((hash, prefix)) = stack.pop() {
            match self.load(&hash)? {
                Node::Leaf { suffix, value } => {
                    let mut full = prefix.as_slice().to_vec();
                    full.extend_from_slice(suffix.as_slice());
                    let key_path: Hash = NibblePath::from_slice(&full)
                        .to_bytes()
                        .try_into()
                        .map_err(|_| TrieError::corrupt(Node::storage_key(&hash), "leaf path has the wrong length"))?;
                    entries.push((key_path, value));
                }
                Node::Branch { skip, children } => {
                    for (index, child) in children.iter().enumerate().rev() {
                        if let Some(child) = child {
                            let mut next = prefix.as_slice().to_vec();
                            next.extend_from_slice(skip.as_slice());
                            stack.push((*child, NibblePath::from_slice(&next).child(index as u8)));
                        }
                    }
                }
            }
        }
        Ok(entries)
    }

    /// Number of keys in the trie
    pub fn len(&self) -> TrieResult<usize> {
        Ok(self.entries()?.len())
    }
}

impl<S, H> std::fmt::Debug for MerklePatriciaTrie<S, H> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MerklePatriciaTrie").field("root", &self.root.map(hex::encode)).finish()
    }
}

/// Nibble at `index`, or a corruption error against the node that required it
fn nibble_at(path: &NibblePath, index: usize, node: &Hash) -> TrieResult<u8> {
    path.get(index)
        .ok_or_else(|| TrieError::corrupt(Node::storage_key(node), format!("path ends at nibble {index} inside the node")))
}
