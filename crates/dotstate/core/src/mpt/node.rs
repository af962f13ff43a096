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

//! Node implementation for the Merkle Patricia Trie
//!
//! Nodes form a closed sum type:
//!
//! - `Leaf`: the remaining nibble suffix of a key path plus the value bytes
//! - `Branch`: a skip-path (path compression) plus 16 child slots
//!
//! A node is stored under the hash of its canonical preimage. Every load
//! re-derives that hash and compares it with the key it was read from, so
//! a corrupted store is reported instead of being silently accepted.
//!
//! # Hash layout
//!
//! ```text
//! leaf   = leaf_hash(compact(suffix) || value_hash)
//! branch = node_hash(compact(skip) || ABSENT || slot_0 .. slot_15)
//! ```
//!
//! The `ABSENT` after the skip-path is the branch value slot. Key paths all
//! have the same length, so no key ends at a branch and the slot is always
//! empty; it stays in the preimage so the layout is fixed. Empty child slots
//! are also `ABSENT`.

use crate::error::{TrieError, TrieResult};
use crate::hashing::{ABSENT, HASH_LEN, Hash, TreeHasher};
use crate::path::NibblePath;
use crate::storage::{KeySpace, ReadStore};
use serde::{Deserialize, Serialize};

/// Value type stored in the trie
pub type Value = Vec<u8>;

/// Number of child slots in a branch
pub const RADIX: usize = 16;

/// Child slots of a branch node
pub type Children = [Option<Hash>; RADIX];

/// Node in the MPT
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Node {
    /// Terminal node: remaining key path and the value
    Leaf { suffix: NibblePath, value: Value },
    /// Internal node: compressed path segment and child slots
    Branch { skip: NibblePath, children: Children },
}

/// Commitment of a leaf given its suffix and value hash
pub fn leaf_hash<H: TreeHasher>(hasher: &H, suffix: &NibblePath, value_hash: &Hash) -> Hash {
    let mut preimage = suffix.encode_compact();
    preimage.extend_from_slice(value_hash);
    hasher.leaf_hash(&preimage)
}

/// Commitment of a branch given its skip-path and child slots
pub fn branch_hash<H: TreeHasher>(hasher: &H, skip: &NibblePath, children: &Children) -> Hash {
    let mut preimage = skip.encode_compact();
    preimage.reserve(HASH_LEN * (RADIX + 1));
    preimage.extend_from_slice(&ABSENT);
    for child in children {
        preimage.extend_from_slice(child.as_ref().unwrap_or(&ABSENT));
    }
    hasher.node_hash(&preimage)
}

impl Node {
    /// Create a new leaf node
    pub fn new_leaf(suffix: NibblePath, value: Value) -> Self {
        Node::Leaf { suffix, value }
    }

    /// Create a new branch node
    pub fn new_branch(skip: NibblePath, children: Children) -> Self {
        Node::Branch { skip, children }
    }

    pub fn is_leaf(&self) -> bool {
        matches!(self, Node::Leaf { .. })
    }

    pub fn is_branch(&self) -> bool {
        matches!(self, Node::Branch { .. })
    }

    /// Compute the node's identity hash
    pub fn hash<H: TreeHasher>(&self, hasher: &H) -> Hash {
        match self {
            Node::Leaf { suffix, value } => leaf_hash(hasher, suffix, &hasher.value_hash(value)),
            Node::Branch { skip, children } => branch_hash(hasher, skip, children),
        }
    }

    /// Hashes of all non-empty child slots
    pub fn child_hashes(&self) -> Vec<Hash> {
        match self {
            Node::Leaf { .. } => Vec::new(),
            Node::Branch { children, .. } => children.iter().flatten().copied().collect(),
        }
    }

    /// Number of non-empty child slots
    pub fn child_count(&self) -> usize {
        match self {
            Node::Leaf { .. } => 0,
            Node::Branch { children, .. } => children.iter().filter(|c| c.is_some()).count(),
        }
    }

    /// Encode node for storage
    pub fn encode(&self) -> TrieResult<Vec<u8>> {
        bincode::serde::encode_to_vec(self, bincode::config::standard()).map_err(|e| TrieError::Serialization(e.to_string()))
    }

    /// Decode node from bytes and check its structural invariants
    pub fn decode(data: &[u8]) -> TrieResult<Node> {
        let (node, read): (Node, usize) =
            bincode::serde::decode_from_slice(data, bincode::config::standard()).map_err(|e| TrieError::Serialization(e.to_string()))?;
        if read != data.len() {
            return Err(TrieError::Serialization(format!("{} trailing bytes after node", data.len() - read)));
        }
        node.validate()?;
        Ok(node)
    }

    fn validate(&self) -> TrieResult<()> {
        match self {
            Node::Leaf { suffix, .. } if !suffix.is_valid() => Err(TrieError::Serialization("leaf suffix holds an invalid nibble".to_string())),
            Node::Branch { skip, .. } if !skip.is_valid() => Err(TrieError::Serialization("branch skip-path holds an invalid nibble".to_string())),
            Node::Branch { .. } if self.child_count() < 2 => Err(TrieError::Serialization(format!("branch with {} children", self.child_count()))),
            _ => Ok(()),
        }
    }

    /// Physical key of the node stored under `hash`
    pub fn storage_key(hash: &Hash) -> Vec<u8> {
        KeySpace::Node.key(hash)
    }

    /// Load the node stored under `hash` and verify its integrity
    ///
    /// # Errors
    ///
    /// - [`TrieError::NodeNotFound`] if nothing is stored under `hash`
    /// - [`TrieError::CorruptNode`] if the bytes do not decode or the decoded
    ///   node hashes to something other than `hash`
    pub fn load<R, H>(store: &R, hasher: &H, hash: &Hash) -> TrieResult<Node>
    where
        R: ReadStore + ?Sized,
        H: TreeHasher,
    {
        let key = Self::storage_key(hash);
        let data = store.get(&key)?.ok_or(TrieError::NodeNotFound(*hash))?;
        let node = Self::decode(&data).map_err(|e| TrieError::corrupt(&key, e.to_string()))?;
        if node.hash(hasher) != *hash {
            return Err(TrieError::corrupt(&key, "stored node does not hash to its key"));
        }
        Ok(node)
    }

    /// Calculate the size of the node payload in bytes
    pub fn size_bytes(&self) -> u64 {
        match self {
            Node::Leaf { suffix, value } => (suffix.len() + value.len()) as u64,
            Node::Branch { skip, children } => (skip.len() + children.iter().flatten().count() * HASH_LEN) as u64,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hashing::Keccak256Hasher;
    use crate::storage::{MemoryStore, NodeStore};

    fn two_children() -> Children {
        let h = Keccak256Hasher;
        let mut children = [None; RADIX];
        children[0] = Some(h.digest(&[b"child0"]));
        children[5] = Some(h.digest(&[b"child5"]));
        children
    }

    #[test]
    fn test_leaf_node() {
        let suffix = NibblePath::from_bytes(b"\x12");
        let node = Node::new_leaf(suffix, b"test_value".to_vec());
        assert!(node.is_leaf());
        assert!(!node.is_branch());
        assert!(node.child_hashes().is_empty());
    }

    #[test]
    fn test_branch_node() {
        let node = Node::new_branch(NibblePath::empty(), two_children());
        assert!(node.is_branch());
        assert_eq!(node.child_count(), 2);
        assert_eq!(node.child_hashes().len(), 2);
    }

    #[test]
    fn test_node_encoding_decoding() {
        let original = Node::new_leaf(NibblePath::from_bytes(b"abc"), b"test_value".to_vec());
        let decoded = Node::decode(&original.encode().unwrap()).unwrap();
        assert_eq!(original, decoded);

        let branch = Node::new_branch(NibblePath::from_nibbles(vec![1, 2, 3]).unwrap(), two_children());
        assert_eq!(Node::decode(&branch.encode().unwrap()).unwrap(), branch);
    }

    #[test]
    fn test_node_id_consistency() {
        let h = Keccak256Hasher;
        let node1 = Node::new_leaf(NibblePath::from_bytes(b"k"), b"v".to_vec());
        let node2 = Node::new_leaf(NibblePath::from_bytes(b"k"), b"v".to_vec());
        assert_eq!(node1.hash(&h), node2.hash(&h));
    }

    #[test]
    fn test_branch_hash_binds_slot_positions() {
        let h = Keccak256Hasher;
        let child = h.digest(&[b"child"]);
        let other = h.digest(&[b"other"]);
        let mut a = [None; RADIX];
        a[1] = Some(child);
        a[2] = Some(other);
        let mut b = [None; RADIX];
        b[2] = Some(child);
        b[1] = Some(other);
        assert_ne!(branch_hash(&h, &NibblePath::empty(), &a), branch_hash(&h, &NibblePath::empty(), &b));
    }

    #[test]
    fn test_branch_hash_binds_skip_length() {
        let h = Keccak256Hasher;
        let children = two_children();
        let short = NibblePath::from_nibbles(vec![0]).unwrap();
        let long = NibblePath::from_nibbles(vec![0, 0]).unwrap();
        assert_ne!(branch_hash(&h, &short, &children), branch_hash(&h, &long, &children));
    }

    #[test]
    fn test_decode_rejects_single_child_branch() {
        let mut children = [None; RADIX];
        children[3] = Some([1u8; 32]);
        let bytes = Node::new_branch(NibblePath::empty(), children).encode().unwrap();
        assert!(matches!(Node::decode(&bytes), Err(TrieError::Serialization(_))));
    }

    #[test]
    fn test_decode_rejects_garbage() {
        assert!(Node::decode(b"invalid_node_data").is_err());
    }

    #[test]
    fn test_load_detects_hash_mismatch() {
        let h = Keccak256Hasher;
        let store = MemoryStore::new();
        let node = Node::new_leaf(NibblePath::from_bytes(b"a"), b"1".to_vec());
        let forged = Node::new_leaf(NibblePath::from_bytes(b"a"), b"2".to_vec());
        let hash = node.hash(&h);
        store.put(&Node::storage_key(&hash), forged.encode().unwrap()).unwrap();

        assert!(matches!(Node::load(&store, &h, &hash), Err(TrieError::CorruptNode { .. })));
    }

    #[test]
    fn test_load_missing_node() {
        let store = MemoryStore::new();
        assert!(matches!(Node::load(&store, &Keccak256Hasher, &[9u8; 32]), Err(TrieError::NodeNotFound(_))));
    }

    #[test]
    fn test_load_roundtrip() {
        let h = Keccak256Hasher;
        let store = MemoryStore::new();
        let node = Node::new_branch(NibblePath::empty(), two_children());
        let hash = node.hash(&h);
        store.put(&Node::storage_key(&hash), node.encode().unwrap()).unwrap();
        assert_eq!(Node::load(&store, &h, &hash).unwrap(), node);
    }
}
