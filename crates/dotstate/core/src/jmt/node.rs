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

//! Versioned tree nodes
//!
//! Nodes of the versioned tree are addressed by [`NodeKey`]: the version
//! that created the node plus its nibble path from the root. A node is never
//! rewritten; an update creates a new node under the new version and records
//! the old one as stale.

use crate::error::{TrieError, TrieResult};
use crate::hashing::{EMPTY_ROOT, HASH_LEN, Hash, TreeHasher};
use crate::mpt::node::{Children, RADIX, Value, branch_hash};
use crate::path::{NibblePath, VERSION_LEN, Version, decode_version, encode_version};
use crate::storage::{KeySpace, ReadStore};
use serde::{Deserialize, Serialize};

/// Storage address of a versioned node
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct NodeKey {
    pub version: Version,
    pub path: NibblePath,
}

impl NodeKey {
    pub fn new(version: Version, path: NibblePath) -> Self {
        Self { version, path }
    }

    /// Key of the root node written at `version`
    pub fn root(version: Version) -> Self {
        Self::new(version, NibblePath::empty())
    }

    /// Key of the child at `index`, created at `version`
    pub fn child(&self, version: Version, index: u8) -> Self {
        Self::new(version, self.path.child(index))
    }

    /// Depth of the node (number of nibbles from the root)
    pub fn depth(&self) -> usize {
        self.path.len()
    }

    /// `version (8 bytes, big-endian) || compact(path)`
    pub fn encode(&self) -> Vec<u8> {
        let mut encoded = encode_version(self.version).to_vec();
        encoded.extend_from_slice(&self.path.encode_compact());
        encoded
    }

    pub fn decode(data: &[u8]) -> TrieResult<Self> {
        if data.len() < VERSION_LEN {
            return Err(TrieError::Serialization("node key shorter than its version".to_string()));
        }
        let version = decode_version(&data[..VERSION_LEN])?;
        let path = NibblePath::decode_compact(&data[VERSION_LEN..])?;
        Ok(Self { version, path })
    }

    /// Physical key of the node
    pub fn storage_key(&self) -> Vec<u8> {
        KeySpace::VersionedNode.key(&self.encode())
    }
}

/// Reference from an internal node to one of its children
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Child {
    pub hash: Hash,
    /// Version the child node was created at
    pub version: Version,
    pub is_leaf: bool,
}

/// Node of the versioned tree
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum VersionedNode {
    /// Root of an empty tree
    Null,
    Internal { children: [Option<Child>; RADIX] },
    Leaf { key_hash: Hash, value: Value },
}

impl VersionedNode {
    pub fn new_leaf(key_hash: Hash, value: Value) -> Self {
        VersionedNode::Leaf { key_hash, value }
    }

    pub fn is_leaf(&self) -> bool {
        matches!(self, VersionedNode::Leaf { .. })
    }

    /// Commitment of the node
    ///
    /// Internal nodes use the same layout as path-compressed branches with an
    /// empty skip-path. Leaf hashes do not depend on depth, so a leaf keeps
    /// its hash when it moves up or down the tree.
    pub fn hash<H: TreeHasher>(&self, hasher: &H) -> Hash {
        match self {
            VersionedNode::Null => EMPTY_ROOT,
            VersionedNode::Internal { children } => internal_hash(hasher, &child_hashes(children)),
            VersionedNode::Leaf { key_hash, value } => leaf_hash(hasher, key_hash, &hasher.value_hash(value)),
        }
    }

    /// Reference to this node as a child created at `version`
    pub fn as_child<H: TreeHasher>(&self, hasher: &H, version: Version) -> Child {
        Child {
            hash: self.hash(hasher),
            version,
            is_leaf: self.is_leaf(),
        }
    }

    pub fn encode(&self) -> TrieResult<Vec<u8>> {
        bincode::serde::encode_to_vec(self, bincode::config::standard()).map_err(|e| TrieError::Serialization(e.to_string()))
    }

    pub fn decode(data: &[u8]) -> TrieResult<Self> {
        let (node, read): (VersionedNode, usize) =
            bincode::serde::decode_from_slice(data, bincode::config::standard()).map_err(|e| TrieError::Serialization(e.to_string()))?;
        if read != data.len() {
            return Err(TrieError::Serialization(format!("{} trailing bytes after node", data.len() - read)));
        }
        Ok(node)
    }

    /// Load the node at `key` and check it against the hash its parent (or
    /// the roots index) recorded for it
    ///
    /// # Errors
    ///
    /// - [`TrieError::NodeNotFound`] if no node is stored at `key`
    /// - [`TrieError::CorruptNode`] on undecodable bytes, a hash mismatch, a
    ///   leaf stored off its key's path, or a `Null` node below the root
    pub fn load<R, H>(store: &R, hasher: &H, key: &NodeKey, expected: &Hash) -> TrieResult<Self>
    where
        R: ReadStore + ?Sized,
        H: TreeHasher,
    {
        let storage_key = key.storage_key();
        let data = store.get(&storage_key)?.ok_or(TrieError::NodeNotFound(*expected))?;
        let node = Self::decode(&data).map_err(|e| TrieError::corrupt(&storage_key, e.to_string()))?;
        match &node {
            VersionedNode::Null if key.depth() > 0 => return Err(TrieError::corrupt(&storage_key, "empty node below the root")),
            VersionedNode::Leaf { key_hash, .. } if !NibblePath::from_bytes(key_hash).starts_with(&key.path) => {
                return Err(TrieError::corrupt(&storage_key, "leaf stored off its key path"));
            }
            _ => {}
        }
        if node.hash(hasher) != *expected {
            return Err(TrieError::corrupt(&storage_key, "stored node does not match the recorded hash"));
        }
        Ok(node)
    }
}

/// Leaf commitment: `leaf_hash(key_hash || value_hash)`
pub fn leaf_hash<H: TreeHasher>(hasher: &H, key_hash: &Hash, value_hash: &Hash) -> Hash {
    let mut preimage = [0u8; 2 * HASH_LEN];
    preimage[..HASH_LEN].copy_from_slice(key_hash);
    preimage[HASH_LEN..].copy_from_slice(value_hash);
    hasher.leaf_hash(&preimage)
}

/// Internal node commitment over its child hashes
pub fn internal_hash<H: TreeHasher>(hasher: &H, children: &Children) -> Hash {
    branch_hash(hasher, &NibblePath::empty(), children)
}

pub(crate) fn child_hashes(children: &[Option<Child>; RADIX]) -> Children {
    let mut hashes = [None; RADIX];
    for (slot, child) in hashes.iter_mut().zip(children) {
        *slot = child.map(|c| c.hash);
    }
    hashes
}

/// Record of a node that stopped being part of the latest tree
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct StaleNodeIndex {
    /// First version whose tree no longer contains the node
    pub stale_since_version: Version,
    pub node_key: NodeKey,
}

impl StaleNodeIndex {
    /// Physical key: `KeySpace::Stale || stale_since (big-endian) || node key`
    pub fn storage_key(&self) -> Vec<u8> {
        let mut body = encode_version(self.stale_since_version).to_vec();
        body.extend_from_slice(&self.node_key.encode());
        KeySpace::Stale.key(&body)
    }

    pub fn from_storage_key(key: &[u8]) -> TrieResult<Self> {
        let body = KeySpace::Stale.strip(key).ok_or_else(|| TrieError::corrupt(key, "not a stale-node key"))?;
        if body.len() < VERSION_LEN {
            return Err(TrieError::corrupt(key, "stale-node key shorter than its version"));
        }
        let stale_since_version = decode_version(&body[..VERSION_LEN])?;
        let node_key = NodeKey::decode(&body[VERSION_LEN..]).map_err(|e| TrieError::corrupt(key, e.to_string()))?;
        Ok(Self { stale_since_version, node_key })
    }

    /// Whether some version in `[created, stale_since)` is among `retained`
    pub fn is_needed_by(&self, retained: &std::collections::BTreeSet<Version>) -> bool {
        retained.range(self.node_key.version..self.stale_since_version).next().is_some()
    }
}
