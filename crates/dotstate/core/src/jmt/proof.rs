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

//! Proofs against a versioned root
//!
//! Internal nodes of the versioned tree are not path-compressed, so every
//! step consumes exactly one nibble of the key path and carries the sibling
//! slots of one internal node.

use crate::error::{TrieError, TrieResult};
use crate::hashing::{EMPTY_ROOT, Hash, TreeHasher};
use crate::jmt::node::{internal_hash, leaf_hash};
use crate::mpt::node::Children;
use crate::mpt::proof::ProofType;
use crate::path::NibblePath;
use serde::{Deserialize, Serialize};

/// One internal node crossed on the way down
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SparseStep {
    /// Slot taken by the key path
    pub index: u8,
    /// Hashes of the other children; the slot at `index` is empty
    pub siblings: Children,
}

/// What the walk found below the last step
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SparseTerminal {
    Leaf { value_hash: Hash },
    /// Empty slot, or the empty tree when there are no steps
    Empty,
    DifferentLeaf { key_hash: Hash, value_hash: Hash },
}

/// Inclusion or non-inclusion proof in the versioned tree
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SparseProof {
    pub steps: Vec<SparseStep>,
    pub terminal: SparseTerminal,
}

impl SparseProof {
    pub fn new(steps: Vec<SparseStep>, terminal: SparseTerminal) -> Self {
        Self { steps, terminal }
    }

    pub fn proof_type(&self) -> ProofType {
        match self.terminal {
            SparseTerminal::Leaf { .. } => ProofType::Inclusion,
            SparseTerminal::Empty => ProofType::NonInclusionMissingBranch,
            SparseTerminal::DifferentLeaf { .. } => ProofType::NonInclusionDifferentLeaf,
        }
    }

    pub fn encode(&self) -> TrieResult<Vec<u8>> {
        bincode::serde::encode_to_vec(self, bincode::config::standard()).map_err(|e| TrieError::Serialization(e.to_string()))
    }

    pub fn decode(data: &[u8]) -> TrieResult<Self> {
        let (proof, read): (SparseProof, usize) =
            bincode::serde::decode_from_slice(data, bincode::config::standard()).map_err(|e| TrieError::Serialization(e.to_string()))?;
        if read != data.len() {
            return Err(TrieError::Serialization(format!("{} trailing bytes after proof", data.len() - read)));
        }
        Ok(proof)
    }

    /// Verify the proof for `key` against `root`
    ///
    /// `value = Some(..)` checks inclusion of that value, `None` checks that
    /// the key is absent. Malformed proofs return `false`.
    pub fn verify<H: TreeHasher>(&self, hasher: &H, root: &Hash, key: &[u8], value: Option<&[u8]>) -> bool {
        let key_hash = hasher.key_path(key);
        let path = NibblePath::from_bytes(&key_hash);
        if self.steps.len() > path.len() {
            return false;
        }
        for (depth, step) in self.steps.iter().enumerate() {
            if path.get(depth) != Some(step.index) || step.siblings[step.index as usize].is_some() {
                return false;
            }
        }

        let mut current = match (&self.terminal, value) {
            (SparseTerminal::Leaf { value_hash }, Some(value)) => {
                if hasher.value_hash(value) != *value_hash {
                    return false;
                }
                Some(leaf_hash(hasher, &key_hash, value_hash))
            }
            (SparseTerminal::Empty, None) => None,
            (SparseTerminal::DifferentLeaf { key_hash: other, value_hash }, None) => {
                if *other == key_hash || !NibblePath::from_bytes(other).starts_with(&path.prefix(self.steps.len())) {
                    return false;
                }
                Some(leaf_hash(hasher, other, value_hash))
            }
            _ => return false,
        };

        for step in self.steps.iter().rev() {
            let mut children = step.siblings;
            children[step.index as usize] = current;
            if children.iter().all(Option::is_none) {
                return false;
            }
            current = Some(internal_hash(hasher, &children));
        }

        current.unwrap_or(EMPTY_ROOT) == *root
    }
}

/// Sibling slots of an internal node with the slot at `index` cleared
pub(crate) fn siblings_of(children: &Children, index: u8) -> Children {
    let mut siblings = *children;
    if let Some(slot) = siblings.get_mut(index as usize) {
        *slot = None;
    }
    siblings
}
