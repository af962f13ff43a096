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

//! Merkle proofs for the Patricia trie
//!
//! A proof is the list of branches crossed on the way from the root to the
//! position of a key, followed by a terminal describing what was found there.
//! Each step carries the hashes of the branch's other children, which is
//! enough to recompute every branch hash bottom-up.
//!
//! Verification walks the steps forward first, checking that the skip-paths
//! and child indices spell out the queried key's path, then folds the hashes
//! back up from the terminal and compares the result with the trusted root.
//! A malformed proof is never an error: it simply fails to verify.

use crate::error::{TrieError, TrieResult};
use crate::hashing::{EMPTY_ROOT, HASH_LEN, Hash, TreeHasher};
use crate::mpt::node::{Children, RADIX, branch_hash, leaf_hash};
use crate::path::NibblePath;
use serde::{Deserialize, Serialize};

/// What a proof claims about its key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProofType {
    /// The key is bound to a value
    Inclusion,
    /// The walk ends at an empty slot, an empty trie, or inside a skip-path
    NonInclusionMissingBranch,
    /// The walk ends at a leaf holding another key
    NonInclusionDifferentLeaf,
}

/// One branch crossed on the way down
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProofStep {
    /// All sibling slots of the branch; the slot at `index` is left empty
    Branch { skip: NibblePath, index: u8, neighbors: Children },
    /// Compressed step for a branch with exactly one other child
    Fork { skip: NibblePath, index: u8, neighbor_index: u8, neighbor: Hash },
}

/// What the walk found below the last step
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProofTerminal {
    /// Leaf holding the queried key
    Leaf { suffix: NibblePath, value_hash: Hash },
    /// Empty child slot, or an empty trie when there are no steps
    Empty,
    /// Branch whose skip-path the key leaves before reaching any child
    ForeignBranch { skip: NibblePath, children: Children },
    /// Leaf holding a different key
    DifferentLeaf { key_path: Hash, suffix: NibblePath, value_hash: Hash },
}

/// Inclusion or non-inclusion proof for one key
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Proof {
    /// Steps from the root down
    pub steps: Vec<ProofStep>,
    pub terminal: ProofTerminal,
}

impl ProofStep {
    fn skip(&self) -> &NibblePath {
        match self {
            ProofStep::Branch { skip, .. } | ProofStep::Fork { skip, .. } => skip,
        }
    }

    fn index(&self) -> u8 {
        match self {
            ProofStep::Branch { index, .. } | ProofStep::Fork { index, .. } => *index,
        }
    }

    /// Rebuild the branch's child slots with `child` placed at the step index.
    /// `None` if the step is inconsistent.
    fn children_with(&self, child: Option<Hash>) -> Option<Children> {
        let index = self.index() as usize;
        if index >= RADIX {
            return None;
        }
        let mut children = match self {
            ProofStep::Branch { neighbors, .. } => {
                if neighbors[index].is_some() {
                    return None;
                }
                *neighbors
            }
            ProofStep::Fork { neighbor_index, neighbor, .. } => {
                let neighbor_index = *neighbor_index as usize;
                if neighbor_index >= RADIX || neighbor_index == index {
                    return None;
                }
                let mut children = [None; RADIX];
                children[neighbor_index] = Some(*neighbor);
                children
            }
        };
        children[index] = child;
        Some(children)
    }
}

impl Proof {
    /// Create a new proof
    pub fn new(steps: Vec<ProofStep>, terminal: ProofTerminal) -> Self {
        Self { steps, terminal }
    }

    /// The claim this proof makes, derived from its terminal
    pub fn proof_type(&self) -> ProofType {
        match self.terminal {
            ProofTerminal::Leaf { .. } => ProofType::Inclusion,
            ProofTerminal::Empty | ProofTerminal::ForeignBranch { .. } => ProofType::NonInclusionMissingBranch,
            ProofTerminal::DifferentLeaf { .. } => ProofType::NonInclusionDifferentLeaf,
        }
    }

    /// Encode proof for serialization
    ///
    /// # Returns
    ///
    /// A byte vector containing the encoded proof
    pub fn encode(&self) -> TrieResult<Vec<u8>> {
        bincode::serde::encode_to_vec(self, bincode::config::standard()).map_err(|e| TrieError::Serialization(e.to_string()))
    }

    /// Decode proof from bytes
    ///
    /// # Arguments
    ///
    /// * `data` - The encoded proof data
    ///
    /// # Returns
    ///
    /// A Result containing either the decoded proof or an error
    pub fn decode(data: &[u8]) -> TrieResult<Self> {
        let (proof, read): (Proof, usize) =
            bincode::serde::decode_from_slice(data, bincode::config::standard()).map_err(|e| TrieError::Serialization(e.to_string()))?;
        if read != data.len() {
            return Err(TrieError::Serialization(format!("{} trailing bytes after proof", data.len() - read)));
        }
        Ok(proof)
    }

    /// Number of sibling hashes carried by the proof
    pub fn sibling_count(&self) -> usize {
        self.steps
            .iter()
            .map(|step| match step {
                ProofStep::Branch { neighbors, .. } => neighbors.iter().flatten().count(),
                ProofStep::Fork { .. } => 1,
            })
            .sum()
    }

    /// Approximate proof size in bytes
    pub fn size(&self) -> usize {
        self.sibling_count() * HASH_LEN
    }
}

/// Verify a proof for `key` against `root`
///
/// # Arguments
///
/// * `hasher` - Hash function the trie was built with
/// * `root` - Trusted root; `None` (or [`EMPTY_ROOT`]) stands for the empty trie
/// * `key` - The key the proof is about
/// * `value` - The expected value; required for inclusion, ignored otherwise
/// * `inclusion` - Whether the caller expects the key to be present
/// * `proof` - The proof to check
///
/// # Returns
///
/// `true` iff the proof is well formed, makes the claim the caller expects,
/// and recomputes exactly `root`
pub fn verify_proof<H: TreeHasher>(hasher: &H, root: Option<&Hash>, key: &[u8], value: Option<&[u8]>, inclusion: bool, proof: &Proof) -> bool {
    let root = root.filter(|r| **r != EMPTY_ROOT).copied();
    let path = NibblePath::from_bytes(&hasher.key_path(key));
    let full = path.as_slice();

    // forward pass: the steps must spell out the key path
    let mut pos = 0usize;
    for step in &proof.steps {
        let skip = step.skip().as_slice();
        if !skip.iter().all(|n| *n < 16) || !full[pos.min(full.len())..].starts_with(skip) {
            return false;
        }
        pos += skip.len();
        match full.get(pos) {
            Some(nibble) if *nibble == step.index() => pos += 1,
            _ => return false,
        }
    }
    let rest = &full[pos.min(full.len())..];

    let mut current = match &proof.terminal {
        ProofTerminal::Leaf { suffix, value_hash } => {
            let Some(value) = value else {
                return false;
            };
            if !inclusion || suffix.as_slice() != rest || hasher.value_hash(value) != *value_hash {
                return false;
            }
            Some(leaf_hash(hasher, suffix, value_hash))
        }
        ProofTerminal::Empty => {
            if inclusion {
                return false;
            }
            None
        }
        ProofTerminal::ForeignBranch { skip, children } => {
            if inclusion || !skip.is_valid() || rest.starts_with(skip.as_slice()) || children.iter().flatten().count() < 2 {
                return false;
            }
            Some(branch_hash(hasher, skip, children))
        }
        ProofTerminal::DifferentLeaf { key_path, suffix, value_hash } => {
            let other = NibblePath::from_bytes(key_path);
            if inclusion || other == path || !other.as_slice().starts_with(&full[..pos.min(full.len())]) || other.skip(pos) != *suffix {
                return false;
            }
            Some(leaf_hash(hasher, suffix, value_hash))
        }
    };

    // backward pass: fold hashes up to the root
    for step in proof.steps.iter().rev() {
        let Some(children) = step.children_with(current) else {
            return false;
        };
        if children.iter().flatten().count() < 2 {
            return false;
        }
        current = Some(branch_hash(hasher, step.skip(), &children));
    }

    current == root
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hashing::Keccak256Hasher;

    #[test]
    fn test_empty_trie_proof() {
        let h = Keccak256Hasher;
        let proof = Proof::new(Vec::new(), ProofTerminal::Empty);
        assert_eq!(proof.proof_type(), ProofType::NonInclusionMissingBranch);
        assert!(verify_proof(&h, None, b"key", None, false, &proof));
        assert!(verify_proof(&h, Some(&EMPTY_ROOT), b"key", None, false, &proof));
        assert!(!verify_proof(&h, None, b"key", None, true, &proof));
        assert!(!verify_proof(&h, Some(&[7u8; 32]), b"key", None, false, &proof));
    }

    #[test]
    fn test_single_leaf_proof() {
        let h = Keccak256Hasher;
        let path = NibblePath::from_bytes(&h.key_path(b"key"));
        let value_hash = h.value_hash(b"value");
        let root = leaf_hash(&h, &path, &value_hash);
        let proof = Proof::new(Vec::new(), ProofTerminal::Leaf { suffix: path, value_hash });

        assert!(verify_proof(&h, Some(&root), b"key", Some(b"value"), true, &proof));
        assert!(!verify_proof(&h, Some(&root), b"key", Some(b"other"), true, &proof));
        assert!(!verify_proof(&h, Some(&root), b"key", None, true, &proof));
        assert!(!verify_proof(&h, Some(&root), b"key", Some(b"value"), false, &proof));
        assert!(!verify_proof(&h, Some(&root), b"other", Some(b"value"), true, &proof));
    }

    #[test]
    fn test_malformed_steps_do_not_panic() {
        let h = Keccak256Hasher;
        let bogus = Proof::new(
            vec![
                ProofStep::Fork {
                    skip: NibblePath::from_slice(&[0; 80]),
                    index: 200,
                    neighbor_index: 200,
                    neighbor: [1; 32],
                };
                3
            ],
            ProofTerminal::DifferentLeaf {
                key_path: [0; 32],
                suffix: NibblePath::empty(),
                value_hash: [0; 32],
            },
        );
        assert!(!verify_proof(&h, Some(&[1; 32]), b"key", None, false, &bogus));
    }

    #[test]
    fn test_encode_decode() {
        let proof = Proof::new(
            vec![ProofStep::Fork {
                skip: NibblePath::from_slice(&[1, 2]),
                index: 3,
                neighbor_index: 4,
                neighbor: [5; 32],
            }],
            ProofTerminal::Empty,
        );
        let decoded = Proof::decode(&proof.encode().unwrap()).unwrap();
        assert_eq!(decoded, proof);
        assert_eq!(decoded.sibling_count(), 1);
        assert!(Proof::decode(b"\xff\xff\xff").is_err());
    }
}
