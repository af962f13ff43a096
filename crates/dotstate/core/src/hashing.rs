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

//! Domain-separated hashing
//!
//! Every component receives its hash function through the [`TreeHasher`]
//! trait instead of calling a concrete digest. Implementations only provide
//! the raw 32-byte [`TreeHasher::digest`]; the provided methods apply the
//! domain separation used by every tree:
//!
//! - `leaf_hash   = H(0x00 || preimage)`
//! - `node_hash   = H(0x01 || preimage)`
//! - `value_hash  = H(0x02 || value)`
//! - `key_path    = H(0x03 || key)`
//!
//! Two implementations ship with the crate: [`Keccak256Hasher`] and
//! [`Blake3Hasher`].

use serde::{Deserialize, Serialize};
use sha3::{Digest, Keccak256};

/// 32-byte hash used as node identity and subtree commitment
pub type Hash = [u8; 32];

/// Length in bytes of every [`Hash`]
pub const HASH_LEN: usize = 32;

/// Root recorded for a tree that holds no keys. Never written as a node.
pub const EMPTY_ROOT: Hash = [0u8; HASH_LEN];

/// Placeholder for an empty child slot inside a node preimage.
///
/// All bytes are `0xFF` so the sentinel can never be confused with
/// [`EMPTY_ROOT`] or with a digest produced for a real node.
pub const ABSENT: Hash = [0xFFu8; HASH_LEN];

const LEAF_DOMAIN: u8 = 0x00;
const NODE_DOMAIN: u8 = 0x01;
const VALUE_DOMAIN: u8 = 0x02;
const KEY_DOMAIN: u8 = 0x03;

/// Hash function injected into every tree component
pub trait TreeHasher: Clone + Send + Sync {
    /// Short identifier of the algorithm, used in logs and configuration
    fn name(&self) -> &'static str;

    /// Raw digest over the concatenation of `parts`
    fn digest(&self, parts: &[&[u8]]) -> Hash;

    /// Commitment of a leaf preimage
    fn leaf_hash(&self, preimage: &[u8]) -> Hash {
        self.digest(&[&[LEAF_DOMAIN], preimage])
    }

    /// Commitment of an internal node preimage
    fn node_hash(&self, preimage: &[u8]) -> Hash {
        self.digest(&[&[NODE_DOMAIN], preimage])
    }

    /// Commitment of a stored value
    fn value_hash(&self, value: &[u8]) -> Hash {
        self.digest(&[&[VALUE_DOMAIN], value])
    }

    /// Digest of a user key; its nibbles are the key's path in the tree
    fn key_path(&self, key: &[u8]) -> Hash {
        self.digest(&[&[KEY_DOMAIN], key])
    }
}

/// Keccak-256 hasher
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Keccak256Hasher;

impl TreeHasher for Keccak256Hasher {
    fn name(&self) -> &'static str {
        "keccak256"
    }

    fn digest(&self, parts: &[&[u8]]) -> Hash {
        let mut hasher = Keccak256::new();
        for part in parts {
            hasher.update(part);
        }
        hasher.finalize().into()
    }
}

/// BLAKE3 hasher
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Blake3Hasher;

impl TreeHasher for Blake3Hasher {
    fn name(&self) -> &'static str {
        "blake3"
    }

    fn digest(&self, parts: &[&[u8]]) -> Hash {
        let mut hasher = blake3::Hasher::new();
        for part in parts {
            hasher.update(part);
        }
        *hasher.finalize().as_bytes()
    }
}

/// Hash algorithm selectable from configuration
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HashAlgorithm {
    #[default]
    Keccak256,
    Blake3,
}

/// Runtime dispatch to the configured algorithm
impl TreeHasher for HashAlgorithm {
    fn name(&self) -> &'static str {
        match self {
            HashAlgorithm::Keccak256 => Keccak256Hasher.name(),
            HashAlgorithm::Blake3 => Blake3Hasher.name(),
        }
    }

    fn digest(&self, parts: &[&[u8]]) -> Hash {
        match self {
            HashAlgorithm::Keccak256 => Keccak256Hasher.digest(parts),
            HashAlgorithm::Blake3 => Blake3Hasher.digest(parts),
        }
    }
}

impl std::str::FromStr for HashAlgorithm {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "keccak256" | "keccak" => Ok(HashAlgorithm::Keccak256),
            "blake3" => Ok(HashAlgorithm::Blake3),
            other => Err(format!("unknown hash algorithm: {other}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_domains_are_separated() {
        let h = Keccak256Hasher;
        let data = b"payload";
        let hashes = [h.leaf_hash(data), h.node_hash(data), h.value_hash(data), h.key_path(data)];
        for i in 0..hashes.len() {
            for j in (i + 1)..hashes.len() {
                assert_ne!(hashes[i], hashes[j]);
            }
        }
    }

    #[test]
    fn test_digest_concatenates_parts() {
        let h = Blake3Hasher;
        assert_eq!(h.digest(&[b"ab", b"cd"]), h.digest(&[b"abcd"]));
        assert_eq!(h.digest(&[b"abcd"]), *blake3::hash(b"abcd").as_bytes());
    }

    #[test]
    fn test_keccak_matches_reference() {
        let expected: Hash = Keccak256::digest(b"").into();
        assert_eq!(Keccak256Hasher.digest(&[]), expected);
    }

    #[test]
    fn test_sentinels_are_distinct() {
        assert_ne!(EMPTY_ROOT, ABSENT);
        assert_ne!(Keccak256Hasher.node_hash(&[]), ABSENT);
    }

    #[test]
    fn test_hash_algorithm_parsing() {
        assert_eq!("Keccak256".parse::<HashAlgorithm>().unwrap(), HashAlgorithm::Keccak256);
        assert_eq!("blake3".parse::<HashAlgorithm>().unwrap(), HashAlgorithm::Blake3);
        assert!("md5".parse::<HashAlgorithm>().is_err());
    }

    #[test]
    fn test_hash_algorithm_dispatches() {
        assert_eq!(HashAlgorithm::Blake3.key_path(b"k"), Blake3Hasher.key_path(b"k"));
        assert_eq!(HashAlgorithm::Keccak256.name(), "keccak256");
    }
}
