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

//! Path and key encoding
//!
//! - [`NibblePath`]: half-byte decomposition of a key digest, used for trie
//!   descent and for the skip segments of path-compressed branches.
//! - Version keys: fixed-width big-endian encoding so that lexicographic order
//!   in the store equals numeric order (required by range scans).

use crate::error::{TrieError, TrieResult};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Monotonically assigned commit identifier
pub type Version = u64;

/// Width in bytes of an encoded [`Version`]
pub const VERSION_LEN: usize = 8;

/// Encode a version as 8 big-endian bytes
pub fn encode_version(version: Version) -> [u8; VERSION_LEN] {
    version.to_be_bytes()
}

/// Decode a version from exactly 8 big-endian bytes
pub fn decode_version(bytes: &[u8]) -> TrieResult<Version> {
    let raw: [u8; VERSION_LEN] = bytes
        .try_into()
        .map_err(|_| TrieError::Serialization(format!("version key must be {VERSION_LEN} bytes, got {}", bytes.len())))?;
    Ok(Version::from_be_bytes(raw))
}

/// Find common prefix length between two nibble slices
pub fn common_prefix(a: &[u8], b: &[u8]) -> usize {
    a.iter().zip(b).take_while(|(x, y)| x == y).count()
}

/// An ordered sequence of nibbles (values `0..16`)
#[derive(Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct NibblePath {
    nibbles: Vec<u8>,
}

impl NibblePath {
    /// Create an empty path
    pub fn empty() -> Self {
        Self { nibbles: Vec::new() }
    }

    /// Decompose bytes into nibbles, high half first
    pub fn from_bytes(bytes: &[u8]) -> Self {
        let mut nibbles = Vec::with_capacity(bytes.len() * 2);
        for byte in bytes {
            nibbles.push(byte >> 4);
            nibbles.push(byte & 0x0f);
        }
        Self { nibbles }
    }

    /// Build a path from raw nibbles, rejecting values above `0x0f`
    pub fn from_nibbles(nibbles: Vec<u8>) -> TrieResult<Self> {
        if let Some(bad) = nibbles.iter().find(|n| **n > 0x0f) {
            return Err(TrieError::Serialization(format!("invalid nibble value {bad}")));
        }
        Ok(Self { nibbles })
    }

    pub(crate) fn from_slice(nibbles: &[u8]) -> Self {
        debug_assert!(nibbles.iter().all(|n| *n < 16));
        Self { nibbles: nibbles.to_vec() }
    }

    /// Number of nibbles
    pub fn len(&self) -> usize {
        self.nibbles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nibbles.is_empty()
    }

    /// Nibble at `index`, if any
    pub fn get(&self, index: usize) -> Option<u8> {
        self.nibbles.get(index).copied()
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.nibbles
    }

    /// Whether every nibble is in range
    pub fn is_valid(&self) -> bool {
        self.nibbles.iter().all(|n| *n < 16)
    }

    /// The first `len` nibbles (saturating)
    pub fn prefix(&self, len: usize) -> NibblePath {
        Self::from_slice(&self.nibbles[..len.min(self.nibbles.len())])
    }

    /// Everything after the first `count` nibbles (saturating)
    pub fn skip(&self, count: usize) -> NibblePath {
        Self::from_slice(&self.nibbles[count.min(self.nibbles.len())..])
    }

    pub fn starts_with(&self, prefix: &NibblePath) -> bool {
        self.nibbles.starts_with(&prefix.nibbles)
    }

    pub fn common_prefix_len(&self, other: &NibblePath) -> usize {
        common_prefix(&self.nibbles, &other.nibbles)
    }

    /// A copy of this path extended by one nibble
    pub fn child(&self, nibble: u8) -> NibblePath {
        let mut nibbles = Vec::with_capacity(self.nibbles.len() + 1);
        nibbles.extend_from_slice(&self.nibbles);
        nibbles.push(nibble);
        Self { nibbles }
    }

    /// `self || nibble || tail`, the path of a node lifted past a collapsed branch
    pub fn join(&self, nibble: u8, tail: &NibblePath) -> NibblePath {
        let mut nibbles = Vec::with_capacity(self.nibbles.len() + 1 + tail.nibbles.len());
        nibbles.extend_from_slice(&self.nibbles);
        nibbles.push(nibble);
        nibbles.extend_from_slice(&tail.nibbles);
        Self { nibbles }
    }

    /// Pack the nibbles back into bytes; an odd trailing nibble is padded with zero
    pub fn to_bytes(&self) -> Vec<u8> {
        self.nibbles
            .chunks(2)
            .map(|pair| if pair.len() == 2 { (pair[0] << 4) | pair[1] } else { pair[0] << 4 })
            .collect()
    }

    /// Compact encoding: `u16` big-endian nibble count followed by packed nibbles.
    ///
    /// This is the layout hashed into node preimages, so the nibble count is
    /// always committed along with the content.
    pub fn encode_compact(&self) -> Vec<u8> {
        let mut encoded = Vec::with_capacity(2 + self.nibbles.len().div_ceil(2));
        encoded.extend_from_slice(&(self.nibbles.len() as u16).to_be_bytes());
        encoded.extend_from_slice(&self.to_bytes());
        encoded
    }

    /// Inverse of [`NibblePath::encode_compact`]
    pub fn decode_compact(data: &[u8]) -> TrieResult<Self> {
        if data.len() < 2 {
            return Err(TrieError::Serialization("compact path shorter than its length prefix".to_string()));
        }
        let len = u16::from_be_bytes([data[0], data[1]]) as usize;
        let packed = &data[2..];
        if packed.len() != len.div_ceil(2) {
            return Err(TrieError::Serialization(format!("compact path declares {len} nibbles but carries {} bytes", packed.len())));
        }
        let mut path = Self::from_bytes(packed);
        path.nibbles.truncate(len);
        Ok(path)
    }
}

impl fmt::Debug for NibblePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NibblePath(")?;
        for nibble in &self.nibbles {
            write!(f, "{nibble:x}")?;
        }
        write!(f, ")")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_encoding_preserves_order() {
        let versions = [0u64, 1, 255, 256, 65_535, u64::MAX - 1, u64::MAX];
        for pair in versions.windows(2) {
            assert!(encode_version(pair[0]) < encode_version(pair[1]));
        }
        assert_eq!(decode_version(&encode_version(42)).unwrap(), 42);
        assert!(decode_version(&[1, 2, 3]).is_err());
    }

    #[test]
    fn test_from_bytes_high_nibble_first() {
        let path = NibblePath::from_bytes(&[0xab, 0x01]);
        assert_eq!(path.as_slice(), &[0xa, 0xb, 0x0, 0x1]);
        assert_eq!(path.to_bytes(), vec![0xab, 0x01]);
    }

    #[test]
    fn test_prefix_skip_and_join() {
        let path = NibblePath::from_bytes(&[0x12, 0x34]);
        let head = path.prefix(1);
        let tail = path.skip(2);
        assert_eq!(head.as_slice(), &[1]);
        assert_eq!(tail.as_slice(), &[3, 4]);
        assert_eq!(head.join(2, &tail), path);
        assert!(path.starts_with(&head));
        assert_eq!(path.skip(10), NibblePath::empty());
    }

    #[test]
    fn test_common_prefix_len() {
        let a = NibblePath::from_bytes(&[0x12, 0x34]);
        let b = NibblePath::from_bytes(&[0x12, 0x44]);
        assert_eq!(a.common_prefix_len(&b), 2);
        assert_eq!(a.common_prefix_len(&NibblePath::empty()), 0);
        assert_eq!(common_prefix(&[1, 2, 3], &[1, 2, 3]), 3);
    }

    #[test]
    fn test_compact_encoding_odd_length() {
        let path = NibblePath::from_nibbles(vec![0xa, 0xb, 0xc]).unwrap();
        let encoded = path.encode_compact();
        assert_eq!(encoded, vec![0x00, 0x03, 0xab, 0xc0]);
        assert_eq!(NibblePath::decode_compact(&encoded).unwrap(), path);
    }

    #[test]
    fn test_compact_encoding_distinguishes_padding() {
        let odd = NibblePath::from_nibbles(vec![0xa]).unwrap();
        let even = NibblePath::from_nibbles(vec![0xa, 0x0]).unwrap();
        assert_ne!(odd.encode_compact(), even.encode_compact());
    }

    #[test]
    fn test_decode_compact_rejects_malformed() {
        assert!(NibblePath::decode_compact(&[0x00]).is_err());
        assert!(NibblePath::decode_compact(&[0x00, 0x04, 0xab]).is_err());
    }

    #[test]
    fn test_invalid_nibbles_rejected() {
        assert!(NibblePath::from_nibbles(vec![1, 16]).is_err());
        let path = NibblePath::from_nibbles(vec![15, 0]).unwrap();
        assert!(path.is_valid());
    }

    #[test]
    fn test_debug_format() {
        let path = NibblePath::from_bytes(&[0x1f]);
        assert_eq!(format!("{path:?}"), "NibblePath(1f)");
    }
}
