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

//! Jellyfish Merkle Tree (JMT) Module
//!
//! A versioned sparse Merkle tree over hashed keys. Nodes are addressed by
//! `(version, nibble path)` instead of by content hash, so every commit adds
//! nodes without touching those of earlier versions.
//!
//! # Usage
//!
//! ```rust
//! use dotstate_core::hashing::Blake3Hasher;
//! use dotstate_core::jmt::JellyfishTree;
//! use dotstate_core::storage::MemoryStore;
//!
//! let tree = JellyfishTree::new(MemoryStore::new(), Blake3Hasher);
//! tree.put(1, vec![(b"alice".to_vec(), Some(b"100".to_vec()))]).unwrap();
//! tree.put(2, vec![(b"alice".to_vec(), Some(b"150".to_vec()))]).unwrap();
//!
//! assert_eq!(tree.get(b"alice", 1).unwrap(), Some(b"100".to_vec()));
//! assert_eq!(tree.get(b"alice", 2).unwrap(), Some(b"150".to_vec()));
//!
//! let proof = tree.get_proof(b"alice", 2).unwrap().unwrap();
//! assert!(tree.verify_proof(b"alice", Some(b"150"), 2, &proof).unwrap());
//! ```

pub mod node;
pub mod proof;
pub mod tree;

pub use node::{Child, NodeKey, StaleNodeIndex, VersionedNode};
pub use proof::{SparseProof, SparseStep, SparseTerminal};
pub use tree::JellyfishTree;
