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

//! Merkle Patricia Trie (MPT) Module
//!
//! A path-compressed, content-addressed radix trie with inclusion and
//! non-inclusion proofs.
//!
//! # Module Structure
//!
//! - `node`: node type, hash layout and integrity-checked loading
//! - `proof`: proof format and stateless verification
//! - `trie`: the trie and its operations
//!
//! # Usage
//!
//! ```rust
//! use dotstate_core::hashing::Keccak256Hasher;
//! use dotstate_core::mpt::MerklePatriciaTrie;
//! use dotstate_core::storage::MemoryStore;
//!
//! let mut trie = MerklePatriciaTrie::new(MemoryStore::new(), Keccak256Hasher);
//! trie.put(b"key1", b"value1".to_vec()).unwrap();
//!
//! assert_eq!(trie.get(b"key1").unwrap(), Some(b"value1".to_vec()));
//!
//! let proof = trie.get_proof(b"key1").unwrap();
//! assert!(trie.verify_proof(b"key1", Some(b"value1"), true, &proof));
//! ```

/// Trie node implementations and node type definitions
pub mod node;

/// Merkle proof generation and verification
pub mod proof;

/// Main trie implementation and operations
pub mod trie;

pub use node::{Children, Node, Value};
pub use proof::{Proof, ProofStep, ProofTerminal, ProofType, verify_proof};
pub use trie::MerklePatriciaTrie;
