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

//! DotState Core Library
//!
//! Authenticated, versioned key-value state over a pluggable ordered store.
//! Two commitment structures are provided:
//!
//! - [`mpt`]: a content-addressed Merkle Patricia Trie, composed into
//!   versioned commits by [`database::TrieDatabase`]
//! - [`jmt`]: a Jellyfish-style tree whose nodes are addressed by version
//!
//! Both publish one root per version in the [`roots`] index, produce
//! inclusion and non-inclusion proofs, and reclaim the storage of dropped
//! versions through the collectors in [`gc`].

pub mod config;
pub mod database;
pub mod error;
pub mod gc;
pub mod hashing;
pub mod jmt;
pub mod mpt;
pub mod path;
pub mod roots;
pub mod storage;

// Re-export the types most callers start from
pub use config::TreeConfig;
pub use database::{CommitResult, TrieDatabase};
pub use error::{StoreError, StoreResult, TrieError, TrieResult};
pub use gc::{GarbageCollector, GcOptions, GcReport, GcStrategy, RetentionPolicy};
pub use hashing::{Blake3Hasher, EMPTY_ROOT, Hash, HashAlgorithm, Keccak256Hasher, TreeHasher};
pub use jmt::JellyfishTree;
pub use mpt::{MerklePatriciaTrie, Proof, verify_proof};
pub use path::{NibblePath, Version};
pub use roots::RootsIndex;
pub use storage::{MemoryDatabase, MemoryStore, NamespacedStore, NodeStore, ReadStore, WriteBatch};
