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

//! Namespacing and logical key layout
//!
//! A [`Namespace`] is a one-byte prefix prepended to every physical key so
//! several logical trees can share one partition without collisions. The
//! byte [`RESERVED_NAMESPACE`] is withheld from configuration.
//!
//! Inside a namespace, each kind of record lives under its own [`KeySpace`]
//! tag:
//!
//! ```text
//! [namespace][b'n'][hash]                          MPT node
//! [namespace][b'c'][hash]                          refcount (u64 BE)
//! [namespace][b'r'][version BE]                    roots index entry
//! [namespace][b'v'][version BE][u16 len][nibbles]  versioned tree node
//! [namespace][b's'][stale since BE][node key]      stale node marker
//! ```
//!
//! Partitions (column families, tables) are a coarser isolation layer chosen
//! when the backend is opened; namespaces work inside any of them.

use super::{KeyValue, NodeStore, ReadStore, WriteBatch, prefix_successor};
use crate::error::{StoreResult, TrieError, TrieResult};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Namespace byte kept back for internal use
pub const RESERVED_NAMESPACE: u8 = 0xFF;

/// One-byte key prefix isolating a logical tree
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct Namespace(u8);

impl Namespace {
    /// Validate and create a namespace
    ///
    /// # Errors
    ///
    /// [`TrieError::Configuration`] if `byte` is [`RESERVED_NAMESPACE`]
    pub fn new(byte: u8) -> TrieResult<Self> {
        if byte == RESERVED_NAMESPACE {
            return Err(TrieError::Configuration(format!("namespace 0x{byte:02x} is reserved")));
        }
        Ok(Self(byte))
    }

    pub fn byte(self) -> u8 {
        self.0
    }

    /// Physical key for a logical key
    pub fn prefix(self, key: &[u8]) -> Vec<u8> {
        let mut full = Vec::with_capacity(key.len() + 1);
        full.push(self.0);
        full.extend_from_slice(key);
        full
    }

    /// Logical key for a physical key, or `None` if it belongs to another namespace
    pub fn unprefix(self, key: &[u8]) -> Option<&[u8]> {
        match key.split_first() {
            Some((first, rest)) if *first == self.0 => Some(rest),
            _ => None,
        }
    }
}

impl Default for Namespace {
    fn default() -> Self {
        Self(0)
    }
}

impl TryFrom<u8> for Namespace {
    type Error = TrieError;

    fn try_from(byte: u8) -> Result<Self, Self::Error> {
        Namespace::new(byte)
    }
}

impl From<Namespace> for u8 {
    fn from(namespace: Namespace) -> Self {
        namespace.0
    }
}

/// Record kinds sharing a namespace
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum KeySpace {
    /// Content-addressed trie nodes
    Node = b'n',
    /// Reference counts of trie nodes
    RefCount = b'c',
    /// Version to root hash
    Root = b'r',
    /// Versioned tree nodes keyed by (version, path)
    VersionedNode = b'v',
    /// Stale markers of superseded versioned nodes
    Stale = b's',
}

impl KeySpace {
    pub fn tag(self) -> u8 {
        self as u8
    }

    /// Key of `body` within this key space
    pub fn key(self, body: &[u8]) -> Vec<u8> {
        let mut key = Vec::with_capacity(body.len() + 1);
        key.push(self.tag());
        key.extend_from_slice(body);
        key
    }

    /// Body of `key` if it belongs to this key space
    pub fn strip(self, key: &[u8]) -> Option<&[u8]> {
        match key.split_first() {
            Some((tag, body)) if *tag == self.tag() => Some(body),
            _ => None,
        }
    }
}

/// Store adapter confining all keys to one namespace
#[derive(Debug, Clone)]
pub struct NamespacedStore<S> {
    inner: S,
    namespace: Namespace,
}

impl<S> NamespacedStore<S> {
    pub fn new(inner: S, namespace: Namespace) -> Self {
        debug!(namespace = namespace.byte(), "opening namespaced store");
        Self { inner, namespace }
    }

    pub fn namespace(&self) -> Namespace {
        self.namespace
    }

    pub fn inner(&self) -> &S {
        &self.inner
    }

    pub fn into_inner(self) -> S {
        self.inner
    }

    fn strip_all(&self, pairs: Vec<KeyValue>) -> Vec<KeyValue> {
        pairs
            .into_iter()
            .filter_map(|(key, value)| self.namespace.unprefix(&key).map(|logical| (logical.to_vec(), value)))
            .collect()
    }
}

impl<S: ReadStore> ReadStore for NamespacedStore<S> {
    fn get(&self, key: &[u8]) -> StoreResult<Option<Vec<u8>>> {
        self.inner.get(&self.namespace.prefix(key))
    }

    fn scan(&self, start: &[u8], end: Option<&[u8]>) -> StoreResult<Vec<KeyValue>> {
        let start = self.namespace.prefix(start);
        let end = match end {
            Some(end) => Some(self.namespace.prefix(end)),
            None => prefix_successor(&[self.namespace.byte()]),
        };
        let pairs = self.inner.scan(&start, end.as_deref())?;
        Ok(self.strip_all(pairs))
    }
}

impl<S: NodeStore> NodeStore for NamespacedStore<S> {
    fn write(&self, batch: WriteBatch) -> StoreResult<()> {
        self.inner.write(batch.prefixed(&[self.namespace.byte()]))
    }

    fn snapshot(&self) -> StoreResult<Box<dyn ReadStore + '_>> {
        Ok(Box::new(NamespacedStore {
            inner: self.inner.snapshot()?,
            namespace: self.namespace,
        }))
    }
}
