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

//! Staged writes over a base store
//!
//! [`OverlayStore`] buffers every write in a [`WriteBatch`] and serves reads
//! from that batch first, falling back to the base store. Nothing reaches the
//! base until the caller takes the batch out with [`OverlayStore::into_batch`]
//! and writes it, which lets a multi-step mutation land as one atomic batch.

use super::{KeyValue, NodeStore, ReadStore, WriteBatch, merge_scan};
use crate::error::StoreResult;
use parking_lot::RwLock;

/// A read-through, write-back view over `S`
#[derive(Debug)]
pub struct OverlayStore<S> {
    base: S,
    staged: RwLock<WriteBatch>,
}

impl<S> OverlayStore<S> {
    /// Create an overlay with nothing staged
    pub fn new(base: S) -> Self {
        Self::with_batch(base, WriteBatch::new())
    }

    /// Create an overlay on top of an existing batch
    pub fn with_batch(base: S, batch: WriteBatch) -> Self {
        Self {
            base,
            staged: RwLock::new(batch),
        }
    }

    /// Borrow the base store
    pub fn base(&self) -> &S {
        &self.base
    }

    /// Number of staged operations
    pub fn staged_len(&self) -> usize {
        self.staged.read().len()
    }

    /// Apply `f` to the staged batch
    pub fn with_staged<R>(&self, f: impl FnOnce(&mut WriteBatch) -> R) -> R {
        f(&mut self.staged.write())
    }

    /// Consume the overlay, returning the staged batch
    pub fn into_batch(self) -> WriteBatch {
        self.staged.into_inner()
    }
}

impl<S: ReadStore> ReadStore for OverlayStore<S> {
    fn get(&self, key: &[u8]) -> StoreResult<Option<Vec<u8>>> {
        if let Some(staged) = self.staged.read().lookup(key) {
            return Ok(staged.map(<[u8]>::to_vec));
        }
        self.base.get(key)
    }

    fn scan(&self, start: &[u8], end: Option<&[u8]>) -> StoreResult<Vec<KeyValue>> {
        let base = self.base.scan(start, end)?;
        Ok(merge_scan(base, &self.staged.read(), start, end))
    }
}

impl<S: NodeStore> NodeStore for OverlayStore<S> {
    fn write(&self, batch: WriteBatch) -> StoreResult<()> {
        self.staged.write().merge(batch);
        Ok(())
    }

    fn snapshot(&self) -> StoreResult<Box<dyn ReadStore + '_>> {
        let staged = self.staged.read().clone();
        Ok(Box::new(OverlayStore::with_batch(self.base.snapshot()?, staged)))
    }
}
