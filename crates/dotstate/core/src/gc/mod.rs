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

//! Garbage collection of unreachable nodes
//!
//! A GC run goes through three phases:
//!
//! 1. **Resolve retained versions** from the roots index through a
//!    [`RetentionPolicy`]
//! 2. **Determine dropped versions**: every recorded version not retained
//! 3. **Reclaim** the nodes only dropped versions could reach, using one of
//!    the strategies below, and remove the dropped roots index entries
//!
//! # Strategies
//!
//! - [`GcStrategy::RefCount`]: decrement-and-sweep over each dropped root.
//!   Each dropped version is swept in the same atomic batch that removes its
//!   roots index entry, so an interrupted run can simply be repeated.
//! - [`GcStrategy::MarkAndSweep`]: mark from every retained root and delete
//!   everything unmarked in one batch. Also reclaims orphaned nodes.
//! - [`GcStrategy::StaleNodes`]: for the versioned tree, delete stale nodes
//!   whose lifetime contains no retained version.
//!
//! GC is a writer: it must not run concurrently with commits to the same
//! store. Readers may keep running; with [`GcOptions::snapshot_read`] tree
//! traversals read from a point-in-time snapshot.
//!
//! # Usage
//!
//! ```rust
//! use dotstate_core::gc::{GarbageCollector, GcOptions, GcStrategy, RetentionPolicy};
//! use dotstate_core::hashing::Keccak256Hasher;
//! use dotstate_core::roots::RootsIndex;
//! use dotstate_core::storage::MemoryStore;
//!
//! let store = MemoryStore::new();
//! let roots = RootsIndex::new(store.clone());
//! let collector = GarbageCollector::new(Keccak256Hasher, GcStrategy::RefCount);
//! let policy = RetentionPolicy::keep_latest(10).unwrap();
//! let report = collector.run(&store, &roots, &policy, &GcOptions::default()).unwrap();
//! assert_eq!(report.deleted, 0);
//! ```

pub mod mark_sweep;
pub mod policy;
pub mod refcount;
pub mod stale;

pub use mark_sweep::MarkAndSweep;
pub use policy::RetentionPolicy;
pub use refcount::{RefCountCollector, read_refcount, reachable, refcount_key};
pub use stale::StaleNodePruner;

use crate::error::TrieResult;
use crate::hashing::{Hash, TreeHasher};
use crate::path::Version;
use crate::roots::RootsIndex;
use crate::storage::{NodeStore, ReadStore, WriteBatch};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Instant;
use tracing::info;

/// How a GC run reclaims nodes
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum GcStrategy {
    #[default]
    RefCount,
    MarkAndSweep,
    StaleNodes,
}

impl GcStrategy {
    pub fn name(self) -> &'static str {
        match self {
            GcStrategy::RefCount => "refcount",
            GcStrategy::MarkAndSweep => "mark-and-sweep",
            GcStrategy::StaleNodes => "stale-nodes",
        }
    }
}

impl fmt::Display for GcStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for GcStrategy {
    type Err = crate::error::TrieError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "refcount" => Ok(GcStrategy::RefCount),
            "mark-and-sweep" => Ok(GcStrategy::MarkAndSweep),
            "stale-nodes" => Ok(GcStrategy::StaleNodes),
            other => Err(crate::error::TrieError::Configuration(format!("unknown GC strategy '{other}'"))),
        }
    }
}

/// Progress reported after each atomic batch
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GcProgress {
    pub versions_processed: usize,
    pub versions_total: usize,
    pub nodes_visited: usize,
    pub nodes_deleted: usize,
}

/// Callback receiving [`GcProgress`] updates
pub type ProgressCallback = Arc<dyn Fn(&GcProgress) + Send + Sync>;

/// Options for a GC run
#[derive(Clone)]
pub struct GcOptions {
    /// Traverse and count without writing anything
    pub dry_run: bool,
    /// Dropped versions swept per atomic batch (reference counting only)
    pub batch_size: usize,
    /// Traverse trees through a point-in-time snapshot
    pub snapshot_read: bool,
    pub progress: Option<ProgressCallback>,
}

impl Default for GcOptions {
    fn default() -> Self {
        Self {
            dry_run: false,
            batch_size: 1,
            snapshot_read: true,
            progress: None,
        }
    }
}

impl fmt::Debug for GcOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GcOptions")
            .field("dry_run", &self.dry_run)
            .field("batch_size", &self.batch_size)
            .field("snapshot_read", &self.snapshot_read)
            .field("progress", &self.progress.is_some())
            .finish()
    }
}

impl GcOptions {
    fn report(&self, progress: &GcProgress) {
        if let Some(callback) = &self.progress {
            callback(progress);
        }
    }
}

/// Outcome of a GC run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GcReport {
    pub strategy: GcStrategy,
    pub dry_run: bool,
    pub versions_retained: usize,
    pub versions_dropped: usize,
    /// Nodes visited (or stale entries examined)
    pub total: usize,
    /// Nodes deleted, or that would be deleted in a dry run
    pub deleted: usize,
    pub duration_ms: u64,
}

/// Entry point for GC runs
#[derive(Debug, Clone)]
pub struct GarbageCollector<H> {
    hasher: H,
    strategy: GcStrategy,
}

impl<H: TreeHasher> GarbageCollector<H> {
    pub fn new(hasher: H, strategy: GcStrategy) -> Self {
        Self { hasher, strategy }
    }

    pub fn strategy(&self) -> GcStrategy {
        self.strategy
    }

    /// Run one collection
    ///
    /// # Arguments
    ///
    /// * `store` - Store holding the nodes; every write goes here
    /// * `roots` - Roots index of the same store
    /// * `policy` - Which versions to keep
    /// * `options` - Dry run, batching, snapshot reads and progress reporting
    ///
    /// # Errors
    ///
    /// Invalid policies are rejected before any I/O. Backend failures
    /// propagate unchanged; batches written before the failure stay applied.
    pub fn run<S, R>(&self, store: &S, roots: &RootsIndex<R>, policy: &RetentionPolicy, options: &GcOptions) -> TrieResult<GcReport>
    where
        S: NodeStore,
        R: NodeStore,
    {
        policy.validate()?;
        let started = Instant::now();

        let recorded = roots.list_all()?;
        let versions: BTreeSet<Version> = recorded.keys().copied().collect();
        let retained = policy.retained(&versions);
        let dropped: Vec<Version> = policy.dropped(&versions).into_iter().collect();
        info!(strategy = %self.strategy, %policy, retained = retained.len(), dropped = dropped.len(), dry_run = options.dry_run, "starting garbage collection");

        let snapshot = if options.snapshot_read { Some(store.snapshot()?) } else { None };
        let source: &dyn ReadStore = match &snapshot {
            Some(snapshot) => snapshot.as_ref(),
            None => store,
        };

        let mut report = GcReport {
            strategy: self.strategy,
            dry_run: options.dry_run,
            versions_retained: retained.len(),
            versions_dropped: dropped.len(),
            ..GcReport::default()
        };

        match self.strategy {
            GcStrategy::RefCount => self.run_refcount(store, snapshot.as_deref(), &recorded, &dropped, options, &mut report)?,
            GcStrategy::MarkAndSweep => {
                let collector = MarkAndSweep::new(self.hasher.clone());
                let marks = collector.mark(source, retained.iter().filter_map(|v| recorded.get(v)))?;
                let mut batch = WriteBatch::new();
                let (total, deleted) = collector.sweep(source, &marks, &mut batch)?;
                self.finish_single_batch(store, batch, &dropped, (total, deleted), options, &mut report)?;
            }
            GcStrategy::StaleNodes => {
                let mut batch = WriteBatch::new();
                let (total, deleted) = StaleNodePruner::new().prune(source, &retained, &mut batch)?;
                self.finish_single_batch(store, batch, &dropped, (total, deleted), options, &mut report)?;
            }
        }

        report.duration_ms = started.elapsed().as_millis() as u64;
        info!(total = report.total, deleted = report.deleted, duration_ms = report.duration_ms, dry_run = options.dry_run, "garbage collection finished");
        Ok(report)
    }

    fn run_refcount<S: NodeStore>(
        &self,
        store: &S,
        snapshot: Option<&dyn ReadStore>,
        recorded: &BTreeMap<Version, Hash>,
        dropped: &[Version],
        options: &GcOptions,
        report: &mut GcReport,
    ) -> TrieResult<()> {
        let collector = RefCountCollector::new(self.hasher.clone());
        let mut progress = GcProgress {
            versions_total: dropped.len(),
            ..GcProgress::default()
        };
        // in a dry run nothing is written, so later batches read earlier decrements from here
        let mut batch = WriteBatch::new();

        for chunk in dropped.chunks(options.batch_size.max(1)) {
            for version in chunk {
                if let Some(root) = recorded.get(version) {
                    let (touched, deleted) = collector.decrement_all(store, snapshot, root, &mut batch)?;
                    report.total += touched;
                    report.deleted += deleted;
                }
                RootsIndex::<S>::stage_remove(&mut batch, *version);
            }
            if !options.dry_run {
                store.write(std::mem::take(&mut batch))?;
            }
            progress.versions_processed += chunk.len();
            progress.nodes_visited = report.total;
            progress.nodes_deleted = report.deleted;
            options.report(&progress);
        }
        Ok(())
    }

    fn finish_single_batch<S: NodeStore>(
        &self,
        store: &S,
        mut batch: WriteBatch,
        dropped: &[Version],
        (total, deleted): (usize, usize),
        options: &GcOptions,
        report: &mut GcReport,
    ) -> TrieResult<()> {
        for version in dropped {
            RootsIndex::<S>::stage_remove(&mut batch, *version);
        }
        if !options.dry_run {
            store.write(batch)?;
        }
        report.total = total;
        report.deleted = deleted;
        options.report(&GcProgress {
            versions_processed: dropped.len(),
            versions_total: dropped.len(),
            nodes_visited: total,
            nodes_deleted: deleted,
        });
        Ok(())
    }
}
