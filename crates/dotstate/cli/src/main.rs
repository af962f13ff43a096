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

//! DotState CLI Tool
//!
//! Batch tooling for the state engine: load benchmarks over the Patricia
//! trie or the versioned tree, garbage collection and roots inspection.

use anyhow::{Context, Result, bail};
use clap::{Args, Parser, Subcommand, ValueEnum};
use dotstate_core::config::TreeConfig;
use dotstate_core::gc::{GarbageCollector, GcOptions, GcReport, GcStrategy, RetentionPolicy};
use dotstate_core::hashing::{HashAlgorithm, TreeHasher};
use dotstate_core::jmt::JellyfishTree;
use dotstate_core::mpt::MerklePatriciaTrie;
use dotstate_core::roots::RootsIndex;
use dotstate_core::storage::{MemoryDatabase, NodeStore};
use dotstate_core::{CommitResult, TrieDatabase, Version};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde_json::json;
use std::path::PathBuf;
use std::process;
use std::time::Instant;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "dotstate")]
#[command(about = "DotState - authenticated versioned state CLI")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Load random records in versioned batches and report throughput
    Bench(BenchArgs),
    /// Collect the storage of versions outside a retention policy
    Gc(GcArgs),
    /// List recorded versions and their root hashes
    Roots(StoreArgs),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum Backend {
    Memory,
    Rocksdb,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum TreeKind {
    /// Content-addressed Merkle Patricia Trie with reference counting
    Mpt,
    /// Version-addressed Jellyfish tree with stale-node pruning
    Jmt,
}

#[derive(Args, Clone)]
struct StoreArgs {
    /// JSON tree configuration file
    #[arg(long, short = 'c')]
    config: Option<PathBuf>,

    #[arg(long, value_enum, default_value = "memory")]
    backend: Backend,

    /// Database directory for the rocksdb backend
    #[arg(long, short = 'p')]
    path: Option<PathBuf>,

    /// Namespace byte, overriding the config file
    #[arg(long)]
    namespace: Option<u8>,

    /// Hash algorithm, overriding the config file
    #[arg(long)]
    hash: Option<HashAlgorithm>,

    /// Emit a JSON report instead of text
    #[arg(long)]
    json: bool,
}

#[derive(Args)]
struct BenchArgs {
    #[command(flatten)]
    store: StoreArgs,

    #[arg(long, value_enum, default_value = "mpt")]
    tree: TreeKind,

    /// Total records to insert
    #[arg(long, default_value_t = 10_000)]
    records: usize,

    /// Records committed per version
    #[arg(long, default_value_t = 1_000)]
    batch_size: usize,

    /// Value size in bytes
    #[arg(long, default_value_t = 64)]
    value_size: usize,

    /// Share of each batch spent deleting earlier keys
    #[arg(long, default_value_t = 0.0)]
    delete_ratio: f64,

    /// Only time raw trie inserts; no versions, no GC
    #[arg(long)]
    memory_only: bool,

    /// Run GC after loading, keeping this many latest versions
    #[arg(long)]
    keep_latest: Option<usize>,

    /// Seed for record generation
    #[arg(long, default_value_t = 42)]
    seed: u64,

    /// Proofs sampled and verified against the latest root
    #[arg(long, default_value_t = 100)]
    proof_samples: usize,
}

#[derive(Args)]
struct GcArgs {
    #[command(flatten)]
    store: StoreArgs,

    #[arg(long, value_enum, default_value = "mpt")]
    tree: TreeKind,

    /// Retention policy: latest:N, versions:a,b,c or range:from-to
    #[arg(long)]
    policy: Option<RetentionPolicy>,

    /// refcount, mark-and-sweep or stale-nodes
    #[arg(long)]
    strategy: Option<GcStrategy>,

    /// Dropped versions swept per atomic batch
    #[arg(long)]
    batch_size: Option<usize>,

    /// Count what would be deleted without writing
    #[arg(long)]
    dry_run: bool,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    let result = match cli.command {
        Commands::Bench(args) => handle_bench(&args),
        Commands::Gc(args) => handle_gc(&args),
        Commands::Roots(args) => handle_roots(&args),
    };

    if let Err(e) = result {
        error!("Command failed: {:#}", e);
        process::exit(1);
    }
}

/// Config file merged with command-line overrides, validated before any store is opened
fn load_config(args: &StoreArgs) -> Result<TreeConfig> {
    let mut config = match &args.config {
        Some(path) => {
            let text = std::fs::read_to_string(path).with_context(|| format!("reading config {}", path.display()))?;
            serde_json::from_str(&text).with_context(|| format!("parsing config {}", path.display()))?
        }
        None => TreeConfig::default(),
    };
    if let Some(namespace) = args.namespace {
        config.namespace = namespace;
    }
    if let Some(hash) = args.hash {
        config.hash_algorithm = hash;
    }
    config.validate()?;
    Ok(config)
}

#[cfg(feature = "rocksdb")]
fn open_rocks(config: &TreeConfig, args: &StoreArgs) -> Result<dotstate_core::NamespacedStore<dotstate_core::storage::RocksStore>> {
    let path = args.path.as_ref().context("--path is required for the rocksdb backend")?;
    info!(path = %path.display(), "opening rocksdb backend");
    Ok(config.open_rocks(path)?)
}

fn print_report(args: &StoreArgs, report: serde_json::Value) -> Result<()> {
    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else if let Some(fields) = report.as_object() {
        for (name, value) in fields {
            println!("{name:>22}: {value}");
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// bench
// ---------------------------------------------------------------------------

struct Workload {
    batches: Vec<Vec<(Vec<u8>, Option<Vec<u8>>)>>,
    live: Vec<(Vec<u8>, Vec<u8>)>,
    inserted: usize,
    deleted: usize,
}

fn random_bytes(rng: &mut StdRng, len: usize) -> Vec<u8> {
    let mut bytes = vec![0u8; len];
    rng.fill(&mut bytes[..]);
    bytes
}

/// Versioned batches of upserts, each followed by deletes of earlier keys
fn build_workload(args: &BenchArgs) -> Workload {
    let mut rng = StdRng::seed_from_u64(args.seed);
    let batch_size = args.batch_size.max(1);
    let ratio = args.delete_ratio.clamp(0.0, 1.0);
    let mut workload = Workload {
        batches: Vec::new(),
        live: Vec::new(),
        inserted: 0,
        deleted: 0,
    };

    let mut remaining = args.records;
    while remaining > 0 {
        let count = remaining.min(batch_size);
        remaining -= count;
        let deletes = ((count as f64) * ratio).round() as usize;

        let mut batch = Vec::with_capacity(count + deletes);
        for _ in 0..deletes.min(workload.live.len()) {
            let index = rng.gen_range(0..workload.live.len());
            let (key, _) = workload.live.swap_remove(index);
            batch.push((key, None));
            workload.deleted += 1;
        }
        for _ in 0..count {
            let key = random_bytes(&mut rng, 32);
            let value = random_bytes(&mut rng, args.value_size.max(1));
            workload.live.push((key.clone(), value.clone()));
            batch.push((key, Some(value)));
            workload.inserted += 1;
        }
        workload.batches.push(batch);
    }
    workload
}

fn handle_bench(args: &BenchArgs) -> Result<()> {
    if !(0.0..=1.0).contains(&args.delete_ratio) {
        bail!("--delete-ratio must be between 0 and 1");
    }
    if let Some(0) = args.keep_latest {
        bail!("--keep-latest must be at least 1");
    }
    let config = load_config(&args.store)?;
    let workload = build_workload(args);
    info!(records = workload.inserted, deletes = workload.deleted, batches = workload.batches.len(), tree = ?args.tree, "workload generated");

    if args.memory_only {
        return bench_memory_only(args, &config, &workload);
    }
    match args.store.backend {
        Backend::Memory => run_bench(config.open_memory(&MemoryDatabase::new())?, args, &config, &workload),
        Backend::Rocksdb => bench_rocks(args, &config, &workload),
    }
}

#[cfg(feature = "rocksdb")]
fn bench_rocks(args: &BenchArgs, config: &TreeConfig, workload: &Workload) -> Result<()> {
    run_bench(open_rocks(config, &args.store)?, args, config, workload)
}

#[cfg(not(feature = "rocksdb"))]
fn bench_rocks(_args: &BenchArgs, _config: &TreeConfig, _workload: &Workload) -> Result<()> {
    bail!("this build has no rocksdb backend; rebuild with --features rocksdb")
}

/// Raw trie inserts and deletes without versioning
fn bench_memory_only(args: &BenchArgs, config: &TreeConfig, workload: &Workload) -> Result<()> {
    let store = config.open_memory(&MemoryDatabase::new())?;
    let mut trie = MerklePatriciaTrie::new(store, config.hash_algorithm);
    let started = Instant::now();
    for (key, value) in workload.batches.iter().flatten() {
        match value {
            Some(value) => trie.put(key, value.clone())?,
            None => {
                trie.delete(key)?;
            }
        }
    }
    let elapsed = started.elapsed();
    let operations = workload.inserted + workload.deleted;

    print_report(
        &args.store,
        json!({
            "mode": "memory-only",
            "hash": config.hash_algorithm.name(),
            "operations": operations,
            "elapsed_ms": elapsed.as_millis() as u64,
            "ops_per_sec": operations as f64 / elapsed.as_secs_f64().max(f64::EPSILON),
            "root": trie.root_hash().map(hex_root),
        }),
    )
}

fn hex_root(root: [u8; 32]) -> String {
    hex::encode(root)
}

struct LoadStats {
    versions: usize,
    nodes_written: usize,
    stale_nodes: usize,
    commit_ms: u64,
}

impl LoadStats {
    fn record<N>(&mut self, result: &CommitResult<N>) {
        self.versions += 1;
        self.nodes_written += result.nodes_written;
        self.stale_nodes += result.stale_nodes.len();
    }
}

fn run_bench<S: NodeStore>(store: S, args: &BenchArgs, config: &TreeConfig, workload: &Workload) -> Result<()> {
    let mut stats = LoadStats {
        versions: 0,
        nodes_written: 0,
        stale_nodes: 0,
        commit_ms: 0,
    };
    let mut rng = StdRng::seed_from_u64(args.seed.wrapping_add(1));
    let samples: Vec<&(Vec<u8>, Vec<u8>)> = (0..args.proof_samples.min(workload.live.len()))
        .map(|_| &workload.live[rng.gen_range(0..workload.live.len())])
        .collect();

    let started = Instant::now();
    let (latest, verified, gc) = match args.tree {
        TreeKind::Mpt => {
            let db = TrieDatabase::new(&store, config.hash_algorithm);
            let first = next_version(db.latest_version()?);
            for (offset, batch) in workload.batches.iter().enumerate() {
                let result = db.commit(first + offset as Version, batch.iter().cloned())?;
                stats.record(&result);
            }
            stats.commit_ms = started.elapsed().as_millis() as u64;
            let latest = db.latest_version()?.context("no version was committed")?;

            let mut verified = 0;
            for (key, value) in &samples {
                let proof = db.get_proof(key, latest)?;
                if db.verify_proof(key, Some(value), true, latest, &proof)? {
                    verified += 1;
                }
            }
            let gc = match args.keep_latest {
                Some(count) => Some(db.collect_garbage(mpt_strategy(config)?, &RetentionPolicy::keep_latest(count)?, &config.gc_options())?),
                None => None,
            };
            (latest, verified, gc)
        }
        TreeKind::Jmt => {
            let tree = JellyfishTree::new(&store, config.hash_algorithm);
            let first = next_version(tree.latest_version()?);
            for (offset, batch) in workload.batches.iter().enumerate() {
                let result = tree.put(first + offset as Version, batch.iter().cloned())?;
                stats.record(&result);
            }
            stats.commit_ms = started.elapsed().as_millis() as u64;
            let latest = tree.latest_version()?.context("no version was committed")?;

            let mut verified = 0;
            for (key, value) in &samples {
                if let Some(proof) = tree.get_proof(key, latest)? {
                    if tree.verify_proof(key, Some(value), latest, &proof)? {
                        verified += 1;
                    }
                }
            }
            let gc = match args.keep_latest {
                Some(count) => {
                    let collector = GarbageCollector::new(config.hash_algorithm, GcStrategy::StaleNodes);
                    Some(collector.run(&store, &tree.roots(), &RetentionPolicy::keep_latest(count)?, &config.gc_options())?)
                }
                None => None,
            };
            (latest, verified, gc)
        }
    };
    if verified < samples.len() {
        warn!(verified, sampled = samples.len(), "some sampled proofs failed to verify");
    }

    let operations = workload.inserted + workload.deleted;
    print_report(
        &args.store,
        json!({
            "tree": format!("{:?}", args.tree).to_lowercase(),
            "hash": config.hash_algorithm.name(),
            "operations": operations,
            "versions": stats.versions,
            "latest_version": latest,
            "commit_ms": stats.commit_ms,
            "ops_per_sec": operations as f64 * 1000.0 / (stats.commit_ms.max(1) as f64),
            "nodes_written": stats.nodes_written,
            "stale_nodes": stats.stale_nodes,
            "proofs_verified": format!("{verified}/{}", samples.len()),
            "gc": gc.map(|report| gc_json(&report)),
        }),
    )
}

fn next_version(latest: Option<Version>) -> Version {
    latest.map_or(1, |v| v + 1)
}

fn mpt_strategy(config: &TreeConfig) -> Result<GcStrategy> {
    match config.gc_strategy {
        GcStrategy::StaleNodes => bail!("stale-node pruning applies to the jmt tree only"),
        strategy => Ok(strategy),
    }
}

fn gc_json(report: &GcReport) -> serde_json::Value {
    serde_json::to_value(report).unwrap_or_else(|_| json!(null))
}

// ---------------------------------------------------------------------------
// gc / roots
// ---------------------------------------------------------------------------

fn handle_gc(args: &GcArgs) -> Result<()> {
    let mut config = load_config(&args.store)?;
    if let Some(policy) = &args.policy {
        config.retention = Some(policy.clone());
    }
    if let Some(strategy) = args.strategy {
        config.gc_strategy = strategy;
    }
    if let Some(batch_size) = args.batch_size {
        config.gc_batch_size = batch_size;
    }
    if args.tree == TreeKind::Jmt {
        config.gc_strategy = GcStrategy::StaleNodes;
    }
    config.validate()?;
    let policy = config.retention.clone().context("no retention policy; pass --policy or set one in the config")?;

    match args.store.backend {
        Backend::Memory => {
            warn!("the memory backend starts empty; nothing to collect");
            run_gc(config.open_memory(&MemoryDatabase::new())?, args, &config, &policy)
        }
        Backend::Rocksdb => gc_rocks(args, &config, &policy),
    }
}

#[cfg(feature = "rocksdb")]
fn gc_rocks(args: &GcArgs, config: &TreeConfig, policy: &RetentionPolicy) -> Result<()> {
    run_gc(open_rocks(config, &args.store)?, args, config, policy)
}

#[cfg(not(feature = "rocksdb"))]
fn gc_rocks(_args: &GcArgs, _config: &TreeConfig, _policy: &RetentionPolicy) -> Result<()> {
    bail!("this build has no rocksdb backend; rebuild with --features rocksdb")
}

fn run_gc<S: NodeStore>(store: S, args: &GcArgs, config: &TreeConfig, policy: &RetentionPolicy) -> Result<()> {
    let strategy = match args.tree {
        TreeKind::Mpt => mpt_strategy(config)?,
        TreeKind::Jmt => GcStrategy::StaleNodes,
    };
    let options = GcOptions {
        dry_run: args.dry_run,
        ..config.gc_options()
    };
    let roots = RootsIndex::new(&store);
    let report = GarbageCollector::new(config.hash_algorithm, strategy).run(&store, &roots, policy, &options)?;
    print_report(&args.store, gc_json(&report))
}

fn handle_roots(args: &StoreArgs) -> Result<()> {
    let config = load_config(args)?;
    match args.backend {
        Backend::Memory => list_roots(config.open_memory(&MemoryDatabase::new())?, args),
        Backend::Rocksdb => roots_rocks(args, &config),
    }
}

#[cfg(feature = "rocksdb")]
fn roots_rocks(args: &StoreArgs, config: &TreeConfig) -> Result<()> {
    list_roots(open_rocks(config, args)?, args)
}

#[cfg(not(feature = "rocksdb"))]
fn roots_rocks(_args: &StoreArgs, _config: &TreeConfig) -> Result<()> {
    bail!("this build has no rocksdb backend; rebuild with --features rocksdb")
}

fn list_roots<S: NodeStore>(store: S, args: &StoreArgs) -> Result<()> {
    let roots = RootsIndex::new(store).list_all()?;
    if args.json {
        let entries: Vec<_> = roots.iter().map(|(version, root)| json!({ "version": version, "root": hex_root(*root) })).collect();
        println!("{}", serde_json::to_string_pretty(&entries)?);
    } else if roots.is_empty() {
        println!("No versions recorded");
    } else {
        for (version, root) in &roots {
            println!("{version:>10}  {}", hex_root(*root));
        }
    }
    Ok(())
}
