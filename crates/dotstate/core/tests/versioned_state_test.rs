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

// End-to-end scenarios over the public API: versioned commits, historical
// reads, proofs and garbage collection for both tree types.

use dotstate_core::gc::{GarbageCollector, GcOptions, GcStrategy, RetentionPolicy, reachable};
use dotstate_core::hashing::{Blake3Hasher, EMPTY_ROOT, Keccak256Hasher};
use dotstate_core::jmt::JellyfishTree;
use dotstate_core::mpt::{MerklePatriciaTrie, ProofType};
use dotstate_core::storage::{KeySpace, MemoryStore, ReadStore};
use dotstate_core::{TrieDatabase, TrieError};
use std::collections::HashSet;

fn upsert(key: &str, value: &str) -> (Vec<u8>, Option<Vec<u8>>) {
    (key.as_bytes().to_vec(), Some(value.as_bytes().to_vec()))
}

fn account_updates(version: u64) -> Vec<(Vec<u8>, Option<Vec<u8>>)> {
    (0..16u32)
        .map(|i| (format!("account-{i}").into_bytes(), Some(format!("{}", version * 1000 + i as u64).into_bytes())))
        .collect()
}

fn node_hashes(store: &MemoryStore) -> HashSet<[u8; 32]> {
    store
        .scan_prefix(&[KeySpace::Node.tag()])
        .unwrap()
        .into_iter()
        .filter_map(|(key, _)| KeySpace::Node.strip(&key).and_then(|body| <[u8; 32]>::try_from(body).ok()))
        .collect()
}

#[test]
fn test_historical_read_through_stored_nodes() {
    let store = MemoryStore::new();
    let mut trie = MerklePatriciaTrie::new(store.clone(), Keccak256Hasher);
    trie.put(b"alice", b"100".to_vec()).unwrap();
    trie.put(b"bob", b"200".to_vec()).unwrap();
    trie.put(b"charlie", b"300".to_vec()).unwrap();
    let r1 = trie.root_hash().unwrap();

    trie.put(b"alice", b"150".to_vec()).unwrap();
    let r2 = trie.root_hash().unwrap();
    assert_ne!(r1, r2);
    assert_eq!(trie.get(b"alice").unwrap(), Some(b"150".to_vec()));

    let reopened = MerklePatriciaTrie::at_root(store, Keccak256Hasher, Some(r1));
    assert_eq!(reopened.get(b"alice").unwrap(), Some(b"100".to_vec()));
    assert_eq!(reopened.get(b"charlie").unwrap(), Some(b"300".to_vec()));
}

#[test]
fn test_versioned_commits_and_proofs() {
    let db = TrieDatabase::new(MemoryStore::new(), Keccak256Hasher);
    db.commit(1, vec![upsert("alice", "100"), upsert("bob", "200"), upsert("charlie", "300")]).unwrap();
    db.commit(2, vec![upsert("alice", "150"), (b"bob".to_vec(), None)]).unwrap();

    let bob_then = db.get_proof(b"bob", 1).unwrap();
    assert_eq!(bob_then.proof_type(), ProofType::Inclusion);
    assert!(db.verify_proof(b"bob", Some(b"200"), true, 1, &bob_then).unwrap());

    let bob_now = db.get_proof(b"bob", 2).unwrap();
    assert_ne!(bob_now.proof_type(), ProofType::Inclusion);
    assert!(db.verify_proof(b"bob", None, false, 2, &bob_now).unwrap());
    assert!(!db.verify_proof(b"bob", Some(b"200"), true, 2, &bob_now).unwrap());

    let decoded = dotstate_core::Proof::decode(&bob_then.encode().unwrap()).unwrap();
    assert_eq!(decoded, bob_then);
}

#[test]
fn test_keep_latest_refcount_leaves_only_latest_nodes() {
    let store = MemoryStore::new();
    let db = TrieDatabase::new(store.clone(), Keccak256Hasher);
    for version in 1..=5 {
        db.commit(version, account_updates(version)).unwrap();
    }

    let report = db
        .collect_garbage(GcStrategy::RefCount, &RetentionPolicy::keep_latest(1).unwrap(), &GcOptions::default())
        .unwrap();
    assert_eq!(report.versions_dropped, 4);
    assert_eq!(report.versions_retained, 1);

    for version in 1..=4 {
        assert!(matches!(db.get(b"account-0", version), Err(TrieError::VersionNotFound(v)) if v == version));
    }
    let root = db.root_hash(5).unwrap();
    let live: HashSet<[u8; 32]> = reachable(&store, &Keccak256Hasher, &root).unwrap().into_iter().collect();
    assert_eq!(node_hashes(&store), live);
    for i in 0..16u32 {
        let key = format!("account-{i}");
        assert_eq!(db.get(key.as_bytes(), 5).unwrap(), Some(format!("{}", 5000 + i).into_bytes()));
    }
}

#[test]
fn test_keep_latest_mark_and_sweep_leaves_only_latest_nodes() {
    let store = MemoryStore::new();
    let db = TrieDatabase::new(store.clone(), Blake3Hasher);
    for version in 1..=5 {
        db.commit(version, account_updates(version)).unwrap();
    }

    let collector = GarbageCollector::new(Blake3Hasher, GcStrategy::MarkAndSweep);
    collector
        .run(&store, db.roots(), &RetentionPolicy::keep_latest(1).unwrap(), &GcOptions::default())
        .unwrap();

    assert_eq!(db.roots().versions().unwrap(), vec![5]);
    let root = db.root_hash(5).unwrap();
    let live: HashSet<[u8; 32]> = reachable(&store, &Blake3Hasher, &root).unwrap().into_iter().collect();
    assert_eq!(node_hashes(&store), live);

    // the next commit builds on the surviving root
    db.commit(6, vec![upsert("account-0", "fresh")]).unwrap();
    assert_eq!(db.get(b"account-0", 6).unwrap(), Some(b"fresh".to_vec()));
    assert_eq!(db.get(b"account-1", 6).unwrap(), Some(b"5001".to_vec()));
}

#[test]
fn test_gc_keeps_every_node_of_retained_versions() {
    let store = MemoryStore::new();
    let db = TrieDatabase::new(store.clone(), Keccak256Hasher);
    for version in 1..=6 {
        let mut updates = account_updates(version);
        updates.truncate(version as usize + 2);
        db.commit(version, updates).unwrap();
    }
    let retained = [2u64, 4, 6];
    let before: Vec<HashSet<[u8; 32]>> = retained
        .iter()
        .map(|v| reachable(&store, &Keccak256Hasher, &db.root_hash(*v).unwrap()).unwrap().into_iter().collect())
        .collect();

    db.collect_garbage(GcStrategy::RefCount, &RetentionPolicy::keep_versions(retained).unwrap(), &GcOptions::default())
        .unwrap();

    let remaining = node_hashes(&store);
    let mut expected = HashSet::new();
    for nodes in before {
        assert!(nodes.is_subset(&remaining));
        expected.extend(nodes);
    }
    assert_eq!(remaining, expected);
}

#[test]
fn test_jellyfish_stale_pruning_keeps_latest() {
    let store = MemoryStore::new();
    let tree = JellyfishTree::new(store.clone(), Keccak256Hasher);
    for version in 1..=5 {
        tree.put(version, account_updates(version)).unwrap();
    }
    let nodes_before = store.scan_prefix(&[KeySpace::VersionedNode.tag()]).unwrap().len();

    let collector = GarbageCollector::new(Keccak256Hasher, GcStrategy::StaleNodes);
    let report = collector
        .run(&store, &tree.roots(), &RetentionPolicy::keep_latest(1).unwrap(), &GcOptions::default())
        .unwrap();
    assert!(report.deleted > 0);

    let nodes_after = store.scan_prefix(&[KeySpace::VersionedNode.tag()]).unwrap().len();
    assert_eq!(nodes_before - nodes_after, report.deleted);
    assert!(tree.stale_nodes(None).unwrap().is_empty());
    assert!(matches!(tree.get(b"account-0", 4), Err(TrieError::VersionNotFound(4))));

    for i in 0..16u32 {
        let key = format!("account-{i}");
        let value = format!("{}", 5000 + i).into_bytes();
        assert_eq!(tree.get(key.as_bytes(), 5).unwrap(), Some(value.clone()));
        let proof = tree.get_proof(key.as_bytes(), 5).unwrap().unwrap();
        assert!(tree.verify_proof(key.as_bytes(), Some(&value), 5, &proof).unwrap());
    }
}

#[test]
fn test_jellyfish_and_trie_agree_on_contents() {
    let db = TrieDatabase::new(MemoryStore::new(), Keccak256Hasher);
    let tree = JellyfishTree::new(MemoryStore::new(), Keccak256Hasher);
    let updates = vec![upsert("alice", "100"), upsert("bob", "200"), upsert("charlie", "300")];
    db.commit(1, updates.clone()).unwrap();
    tree.put(1, updates).unwrap();

    for key in ["alice", "bob", "charlie", "dave"] {
        assert_eq!(db.get(key.as_bytes(), 1).unwrap(), tree.get(key.as_bytes(), 1).unwrap());
    }

    db.commit(2, vec![(b"alice".to_vec(), None), (b"bob".to_vec(), None), (b"charlie".to_vec(), None)]).unwrap();
    tree.put(2, vec![(b"alice".to_vec(), None), (b"bob".to_vec(), None), (b"charlie".to_vec(), None)]).unwrap();
    assert_eq!(db.root_hash(2).unwrap(), EMPTY_ROOT);
    assert_eq!(tree.root_hash(2).unwrap(), EMPTY_ROOT);
}
