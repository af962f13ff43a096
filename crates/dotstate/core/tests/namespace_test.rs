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

// Several logical trees sharing one physical store.

use dotstate_core::config::TreeConfig;
use dotstate_core::gc::{GcOptions, GcStrategy, RetentionPolicy};
use dotstate_core::hashing::Keccak256Hasher;
use dotstate_core::jmt::JellyfishTree;
use dotstate_core::storage::{MemoryDatabase, MemoryStore, Namespace, NamespacedStore, NodeStore, ReadStore};
use dotstate_core::{TrieDatabase, TrieError};

fn namespaced(store: &MemoryStore, byte: u8) -> NamespacedStore<MemoryStore> {
    NamespacedStore::new(store.clone(), Namespace::new(byte).unwrap())
}

#[test]
fn test_same_key_in_two_namespaces() {
    let store = MemoryStore::new();
    let left = TrieDatabase::new(namespaced(&store, 1), Keccak256Hasher);
    let right = TrieDatabase::new(namespaced(&store, 2), Keccak256Hasher);

    left.commit(1, vec![(b"key".to_vec(), Some(b"left".to_vec()))]).unwrap();
    right.commit(1, vec![(b"key".to_vec(), Some(b"right".to_vec()))]).unwrap();
    right.commit(2, vec![(b"key".to_vec(), None)]).unwrap();

    assert_eq!(left.get(b"key", 1).unwrap(), Some(b"left".to_vec()));
    assert_eq!(right.get(b"key", 1).unwrap(), Some(b"right".to_vec()));
    assert_eq!(right.get(b"key", 2).unwrap(), None);
    assert!(matches!(left.get(b"key", 2), Err(TrieError::VersionNotFound(2))));
}

#[test]
fn test_identical_trees_do_not_share_storage() {
    let store = MemoryStore::new();
    let left = TrieDatabase::new(namespaced(&store, 1), Keccak256Hasher);
    let right = TrieDatabase::new(namespaced(&store, 2), Keccak256Hasher);
    let updates = vec![(b"a".to_vec(), Some(b"1".to_vec())), (b"b".to_vec(), Some(b"2".to_vec()))];
    left.commit(1, updates.clone()).unwrap();
    right.commit(1, updates).unwrap();
    assert_eq!(left.root_hash(1).unwrap(), right.root_hash(1).unwrap());

    // collecting one namespace leaves the other's nodes and counts alone
    left.commit(2, vec![(b"a".to_vec(), Some(b"3".to_vec()))]).unwrap();
    left.collect_garbage(GcStrategy::RefCount, &RetentionPolicy::keep_latest(1).unwrap(), &GcOptions::default())
        .unwrap();
    assert_eq!(right.get(b"a", 1).unwrap(), Some(b"1".to_vec()));
    assert_eq!(left.get(b"a", 2).unwrap(), Some(b"3".to_vec()));

    let right_keys = store.scan_prefix(&[2]).unwrap();
    assert!(!right_keys.is_empty());
    assert!(store.keys().iter().all(|key| key[0] == 1 || key[0] == 2));
}

#[test]
fn test_delete_does_not_cross_namespaces() {
    let store = MemoryStore::new();
    let left = namespaced(&store, 1);
    let right = namespaced(&store, 2);
    left.put(b"k", b"v1".to_vec()).unwrap();
    right.put(b"k", b"v2".to_vec()).unwrap();
    left.delete(b"k").unwrap();
    assert_eq!(left.get(b"k").unwrap(), None);
    assert_eq!(right.get(b"k").unwrap(), Some(b"v2".to_vec()));
}

#[test]
fn test_mixed_tree_types_share_a_partition() {
    let database = MemoryDatabase::new();
    let accounts = TreeConfig { namespace: 1, ..TreeConfig::default() };
    let storage = TreeConfig { namespace: 2, ..TreeConfig::default() };

    let trie = TrieDatabase::new(accounts.open_memory(&database).unwrap(), accounts.hash_algorithm);
    let tree = JellyfishTree::new(storage.open_memory(&database).unwrap(), storage.hash_algorithm);
    trie.commit(1, vec![(b"x".to_vec(), Some(b"trie".to_vec()))]).unwrap();
    tree.put(1, vec![(b"x".to_vec(), Some(b"tree".to_vec()))]).unwrap();
    tree.put(2, vec![(b"x".to_vec(), Some(b"tree2".to_vec()))]).unwrap();

    assert_eq!(trie.get(b"x", 1).unwrap(), Some(b"trie".to_vec()));
    assert_eq!(tree.get(b"x", 1).unwrap(), Some(b"tree".to_vec()));
    assert_eq!(trie.latest_version().unwrap(), Some(1));
    assert_eq!(tree.latest_version().unwrap(), Some(2));
}

#[test]
fn test_reserved_namespace_is_rejected() {
    assert!(matches!(Namespace::new(0xFF), Err(TrieError::Configuration(_))));
    let config: Result<TreeConfig, _> = serde_json::from_str(r#"{"namespace": 255}"#);
    assert!(config.unwrap().validate().is_err());
}
