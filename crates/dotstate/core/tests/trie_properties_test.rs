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

// Property tests: canonical roots, delete round-trips and proof soundness.

use dotstate_core::hashing::Keccak256Hasher;
use dotstate_core::jmt::JellyfishTree;
use dotstate_core::mpt::{MerklePatriciaTrie, ProofStep};
use dotstate_core::storage::MemoryStore;
use proptest::prelude::*;
use std::collections::BTreeMap;

type Entries = Vec<(Vec<u8>, Vec<u8>)>;

fn entry_map(max: usize) -> impl Strategy<Value = BTreeMap<Vec<u8>, Vec<u8>>> {
    prop::collection::btree_map(prop::collection::vec(any::<u8>(), 1..16), prop::collection::vec(any::<u8>(), 1..32), 1..max)
}

fn entries_with_permutation() -> impl Strategy<Value = (Entries, Entries)> {
    entry_map(48).prop_flat_map(|map| {
        let entries: Entries = map.into_iter().collect();
        (Just(entries.clone()), Just(entries).prop_shuffle())
    })
}

fn build_trie(entries: &[(Vec<u8>, Vec<u8>)]) -> MerklePatriciaTrie<MemoryStore, Keccak256Hasher> {
    let mut trie = MerklePatriciaTrie::new(MemoryStore::new(), Keccak256Hasher);
    for (key, value) in entries {
        trie.put(key, value.clone()).unwrap();
    }
    trie
}

proptest! {
    #[test]
    fn trie_root_ignores_insert_order((sorted, shuffled) in entries_with_permutation()) {
        let a = build_trie(&sorted);
        let b = build_trie(&shuffled);
        prop_assert_eq!(a.root_hash(), b.root_hash());
    }

    #[test]
    fn jellyfish_root_ignores_update_order((sorted, shuffled) in entries_with_permutation()) {
        let a = JellyfishTree::new(MemoryStore::new(), Keccak256Hasher);
        let b = JellyfishTree::new(MemoryStore::new(), Keccak256Hasher);
        let one_commit = a.put(1, sorted.iter().map(|(k, v)| (k.clone(), Some(v.clone())))).unwrap();

        // same contents reached through several commits in another order
        let mut version = 0;
        for chunk in shuffled.chunks(7) {
            version += 1;
            b.put(version, chunk.iter().map(|(k, v)| (k.clone(), Some(v.clone())))).unwrap();
        }
        prop_assert_eq!(one_commit.new_root_hash, b.root_hash(version).unwrap());
    }

    #[test]
    fn deleted_keys_leave_no_trace(base in entry_map(24), extra in entry_map(24)) {
        let extra: Entries = extra.into_iter().filter(|(k, _)| !base.contains_key(k)).collect();
        let base: Entries = base.into_iter().collect();

        let expected = build_trie(&base);
        let mut trie = build_trie(&base);
        for (key, value) in &extra {
            trie.put(key, value.clone()).unwrap();
        }
        for (key, _) in &extra {
            prop_assert!(trie.delete(key).unwrap());
            prop_assert_eq!(trie.get(key).unwrap(), None);
        }
        prop_assert_eq!(trie.root_hash(), expected.root_hash());

        for (key, _) in &base {
            prop_assert!(trie.delete(key).unwrap());
        }
        prop_assert!(trie.is_empty());
        prop_assert_eq!(trie.root_hash(), None);
    }

    #[test]
    fn trie_proofs_are_sound(entries in entry_map(32), probe in prop::collection::vec(any::<u8>(), 1..16)) {
        let trie = build_trie(&entries.iter().map(|(k, v)| (k.clone(), v.clone())).collect::<Vec<_>>());

        for (key, value) in &entries {
            let proof = trie.get_proof(key).unwrap();
            prop_assert!(trie.verify_proof(key, Some(value), true, &proof));
            prop_assert!(!trie.verify_proof(key, Some(b"not the value"), true, &proof));
        }

        let proof = trie.get_proof(&probe).unwrap();
        match entries.get(&probe) {
            Some(value) => {
                prop_assert!(trie.verify_proof(&probe, Some(value), true, &proof));
            }
            None => {
                prop_assert!(trie.verify_proof(&probe, None, false, &proof));
                prop_assert!(!trie.verify_proof(&probe, None, true, &proof));
            }
        }

        // flip one byte of the first sibling hash
        let mut forged = proof.clone();
        let flipped = forged.steps.iter_mut().find_map(|step| match step {
            ProofStep::Branch { neighbors, .. } => neighbors.iter_mut().flatten().next().map(|hash| hash[0] ^= 0x01),
            ProofStep::Fork { neighbor, .. } => {
                neighbor[0] ^= 0x01;
                Some(())
            }
        });
        if flipped.is_some() {
            let inclusion = entries.contains_key(&probe);
            prop_assert!(!trie.verify_proof(&probe, entries.get(&probe).map(|v| v.as_slice()), inclusion, &forged));
        }
    }

    #[test]
    fn jellyfish_proofs_are_sound(entries in entry_map(32), probe in prop::collection::vec(any::<u8>(), 1..16)) {
        let tree = JellyfishTree::new(MemoryStore::new(), Keccak256Hasher);
        tree.put(1, entries.iter().map(|(k, v)| (k.clone(), Some(v.clone())))).unwrap();
        let root = tree.root_hash(1).unwrap();

        for (key, value) in &entries {
            let proof = tree.get_proof(key, 1).unwrap().unwrap();
            prop_assert!(proof.verify(&Keccak256Hasher, &root, key, Some(value)));
        }

        let expected = entries.get(&probe).map(|v| v.as_slice());
        let proof = tree.get_proof(&probe, 1).unwrap().unwrap();
        prop_assert!(proof.verify(&Keccak256Hasher, &root, &probe, expected));

        let mut forged = proof.clone();
        let flipped = forged
            .steps
            .iter_mut()
            .find_map(|step| step.siblings.iter_mut().flatten().next().map(|hash| hash[0] ^= 0x01));
        if flipped.is_some() {
            prop_assert!(!forged.verify(&Keccak256Hasher, &root, &probe, expected));
        }
    }
}
