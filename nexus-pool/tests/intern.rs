//! An interned string set assembled from `HashIndex` + `SlotStore`,
//! exercising the full composite protocol: hash, find with an equality
//! predicate, acquire-or-create on miss, remove + release, and rebuild.

use std::collections::HashMap;

use nexus_pool::{HashIndex, SlotStore};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

fn fnv1a(bytes: &[u8]) -> u64 {
    let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
    for &b in bytes {
        hash ^= b as u64;
        hash = hash.wrapping_mul(0x0100_0000_01b3);
    }
    hash
}

#[derive(Default, Clone)]
struct Entry {
    hash: u64,
    text: String,
}

struct InternSet {
    index: HashIndex<u32>,
    store: SlotStore<Entry>,
    hasher: fn(&[u8]) -> u64,
}

impl InternSet {
    fn new(items: usize) -> Self {
        Self::with_hasher(items, fnv1a)
    }

    fn with_hasher(items: usize, hasher: fn(&[u8]) -> u64) -> Self {
        Self {
            index: HashIndex::for_items(items),
            store: SlotStore::with_capacity(items),
            hasher,
        }
    }

    fn find(&self, s: &str) -> Option<u32> {
        let hash = (self.hasher)(s.as_bytes());
        let store = &self.store;
        self.index.find(hash, |id| store[id].text == s)
    }

    fn intern(&mut self, s: &str) -> u32 {
        if let Some(id) = self.find(s) {
            return id;
        }

        let hash = (self.hasher)(s.as_bytes());
        let mut id = [0u32];
        self.store.acquire_or_create(&mut id);

        // Reuse the slot's existing String allocation
        let entry = self.store.get_mut(id[0]);
        entry.hash = hash;
        entry.text.clear();
        entry.text.push_str(s);

        self.index.add(hash, id[0]);
        id[0]
    }

    fn remove(&mut self, s: &str) -> bool {
        let Some(id) = self.find(s) else {
            return false;
        };
        let hash = self.store[id].hash;
        assert!(self.index.remove(hash, id));
        assert!(self.store.release_one(id));
        true
    }

    fn len(&self) -> usize {
        self.store.active_count()
    }

    fn get(&self, id: u32) -> Option<&str> {
        self.store
            .is_active(id)
            .then(|| self.store[id].text.as_str())
    }

    /// Rehash into a table sized for the current population.
    fn rebuild(&mut self) {
        let store = &self.store;
        let buckets = store.active_count().max(16).next_power_of_two();
        let entries = store.iter_active().map(|(id, entry)| (entry.hash, id));
        self.index.rebuild(buckets, entries);
    }
}

#[test]
fn intern_dedups() {
    let mut set = InternSet::new(16);
    let a = set.intern("alpha");
    let b = set.intern("beta");
    let a2 = set.intern("alpha");

    assert_eq!(a, a2);
    assert_ne!(a, b);
    assert_eq!(set.len(), 2);
    assert_eq!(set.get(a), Some("alpha"));
    assert_eq!(set.get(b), Some("beta"));
}

#[test]
fn removed_ids_are_reused() {
    let mut set = InternSet::new(16);
    let a = set.intern("alpha");
    set.intern("beta");

    assert!(set.remove("alpha"));
    assert!(!set.remove("alpha"));
    assert_eq!(set.get(a), None);
    assert_eq!(set.find("alpha"), None);

    let c = set.intern("gamma");
    assert_eq!(c, a);
    assert_eq!(set.get(c), Some("gamma"));
    assert_eq!(set.store.total_count(), 2);
}

#[test]
fn colliding_hashes_are_told_apart() {
    // Every string hashes the same: everything lands in one bucket
    fn constant(_: &[u8]) -> u64 {
        7
    }

    let mut set = InternSet::with_hasher(16, constant);
    let words: Vec<String> = (0..50).map(|i| format!("word-{i}")).collect();
    let ids: Vec<u32> = words.iter().map(|w| set.intern(w)).collect();

    assert_eq!(set.index.collision_buckets(), 1);
    assert_eq!(set.index.avg_chain_len(), 49.0);
    assert!(set.index.overflow_buckets() == 1);

    for (word, &id) in words.iter().zip(&ids) {
        assert_eq!(set.find(word), Some(id));
    }

    // Remove the quick slot occupant, everything else still resolves
    assert!(set.remove(&words[0]));
    for (word, &id) in words.iter().zip(&ids).skip(1) {
        assert_eq!(set.find(word), Some(id));
    }
    assert_eq!(set.index.avg_chain_len(), 48.0);
}

#[test]
fn rebuild_after_growth() {
    let mut set = InternSet::new(0);
    assert_eq!(set.index.bucket_count(), 16);

    let words: Vec<String> = (0..1000).map(|i| format!("k{i}")).collect();
    for w in &words {
        set.intern(w);
    }
    assert!(set.index.load_factor() > 10.0);

    set.rebuild();
    assert_eq!(set.index.bucket_count(), 1024);
    assert!(set.index.load_factor() < 1.0);
    for w in &words {
        let id = set.find(w).unwrap();
        assert_eq!(set.get(id), Some(w.as_str()));
    }
}

#[test]
fn random_churn_matches_hashmap() {
    let mut rng = StdRng::seed_from_u64(0x5eed);
    let mut set = InternSet::new(64);
    let mut model: HashMap<String, u32> = HashMap::new();

    for round in 0..20_000 {
        let key = format!("key-{}", rng.gen_range(0..300));
        if rng.gen_bool(0.6) {
            let id = set.intern(&key);
            let expected = *model.entry(key.clone()).or_insert(id);
            assert_eq!(id, expected, "round {round}: {key}");
        } else {
            assert_eq!(set.remove(&key), model.remove(&key).is_some());
        }

        if round % 2_500 == 0 {
            set.rebuild();
        }
    }

    assert_eq!(set.len(), model.len());
    assert_eq!(set.index.len(), model.len());
    for (key, &id) in &model {
        assert_eq!(set.find(key), Some(id));
        assert_eq!(set.get(id), Some(key.as_str()));
    }
    // Never minted more ids than the keyspace
    assert!(set.store.total_count() <= 300);
}
