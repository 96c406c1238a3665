//! Hash index and active/idle slot store for flat associative containers.
//!
//! This crate provides the two primitives that hash maps, hash sets and
//! interned string sets are assembled from. Neither owns the other; the
//! composite container owns one of each and keeps them in step.
//!
//! ```text
//! HashIndex          - hash -> id, quick slot + collision chain per bucket
//! SlotStore<T>       - id -> T, every id either Active or Idle
//! ```
//!
//! Benefits:
//! - **Stable ids**: an id stays valid until released, and is reused after
//! - **No per-element allocation**: values live in page-aligned chunks
//! - **Stable addresses**: growth adds chunks, it never moves values
//! - **O(1) average**: lookup, insert, remove and release
//!
//! # Composing a set
//!
//! The caller hashes the key, asks the index for a matching id using a
//! predicate that reads the store, and registers a fresh id on a miss.
//!
//! ```
//! use nexus_pool::{HashIndex, SlotStore};
//!
//! fn fnv1a(bytes: &[u8]) -> u64 {
//!     bytes.iter().fold(0xcbf2_9ce4_8422_2325, |h, &b| {
//!         (h ^ b as u64).wrapping_mul(0x0100_0000_01b3)
//!     })
//! }
//!
//! let mut index: HashIndex = HashIndex::for_items(64);
//! let mut store: SlotStore<String> = SlotStore::new();
//!
//! let mut intern = |s: &str| -> u32 {
//!     let hash = fnv1a(s.as_bytes());
//!     if let Some(id) = index.find(hash, |id| store[id] == s) {
//!         return id;
//!     }
//!     let mut id = [0u32];
//!     store.acquire_or_create(&mut id);
//!     store.write(id[0], s.to_owned());
//!     index.add(hash, id[0]);
//!     id[0]
//! };
//!
//! let a = intern("alpha");
//! let b = intern("beta");
//! assert_eq!(intern("alpha"), a);
//! assert_ne!(a, b);
//! ```
//!
//! # Removal
//!
//! Removing an element means unregistering it from the index and releasing
//! its id. The value stays in its slot until it is overwritten, so a
//! released entry can be edited in place and reacquired.
//!
//! ```
//! use nexus_pool::{HashIndex, SlotStore};
//!
//! let mut index: HashIndex = HashIndex::new(16);
//! let mut store: SlotStore<u64> = SlotStore::new();
//!
//! let mut ids = [0u32; 1];
//! store.create_active(&mut ids);
//! store.write(ids[0], 99);
//! index.add(99, ids[0]);
//!
//! assert!(index.remove(99, ids[0]));
//! assert_eq!(store.release(&ids), 1);
//! assert_eq!(store.idle_count(), 1);
//! assert_eq!(store.read(ids[0]), 99);
//! ```
//!
//! # Rehashing
//!
//! The bucket count never changes on its own. When the load factor grows
//! too large, the composite rebuilds the index from its active entries with
//! [`HashIndex::rebuild`].
//!
//! # Threading
//!
//! Both types are single-threaded. Every mutation takes `&mut self`; share
//! them across threads behind the caller's own lock.
//!
//! # Platform
//!
//! On unix, chunks are mapped with `mmap` and may optionally be locked in
//! RAM or backed by explicit huge pages (see [`SlotStoreBuilder`]). Other
//! platforms fall back to the global allocator.

#![warn(missing_docs)]

mod chunk;
mod sys;

pub mod error;
pub mod hash_index;
pub mod id;
pub mod slot_store;

pub use error::PoolError;
pub use hash_index::{
    DEFAULT_BUCKETS, DEFAULT_MAX_COLLISION, HashIndex, HashIndexBuilder, HashIndexStats, Ids,
};
pub use id::Id;
pub use slot_store::{SlotStats, SlotStore, SlotStoreBuilder};
