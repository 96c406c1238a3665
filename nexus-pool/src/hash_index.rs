//! Fixed-bucket hash index with dynamic collision chains.
//!
//! Maps a caller-supplied 64-bit hash to small integer ids. Each bucket has
//! one quick slot checked first and an unbounded collision chain behind it.
//! The index stores ids only; the caller resolves collisions by passing a
//! predicate that compares the id's value against the key being looked up.
//!
//! ```text
//! bucket = hash % bucket_count
//!
//! quick:  [ 3 | - | 7 | 1 | - ]
//! chains: [ {9,4} | {} | {} | {12} | {} ]
//! ```
//!
//! Removing a quick-slot occupant promotes one chain entry into the quick
//! slot, so a bucket with a non-empty chain always has its quick slot
//! filled. The bucket count only changes through [`HashIndex::rebuild`].

use core::fmt;

use crate::{Id, PoolError};

/// Chain length above which a bucket counts as overflowing.
///
/// This is a statistic threshold only. Chains grow without bound.
pub const DEFAULT_MAX_COLLISION: usize = 8;

/// Bucket count used by [`HashIndexBuilder`] when nothing is configured.
pub const DEFAULT_BUCKETS: usize = 1024;

const MIN_BUCKETS_FOR_ITEMS: usize = 16;

/// Hash-to-id index with per-bucket quick slots and collision chains.
///
/// # Example
///
/// ```
/// use nexus_pool::HashIndex;
///
/// let names = ["apple", "pear", "plum"];
/// let mut index: HashIndex = HashIndex::new(4);
///
/// // Same hash for two different keys: the predicate tells them apart
/// index.add(10, 0);
/// index.add(10, 2);
///
/// assert_eq!(index.find(10, |id| names[id as usize] == "plum"), Some(2));
/// assert_eq!(index.find(10, |id| names[id as usize] == "pear"), None);
///
/// assert!(index.remove(10, 0));
/// assert_eq!(index.find(10, |_| true), Some(2));
/// ```
#[derive(Clone, Debug)]
pub struct HashIndex<Idx: Id = u32> {
    /// One id per bucket, `Idx::NONE` when empty.
    quick: Box<[Idx]>,
    /// Overflow ids per bucket. Empty chains hold no allocation.
    chains: Box<[Vec<Idx>]>,
    len: usize,
    quick_occupied: usize,
    collision_buckets: usize,
    max_collision: usize,
}

impl<Idx: Id> HashIndex<Idx> {
    /// Creates an index with `bucket_count` buckets.
    ///
    /// # Panics
    ///
    /// Panics if `bucket_count` is 0.
    pub fn new(bucket_count: usize) -> Self {
        assert!(bucket_count > 0, "bucket count must be > 0");
        Self {
            quick: vec![Idx::NONE; bucket_count].into_boxed_slice(),
            chains: empty_chains(bucket_count),
            len: 0,
            quick_occupied: 0,
            collision_buckets: 0,
            max_collision: DEFAULT_MAX_COLLISION,
        }
    }

    /// Creates an index sized for roughly `items` entries.
    ///
    /// The bucket count is `items` rounded up to a power of two, at least 16.
    pub fn for_items(items: usize) -> Self {
        Self::new(buckets_for_items(items))
    }

    /// Number of buckets in the current table generation.
    #[inline]
    pub fn bucket_count(&self) -> usize {
        self.quick.len()
    }

    /// Number of registered `(hash, id)` entries.
    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    /// Returns `true` if nothing is registered.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Chain length above which a bucket is reported as overflowing.
    #[inline]
    pub fn max_collision(&self) -> usize {
        self.max_collision
    }

    /// Bucket selected by `hash`.
    #[inline]
    pub fn bucket_of(&self, hash: u64) -> usize {
        (hash % self.quick.len() as u64) as usize
    }

    /// Registers `id` under `hash`.
    ///
    /// Goes into the bucket's quick slot if it is empty, otherwise onto the
    /// bucket's collision chain. Never rejects: the chain has no upper
    /// bound. Registering the same `(hash, id)` twice creates two entries.
    pub fn add(&mut self, hash: u64, id: Idx) -> bool {
        debug_assert!(id.is_some(), "cannot register the sentinel id");

        let bucket = self.bucket_of(hash);
        let quick = &mut self.quick[bucket];
        if quick.is_none() {
            *quick = id;
            self.quick_occupied += 1;
        } else {
            let chain = &mut self.chains[bucket];
            if chain.is_empty() {
                self.collision_buckets += 1;
            }
            chain.push(id);
        }

        self.len += 1;
        true
    }

    /// Returns the first id under `hash` for which `pred` holds.
    ///
    /// The quick slot is tested first, then the collision chain in order.
    #[inline]
    pub fn find<F>(&self, hash: u64, mut pred: F) -> Option<Idx>
    where
        F: FnMut(Idx) -> bool,
    {
        let bucket = self.bucket_of(hash);
        let quick = self.quick[bucket];
        if quick.is_none() {
            // Chains are never populated behind an empty quick slot
            return None;
        }
        if pred(quick) {
            return Some(quick);
        }
        self.chains[bucket].iter().copied().find(|&id| pred(id))
    }

    /// Returns `true` if `id` is registered under `hash`.
    #[inline]
    pub fn contains(&self, hash: u64, id: Idx) -> bool {
        id.is_some() && self.find(hash, |candidate| candidate == id).is_some()
    }

    /// Iterates every id in `hash`'s bucket: quick slot first, then chain.
    ///
    /// Ids of other hashes that share the bucket are included.
    pub fn ids(&self, hash: u64) -> Ids<'_, Idx> {
        let bucket = self.bucket_of(hash);
        let quick = self.quick[bucket];
        Ids {
            quick: quick.is_some().then_some(quick),
            chain: self.chains[bucket].iter(),
        }
    }

    /// Unregisters `id` from `hash`.
    ///
    /// If `id` occupied the quick slot and the chain is non-empty, one chain
    /// entry is promoted into the quick slot. Order among the remaining chain
    /// entries is not preserved. An emptied chain releases its allocation.
    ///
    /// Returns `false` if `id` is not registered under `hash`.
    pub fn remove(&mut self, hash: u64, id: Idx) -> bool {
        if id.is_none() {
            return false;
        }

        let bucket = self.bucket_of(hash);
        let chain = &mut self.chains[bucket];

        if self.quick[bucket] == id {
            if chain.is_empty() {
                self.quick[bucket] = Idx::NONE;
                self.quick_occupied -= 1;
            } else {
                self.quick[bucket] = chain.swap_remove(0);
                if chain.is_empty() {
                    *chain = Vec::new();
                    self.collision_buckets -= 1;
                }
            }
            self.len -= 1;
            return true;
        }

        match chain.iter().position(|&candidate| candidate == id) {
            Some(pos) => {
                chain.swap_remove(pos);
                if chain.is_empty() {
                    *chain = Vec::new();
                    self.collision_buckets -= 1;
                }
                self.len -= 1;
                true
            }
            None => false,
        }
    }

    /// Replaces `old_id` with `new_id` under `hash`, in place.
    ///
    /// The bucket is not recomputed: `new_id` must belong under the same
    /// hash. Returns `false` if `old_id` is not registered under `hash`, or
    /// if either id is the sentinel.
    pub fn update(&mut self, hash: u64, old_id: Idx, new_id: Idx) -> bool {
        if old_id.is_none() || new_id.is_none() {
            return false;
        }

        let bucket = self.bucket_of(hash);
        if self.quick[bucket] == old_id {
            self.quick[bucket] = new_id;
            return true;
        }

        match self.chains[bucket].iter_mut().find(|slot| **slot == old_id) {
            Some(slot) => {
                *slot = new_id;
                true
            }
            None => false,
        }
    }

    /// Removes every entry and frees every chain.
    pub fn clear(&mut self) {
        self.quick.fill(Idx::NONE);
        for chain in self.chains.iter_mut() {
            *chain = Vec::new();
        }
        self.len = 0;
        self.quick_occupied = 0;
        self.collision_buckets = 0;
    }

    /// Starts a new table generation with `bucket_count` buckets and
    /// registers every `(hash, id)` from `entries`.
    ///
    /// This is the only way the bucket count changes. Composites call it
    /// after churn that changed which ids their keys map to, or when the
    /// load factor has drifted too far.
    ///
    /// # Panics
    ///
    /// Panics if `bucket_count` is 0.
    pub fn rebuild<I>(&mut self, bucket_count: usize, entries: I)
    where
        I: IntoIterator<Item = (u64, Idx)>,
    {
        assert!(bucket_count > 0, "bucket count must be > 0");

        if bucket_count == self.bucket_count() {
            self.clear();
        } else {
            self.quick = vec![Idx::NONE; bucket_count].into_boxed_slice();
            self.chains = empty_chains(bucket_count);
            self.len = 0;
            self.quick_occupied = 0;
            self.collision_buckets = 0;
        }

        for (hash, id) in entries {
            self.add(hash, id);
        }
    }

    /// Releases spare capacity held by collision chains.
    pub fn shrink_to_fit(&mut self) {
        for chain in self.chains.iter_mut() {
            chain.shrink_to_fit();
        }
    }

    // =========================================================================
    // Statistics
    // =========================================================================

    /// Number of buckets whose quick slot is occupied.
    #[inline]
    pub fn quick_occupied(&self) -> usize {
        self.quick_occupied
    }

    /// Number of buckets with a non-empty collision chain.
    #[inline]
    pub fn collision_buckets(&self) -> usize {
        self.collision_buckets
    }

    /// Number of chains longer than [`max_collision`](Self::max_collision).
    pub fn overflow_buckets(&self) -> usize {
        self.chains
            .iter()
            .filter(|chain| chain.len() > self.max_collision)
            .count()
    }

    /// Average chain length over buckets with a non-empty chain.
    ///
    /// Returns 0.0 when there are no collisions.
    #[inline]
    pub fn avg_chain_len(&self) -> f64 {
        if self.collision_buckets == 0 {
            return 0.0;
        }
        (self.len - self.quick_occupied) as f64 / self.collision_buckets as f64
    }

    /// Entries per bucket.
    #[inline]
    pub fn load_factor(&self) -> f64 {
        self.len as f64 / self.bucket_count() as f64
    }

    /// Snapshot of every statistic.
    pub fn stats(&self) -> HashIndexStats {
        HashIndexStats {
            buckets: self.bucket_count(),
            entries: self.len,
            quick_occupied: self.quick_occupied,
            collision_buckets: self.collision_buckets,
            overflow_buckets: self.overflow_buckets(),
            max_chain_len: self.chains.iter().map(Vec::len).max().unwrap_or(0),
            avg_chain_len: self.avg_chain_len(),
            load_factor: self.load_factor(),
        }
    }
}

impl HashIndex {
    /// Returns a builder for configuring the bucket count and the overflow
    /// threshold.
    pub fn builder() -> HashIndexBuilder {
        HashIndexBuilder::default()
    }
}

fn empty_chains<Idx>(bucket_count: usize) -> Box<[Vec<Idx>]> {
    (0..bucket_count).map(|_| Vec::new()).collect()
}

#[inline]
fn buckets_for_items(items: usize) -> usize {
    items.max(MIN_BUCKETS_FOR_ITEMS).next_power_of_two()
}

/// Iterator over the ids in one bucket. See [`HashIndex::ids`].
#[derive(Clone, Debug)]
pub struct Ids<'a, Idx> {
    quick: Option<Idx>,
    chain: core::slice::Iter<'a, Idx>,
}

impl<Idx: Copy> Iterator for Ids<'_, Idx> {
    type Item = Idx;

    #[inline]
    fn next(&mut self) -> Option<Idx> {
        match self.quick.take() {
            Some(id) => Some(id),
            None => self.chain.next().copied(),
        }
    }

    #[inline]
    fn size_hint(&self) -> (usize, Option<usize>) {
        let n = self.quick.is_some() as usize + self.chain.len();
        (n, Some(n))
    }
}

impl<Idx: Copy> ExactSizeIterator for Ids<'_, Idx> {}

/// Point-in-time statistics of a [`HashIndex`].
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct HashIndexStats {
    /// Bucket count.
    pub buckets: usize,
    /// Registered entries.
    pub entries: usize,
    /// Occupied quick slots.
    pub quick_occupied: usize,
    /// Buckets with a non-empty chain.
    pub collision_buckets: usize,
    /// Chains longer than the overflow threshold.
    pub overflow_buckets: usize,
    /// Longest chain.
    pub max_chain_len: usize,
    /// Mean length of non-empty chains.
    pub avg_chain_len: f64,
    /// Entries per bucket.
    pub load_factor: f64,
}

impl fmt::Display for HashIndexStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "buckets={} entries={} quick={} collisions={} overflow={} max_chain={} avg_chain={:.2} load={:.3}",
            self.buckets,
            self.entries,
            self.quick_occupied,
            self.collision_buckets,
            self.overflow_buckets,
            self.max_chain_len,
            self.avg_chain_len,
            self.load_factor,
        )
    }
}

// =============================================================================
// Builder
// =============================================================================

/// Builder for [`HashIndex`].
///
/// ```
/// use nexus_pool::HashIndex;
///
/// let index: HashIndex<u32> = HashIndex::builder()
///     .items(10_000)
///     .max_collision(4)
///     .build()
///     .unwrap();
///
/// assert_eq!(index.bucket_count(), 16_384);
/// assert_eq!(index.max_collision(), 4);
/// ```
#[derive(Clone, Debug)]
pub struct HashIndexBuilder {
    buckets: Option<usize>,
    items: Option<usize>,
    max_collision: usize,
}

impl Default for HashIndexBuilder {
    fn default() -> Self {
        Self {
            buckets: None,
            items: None,
            max_collision: DEFAULT_MAX_COLLISION,
        }
    }
}

impl HashIndexBuilder {
    /// Exact bucket count. Takes precedence over [`items`](Self::items).
    pub fn buckets(mut self, buckets: usize) -> Self {
        self.buckets = Some(buckets);
        self
    }

    /// Expected number of entries. Bucket count becomes the next power of
    /// two, at least 16.
    pub fn items(mut self, items: usize) -> Self {
        self.items = Some(items);
        self
    }

    /// Overflow threshold for statistics. Default: [`DEFAULT_MAX_COLLISION`].
    pub fn max_collision(mut self, n: usize) -> Self {
        self.max_collision = n;
        self
    }

    /// Build the index.
    pub fn build<Idx: Id>(self) -> Result<HashIndex<Idx>, PoolError> {
        let buckets = match (self.buckets, self.items) {
            (Some(0), _) => return Err(PoolError::ZeroBuckets),
            (Some(buckets), _) => buckets,
            (None, Some(items)) => buckets_for_items(items),
            (None, None) => DEFAULT_BUCKETS,
        };

        let mut index = HashIndex::new(buckets);
        index.max_collision = self.max_collision;
        Ok(index)
    }
}
