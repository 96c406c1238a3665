//! Active/idle slot store over stable chunked storage.
//!
//! A [`SlotStore`] owns a growable array of `T` addressed by integer ids and
//! classifies every id it has ever minted as either **active** or **idle**:
//!
//! ```text
//!              create_idle                 acquire / acquire_or_create
//! Unallocated ────────────► Idle ◄───────────────────────────────────► Active
//!      │                          release / release_all_active           ▲
//!      └─────────────────────────── create_active ───────────────────────┘
//! ```
//!
//! Ids are minted in increasing order (the next unused storage index) and
//! never return to "unallocated" except through [`SlotStore::clear`]. A
//! slot's value survives active/idle transitions until it is overwritten,
//! so a composite can release an entry and later reuse it in place.
//!
//! # Ordering
//!
//! Release removes an id from the active list with swap-and-pop, which is
//! O(1) but moves the last active id into the released position. The views
//! returned by [`active_ids`](SlotStore::active_ids) and
//! [`idle_ids`](SlotStore::idle_ids) are therefore not stable across
//! releases. Callers that need a stable iteration order should iterate ids
//! directly rather than the views.
//!
//! # Storage
//!
//! Values live in fixed-size, page-aligned chunks. Growth adds chunks and
//! never relocates existing values, so [`slot_ptr`](SlotStore::slot_ptr)
//! pointers remain valid until `clear` or drop.

use core::fmt;
use core::ops::{Index, IndexMut};
use std::alloc::handle_alloc_error;
use std::ptr::NonNull;

use crate::chunk::{Chunks, DEFAULT_CHUNK_BYTES};
use crate::sys::{Backing, PageOptions};
use crate::{Id, PoolError};

/// `active_pos` marker for ids currently idle.
const IDLE: usize = usize::MAX;

/// Value store partitioned into active and idle ids.
///
/// # Example
///
/// ```
/// use nexus_pool::SlotStore;
///
/// let mut store: SlotStore<u64> = SlotStore::new();
///
/// let mut ids = [0u32; 3];
/// store.create_active(&mut ids);
/// assert_eq!(ids, [0, 1, 2]);
///
/// store.write(ids[1], 42);
/// assert_eq!(store.release(&ids[1..2]), 1);
/// assert!(!store.is_active(ids[1]));
///
/// // The released slot comes back with its value intact
/// let (id, value) = store.acquire_idle().unwrap();
/// assert_eq!((id, *value), (1, 42));
/// ```
pub struct SlotStore<T, Idx: Id = u32> {
    values: Chunks<T>,
    /// Position of each minted id in `active`, or `IDLE`.
    active_pos: Vec<usize>,
    active: Vec<Idx>,
    idle: Vec<Idx>,
}

impl<T, Idx: Id> SlotStore<T, Idx> {
    /// Creates an empty store with default-sized chunks.
    ///
    /// No memory is allocated until ids are minted or storage is reserved.
    pub fn new() -> Self {
        Self::from_chunks(Chunks::with_default_chunks())
    }

    /// Creates an empty store with room for `capacity` ids.
    pub fn with_capacity(capacity: usize) -> Self {
        let mut store = Self::new();
        store.reserve(capacity);
        store
    }

    fn from_chunks(values: Chunks<T>) -> Self {
        Self {
            values,
            active_pos: Vec::new(),
            active: Vec::new(),
            idle: Vec::new(),
        }
    }

    // =========================================================================
    // Capacity
    // =========================================================================

    /// Reserves storage for at least `additional` more ids without minting
    /// them.
    ///
    /// # Panics
    ///
    /// Panics if the id type cannot address the requested total.
    ///
    /// # Aborts
    ///
    /// Aborts via [`handle_alloc_error`] if the OS refuses a chunk.
    pub fn reserve(&mut self, additional: usize) {
        match self.try_reserve(additional) {
            Ok(()) => {}
            Err(PoolError::IdSpaceExhausted { .. }) => panic!("id space exhausted"),
            Err(_) => handle_alloc_error(self.values.chunk_layout()),
        }
    }

    /// Fallible version of [`reserve`](Self::reserve).
    ///
    /// Nothing is allocated if the request exceeds the id space.
    pub fn try_reserve(&mut self, additional: usize) -> Result<(), PoolError> {
        let max = Idx::MAX_ID + 1;
        let total = self.total_count().saturating_add(additional);
        if total > max {
            return Err(PoolError::IdSpaceExhausted {
                requested: total,
                max,
            });
        }

        self.active_pos
            .try_reserve(additional)
            .map_err(|_| PoolError::AllocationFailed)?;
        self.values.reserve_total(total)
    }

    /// Ids that can exist without allocating another chunk.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.values.capacity()
    }

    /// Slots per chunk.
    #[inline]
    pub fn chunk_len(&self) -> usize {
        self.values.chunk_len()
    }

    // =========================================================================
    // Minting
    // =========================================================================

    /// Mints `ids.len()` new ids into the idle set.
    ///
    /// The new ids are the next unused storage indices in increasing order.
    /// Their values are initialized with `T::default()`.
    ///
    /// # Panics
    ///
    /// Panics if the id type cannot represent the new ids.
    pub fn create_idle(&mut self, ids: &mut [Idx])
    where
        T: Default,
    {
        self.mint(ids, false);
    }

    /// Mints `ids.len()` new ids directly into the active set.
    ///
    /// The new ids are the next unused storage indices in increasing order.
    /// Their values are initialized with `T::default()`.
    ///
    /// # Panics
    ///
    /// Panics if the id type cannot represent the new ids.
    pub fn create_active(&mut self, ids: &mut [Idx])
    where
        T: Default,
    {
        self.mint(ids, true);
    }

    fn mint(&mut self, ids: &mut [Idx], active: bool)
    where
        T: Default,
    {
        if ids.is_empty() {
            return;
        }

        let start = self.total_count();
        debug_assert_eq!(self.values.len(), start);
        let end = start.saturating_add(ids.len());
        assert!(end - 1 <= Idx::MAX_ID, "id space exhausted");

        self.reserve(ids.len());
        let list = if active {
            &mut self.active
        } else {
            &mut self.idle
        };
        list.reserve(ids.len());

        for (offset, slot) in ids.iter_mut().enumerate() {
            let idx = self.values.push_within_capacity(T::default());
            debug_assert_eq!(idx, start + offset);

            let id = Idx::from_usize(idx);
            self.active_pos.push(if active { list.len() } else { IDLE });
            list.push(id);
            *slot = id;
        }
    }

    // =========================================================================
    // Transitions
    // =========================================================================

    /// Moves `ids.len()` idle ids to the active set, writing them to `ids`.
    ///
    /// Which idle ids are chosen is unspecified. If fewer than `ids.len()`
    /// ids are idle, returns `false` and changes nothing.
    pub fn acquire(&mut self, ids: &mut [Idx]) -> bool {
        if ids.len() > self.idle.len() {
            return false;
        }

        let split = self.idle.len() - ids.len();
        for (slot, id) in ids.iter_mut().zip(self.idle.drain(split..)) {
            self.active_pos[id.as_usize()] = self.active.len();
            self.active.push(id);
            *slot = id;
        }
        true
    }

    /// Fills `ids` with active ids, reusing idle ids first and minting new
    /// ones for the shortfall.
    ///
    /// Reused and newly minted ids appear in unspecified relative order.
    /// Always returns `true`.
    pub fn acquire_or_create(&mut self, ids: &mut [Idx]) -> bool
    where
        T: Default,
    {
        let reuse = ids.len().min(self.idle.len());
        let (reused, fresh) = ids.split_at_mut(reuse);
        self.acquire(reused);
        self.mint(fresh, true);
        true
    }

    /// Moves one idle id to the active set and returns it with its value.
    ///
    /// Returns `None` if no id is idle. Never mints.
    pub fn acquire_idle(&mut self) -> Option<(Idx, &mut T)> {
        let id = self.idle.pop()?;
        self.active_pos[id.as_usize()] = self.active.len();
        self.active.push(id);
        Some((id, self.values.get_mut(id.as_usize())))
    }

    /// Moves every currently active id in `ids` to the idle set.
    ///
    /// Ids that are idle, never minted, or repeated in `ids` are skipped.
    /// Returns how many ids were released.
    pub fn release(&mut self, ids: &[Idx]) -> usize {
        ids.iter().filter(|&&id| self.release_one(id)).count()
    }

    /// Moves `id` to the idle set if it is active.
    ///
    /// The last active id takes over `id`'s position in
    /// [`active_ids`](Self::active_ids).
    pub fn release_one(&mut self, id: Idx) -> bool {
        let idx = id.as_usize();
        let pos = match self.active_pos.get(idx) {
            Some(&pos) if pos != IDLE => pos,
            _ => return false,
        };

        self.active.swap_remove(pos);
        if let Some(&moved) = self.active.get(pos) {
            self.active_pos[moved.as_usize()] = pos;
        }

        self.active_pos[idx] = IDLE;
        self.idle.push(id);
        true
    }

    /// Moves every active id to the idle set. Returns how many moved.
    pub fn release_all_active(&mut self) -> usize {
        let released = self.active.len();
        self.idle.reserve(released);
        for id in self.active.drain(..) {
            self.active_pos[id.as_usize()] = IDLE;
            self.idle.push(id);
        }
        released
    }

    /// Drops every value and forgets every id.
    ///
    /// Allocated chunks are kept, so re-minting up to the previous count
    /// does not allocate. Ids minted afterwards start again at 0.
    pub fn clear(&mut self) {
        self.values.clear();
        self.active_pos.clear();
        self.active.clear();
        self.idle.clear();
    }

    // =========================================================================
    // Data access
    // =========================================================================

    /// Overwrites the value of a minted id, active or idle.
    ///
    /// # Panics
    ///
    /// Panics if `id` was never minted.
    #[inline]
    pub fn write(&mut self, id: Idx, value: T) {
        *self.values.get_mut(id.as_usize()) = value;
    }

    /// Copies out the value of a minted id, active or idle.
    ///
    /// # Panics
    ///
    /// Panics if `id` was never minted.
    #[inline]
    pub fn read(&self, id: Idx) -> T
    where
        T: Clone,
    {
        self.values.get(id.as_usize()).clone()
    }

    /// Returns the value of a minted id, regardless of state.
    ///
    /// # Panics
    ///
    /// Panics if `id` was never minted.
    #[inline]
    pub fn get(&self, id: Idx) -> &T {
        self.values.get(id.as_usize())
    }

    /// Returns the value of a minted id mutably, regardless of state.
    ///
    /// Idle entries can be edited in place before being reacquired.
    ///
    /// # Panics
    ///
    /// Panics if `id` was never minted.
    #[inline]
    pub fn get_mut(&mut self, id: Idx) -> &mut T {
        self.values.get_mut(id.as_usize())
    }

    /// Returns the value of `id` without checking that it was minted.
    ///
    /// # Safety
    ///
    /// `id` must be less than [`total_count`](Self::total_count).
    #[inline]
    pub unsafe fn get_unchecked(&self, id: Idx) -> &T {
        unsafe { self.values.get_unchecked(id.as_usize()) }
    }

    /// Returns the value of `id` mutably without checking that it was minted.
    ///
    /// # Safety
    ///
    /// `id` must be less than [`total_count`](Self::total_count).
    #[inline]
    pub unsafe fn get_unchecked_mut(&mut self, id: Idx) -> &mut T {
        unsafe { self.values.get_unchecked_mut(id.as_usize()) }
    }

    /// Raw pointer to the value of a minted id.
    ///
    /// The pointer stays valid across growth, release and reacquire. It is
    /// invalidated by [`clear`](Self::clear) and by dropping the store.
    /// Reading or writing through it while a reference from this store is
    /// live is undefined behavior.
    ///
    /// # Panics
    ///
    /// Panics if `id` was never minted.
    #[inline]
    pub fn slot_ptr(&self, id: Idx) -> NonNull<T> {
        self.values.ptr(id.as_usize())
    }

    // =========================================================================
    // Queries
    // =========================================================================

    /// Returns `true` if `id` is minted and active.
    #[inline]
    pub fn is_active(&self, id: Idx) -> bool {
        matches!(self.active_pos.get(id.as_usize()), Some(&pos) if pos != IDLE)
    }

    /// Number of active ids.
    #[inline]
    pub fn active_count(&self) -> usize {
        self.active.len()
    }

    /// Number of idle ids.
    #[inline]
    pub fn idle_count(&self) -> usize {
        self.idle.len()
    }

    /// Number of ids ever minted (active + idle).
    #[inline]
    pub fn total_count(&self) -> usize {
        self.active_pos.len()
    }

    /// Active ids. Order changes when ids are released.
    #[inline]
    pub fn active_ids(&self) -> &[Idx] {
        &self.active
    }

    /// Idle ids. Order changes when ids are acquired.
    #[inline]
    pub fn idle_ids(&self) -> &[Idx] {
        &self.idle
    }

    /// Iterates active ids with their values, in `active_ids` order.
    pub fn iter_active(&self) -> impl Iterator<Item = (Idx, &T)> + '_ {
        self.active
            .iter()
            .map(move |&id| (id, self.values.get(id.as_usize())))
    }

    /// Snapshot of counts and storage usage.
    pub fn stats(&self) -> SlotStats {
        SlotStats {
            active: self.active_count(),
            idle: self.idle_count(),
            total: self.total_count(),
            capacity: self.capacity(),
            chunks: self.values.chunk_count(),
            chunk_len: self.chunk_len(),
        }
    }
}

impl<T, Idx: Id> Default for SlotStore<T, Idx> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T, Idx: Id> Index<Idx> for SlotStore<T, Idx> {
    type Output = T;

    #[inline]
    fn index(&self, id: Idx) -> &T {
        self.get(id)
    }
}

impl<T, Idx: Id> IndexMut<Idx> for SlotStore<T, Idx> {
    #[inline]
    fn index_mut(&mut self, id: Idx) -> &mut T {
        self.get_mut(id)
    }
}

impl<T, Idx: Id> fmt::Debug for SlotStore<T, Idx> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SlotStore")
            .field("active", &self.active_count())
            .field("idle", &self.idle_count())
            .field("capacity", &self.capacity())
            .field("chunk_len", &self.chunk_len())
            .finish()
    }
}

/// Point-in-time counts of a [`SlotStore`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SlotStats {
    /// Active ids.
    pub active: usize,
    /// Idle ids.
    pub idle: usize,
    /// Minted ids.
    pub total: usize,
    /// Slots allocated.
    pub capacity: usize,
    /// Chunks allocated.
    pub chunks: usize,
    /// Slots per chunk.
    pub chunk_len: usize,
}

impl fmt::Display for SlotStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "active={} idle={} total={} capacity={} chunks={}x{}",
            self.active, self.idle, self.total, self.capacity, self.chunks, self.chunk_len,
        )
    }
}

// =============================================================================
// Builder
// =============================================================================

/// Builder for [`SlotStore`].
///
/// ```
/// use nexus_pool::{SlotStore, SlotStoreBuilder};
///
/// let store: SlotStore<u64> = SlotStoreBuilder::default()
///     .capacity(10_000)
///     .chunk_kilobytes(16)
///     .build()
///     .unwrap();
///
/// assert!(store.capacity() >= 10_000);
/// assert_eq!(store.chunk_len(), 2048);
/// ```
#[derive(Clone, Debug)]
pub struct SlotStoreBuilder {
    capacity: Option<usize>,
    chunk_kilobytes: usize,
    huge_pages: bool,
    mlock: bool,
    populate: bool,
}

impl Default for SlotStoreBuilder {
    fn default() -> Self {
        Self {
            capacity: None,
            chunk_kilobytes: DEFAULT_CHUNK_BYTES / 1024,
            huge_pages: false,
            mlock: false,
            populate: false,
        }
    }
}

impl SlotStoreBuilder {
    /// Pre-allocate storage for at least this many ids.
    pub fn capacity(mut self, ids: usize) -> Self {
        self.capacity = Some(ids);
        self
    }

    /// Size of each chunk in kilobytes. Default: 64.
    ///
    /// Slots per chunk = chunk bytes / `size_of::<T>()`, rounded down to a
    /// power of two.
    pub fn chunk_kilobytes(mut self, kb: usize) -> Self {
        self.chunk_kilobytes = kb;
        self
    }

    /// Back chunks with explicit huge pages (linux, hugetlbfs configured).
    /// Default: false.
    pub fn huge_pages(mut self, enabled: bool) -> Self {
        self.huge_pages = enabled;
        self
    }

    /// Lock chunks in RAM as they are allocated. Default: false.
    pub fn mlock(mut self, enabled: bool) -> Self {
        self.mlock = enabled;
        self
    }

    /// Touch every page of a chunk when it is allocated. Default: false.
    pub fn populate(mut self, enabled: bool) -> Self {
        self.populate = enabled;
        self
    }

    /// Build the store, allocating the configured capacity up front.
    pub fn build<T, Idx: Id>(self) -> Result<SlotStore<T, Idx>, PoolError> {
        let opts = PageOptions {
            backing: if self.huge_pages {
                Backing::HugeTlb
            } else {
                Backing::Standard
            },
            mlock: self.mlock,
            populate: self.populate,
        };

        let chunk_bytes = self.chunk_kilobytes.saturating_mul(1024);
        let mut store = SlotStore::from_chunks(Chunks::new(chunk_bytes, opts)?);
        if let Some(capacity) = self.capacity {
            store.try_reserve(capacity)?;
        }
        Ok(store)
    }
}
