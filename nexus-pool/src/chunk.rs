//! Chunked value storage with stable addresses.
//!
//! Values live in fixed-size, page-aligned chunks. Index `i` maps to chunk
//! `i >> shift`, slot `i & mask`. Growth appends chunks and never moves an
//! existing value, so a pointer into the storage stays valid until `clear`
//! or drop.
//!
//! Only a prefix `0..len` of slots is initialized. Values are appended with
//! `push` and dropped as a whole by `clear`.

use std::alloc::Layout;
use std::marker::PhantomData;
use std::mem;
use std::ptr::{self, NonNull};

use crate::PoolError;
use crate::sys::{Backing, PageOptions, Pages, page_size};

/// Default chunk size in bytes.
pub(crate) const DEFAULT_CHUNK_BYTES: usize = 64 * 1024;

pub(crate) struct Chunks<T> {
    pages: Vec<Pages>,
    /// log2 of slots per chunk.
    shift: u32,
    mask: usize,
    /// Number of initialized slots.
    len: usize,
    opts: PageOptions,
    _marker: PhantomData<T>,
}

impl<T> Chunks<T> {
    /// Creates empty storage whose chunks hold as many `T` as fit in
    /// `chunk_bytes`, rounded down to a power of two.
    ///
    /// With huge page backing, `chunk_bytes` is first rounded up to the huge
    /// page size so each chunk fills its mapping.
    pub(crate) fn new(chunk_bytes: usize, opts: PageOptions) -> Result<Self, PoolError> {
        if chunk_bytes == 0 {
            return Err(PoolError::ZeroCapacity);
        }
        let chunk_bytes = match opts.backing {
            Backing::HugeTlb => chunk_bytes
                .checked_next_multiple_of(opts.backing.granule())
                .ok_or(PoolError::AllocationFailed)?,
            Backing::Standard => chunk_bytes,
        };

        let slot_size = mem::size_of::<T>().max(1);
        if slot_size > chunk_bytes || mem::align_of::<T>() > page_size() {
            return Err(PoolError::SlotTooLarge {
                slot_size,
                chunk_bytes,
            });
        }

        Ok(Self::with_slots(chunk_bytes / slot_size, opts))
    }

    /// Creates empty storage with default-sized chunks, widened to hold at
    /// least one `T`.
    ///
    /// # Panics
    ///
    /// Panics if `T` requires alignment beyond the OS page size.
    pub(crate) fn with_default_chunks() -> Self {
        assert!(
            mem::align_of::<T>() <= page_size(),
            "slot alignment exceeds page size"
        );
        let slot_size = mem::size_of::<T>().max(1);
        Self::with_slots((DEFAULT_CHUNK_BYTES / slot_size).max(1), PageOptions::default())
    }

    fn with_slots(slots: usize, opts: PageOptions) -> Self {
        debug_assert!(slots > 0);
        // Round down to a power of two so indexing is shift + mask
        let shift = usize::BITS - 1 - slots.leading_zeros();
        Self {
            pages: Vec::new(),
            shift,
            mask: (1 << shift) - 1,
            len: 0,
            opts,
            _marker: PhantomData,
        }
    }

    /// Slots per chunk (always a power of two).
    #[inline]
    pub(crate) const fn chunk_len(&self) -> usize {
        1 << self.shift
    }

    /// Number of initialized slots.
    #[inline]
    pub(crate) const fn len(&self) -> usize {
        self.len
    }

    /// Slots available without allocating.
    #[inline]
    pub(crate) fn capacity(&self) -> usize {
        self.pages.len() << self.shift
    }

    /// Number of chunks allocated.
    #[inline]
    pub(crate) fn chunk_count(&self) -> usize {
        self.pages.len()
    }

    /// Layout of one chunk, used to report allocation failure.
    pub(crate) fn chunk_layout(&self) -> Layout {
        Layout::from_size_align(self.chunk_bytes(), page_size())
            .unwrap_or_else(|_| Layout::new::<T>())
    }

    #[inline]
    fn chunk_bytes(&self) -> usize {
        (self.chunk_len() * mem::size_of::<T>()).max(1)
    }

    /// Allocates chunks until at least `total` slots exist.
    pub(crate) fn reserve_total(&mut self, total: usize) -> Result<(), PoolError> {
        while self.capacity() < total {
            let pages = Pages::alloc(self.chunk_bytes(), self.opts)?;
            debug_assert!(pages.len() >= self.chunk_bytes());
            self.pages.push(pages);
        }
        Ok(())
    }

    /// Appends a value into the next slot, which must already be allocated.
    #[inline]
    pub(crate) fn push_within_capacity(&mut self, value: T) -> usize {
        let idx = self.len;
        assert!(idx < self.capacity(), "push beyond reserved capacity");
        // Safety: idx is inside an allocated chunk and uninitialized
        unsafe { ptr::write(self.slot_ptr(idx), value) };
        self.len += 1;
        idx
    }

    /// Returns a reference to an initialized slot.
    ///
    /// # Panics
    ///
    /// Panics if `idx >= len`.
    #[inline]
    pub(crate) fn get(&self, idx: usize) -> &T {
        assert!(idx < self.len, "slot {idx} out of range (len {})", self.len);
        unsafe { self.get_unchecked(idx) }
    }

    /// Returns a mutable reference to an initialized slot.
    ///
    /// # Panics
    ///
    /// Panics if `idx >= len`.
    #[inline]
    pub(crate) fn get_mut(&mut self, idx: usize) -> &mut T {
        assert!(idx < self.len, "slot {idx} out of range (len {})", self.len);
        unsafe { self.get_unchecked_mut(idx) }
    }

    /// # Safety
    ///
    /// `idx` must be less than `len`.
    #[inline]
    pub(crate) unsafe fn get_unchecked(&self, idx: usize) -> &T {
        unsafe { &*self.slot_ptr(idx) }
    }

    /// # Safety
    ///
    /// `idx` must be less than `len`.
    #[inline]
    pub(crate) unsafe fn get_unchecked_mut(&mut self, idx: usize) -> &mut T {
        unsafe { &mut *self.slot_ptr(idx) }
    }

    /// Stable pointer to an initialized slot.
    ///
    /// # Panics
    ///
    /// Panics if `idx >= len`.
    #[inline]
    pub(crate) fn ptr(&self, idx: usize) -> NonNull<T> {
        assert!(idx < self.len, "slot {idx} out of range (len {})", self.len);
        // Safety: slot pointers into a live chunk are never null
        unsafe { NonNull::new_unchecked(self.slot_ptr(idx)) }
    }

    /// Drops every initialized value. Chunks are kept for reuse.
    pub(crate) fn clear(&mut self) {
        let len = self.len;
        // Forget values first so a panicking Drop can't cause a double drop
        self.len = 0;
        if mem::needs_drop::<T>() {
            for idx in 0..len {
                unsafe { ptr::drop_in_place(self.slot_ptr(idx)) };
            }
        }
    }

    #[inline]
    fn slot_ptr(&self, idx: usize) -> *mut T {
        debug_assert!(idx < self.capacity());
        unsafe {
            let base = self.pages.get_unchecked(idx >> self.shift).as_ptr() as *mut T;
            base.add(idx & self.mask)
        }
    }
}

impl<T> Drop for Chunks<T> {
    fn drop(&mut self) {
        self.clear();
        // Pages unmap themselves
    }
}

// Safety: Chunks owns its values, same rules as Vec<T>
unsafe impl<T: Send> Send for Chunks<T> {}
unsafe impl<T: Sync> Sync for Chunks<T> {}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn chunks<T>(bytes: usize) -> Chunks<T> {
        Chunks::new(bytes, PageOptions::default()).unwrap()
    }

    #[test]
    fn chunk_len_is_power_of_two() {
        let c: Chunks<u64> = chunks(4096);
        assert_eq!(c.chunk_len(), 512);

        let c: Chunks<[u8; 24]> = chunks(4096);
        // 170 slots fit, rounded down
        assert_eq!(c.chunk_len(), 128);
    }

    #[test]
    fn default_chunks_fit_large_slots() {
        let c: Chunks<u64> = Chunks::with_default_chunks();
        assert_eq!(c.chunk_len(), DEFAULT_CHUNK_BYTES / 8);

        let c: Chunks<[u8; 100_000]> = Chunks::with_default_chunks();
        assert_eq!(c.chunk_len(), 1);
    }

    #[test]
    fn huge_page_chunks_fill_the_mapping() {
        let opts = PageOptions {
            backing: Backing::HugeTlb,
            ..PageOptions::default()
        };
        let huge = Backing::HugeTlb.granule();

        // Sizing only, nothing is mapped
        let c: Chunks<u64> = Chunks::new(64 * 1024, opts).unwrap();
        assert_eq!(c.chunk_len(), huge / 8);
        assert_eq!(c.chunk_bytes(), huge);

        let c: Chunks<u64> = Chunks::new(huge + 1, opts).unwrap();
        assert_eq!(c.chunk_len(), 2 * huge / 8);
    }

    #[test]
    fn zero_chunk_rejected() {
        let r: Result<Chunks<u64>, _> = Chunks::new(0, PageOptions::default());
        assert!(matches!(r, Err(PoolError::ZeroCapacity)));
    }

    #[test]
    fn slot_too_large_rejected() {
        let r: Result<Chunks<[u8; 8192]>, _> = Chunks::new(4096, PageOptions::default());
        assert!(matches!(
            r,
            Err(PoolError::SlotTooLarge {
                slot_size: 8192,
                chunk_bytes: 4096
            })
        ));
    }

    #[test]
    fn push_across_chunks() {
        let mut c: Chunks<u64> = chunks(64);
        assert_eq!(c.chunk_len(), 8);

        c.reserve_total(20).unwrap();
        assert_eq!(c.chunk_count(), 3);
        assert_eq!(c.capacity(), 24);

        for i in 0..20 {
            assert_eq!(c.push_within_capacity(i as u64 * 10), i);
        }
        for i in 0..20 {
            assert_eq!(*c.get(i), i as u64 * 10);
        }
        *c.get_mut(9) = 7;
        assert_eq!(*c.get(9), 7);
    }

    #[test]
    fn pointers_survive_growth() {
        let mut c: Chunks<u64> = chunks(64);
        c.reserve_total(1).unwrap();
        c.push_within_capacity(42);
        let p = c.ptr(0);

        c.reserve_total(1000).unwrap();
        for i in 1..1000 {
            c.push_within_capacity(i);
        }

        assert_eq!(c.ptr(0), p);
        assert_eq!(unsafe { *p.as_ptr() }, 42);
    }

    #[test]
    #[should_panic(expected = "out of range")]
    fn get_past_len_panics() {
        let mut c: Chunks<u64> = chunks(64);
        c.reserve_total(8).unwrap();
        c.push_within_capacity(1);
        let _ = c.get(1);
    }

    #[test]
    fn zero_sized_values() {
        let mut c: Chunks<()> = chunks(64);
        c.reserve_total(100).unwrap();
        for _ in 0..100 {
            c.push_within_capacity(());
        }
        assert_eq!(c.len(), 100);
        assert_eq!(*c.get(99), ());
    }

    #[test]
    fn clear_and_drop_release_values() {
        static DROPS: AtomicUsize = AtomicUsize::new(0);

        struct Counted;
        impl Drop for Counted {
            fn drop(&mut self) {
                DROPS.fetch_add(1, Ordering::SeqCst);
            }
        }

        DROPS.store(0, Ordering::SeqCst);
        let mut c: Chunks<Counted> = chunks(64);
        c.reserve_total(10).unwrap();
        for _ in 0..10 {
            c.push_within_capacity(Counted);
        }

        c.clear();
        assert_eq!(DROPS.load(Ordering::SeqCst), 10);
        assert_eq!(c.len(), 0);
        assert!(c.capacity() >= 10);

        for _ in 0..4 {
            c.push_within_capacity(Counted);
        }
        drop(c);
        assert_eq!(DROPS.load(Ordering::SeqCst), 14);
    }
}
