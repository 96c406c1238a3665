//! Page-aligned chunk memory (internal).
//!
//! Every storage chunk is one `Pages` region. Regions never move once
//! allocated, which is what lets the slot store hand out stable pointers.

#[cfg(not(unix))]
mod alloc;

#[cfg(unix)]
mod unix;

use std::ptr::NonNull;

use crate::PoolError;

#[cfg(not(unix))]
use self::alloc as imp;

#[cfg(unix)]
use self::unix as imp;

/// How a chunk's pages are obtained from the OS.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub(crate) enum Backing {
    /// Regular pages. Large regions get a transparent huge page hint on linux.
    #[default]
    Standard,
    /// Explicit huge pages from the hugetlbfs reserve (linux only).
    HugeTlb,
}

/// Allocation options applied to every chunk of a store.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub(crate) struct PageOptions {
    pub backing: Backing,
    pub mlock: bool,
    pub populate: bool,
}

/// A zero-filled, page-aligned region owned until drop.
pub(crate) struct Pages {
    ptr: NonNull<u8>,
    size: usize,
}

impl Pages {
    /// Allocates at least `size` bytes, rounded up to the page granularity
    /// of the requested backing.
    pub(crate) fn alloc(size: usize, opts: PageOptions) -> Result<Self, PoolError> {
        assert!(size > 0, "allocation size must be non-zero");

        let pages = match opts.backing {
            Backing::Standard => {
                imp::alloc_pages(size).map_err(|_| PoolError::AllocationFailed)?
            }
            Backing::HugeTlb => {
                imp::alloc_pages_hugetlb(size).map_err(|_| PoolError::HugePagesUnavailable)?
            }
        };

        if opts.populate {
            pages.prefault();
        }
        if opts.mlock {
            imp::mlock(pages.ptr, pages.size).map_err(|_| PoolError::MlockFailed)?;
        }
        Ok(pages)
    }

    /// Start of the region.
    #[inline]
    pub(crate) fn as_ptr(&self) -> *mut u8 {
        self.ptr.as_ptr()
    }

    /// Size of the region in bytes, after rounding.
    #[inline]
    pub(crate) fn len(&self) -> usize {
        self.size
    }

    fn prefault(&self) {
        let step = imp::page_size();
        for offset in (0..self.size).step_by(step) {
            // Safety: offset < size, region is writable
            unsafe { std::ptr::write_volatile(self.ptr.as_ptr().add(offset), 0) };
        }
    }
}

// Safety: Pages is a uniquely owned allocation
unsafe impl Send for Pages {}

impl Drop for Pages {
    fn drop(&mut self) {
        unsafe { imp::drop_pages(self.ptr, self.size) }
    }
}

/// Rounds `size` up to a multiple of `granule` (a power of two).
#[inline]
pub(crate) const fn round_up(size: usize, granule: usize) -> usize {
    (size + granule - 1) & !(granule - 1)
}

/// OS page size.
#[inline]
pub(crate) fn page_size() -> usize {
    imp::page_size()
}

impl Backing {
    /// Size every mapping of this backing is rounded up to. Explicit huge
    /// pages fall back to the OS page size where unsupported.
    #[inline]
    pub(crate) fn granule(self) -> usize {
        match self {
            Backing::Standard => imp::page_size(),
            Backing::HugeTlb => imp::huge_page_size(),
        }
    }
}
