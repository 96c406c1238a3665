//! Portable fallback using the global allocator.

use std::alloc::{Layout, alloc_zeroed, dealloc};
use std::io;
use std::ptr::NonNull;

use super::{Pages, round_up};

const PAGE_SIZE: usize = 4096;

pub(super) fn page_size() -> usize {
    PAGE_SIZE
}

pub(super) fn huge_page_size() -> usize {
    PAGE_SIZE
}

pub(super) fn alloc_pages(size: usize) -> io::Result<Pages> {
    let size = round_up(size, PAGE_SIZE);
    let layout = Layout::from_size_align(size, PAGE_SIZE)
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;

    let ptr = unsafe { alloc_zeroed(layout) };
    let ptr = NonNull::new(ptr)
        .ok_or_else(|| io::Error::new(io::ErrorKind::OutOfMemory, "allocation failed"))?;

    Ok(Pages { ptr, size })
}

pub(super) fn alloc_pages_hugetlb(_size: usize) -> io::Result<Pages> {
    Err(io::Error::new(
        io::ErrorKind::Unsupported,
        "huge pages require linux",
    ))
}

pub(super) fn mlock(_ptr: NonNull<u8>, _size: usize) -> io::Result<()> {
    Err(io::Error::new(
        io::ErrorKind::Unsupported,
        "mlock requires unix",
    ))
}

/// # Safety
/// ptr and size must come from a previous `alloc_pages` call.
pub(super) unsafe fn drop_pages(ptr: NonNull<u8>, size: usize) {
    if let Ok(layout) = Layout::from_size_align(size, PAGE_SIZE) {
        unsafe { dealloc(ptr.as_ptr(), layout) };
    }
}
