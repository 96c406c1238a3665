//! Unix implementation using anonymous mmap.

use std::io;
use std::ptr::NonNull;
use std::sync::OnceLock;

use super::{Pages, round_up};

pub(super) fn page_size() -> usize {
    #[cfg(miri)]
    {
        4096
    }

    #[cfg(not(miri))]
    {
        static PAGE_SIZE: OnceLock<usize> = OnceLock::new();
        *PAGE_SIZE.get_or_init(|| {
            let size = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };
            if size > 0 { size as usize } else { 4096 }
        })
    }
}

#[cfg(target_os = "linux")]
pub(super) fn huge_page_size() -> usize {
    static HUGE_PAGE_SIZE: OnceLock<usize> = OnceLock::new();
    *HUGE_PAGE_SIZE.get_or_init(|| read_huge_page_size().unwrap_or(2 * 1024 * 1024))
}

#[cfg(not(target_os = "linux"))]
pub(super) fn huge_page_size() -> usize {
    page_size()
}

#[cfg(target_os = "linux")]
fn read_huge_page_size() -> Option<usize> {
    let meminfo = std::fs::read_to_string("/proc/meminfo").ok()?;
    let line = meminfo.lines().find(|l| l.starts_with("Hugepagesize:"))?;
    let kib: usize = line.split_whitespace().nth(1)?.parse().ok()?;
    Some(kib * 1024)
}

pub(super) fn alloc_pages(size: usize) -> io::Result<Pages> {
    map(round_up(size, page_size()), 0)
}

#[cfg(target_os = "linux")]
pub(super) fn alloc_pages_hugetlb(size: usize) -> io::Result<Pages> {
    map(round_up(size, huge_page_size()), libc::MAP_HUGETLB)
}

#[cfg(not(target_os = "linux"))]
pub(super) fn alloc_pages_hugetlb(_size: usize) -> io::Result<Pages> {
    Err(io::Error::new(
        io::ErrorKind::Unsupported,
        "huge pages require linux",
    ))
}

#[cfg(miri)]
fn map(size: usize, _extra_flags: libc::c_int) -> io::Result<Pages> {
    let layout = std::alloc::Layout::from_size_align(size, page_size())
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;
    let ptr = unsafe { std::alloc::alloc_zeroed(layout) };
    let ptr = NonNull::new(ptr)
        .ok_or_else(|| io::Error::new(io::ErrorKind::OutOfMemory, "allocation failed"))?;
    Ok(Pages { ptr, size })
}

#[cfg(not(miri))]
fn map(size: usize, extra_flags: libc::c_int) -> io::Result<Pages> {
    let flags = libc::MAP_PRIVATE | libc::MAP_ANONYMOUS | extra_flags;
    let ptr = unsafe {
        libc::mmap(
            std::ptr::null_mut(),
            size,
            libc::PROT_READ | libc::PROT_WRITE,
            flags,
            -1,
            0,
        )
    };

    if ptr == libc::MAP_FAILED {
        return Err(io::Error::last_os_error());
    }

    let ptr = NonNull::new(ptr as *mut u8)
        .ok_or_else(|| io::Error::new(io::ErrorKind::OutOfMemory, "mmap returned null"))?;

    // THP hint for regular mappings of at least one huge page
    #[cfg(target_os = "linux")]
    if extra_flags == 0 && size >= 2 * 1024 * 1024 {
        unsafe {
            libc::madvise(ptr.as_ptr() as *mut libc::c_void, size, libc::MADV_HUGEPAGE);
        }
    }

    Ok(Pages { ptr, size })
}

pub(super) fn mlock(ptr: NonNull<u8>, size: usize) -> io::Result<()> {
    #[cfg(miri)]
    {
        let _ = (ptr, size);
        Ok(())
    }

    #[cfg(not(miri))]
    {
        let rc = unsafe { libc::mlock(ptr.as_ptr() as *const libc::c_void, size) };
        if rc == 0 {
            Ok(())
        } else {
            Err(io::Error::last_os_error())
        }
    }
}

/// # Safety
/// ptr and size must come from a previous `map` call.
pub(super) unsafe fn drop_pages(ptr: NonNull<u8>, size: usize) {
    #[cfg(miri)]
    {
        if let Ok(layout) = std::alloc::Layout::from_size_align(size, page_size()) {
            unsafe { std::alloc::dealloc(ptr.as_ptr(), layout) };
        }
    }

    #[cfg(not(miri))]
    unsafe {
        libc::munmap(ptr.as_ptr() as *mut libc::c_void, size);
    }
}
