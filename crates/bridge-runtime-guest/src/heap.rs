//! Size-prefixed allocator backing the `malloc` and `free` exports.
//!
//! The host frees buffers with a pointer only, so every allocation carries
//! its size in a header just before the returned pointer.

use std::alloc::{Layout, alloc, dealloc};
use std::ptr;

const HEADER: usize = 8;
const ALIGN: usize = 8;

/// Allocate `size` bytes. Returns null if the allocation fails.
pub fn allocate(size: usize) -> *mut u8 {
    let Some(total) = size.checked_add(HEADER) else {
        return ptr::null_mut();
    };
    let Ok(layout) = Layout::from_size_align(total, ALIGN) else {
        return ptr::null_mut();
    };

    // SAFETY: `layout` is never zero-sized; the header fits in the first
    // `HEADER` bytes of an `ALIGN`-aligned block.
    unsafe {
        let base = alloc(layout);
        if base.is_null() {
            return base;
        }
        base.cast::<usize>().write(size);
        base.add(HEADER)
    }
}

/// Release a block returned by [`allocate`]. Null is ignored.
///
/// # Safety
///
/// `ptr` must be null or a live pointer returned by [`allocate`].
pub unsafe fn deallocate(ptr: *mut u8) {
    if ptr.is_null() {
        return;
    }

    // SAFETY: upheld by the caller; the header sits `HEADER` bytes before `ptr`.
    unsafe {
        let base = ptr.sub(HEADER);
        let size = base.cast::<usize>().read();
        dealloc(base, Layout::from_size_align_unchecked(size + HEADER, ALIGN));
    }
}

/// Size recorded for a block returned by [`allocate`].
///
/// # Safety
///
/// `ptr` must be a live, non-null pointer returned by [`allocate`].
pub unsafe fn size_of(ptr: *const u8) -> usize {
    // SAFETY: upheld by the caller.
    unsafe { ptr.sub(HEADER).cast::<usize>().read() }
}

/// Copy `bytes` into a fresh allocation. Returns null if the allocation fails.
pub fn place(bytes: &[u8]) -> *mut u8 {
    let out = allocate(bytes.len());
    if !out.is_null() {
        // SAFETY: `out` has room for `bytes.len()` bytes and cannot overlap `bytes`.
        unsafe { ptr::copy_nonoverlapping(bytes.as_ptr(), out, bytes.len()) };
    }
    out
}
