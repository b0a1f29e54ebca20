//! Raw entry points behind the `malloc`, `free` and `do` exports.
//!
//! The functions taking `u32` exist on wasm32 only, where a pointer is a
//! 32-bit offset into linear memory. [`dispatch_raw`] is target independent.

use crate::Dispatcher;
use crate::heap;

/// Handle one request placed by the host and return the response buffer.
///
/// Takes ownership of the request buffer and frees it. The response is a
/// fresh allocation owned by the host from here on; the returned pointer is
/// null if it could not be allocated.
///
/// # Safety
///
/// `ptr` must be a live pointer returned by [`heap::allocate`] with at least
/// `len` initialized bytes, or null.
pub unsafe fn dispatch_raw(dispatcher: &Dispatcher, ptr: *mut u8, len: usize) -> (*mut u8, usize) {
    let response = if ptr.is_null() {
        dispatcher.handle(&[])
    } else {
        // SAFETY: upheld by the caller.
        let request = unsafe { std::slice::from_raw_parts(ptr, len) };
        dispatcher.handle(request)
    };

    // SAFETY: the request is no longer borrowed.
    unsafe { heap::deallocate(ptr) };

    (heap::place(&response), response.len())
}

/// Body of the `malloc` export.
#[cfg(target_arch = "wasm32")]
#[allow(clippy::cast_possible_truncation)]
pub fn malloc(size: u32) -> u32 {
    heap::allocate(size as usize) as usize as u32
}

/// Body of the `free` export.
///
/// # Safety
///
/// `ptr` must be zero or a live pointer returned by [`malloc`].
#[cfg(target_arch = "wasm32")]
pub unsafe fn free(ptr: u32) {
    // SAFETY: upheld by the caller.
    unsafe { heap::deallocate(ptr as usize as *mut u8) };
}

/// Body of the `do` export.
///
/// # Safety
///
/// `ptr` must be zero or a live pointer returned by [`malloc`] with at least
/// `len` initialized bytes.
#[cfg(target_arch = "wasm32")]
#[allow(clippy::cast_possible_truncation)]
pub unsafe fn dispatch(dispatcher: &Dispatcher, ptr: u32, len: u32) -> u64 {
    // SAFETY: upheld by the caller.
    let (out, out_len) = unsafe { dispatch_raw(dispatcher, ptr as usize as *mut u8, len as usize) };
    bridge_runtime_common::Channel::new(out as usize as u32, out_len as u32).pack()
}
