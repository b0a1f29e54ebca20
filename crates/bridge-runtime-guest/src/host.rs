//! Guest → host calls.
//!
//! [`call_host`] encodes a request, hands it to the host's `call_host`
//! import and takes ownership of the response the host placed in this
//! module's memory: it is read once and freed once. The request buffer stays
//! owned by the guest.

use serde_json::Value;

use bridge_runtime_common::{CallRequest, Channel, Params, RuntimeError, envelope};

#[cfg(target_arch = "wasm32")]
#[link(wasm_import_module = "env")]
unsafe extern "C" {
    #[link_name = "call_host"]
    fn import_call_host(ptr: u32, len: u32) -> u64;

    #[link_name = "log"]
    fn import_log(ptr: u32, len: u32);
}

/// Call a host function by name.
///
/// # Errors
///
/// Returns [`RuntimeError::Protocol`] if the host returned no buffer or an
/// undecodable one, and [`RuntimeError::Application`] if the host function
/// failed.
pub fn call_host(method: &str, params: Option<Params>) -> Result<Value, RuntimeError> {
    let request = envelope::encode_request(&CallRequest::new(method, params))?;

    let channel = Channel::unpack(raw_call_host(&request)?);
    if channel.is_null() {
        return Err(RuntimeError::protocol("Host returned no response buffer"));
    }

    // SAFETY: a non-null channel from the host addresses a buffer it
    // allocated through our `malloc` export and handed over to us.
    let response = unsafe { read_and_release(channel) };

    envelope::decode_response(&response)?.into_result()
}

/// Send a message to the host log.
#[allow(clippy::cast_possible_truncation)]
pub fn log(message: &str) {
    #[cfg(target_arch = "wasm32")]
    {
        // SAFETY: the host only reads `len` bytes at `ptr` during the call.
        unsafe {
            import_log(message.as_ptr() as usize as u32, message.len() as u32);
        }
    }

    #[cfg(not(target_arch = "wasm32"))]
    tracing::info!(guest_log = true, "{}", message);
}

#[cfg(target_arch = "wasm32")]
#[allow(clippy::cast_possible_truncation, clippy::unnecessary_wraps)]
fn raw_call_host(request: &[u8]) -> Result<u64, RuntimeError> {
    // SAFETY: the host only reads the request during the call and never frees it.
    Ok(unsafe { import_call_host(request.as_ptr() as usize as u32, request.len() as u32) })
}

#[cfg(not(target_arch = "wasm32"))]
fn raw_call_host(_request: &[u8]) -> Result<u64, RuntimeError> {
    Err(RuntimeError::protocol(
        "call_host is only available inside a wasm32 guest",
    ))
}

/// Copy the response out and free it.
///
/// # Safety
///
/// `channel` must address a live allocation from this module's heap.
unsafe fn read_and_release(channel: Channel) -> Vec<u8> {
    let ptr = channel.ptr() as usize as *mut u8;

    // SAFETY: upheld by the caller.
    unsafe {
        let bytes = std::slice::from_raw_parts(ptr, channel.len() as usize).to_vec();
        crate::heap::deallocate(ptr);
        bytes
    }
}
