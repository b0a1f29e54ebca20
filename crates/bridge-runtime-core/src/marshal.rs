//! Memory marshaling protocol.
//!
//! One cross-boundary call moves bytes through the callee's linear memory:
//!
//! 1. the caller serializes its payload;
//! 2. asks the callee's allocator for `len` bytes;
//! 3. writes the payload at the returned pointer;
//! 4. calls the callee's dispatch entry point with `(ptr, len)` and gets a
//!    packed [`Channel`] back;
//! 5. reads the response bytes at that channel;
//! 6. frees the response pointer, exactly once, unless it is null.
//!
//! The input buffer belongs to the callee from step 4 on; only the response
//! buffer is freed by the caller. The two ownership modes are separate types,
//! [`OutboundBuffer`] and [`InboundBuffer`], each consumed exactly once, so the
//! caller has no way to free the input.
//!
//! The protocol is symmetric: [`CallTarget`] is implemented for a guest driven
//! from the host, and [`LinearMemory`] alone is enough for the guest → host
//! direction, where the host only places a response in the calling guest.

use std::ops::Range;

use async_trait::async_trait;
use tracing::{error, trace, warn};

use bridge_runtime_common::{Channel, RuntimeError};

/// Linear memory of a call target, plus its exported allocator.
#[async_trait]
pub trait LinearMemory: Send {
    /// Allocate `len` bytes with the target's allocator.
    async fn allocate(&mut self, len: u32) -> Result<u32, RuntimeError>;

    /// Release a pointer previously returned by the target's allocator.
    async fn deallocate(&mut self, ptr: u32) -> Result<(), RuntimeError>;

    /// Current memory size in bytes.
    fn size(&self) -> usize;

    /// Copy `len` bytes out of memory starting at `ptr`.
    fn read(&self, ptr: u32, len: u32) -> Result<Vec<u8>, RuntimeError>;

    /// Copy `bytes` into memory starting at `ptr`.
    fn write(&mut self, ptr: u32, bytes: &[u8]) -> Result<(), RuntimeError>;
}

/// A target that can be invoked through its dispatch entry point.
#[async_trait]
pub trait CallTarget: LinearMemory {
    /// Invoke the dispatch entry point with the request buffer and return
    /// the packed response channel.
    async fn dispatch(&mut self, ptr: u32, len: u32) -> Result<u64, RuntimeError>;
}

/// A request buffer placed in the callee's memory.
///
/// Once handed off, the callee owns it; the caller never frees it.
#[derive(Debug)]
#[must_use = "a placed buffer must be handed off to the callee"]
pub struct OutboundBuffer {
    channel: Channel,
}

impl OutboundBuffer {
    /// Give up ownership of the buffer and return its location.
    pub fn hand_off(self) -> Channel {
        self.channel
    }
}

/// A response buffer returned by the callee.
///
/// The caller owns it and must release it after reading.
#[derive(Debug)]
#[must_use = "a response buffer must be read and released"]
pub struct InboundBuffer {
    channel: Channel,
}

impl InboundBuffer {
    /// Wrap the packed channel returned by a dispatch entry point.
    pub fn from_raw(raw: u64) -> Self {
        Self {
            channel: Channel::unpack(raw),
        }
    }

    /// Location of the response.
    pub fn channel(&self) -> Channel {
        self.channel
    }

    /// Read the response and free it.
    ///
    /// The free happens whether or not the read succeeds. A null channel is
    /// never read nor freed.
    ///
    /// # Errors
    ///
    /// Returns [`RuntimeError::Protocol`] for a null channel and
    /// [`RuntimeError::MemoryOutOfRange`] if the response lies outside memory.
    pub async fn read_and_release<M>(self, target: &mut M) -> Result<Vec<u8>, RuntimeError>
    where
        M: LinearMemory + ?Sized,
    {
        let channel = self.channel;
        if channel.is_null() {
            return Err(RuntimeError::protocol("Callee returned no response buffer"));
        }

        let bytes = target.read(channel.ptr(), channel.len());

        if let Err(e) = target.deallocate(channel.ptr()).await {
            error!(ptr = channel.ptr(), error = %e, "Failed to free response buffer");
        }

        bytes
    }
}

/// Allocate space in the target and copy `payload` into it.
///
/// # Errors
///
/// Returns [`RuntimeError::Allocation`] if the allocator fails or returns a
/// null pointer, and [`RuntimeError::MemoryOutOfRange`] if the returned
/// region does not fit in memory.
pub async fn place<M>(target: &mut M, payload: &[u8]) -> Result<OutboundBuffer, RuntimeError>
where
    M: LinearMemory + ?Sized,
{
    let len = u32::try_from(payload.len()).map_err(|_| {
        RuntimeError::allocation(format!(
            "Payload of {} bytes does not fit a 32-bit length",
            payload.len()
        ))
    })?;

    let ptr = target.allocate(len).await?;
    if ptr == 0 && len > 0 {
        return Err(RuntimeError::allocation("Allocator returned a null pointer"));
    }

    if let Err(e) = target.write(ptr, payload) {
        // Not handed off yet, so still ours to release
        if let Err(free_err) = target.deallocate(ptr).await {
            warn!(ptr, error = %free_err, "Failed to free unwritten buffer");
        }
        return Err(e);
    }

    trace!(ptr, len, "Payload placed");
    Ok(OutboundBuffer {
        channel: Channel::new(ptr, len),
    })
}

/// Run one full call against `target` and return the raw response bytes.
///
/// # Errors
///
/// Propagates allocation, memory and engine errors from every step. The
/// response buffer, if any, is freed on all paths after dispatch returns.
pub async fn invoke<T>(target: &mut T, payload: &[u8]) -> Result<Vec<u8>, RuntimeError>
where
    T: CallTarget + ?Sized,
{
    let request = place(target, payload).await?.hand_off();

    let raw = target.dispatch(request.ptr(), request.len()).await?;
    let response = InboundBuffer::from_raw(raw);
    trace!(request = %request, response = %response.channel(), "Dispatch returned");

    response.read_and_release(target).await
}

/// Validate that `[ptr, ptr + len)` lies inside a memory of `memory_size` bytes.
///
/// # Errors
///
/// Returns [`RuntimeError::MemoryOutOfRange`] otherwise.
pub fn check_bounds(ptr: u32, len: u32, memory_size: usize) -> Result<Range<usize>, RuntimeError> {
    let start = ptr as usize;
    match start.checked_add(len as usize) {
        Some(end) if end <= memory_size => Ok(start..end),
        _ => Err(RuntimeError::MemoryOutOfRange {
            offset: ptr,
            len,
            memory_size,
        }),
    }
}
