//! Logging host function implementation.
//!
//! Guest messages are both:
//! 1. Stored in the instance's [`GuestState`] for later retrieval
//! 2. Emitted via the `tracing` crate for observability

use bridge_runtime_core::GuestState;
use tracing::info;

/// Host implementation of the `log` import.
pub struct LoggingHost;

impl LoggingHost {
    /// Record a message from guest code.
    pub fn log(state: &mut GuestState, message: &str) {
        info!(
            module = state.module(),
            call_id = state.call_id(),
            guest_log = true,
            "wasm log: {}",
            message
        );

        state.push_log(message.to_string());
    }

    /// Decode a guest buffer as UTF-8, replacing invalid sequences.
    pub fn decode(bytes: &[u8]) -> String {
        String::from_utf8_lossy(bytes).into_owned()
    }
}
