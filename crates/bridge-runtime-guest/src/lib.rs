//! Guest-side helpers for bridge-runtime modules written in Rust.
//!
//! A guest exports `memory`, `malloc`, `free` and `do`, and may import
//! `env::call_host` and `env::log`. This crate provides all of it:
//!
//! - [`heap`]: Size-prefixed allocator behind `malloc`/`free`
//! - [`Dispatcher`]: Method table behind `do`
//! - [`host`]: Calls back into the host and host logging
//! - [`export_guest!`]: Emits the exports for a dispatcher
//!
//! # Example
//!
//! ```ignore
//! use bridge_runtime_guest::{Dispatcher, export_guest};
//! use serde_json::Value;
//!
//! fn dispatcher() -> Dispatcher {
//!     Dispatcher::new().with("echo", |params| Ok(Value::Object(params)))
//! }
//!
//! export_guest!(dispatcher());
//! ```

#![allow(unsafe_code)]

pub mod abi;
pub mod dispatch;
pub mod heap;
pub mod host;

pub use dispatch::{Dispatcher, Handler, METHOD_NOT_FOUND};
pub use host::{call_host, log};

/// Emit the `malloc`, `free` and `do` exports on wasm32.
///
/// The expression is evaluated once, on the first call, to build the
/// [`Dispatcher`]. On other targets the macro expands to nothing.
#[macro_export]
macro_rules! export_guest {
    ($dispatcher:expr) => {
        #[cfg(target_arch = "wasm32")]
        static __BRIDGE_DISPATCHER: ::std::sync::OnceLock<$crate::Dispatcher> =
            ::std::sync::OnceLock::new();

        #[cfg(target_arch = "wasm32")]
        #[unsafe(export_name = "malloc")]
        extern "C" fn __bridge_malloc(size: u32) -> u32 {
            $crate::abi::malloc(size)
        }

        #[cfg(target_arch = "wasm32")]
        #[unsafe(export_name = "free")]
        unsafe extern "C" fn __bridge_free(ptr: u32) {
            unsafe { $crate::abi::free(ptr) }
        }

        #[cfg(target_arch = "wasm32")]
        #[unsafe(export_name = "do")]
        unsafe extern "C" fn __bridge_do(ptr: u32, len: u32) -> u64 {
            let dispatcher = __BRIDGE_DISPATCHER.get_or_init(|| $dispatcher);
            unsafe { $crate::abi::dispatch(dispatcher, ptr, len) }
        }
    };
}
