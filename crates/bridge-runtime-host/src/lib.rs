//! Host side of bridge-runtime.
//!
//! This crate links guests against the host imports and manages named guest
//! instances.
//!
//! # Interfaces
//!
//! - [`runtime`]: [`HostRuntime`], the module table and call entry point
//! - [`linker`]: The `call_host` and `log` imports, plus WASI preview1
//! - [`builtins`]: Host functions registered by the runtime itself
//! - [`logging`]: Guest log capture
//!
//! # Call Flow
//!
//! 1. **Host → guest**: `HostRuntime::call` places a request envelope in the
//!    guest, invokes its dispatch export and reads back the response.
//! 2. **Guest → host**: while that call is in flight the guest may call
//!    `call_host`; the request is dispatched through the [`HostRegistry`]
//!    and the response is placed back in the guest's memory.
//!
//! [`HostRegistry`]: bridge_runtime_core::HostRegistry

pub mod builtins;
pub mod linker;
pub mod logging;
pub mod runtime;

pub use builtins::{LIST_BUILTINS, LIST_MODULES, register_builtins};
pub use logging::LoggingHost;
pub use runtime::HostRuntime;
