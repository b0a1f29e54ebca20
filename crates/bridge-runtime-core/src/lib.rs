//! Core Wasmtime runtime for bridge-runtime.
//!
//! This crate provides the guest side of the bridge:
//! - [`WasmEngine`]: Configured Wasmtime engine shared by every guest
//! - [`CompiledModule`]: Compiled WebAssembly module wrapper
//! - [`HostRegistry`]: Name → callback table reachable through `call_host`
//! - [`marshal`]: The allocate/write/dispatch/read/free protocol
//! - [`GuestInstance`]: One instantiated guest and its store
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │                     WasmEngine                          │
//! │  (Shared across all guests, thread-safe)                │
//! │  - Fuel metering, optional pooling allocator            │
//! └─────────────────────────────────────────────────────────┘
//!                            │
//!                            ▼
//! ┌─────────────────────────────────────────────────────────┐
//! │                   CompiledModule                        │
//! │  - Pre-compiled machine code                            │
//! └─────────────────────────────────────────────────────────┘
//!                            │
//!                            ▼
//! ┌─────────────────────────────────────────────────────────┐
//! │         GuestInstance (Store<GuestState>)               │
//! │  (One per loaded module, one call at a time)            │
//! │  - Linear memory + exported allocator                   │
//! │  - Registry and module directory handles                │
//! │  - Guest log buffer                                     │
//! └─────────────────────────────────────────────────────────┘
//! ```

pub mod engine;
pub mod instance;
pub mod marshal;
pub mod module;
pub mod registry;
pub mod store;

pub use engine::WasmEngine;
pub use instance::{GuestExports, GuestHandle, GuestInstance};
pub use marshal::{CallTarget, InboundBuffer, LinearMemory, OutboundBuffer};
pub use module::CompiledModule;
pub use registry::{HostCallContext, HostFn, HostRegistry, ModuleDirectory};
pub use store::{GuestState, LogEntry, StoreContext};
