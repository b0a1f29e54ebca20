//! Configuration structures for the bridge-runtime.
//!
//! This module defines configuration options for various components:
//! - [`RuntimeConfig`]: Top-level configuration containing all settings
//! - [`EngineConfig`]: Wasmtime engine settings (pooling, fuel)
//! - [`ExecutionConfig`]: Per-call limits (fuel, memory, log capture)
//! - [`RegistryConfig`]: Host function registry policy
//! - [`GuestAbiConfig`]: Import and export names of the guest contract

use serde::{Deserialize, Serialize};

/// Top-level runtime configuration.
///
/// This structure contains all configuration options for the bridge-runtime.
/// It can be loaded from TOML (see [`crate::ConfigFile`]) or JSON.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct RuntimeConfig {
    /// Wasmtime engine configuration.
    #[serde(default)]
    pub engine: EngineConfig,

    /// Per-call execution configuration.
    #[serde(default)]
    pub execution: ExecutionConfig,

    /// Host function registry configuration.
    #[serde(default)]
    pub registry: RegistryConfig,

    /// Guest contract names.
    #[serde(default)]
    pub abi: GuestAbiConfig,
}

/// Wasmtime engine configuration.
///
/// These settings affect the global Wasmtime engine behavior.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct EngineConfig {
    /// Enable pooling allocator for instance creation.
    ///
    /// When enabled, memory is pre-allocated for a pool of instances.
    #[serde(default = "defaults::pooling_allocator")]
    pub pooling_allocator: bool,

    /// Maximum concurrent instances in the pool.
    ///
    /// Only effective when `pooling_allocator` is enabled.
    #[serde(default = "defaults::max_instances")]
    pub max_instances: u32,

    /// Memory per instance slot in megabytes.
    ///
    /// Only effective when `pooling_allocator` is enabled.
    #[serde(default = "defaults::instance_memory_mb")]
    pub instance_memory_mb: u32,

    /// Enable fuel metering.
    ///
    /// When enabled, every call is limited by `execution.max_fuel`.
    #[serde(default = "defaults::consume_fuel")]
    pub consume_fuel: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            pooling_allocator: defaults::pooling_allocator(),
            max_instances: defaults::max_instances(),
            instance_memory_mb: defaults::instance_memory_mb(),
            consume_fuel: defaults::consume_fuel(),
        }
    }
}

/// Per-call execution configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ExecutionConfig {
    /// Fuel granted to a guest at the start of every call.
    ///
    /// A typical envelope round trip consumes ~10,000-100,000 fuel.
    #[serde(default = "defaults::max_fuel")]
    pub max_fuel: u64,

    /// Maximum linear memory per guest instance in megabytes.
    #[serde(default = "defaults::max_memory_mb")]
    pub max_memory_mb: u32,

    /// Maximum number of guest log entries retained per instance.
    ///
    /// Older entries are dropped first.
    #[serde(default = "defaults::max_guest_logs")]
    pub max_guest_logs: usize,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            max_fuel: defaults::max_fuel(),
            max_memory_mb: defaults::max_memory_mb(),
            max_guest_logs: defaults::max_guest_logs(),
        }
    }
}

impl ExecutionConfig {
    /// Maximum linear memory in bytes.
    pub fn max_memory_bytes(&self) -> usize {
        (self.max_memory_mb as usize) * 1024 * 1024
    }
}

/// What `register` does when a name is already taken.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DuplicatePolicy {
    /// Replace the existing function and log a warning.
    #[default]
    Overwrite,
    /// Fail with `DuplicateName`.
    Reject,
}

/// Host function registry configuration.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct RegistryConfig {
    /// Duplicate registration policy.
    #[serde(default)]
    pub on_duplicate: DuplicatePolicy,
}

/// Names used by the guest contract.
///
/// The defaults match guests built with `TinyGo` and with
/// `bridge-runtime-guest`.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct GuestAbiConfig {
    /// Import module providing `call_host` and `log`.
    #[serde(default = "defaults::import_module")]
    pub import_module: String,

    /// Name of the guest → host callback import.
    #[serde(default = "defaults::call_host_import")]
    pub call_host_import: String,

    /// Name of the logging import.
    #[serde(default = "defaults::log_import")]
    pub log_import: String,

    /// Exported linear memory.
    #[serde(default = "defaults::memory_export")]
    pub memory_export: String,

    /// Exported dispatch entry point `(ptr, len) -> channel`.
    #[serde(default = "defaults::dispatch_export")]
    pub dispatch_export: String,

    /// Exported allocator `(size) -> ptr`.
    #[serde(default = "defaults::alloc_export")]
    pub alloc_export: String,

    /// Exported deallocator `(ptr)`.
    #[serde(default = "defaults::free_export")]
    pub free_export: String,

    /// Link WASI preview1 so toolchains that need it can instantiate.
    #[serde(default = "defaults::link_wasi")]
    pub link_wasi: bool,

    /// Forward guest stdout/stderr to the host process.
    #[serde(default = "defaults::inherit_stdio")]
    pub inherit_stdio: bool,
}

impl Default for GuestAbiConfig {
    fn default() -> Self {
        Self {
            import_module: defaults::import_module(),
            call_host_import: defaults::call_host_import(),
            log_import: defaults::log_import(),
            memory_export: defaults::memory_export(),
            dispatch_export: defaults::dispatch_export(),
            alloc_export: defaults::alloc_export(),
            free_export: defaults::free_export(),
            link_wasi: defaults::link_wasi(),
            inherit_stdio: defaults::inherit_stdio(),
        }
    }
}

/// Default value functions for serde.
mod defaults {
    pub const fn pooling_allocator() -> bool {
        false
    }

    pub const fn max_instances() -> u32 {
        100
    }

    pub const fn instance_memory_mb() -> u32 {
        64
    }

    pub const fn consume_fuel() -> bool {
        true
    }

    pub const fn max_fuel() -> u64 {
        10_000_000
    }

    pub const fn max_memory_mb() -> u32 {
        128
    }

    pub const fn max_guest_logs() -> usize {
        1024
    }

    pub fn import_module() -> String {
        "env".to_string()
    }

    pub fn call_host_import() -> String {
        "call_host".to_string()
    }

    pub fn log_import() -> String {
        "log".to_string()
    }

    pub fn memory_export() -> String {
        "memory".to_string()
    }

    pub fn dispatch_export() -> String {
        "do".to_string()
    }

    pub fn alloc_export() -> String {
        "malloc".to_string()
    }

    pub fn free_export() -> String {
        "free".to_string()
    }

    pub const fn link_wasi() -> bool {
        true
    }

    pub const fn inherit_stdio() -> bool {
        true
    }
}
