//! Per-instance store state.
//!
//! This module provides:
//! - [`GuestState`]: Store data of one loaded guest, reachable from host functions
//! - [`LogEntry`]: A message emitted by the guest through the `log` import
//! - [`create_store`]: Store construction with fuel and memory limits applied

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Instant;

use wasmtime::{Store, StoreLimits, StoreLimitsBuilder};
use wasmtime_wasi::WasiCtxBuilder;
use wasmtime_wasi::preview1::WasiP1Ctx;

use crate::WasmEngine;
use crate::registry::{HostRegistry, ModuleDirectory};
use bridge_runtime_common::{ExecutionConfig, GuestAbiConfig, RuntimeError};

/// Store data for one guest instance.
///
/// Host functions reach it through [`wasmtime::Caller::data`]. It carries the
/// explicit handles a callback needs: the registry, the module directory and
/// the name of the guest it belongs to.
pub struct GuestState {
    /// Name the guest was loaded under.
    module: String,

    /// Identifier of the call in flight, if any.
    call_id: Option<String>,

    /// Host functions reachable through `call_host`.
    registry: Arc<HostRegistry>,

    /// Names of all loaded modules.
    modules: ModuleDirectory,

    /// Guest contract names.
    abi: Arc<GuestAbiConfig>,

    /// Messages from the `log` import, oldest first.
    logs: VecDeque<LogEntry>,

    /// Maximum number of retained log entries.
    max_logs: usize,

    /// Linear memory limits.
    limits: StoreLimits,

    /// WASI preview1 context.
    wasi: WasiP1Ctx,
}

/// A single log entry from guest code.
#[derive(Debug, Clone)]
pub struct LogEntry {
    /// Log message content.
    pub message: String,

    /// Call during which the message was logged.
    pub call_id: Option<String>,

    /// Timestamp when the log was recorded.
    pub timestamp: Instant,
}

/// Shared handles every guest store is built with.
#[derive(Clone)]
pub struct StoreContext {
    /// Host function registry.
    pub registry: Arc<HostRegistry>,

    /// Loaded module names.
    pub modules: ModuleDirectory,

    /// Guest contract names.
    pub abi: Arc<GuestAbiConfig>,

    /// Execution limits.
    pub execution: ExecutionConfig,
}

impl GuestState {
    /// Create the state for a guest loaded under `module`.
    pub fn new(module: impl Into<String>, context: &StoreContext) -> Self {
        let mut wasi = WasiCtxBuilder::new();
        if context.abi.inherit_stdio {
            wasi.inherit_stdout().inherit_stderr();
        }

        let limits = StoreLimitsBuilder::new()
            .memory_size(context.execution.max_memory_bytes())
            .build();

        Self {
            module: module.into(),
            call_id: None,
            registry: Arc::clone(&context.registry),
            modules: context.modules.clone(),
            abi: Arc::clone(&context.abi),
            logs: VecDeque::new(),
            max_logs: context.execution.max_guest_logs,
            limits,
            wasi: wasi.build_p1(),
        }
    }

    /// Name the guest was loaded under.
    pub fn module(&self) -> &str {
        &self.module
    }

    /// Identifier of the call in flight, if any.
    pub fn call_id(&self) -> Option<&str> {
        self.call_id.as_deref()
    }

    /// Returns `true` while a host → guest call is in flight.
    pub fn in_call(&self) -> bool {
        self.call_id.is_some()
    }

    /// Mark a call as in flight.
    pub fn begin_call(&mut self, call_id: String) {
        self.call_id = Some(call_id);
    }

    /// Mark the in-flight call as finished.
    pub fn end_call(&mut self) {
        self.call_id = None;
    }

    /// Host functions reachable through `call_host`.
    pub fn registry(&self) -> &Arc<HostRegistry> {
        &self.registry
    }

    /// Loaded module names.
    pub fn modules(&self) -> &ModuleDirectory {
        &self.modules
    }

    /// Guest contract names.
    pub fn abi(&self) -> &Arc<GuestAbiConfig> {
        &self.abi
    }

    /// Record a guest log message, dropping the oldest entry when full.
    pub fn push_log(&mut self, message: String) {
        if self.max_logs == 0 {
            return;
        }
        while self.logs.len() >= self.max_logs {
            self.logs.pop_front();
        }
        self.logs.push_back(LogEntry {
            message,
            call_id: self.call_id.clone(),
            timestamp: Instant::now(),
        });
    }

    /// Retained log entries, oldest first.
    pub fn logs(&self) -> impl Iterator<Item = &LogEntry> {
        self.logs.iter()
    }

    /// Remove and return all retained log entries.
    pub fn take_logs(&mut self) -> Vec<LogEntry> {
        self.logs.drain(..).collect()
    }

    /// Linear memory limiter.
    pub fn limits_mut(&mut self) -> &mut StoreLimits {
        &mut self.limits
    }

    /// WASI preview1 context.
    pub fn wasi_mut(&mut self) -> &mut WasiP1Ctx {
        &mut self.wasi
    }
}

/// Create a new Wasmtime store for the guest loaded under `module`.
///
/// # Errors
///
/// Returns an error if fuel cannot be set on the store.
pub fn create_store(
    engine: &WasmEngine,
    context: &StoreContext,
    module: &str,
) -> Result<Store<GuestState>, RuntimeError> {
    let state = GuestState::new(module, context);
    let mut store = Store::new(engine.inner(), state);

    store.limiter(|state| state.limits_mut());

    // Instantiation may run a start function, so fuel is needed up front
    refuel(engine, &mut store, &context.execution)?;

    Ok(store)
}

/// Reset the store's fuel to the configured per-call budget.
///
/// # Errors
///
/// Returns an error if fuel cannot be set on the store.
pub fn refuel(
    engine: &WasmEngine,
    store: &mut Store<GuestState>,
    config: &ExecutionConfig,
) -> Result<(), RuntimeError> {
    if engine.is_fuel_enabled() {
        store
            .set_fuel(config.max_fuel)
            .map_err(|e| RuntimeError::invalid_config(format!("Failed to set fuel: {e}")))?;
    }
    Ok(())
}

/// Get remaining fuel from a store.
pub fn get_remaining_fuel(store: &Store<GuestState>) -> Option<u64> {
    store.get_fuel().ok()
}
