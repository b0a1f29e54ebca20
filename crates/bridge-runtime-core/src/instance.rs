//! Loaded guest instances and their exports.
//!
//! This module provides:
//! - [`GuestExports`]: The memory, allocator and dispatch exports a guest must provide
//! - [`GuestHandle`]: A store paired with those exports, driving the marshaling protocol
//! - [`GuestInstance`]: One instantiated guest with its own store

use std::time::Instant;

use async_trait::async_trait;
use serde_json::Value;
use tracing::{debug, error, info, instrument, warn};
use wasmtime::{AsContextMut, Caller, Extern, Instance, Linker, Memory, Store, Trap, TypedFunc};

use crate::marshal::{self, CallTarget, LinearMemory, check_bounds};
use crate::store::{GuestState, LogEntry, StoreContext, create_store, get_remaining_fuel, refuel};
use crate::{CompiledModule, WasmEngine};
use bridge_runtime_common::{
    CallRequest, ExecutionConfig, GuestAbiConfig, RuntimeError, envelope,
};

/// Exports resolved from a guest.
#[derive(Clone)]
pub struct GuestExports {
    memory: Memory,
    alloc: TypedFunc<u32, u32>,
    free: TypedFunc<u32, ()>,
    dispatch: Option<TypedFunc<(u32, u32), u64>>,
}

impl GuestExports {
    /// Resolve every required export from a freshly created instance.
    ///
    /// # Errors
    ///
    /// Returns [`RuntimeError::Instantiation`] if an export is missing or has
    /// the wrong signature.
    pub fn resolve(
        instance: &Instance,
        mut store: impl AsContextMut<Data = GuestState>,
        abi: &GuestAbiConfig,
    ) -> Result<Self, RuntimeError> {
        let memory = instance
            .get_memory(&mut store, &abi.memory_export)
            .ok_or_else(|| missing_export(&abi.memory_export))?;

        let alloc = instance
            .get_typed_func::<u32, u32>(&mut store, &abi.alloc_export)
            .map_err(|e| bad_export(&abi.alloc_export, &e))?;

        let free = instance
            .get_typed_func::<u32, ()>(&mut store, &abi.free_export)
            .map_err(|e| bad_export(&abi.free_export, &e))?;

        let dispatch = instance
            .get_typed_func::<(u32, u32), u64>(&mut store, &abi.dispatch_export)
            .map_err(|e| bad_export(&abi.dispatch_export, &e))?;

        Ok(Self {
            memory,
            alloc,
            free,
            dispatch: Some(dispatch),
        })
    }

    /// Resolve the memory and allocator of the guest behind a host function
    /// call. The dispatch entry point is not needed in that direction.
    ///
    /// # Errors
    ///
    /// Returns [`RuntimeError::Instantiation`] if an export is missing or has
    /// the wrong signature.
    pub fn from_caller(
        caller: &mut Caller<'_, GuestState>,
        abi: &GuestAbiConfig,
    ) -> Result<Self, RuntimeError> {
        let memory = caller
            .get_export(&abi.memory_export)
            .and_then(Extern::into_memory)
            .ok_or_else(|| missing_export(&abi.memory_export))?;

        let alloc = caller
            .get_export(&abi.alloc_export)
            .and_then(Extern::into_func)
            .ok_or_else(|| missing_export(&abi.alloc_export))?
            .typed::<u32, u32>(&*caller)
            .map_err(|e| bad_export(&abi.alloc_export, &e))?;

        let free = caller
            .get_export(&abi.free_export)
            .and_then(Extern::into_func)
            .ok_or_else(|| missing_export(&abi.free_export))?
            .typed::<u32, ()>(&*caller)
            .map_err(|e| bad_export(&abi.free_export, &e))?;

        Ok(Self {
            memory,
            alloc,
            free,
            dispatch: None,
        })
    }
}

/// A store context paired with the guest's exports.
///
/// `S` is either `&mut Store<GuestState>` (host → guest) or
/// `&mut Caller<'_, GuestState>` (placing a host response in the calling guest).
pub struct GuestHandle<S> {
    store: S,
    exports: GuestExports,
}

impl<S> GuestHandle<S>
where
    S: AsContextMut<Data = GuestState> + Send,
{
    /// Pair a store context with resolved exports.
    pub fn new(store: S, exports: GuestExports) -> Self {
        Self { store, exports }
    }
}

#[async_trait]
impl<S> LinearMemory for GuestHandle<S>
where
    S: AsContextMut<Data = GuestState> + Send,
{
    async fn allocate(&mut self, len: u32) -> Result<u32, RuntimeError> {
        self.exports
            .alloc
            .call_async(&mut self.store, len)
            .await
            .map_err(|e| engine_error(e, |m| RuntimeError::allocation(m)))
    }

    async fn deallocate(&mut self, ptr: u32) -> Result<(), RuntimeError> {
        self.exports
            .free
            .call_async(&mut self.store, ptr)
            .await
            .map_err(|e| engine_error(e, |m| RuntimeError::allocation(m)))
    }

    fn size(&self) -> usize {
        self.exports.memory.data_size(&self.store)
    }

    fn read(&self, ptr: u32, len: u32) -> Result<Vec<u8>, RuntimeError> {
        let data = self.exports.memory.data(&self.store);
        let range = check_bounds(ptr, len, data.len())?;
        Ok(data[range].to_vec())
    }

    fn write(&mut self, ptr: u32, bytes: &[u8]) -> Result<(), RuntimeError> {
        let data = self.exports.memory.data_mut(&mut self.store);
        let len = u32::try_from(bytes.len()).map_err(|_| RuntimeError::MemoryOutOfRange {
            offset: ptr,
            len: u32::MAX,
            memory_size: data.len(),
        })?;
        let range = check_bounds(ptr, len, data.len())?;
        data[range].copy_from_slice(bytes);
        Ok(())
    }
}

#[async_trait]
impl<S> CallTarget for GuestHandle<S>
where
    S: AsContextMut<Data = GuestState> + Send,
{
    async fn dispatch(&mut self, ptr: u32, len: u32) -> Result<u64, RuntimeError> {
        let Some(dispatch) = self.exports.dispatch.as_ref() else {
            return Err(RuntimeError::instantiation("Guest has no dispatch entry point"));
        };

        dispatch
            .call_async(&mut self.store, (ptr, len))
            .await
            .map_err(|e| engine_error(e, |m| RuntimeError::trap(m)))
    }
}

/// One instantiated guest.
///
/// Each instance owns its store; callers serialize access to it (see
/// `HostRuntime`), so at most one call is in flight per instance.
pub struct GuestInstance {
    name: String,
    store: Store<GuestState>,
    exports: GuestExports,
    module: CompiledModule,
    engine: WasmEngine,
    execution: ExecutionConfig,
}

impl GuestInstance {
    /// Instantiate `module` under `name`.
    ///
    /// Any start function runs here, with the per-call fuel budget and with
    /// `call_host` disabled.
    ///
    /// # Errors
    ///
    /// Returns [`RuntimeError::Instantiation`] if linking fails, the start
    /// function traps or a required export is missing.
    #[instrument(skip(engine, linker, module, context), fields(module = %name))]
    pub async fn instantiate(
        name: &str,
        engine: &WasmEngine,
        linker: &Linker<GuestState>,
        module: &CompiledModule,
        context: &StoreContext,
    ) -> Result<Self, RuntimeError> {
        let start = Instant::now();
        let mut store = create_store(engine, context, name)?;

        let instance = linker
            .instantiate_async(&mut store, module.as_module())
            .await
            .map_err(|e| {
                engine_error(e, |m| {
                    RuntimeError::instantiation(format!("Instantiation failed: {m}"))
                })
            })?;

        let exports = GuestExports::resolve(&instance, &mut store, &context.abi)?;

        info!(
            content_hash = %module.content_hash(),
            duration_ms = start.elapsed().as_millis(),
            "Guest instantiated"
        );

        Ok(Self {
            name: name.to_string(),
            store,
            exports,
            module: module.clone(),
            engine: engine.clone(),
            execution: context.execution.clone(),
        })
    }

    /// Call `request.method` on the guest and decode its result.
    ///
    /// # Errors
    ///
    /// Returns [`RuntimeError::Application`] if the guest answered with an
    /// error, or the protocol/engine error that interrupted the call.
    #[instrument(skip(self, request), fields(module = %self.name, method = %request.method))]
    pub async fn call(
        &mut self,
        request: &CallRequest,
        call_id: String,
    ) -> Result<Value, RuntimeError> {
        let start = Instant::now();
        let payload = envelope::encode_request(request)?;

        refuel(&self.engine, &mut self.store, &self.execution)?;
        let initial_fuel = get_remaining_fuel(&self.store).unwrap_or(0);

        self.store.data_mut().begin_call(call_id);
        let outcome = {
            let mut handle = GuestHandle::new(&mut self.store, self.exports.clone());
            marshal::invoke(&mut handle, &payload).await
        };
        self.store.data_mut().end_call();

        let fuel_consumed =
            initial_fuel.saturating_sub(get_remaining_fuel(&self.store).unwrap_or(initial_fuel));

        let bytes = match outcome {
            Ok(bytes) => bytes,
            Err(e) => {
                if matches!(e, RuntimeError::FuelExhausted) {
                    warn!(fuel_consumed, "Call terminated: fuel exhausted");
                } else {
                    error!(error = %e, fuel_consumed, "Call failed");
                }
                return Err(e);
            }
        };

        debug!(
            duration_ms = start.elapsed().as_millis(),
            fuel_consumed,
            response_len = bytes.len(),
            "Call completed"
        );

        envelope::decode_response(&bytes)?.into_result()
    }

    /// Name the guest was loaded under.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Current size of the guest's linear memory in bytes.
    pub fn memory_size(&self) -> usize {
        self.exports.memory.data_size(&self.store)
    }

    /// Remove and return the messages the guest has logged.
    pub fn take_logs(&mut self) -> Vec<LogEntry> {
        self.store.data_mut().take_logs()
    }
}

impl std::fmt::Debug for GuestInstance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GuestInstance")
            .field("name", &self.name)
            .field("module", &self.module)
            .finish_non_exhaustive()
    }
}

/// Map an engine error, keeping fuel exhaustion distinct.
fn engine_error(
    error: wasmtime::Error,
    otherwise: impl FnOnce(String) -> RuntimeError,
) -> RuntimeError {
    if is_out_of_fuel(&error) {
        return RuntimeError::FuelExhausted;
    }
    otherwise(extract_trap_message(&error))
}

/// Human-readable trap description, with the trap code when there is one.
fn extract_trap_message(error: &wasmtime::Error) -> String {
    match error.downcast_ref::<Trap>() {
        Some(trap) => format!("{error} ({trap:?})"),
        None => format!("{error:#}"),
    }
}

fn is_out_of_fuel(error: &wasmtime::Error) -> bool {
    error
        .downcast_ref::<Trap>()
        .is_some_and(|trap| *trap == Trap::OutOfFuel)
}

fn missing_export(name: &str) -> RuntimeError {
    RuntimeError::instantiation(format!("Guest does not export '{name}'"))
}

fn bad_export(name: &str, error: &wasmtime::Error) -> RuntimeError {
    RuntimeError::instantiation(format!("Guest export '{name}' is unusable: {error}"))
}
