//! Host function registration for Wasmtime linkers.
//!
//! This module registers the imports every guest is linked against:
//! - `env::call_host` - Guest → host calls through the host function registry
//! - `env::log` - Logging function for guest code
//! - WASI preview1, when enabled

use std::sync::Arc;

use tracing::{debug, warn};
use wasmtime::{Caller, Extern, Linker};

use bridge_runtime_common::{
    CallResponse, Channel, GuestAbiConfig, RuntimeError, envelope,
};
use bridge_runtime_core::marshal::{self, LinearMemory, check_bounds};
use bridge_runtime_core::{GuestExports, GuestHandle, GuestState};

use crate::logging::LoggingHost;

/// Register all host imports on a core module linker.
///
/// # Errors
///
/// Returns an error if function registration fails.
pub fn register_all(
    linker: &mut Linker<GuestState>,
    abi: &GuestAbiConfig,
) -> Result<(), RuntimeError> {
    register_call_host(linker, abi)?;
    register_logging(linker, abi)?;

    if abi.link_wasi {
        wasmtime_wasi::preview1::add_to_linker_async(linker, GuestState::wasi_mut).map_err(
            |e| RuntimeError::invalid_config(format!("Failed to link WASI preview1: {e}")),
        )?;
    }

    Ok(())
}

/// Register the guest → host callback.
///
/// Registers `env::call_host(ptr: i32, len: i32) -> i64`. The guest passes a
/// request envelope in its own memory; the host dispatches it through the
/// registry and places the response envelope in the guest's memory using the
/// guest's allocator. The guest owns the returned buffer and frees it.
///
/// # Memory Protocol
///
/// The host never frees the request buffer. On any failure, or when no host
/// → guest call is in flight for this instance, the callback returns `0`.
pub fn register_call_host(
    linker: &mut Linker<GuestState>,
    abi: &GuestAbiConfig,
) -> Result<(), RuntimeError> {
    linker
        .func_wrap_async(
            &abi.import_module,
            &abi.call_host_import,
            |mut caller: Caller<'_, GuestState>, (ptr, len): (u32, u32)| {
                Box::new(async move { call_host(&mut caller, ptr, len).await })
            },
        )
        .map_err(|e| {
            RuntimeError::invalid_config(format!("Failed to register call_host function: {e}"))
        })?;

    Ok(())
}

/// Register the logging host function.
///
/// Registers `env::log(ptr: i32, len: i32)`. The message is decoded as UTF-8
/// with invalid sequences replaced; out-of-range buffers are ignored.
pub fn register_logging(
    linker: &mut Linker<GuestState>,
    abi: &GuestAbiConfig,
) -> Result<(), RuntimeError> {
    linker
        .func_wrap(
            &abi.import_module,
            &abi.log_import,
            |mut caller: Caller<'_, GuestState>, ptr: u32, len: u32| {
                let memory_export = caller.data().abi().memory_export.clone();

                let Some(memory) = caller
                    .get_export(&memory_export)
                    .and_then(Extern::into_memory)
                else {
                    warn!("Memory export not found in guest module");
                    return;
                };

                let message = {
                    let data = memory.data(&caller);
                    match check_bounds(ptr, len, data.len()) {
                        Ok(range) => LoggingHost::decode(&data[range]),
                        Err(e) => {
                            warn!(error = %e, "Ignoring out-of-range log message");
                            return;
                        }
                    }
                };

                LoggingHost::log(caller.data_mut(), &message);
            },
        )
        .map_err(|e| {
            RuntimeError::invalid_config(format!("Failed to register log function: {e}"))
        })?;

    Ok(())
}

/// Body of the `call_host` import. Returns the packed response channel, or 0.
async fn call_host(caller: &mut Caller<'_, GuestState>, ptr: u32, len: u32) -> u64 {
    if !caller.data().in_call() {
        warn!(
            module = caller.data().module(),
            "call_host invoked outside of an active call"
        );
        return 0;
    }

    match bridge(caller, ptr, len).await {
        Ok(channel) => channel.pack(),
        Err(e) => {
            warn!(
                module = caller.data().module(),
                call_id = caller.data().call_id(),
                error = %e,
                "call_host failed"
            );
            0
        }
    }
}

/// Read the request, dispatch it and place the response in the caller.
async fn bridge(
    caller: &mut Caller<'_, GuestState>,
    ptr: u32,
    len: u32,
) -> Result<Channel, RuntimeError> {
    let (abi, registry, modules, module) = {
        let state = caller.data();
        (
            Arc::clone(state.abi()),
            Arc::clone(state.registry()),
            state.modules().clone(),
            state.module().to_string(),
        )
    };

    let exports = GuestExports::from_caller(caller, &abi)?;
    let mut guest = GuestHandle::new(&mut *caller, exports);

    let raw_request = guest.read(ptr, len)?;

    let response = match envelope::decode_request(&raw_request) {
        Ok(request) => {
            debug!(module = %module, method = %request.method, "Guest called host");
            let method = request.method.clone();
            let result = registry.dispatch(&method, request.into_params(), &module, &modules);
            CallResponse::from(result)
        }
        Err(e) => CallResponse::err(e.to_string()),
    };

    let bytes = envelope::encode_response(&response)?;
    let placed = marshal::place(&mut guest, &bytes).await?;

    Ok(placed.hand_off())
}
