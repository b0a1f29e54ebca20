//! Host functions the runtime registers on its own.

use serde_json::{Value, json};

use bridge_runtime_common::{HostFunctionError, Params, RuntimeError};
use bridge_runtime_core::{HostCallContext, HostRegistry};

/// Returns the names of every registered host function.
pub const LIST_BUILTINS: &str = "list_builtins";

/// Returns the names of every loaded module.
pub const LIST_MODULES: &str = "list_modules";

/// Register the built-in host functions.
///
/// # Errors
///
/// Returns [`RuntimeError::DuplicateName`] if the registry rejects duplicates
/// and a built-in name is already taken.
pub fn register_builtins(registry: &mut HostRegistry) -> Result<(), RuntimeError> {
    registry.register(LIST_BUILTINS, list_builtins)?;
    registry.register(LIST_MODULES, list_modules)?;
    Ok(())
}

fn list_builtins(ctx: &HostCallContext<'_>, _params: Params) -> Result<Value, HostFunctionError> {
    Ok(json!(ctx.registry.list_registered()))
}

fn list_modules(ctx: &HostCallContext<'_>, _params: Params) -> Result<Value, HostFunctionError> {
    Ok(json!(ctx.modules.names()))
}
