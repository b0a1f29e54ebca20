//! Host function registry.
//!
//! The registry maps method names to host callbacks that any guest can reach
//! through the `call_host` import. It is built once, handed to the runtime,
//! and shared read-only behind an `Arc` from then on.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use parking_lot::RwLock;
use serde_json::Value;
use tracing::{debug, warn};

use bridge_runtime_common::{DuplicatePolicy, HostFunctionError, Params, RuntimeError};

/// A host callback.
pub type HostFn =
    Arc<dyn Fn(&HostCallContext<'_>, Params) -> Result<Value, HostFunctionError> + Send + Sync>;

/// Explicit context handed to every host callback.
///
/// There is no ambient "current host"; everything a callback may inspect is
/// passed in here.
pub struct HostCallContext<'a> {
    /// Name of the guest module that issued the call.
    pub caller: &'a str,

    /// The registry the call was dispatched through.
    pub registry: &'a HostRegistry,

    /// Names of the currently loaded modules.
    pub modules: &'a ModuleDirectory,
}

/// Shared set of loaded module names.
///
/// The runtime updates it on load/unload; host callbacks read it. Holding
/// names instead of instances keeps guests from owning each other.
#[derive(Debug, Clone, Default)]
pub struct ModuleDirectory {
    names: Arc<RwLock<BTreeSet<String>>>,
}

impl ModuleDirectory {
    /// Create an empty directory.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a loaded module.
    pub fn insert(&self, name: &str) {
        self.names.write().insert(name.to_string());
    }

    /// Forget a module. Returns `true` if it was present.
    pub fn remove(&self, name: &str) -> bool {
        self.names.write().remove(name)
    }

    /// Check whether a module is loaded.
    pub fn contains(&self, name: &str) -> bool {
        self.names.read().contains(name)
    }

    /// Sorted module names.
    pub fn names(&self) -> Vec<String> {
        self.names.read().iter().cloned().collect()
    }
}

/// Name → callback table for host functions.
pub struct HostRegistry {
    functions: HashMap<String, HostFn>,
    policy: DuplicatePolicy,
}

impl HostRegistry {
    /// Create an empty registry with the given duplicate policy.
    pub fn new(policy: DuplicatePolicy) -> Self {
        Self {
            functions: HashMap::new(),
            policy,
        }
    }

    /// Register a host function.
    ///
    /// # Errors
    ///
    /// Returns [`RuntimeError::DuplicateName`] if `name` is taken and the
    /// policy is [`DuplicatePolicy::Reject`].
    pub fn register<F>(&mut self, name: impl Into<String>, callback: F) -> Result<(), RuntimeError>
    where
        F: Fn(&HostCallContext<'_>, Params) -> Result<Value, HostFunctionError>
            + Send
            + Sync
            + 'static,
    {
        let name = name.into();

        if self.functions.contains_key(&name) {
            match self.policy {
                DuplicatePolicy::Reject => return Err(RuntimeError::duplicate_name(name)),
                DuplicatePolicy::Overwrite => {
                    warn!(name = %name, "Overwriting registered host function");
                }
            }
        }

        debug!(name = %name, "Host function registered");
        self.functions.insert(name, Arc::new(callback));
        Ok(())
    }

    /// Invoke the host function registered under `name`.
    ///
    /// # Errors
    ///
    /// Returns [`RuntimeError::MethodNotFound`] if nothing is registered under
    /// `name`, or [`RuntimeError::HostFunction`] if the callback fails.
    pub fn dispatch(
        &self,
        name: &str,
        params: Params,
        caller: &str,
        modules: &ModuleDirectory,
    ) -> Result<Value, RuntimeError> {
        let callback = self
            .functions
            .get(name)
            .ok_or_else(|| RuntimeError::method_not_found(name))?;

        let context = HostCallContext {
            caller,
            registry: self,
            modules,
        };

        callback(&context, params).map_err(RuntimeError::from)
    }

    /// Sorted names of all registered host functions.
    pub fn list_registered(&self) -> BTreeSet<String> {
        self.functions.keys().cloned().collect()
    }

    /// Check whether `name` is registered.
    pub fn contains(&self, name: &str) -> bool {
        self.functions.contains_key(name)
    }

    /// Number of registered host functions.
    pub fn len(&self) -> usize {
        self.functions.len()
    }

    /// Returns `true` if nothing is registered.
    pub fn is_empty(&self) -> bool {
        self.functions.is_empty()
    }
}

impl Default for HostRegistry {
    fn default() -> Self {
        Self::new(DuplicatePolicy::default())
    }
}

impl std::fmt::Debug for HostRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HostRegistry")
            .field("functions", &self.list_registered())
            .field("policy", &self.policy)
            .finish()
    }
}
