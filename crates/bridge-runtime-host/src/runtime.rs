//! The host runtime.
//!
//! This module provides [`HostRuntime`], which owns the engine, the linker,
//! the host function registry and every loaded guest.

use std::sync::Arc;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use serde_json::Value;
use tokio::sync::Mutex;
use tracing::{Span, debug, info, instrument};
use uuid::Uuid;
use wasmtime::Linker;

use bridge_runtime_common::{CallRequest, GuestAbiConfig, Params, RuntimeConfig, RuntimeError};
use bridge_runtime_core::{
    CompiledModule, GuestInstance, GuestState, HostRegistry, LogEntry, ModuleDirectory,
    StoreContext, WasmEngine,
};

use crate::builtins::register_builtins;
use crate::linker::register_all;

/// Runtime hosting named WebAssembly guests.
///
/// Lifecycle per module: unloaded → loaded → (calling)* → unloaded.
///
/// Calls into the same module are serialized by a per-instance mutex; calls
/// into different modules may run concurrently. The registry is immutable
/// once the runtime is constructed.
///
/// # Example
///
/// ```ignore
/// let mut runtime = HostRuntime::with_defaults(RuntimeConfig::default())?;
/// runtime.init()?;
/// runtime.load_module("hello_mod", &std::fs::read("hello.wasm")?).await?;
/// let result = runtime.call("hello_mod", "echo", Some(params)).await?;
/// ```
pub struct HostRuntime {
    engine: WasmEngine,
    config: RuntimeConfig,
    registry: Arc<HostRegistry>,
    abi: Arc<GuestAbiConfig>,
    linker: Option<Arc<Linker<GuestState>>>,
    modules: DashMap<String, Arc<Mutex<GuestInstance>>>,
    directory: ModuleDirectory,
}

impl HostRuntime {
    /// Create a runtime around `registry`, adding the built-in host functions.
    ///
    /// # Errors
    ///
    /// Returns an error if the engine cannot be created or a built-in name is
    /// rejected by the registry.
    pub fn new(config: RuntimeConfig, mut registry: HostRegistry) -> Result<Self, RuntimeError> {
        let engine = WasmEngine::new(&config.engine)?;
        register_builtins(&mut registry)?;

        info!(
            host_functions = registry.len(),
            link_wasi = config.abi.link_wasi,
            "Host runtime created"
        );

        Ok(Self {
            engine,
            abi: Arc::new(config.abi.clone()),
            config,
            registry: Arc::new(registry),
            linker: None,
            modules: DashMap::new(),
            directory: ModuleDirectory::new(),
        })
    }

    /// Create a runtime with only the built-in host functions.
    ///
    /// # Errors
    ///
    /// Returns an error if the engine cannot be created.
    pub fn with_defaults(config: RuntimeConfig) -> Result<Self, RuntimeError> {
        let registry = HostRegistry::new(config.registry.on_duplicate);
        Self::new(config, registry)
    }

    /// Build the linker with the host imports.
    ///
    /// # Errors
    ///
    /// Returns [`RuntimeError::InvalidConfig`] if called twice or if an
    /// import cannot be registered.
    pub fn init(&mut self) -> Result<(), RuntimeError> {
        if self.linker.is_some() {
            return Err(RuntimeError::invalid_config("Runtime is already initialized"));
        }

        let mut linker = Linker::new(self.engine.inner());
        register_all(&mut linker, &self.abi)?;
        self.linker = Some(Arc::new(linker));

        info!("Host runtime initialized");
        Ok(())
    }

    /// Returns `true` once [`init`](Self::init) has succeeded.
    pub fn is_initialized(&self) -> bool {
        self.linker.is_some()
    }

    /// Compile and instantiate a guest binary under `name`.
    ///
    /// A module already loaded under `name` is replaced; calls already in
    /// flight on it finish against the old instance.
    ///
    /// # Errors
    ///
    /// Returns [`RuntimeError::NotInitialized`] before `init`, and
    /// [`RuntimeError::Instantiation`] if the binary is invalid or does not
    /// satisfy the guest contract.
    #[instrument(skip(self, bytes), fields(bytes_len = bytes.len()))]
    pub async fn load_module(&self, name: &str, bytes: &[u8]) -> Result<(), RuntimeError> {
        let linker = self.linker()?;
        let compiled = CompiledModule::from_bytes(self.engine.inner(), bytes)?;
        self.install(name, &linker, &compiled).await
    }

    /// Compile and instantiate a guest from WAT text under `name`.
    ///
    /// # Errors
    ///
    /// Same as [`load_module`](Self::load_module).
    #[instrument(skip(self, wat))]
    pub async fn load_module_wat(&self, name: &str, wat: &str) -> Result<(), RuntimeError> {
        let linker = self.linker()?;
        let compiled = CompiledModule::from_wat(self.engine.inner(), wat)?;
        self.install(name, &linker, &compiled).await
    }

    async fn install(
        &self,
        name: &str,
        linker: &Linker<GuestState>,
        compiled: &CompiledModule,
    ) -> Result<(), RuntimeError> {
        let context = StoreContext {
            registry: Arc::clone(&self.registry),
            modules: self.directory.clone(),
            abi: Arc::clone(&self.abi),
            execution: self.config.execution.clone(),
        };

        let instance =
            GuestInstance::instantiate(name, &self.engine, linker, compiled, &context).await?;

        let instance = Arc::new(Mutex::new(instance));

        // The directory only changes while the table entry is locked.
        let replaced = match self.modules.entry(name.to_string()) {
            Entry::Occupied(mut entry) => {
                entry.insert(instance);
                self.directory.insert(name);
                true
            }
            Entry::Vacant(entry) => {
                let _installed = entry.insert(instance);
                self.directory.insert(name);
                false
            }
        };

        info!(module = %name, replaced, "Module loaded");
        Ok(())
    }

    /// Call `method` on the guest loaded under `name`.
    ///
    /// # Errors
    ///
    /// Returns [`RuntimeError::ModuleNotFound`] without touching any guest if
    /// `name` is not loaded, [`RuntimeError::Application`] if the guest
    /// answered with an error, or the protocol/engine error of the call.
    #[instrument(skip(self, params), fields(call_id = tracing::field::Empty))]
    pub async fn call(
        &self,
        name: &str,
        method: &str,
        params: Option<Params>,
    ) -> Result<Value, RuntimeError> {
        self.linker()?;

        let instance = self
            .modules
            .get(name)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or_else(|| RuntimeError::module_not_found(name))?;

        let call_id = Uuid::new_v4().to_string();
        Span::current().record("call_id", call_id.as_str());

        let request = CallRequest::new(method, params);

        let mut instance = instance.lock().await;
        debug!("Instance acquired");
        instance.call(&request, call_id).await
    }

    /// Drop the guest loaded under `name`.
    ///
    /// # Errors
    ///
    /// Returns [`RuntimeError::ModuleNotFound`] if nothing is loaded under `name`.
    #[instrument(skip(self))]
    pub fn unload_module(&self, name: &str) -> Result<(), RuntimeError> {
        match self.modules.entry(name.to_string()) {
            Entry::Occupied(entry) => {
                self.directory.remove(name);
                entry.remove();
            }
            Entry::Vacant(_) => return Err(RuntimeError::module_not_found(name)),
        }

        info!(module = %name, "Module unloaded");
        Ok(())
    }

    /// Sorted names of the loaded modules.
    pub fn list_modules(&self) -> Vec<String> {
        self.directory.names()
    }

    /// Sorted names of the registered host functions.
    pub fn list_builtins(&self) -> Vec<String> {
        self.registry.list_registered().into_iter().collect()
    }

    /// Remove and return the messages logged by the guest under `name`.
    ///
    /// Waits for any call in flight on that guest to finish.
    ///
    /// # Errors
    ///
    /// Returns [`RuntimeError::ModuleNotFound`] if nothing is loaded under `name`.
    pub async fn take_logs(&self, name: &str) -> Result<Vec<LogEntry>, RuntimeError> {
        let instance = self
            .modules
            .get(name)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or_else(|| RuntimeError::module_not_found(name))?;

        let mut instance = instance.lock().await;
        Ok(instance.take_logs())
    }

    /// The host function registry.
    pub fn registry(&self) -> &HostRegistry {
        &self.registry
    }

    /// The runtime configuration.
    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    fn linker(&self) -> Result<Arc<Linker<GuestState>>, RuntimeError> {
        self.linker.clone().ok_or(RuntimeError::NotInitialized)
    }
}

impl std::fmt::Debug for HostRuntime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HostRuntime")
            .field("initialized", &self.is_initialized())
            .field("modules", &self.directory.names())
            .field("registry", &self.registry)
            .finish_non_exhaustive()
    }
}
