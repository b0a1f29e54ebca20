//! Error types for the bridge-runtime.
//!
//! This module defines a hierarchy of error types using `thiserror`:
//! - [`RuntimeError`]: Top-level errors for loading guests and calling into them
//! - [`HostFunctionError`]: Errors from host function implementations

use thiserror::Error;

/// Top-level runtime errors.
///
/// Engine-level and memory-bound failures abort the current call and are
/// reported as their own variants. A well-formed response carrying an
/// `error` string is reported as [`RuntimeError::Application`], which is
/// distinct from an unreadable envelope ([`RuntimeError::Protocol`]).
#[derive(Error, Debug)]
pub enum RuntimeError {
    /// `load_module` or `call` was invoked before `init`.
    #[error("Runtime not initialized")]
    NotInitialized,

    /// The engine could not compile or instantiate a guest binary.
    #[error("Instantiation failed: {reason}")]
    Instantiation {
        /// Description of the engine failure.
        reason: String,
    },

    /// No guest is loaded under the requested name.
    #[error("Module not found: {module_id}")]
    ModuleNotFound {
        /// The name of the module that was not found.
        module_id: String,
    },

    /// No host function is registered under the requested name.
    #[error("method not found: {method}")]
    MethodNotFound {
        /// The requested method name.
        method: String,
    },

    /// A host function is already registered under this name.
    #[error("Duplicate host function: {name}")]
    DuplicateName {
        /// The conflicting name.
        name: String,
    },

    /// A linear-memory access exceeded the target's current memory size.
    #[error("Memory access out of range: offset {offset} + length {len} exceeds memory size {memory_size}")]
    MemoryOutOfRange {
        /// Start offset of the access.
        offset: u32,
        /// Length of the access in bytes.
        len: u32,
        /// Memory size at the time of the access.
        memory_size: usize,
    },

    /// The target's allocator call failed.
    #[error("Allocation failed: {reason}")]
    Allocation {
        /// Description of the allocator failure.
        reason: String,
    },

    /// The call envelope could not be encoded or decoded.
    #[error("Protocol error: {reason}")]
    Protocol {
        /// Description of the envelope failure.
        reason: String,
    },

    /// The callee understood the request but the operation failed.
    #[error("Application error: {message}")]
    Application {
        /// The `error` string from the response, verbatim.
        message: String,
    },

    /// A host function returned an error.
    #[error("Host function error: {0}")]
    HostFunction(#[from] HostFunctionError),

    /// Execution exhausted the configured fuel limit.
    #[error("Fuel exhausted: CPU limit exceeded")]
    FuelExhausted,

    /// A WebAssembly trap occurred inside a guest export.
    #[error("Wasm trap: {message}")]
    Trap {
        /// Description of the trap.
        message: String,
    },

    /// Invalid configuration was provided.
    #[error("Invalid configuration: {reason}")]
    InvalidConfig {
        /// Description of the configuration error.
        reason: String,
    },
}

/// Errors from host function implementations.
///
/// The display string of these errors becomes the `error` field of the
/// response envelope returned to the guest.
#[derive(Error, Debug)]
pub enum HostFunctionError {
    /// Invalid argument was passed to a host function.
    #[error("Invalid argument: {reason}")]
    InvalidArgument {
        /// Description of why the argument was invalid.
        reason: String,
    },

    /// The host function ran but could not complete.
    #[error("{message}")]
    Failed {
        /// Failure message forwarded to the guest.
        message: String,
    },
}

impl HostFunctionError {
    /// Create a new `InvalidArgument` error.
    pub fn invalid_argument(reason: impl Into<String>) -> Self {
        Self::InvalidArgument {
            reason: reason.into(),
        }
    }

    /// Create a new `Failed` error.
    pub fn failed(message: impl Into<String>) -> Self {
        Self::Failed {
            message: message.into(),
        }
    }
}

impl RuntimeError {
    /// Create a new `Instantiation` error.
    pub fn instantiation(reason: impl Into<String>) -> Self {
        Self::Instantiation {
            reason: reason.into(),
        }
    }

    /// Create a new `ModuleNotFound` error.
    pub fn module_not_found(module_id: impl Into<String>) -> Self {
        Self::ModuleNotFound {
            module_id: module_id.into(),
        }
    }

    /// Create a new `MethodNotFound` error.
    pub fn method_not_found(method: impl Into<String>) -> Self {
        Self::MethodNotFound {
            method: method.into(),
        }
    }

    /// Create a new `DuplicateName` error.
    pub fn duplicate_name(name: impl Into<String>) -> Self {
        Self::DuplicateName { name: name.into() }
    }

    /// Create a new `Allocation` error.
    pub fn allocation(reason: impl Into<String>) -> Self {
        Self::Allocation {
            reason: reason.into(),
        }
    }

    /// Create a new `Protocol` error.
    pub fn protocol(reason: impl Into<String>) -> Self {
        Self::Protocol {
            reason: reason.into(),
        }
    }

    /// Create a new `Application` error.
    pub fn application(message: impl Into<String>) -> Self {
        Self::Application {
            message: message.into(),
        }
    }

    /// Create a new `Trap` error.
    pub fn trap(message: impl Into<String>) -> Self {
        Self::Trap {
            message: message.into(),
        }
    }

    /// Create a new `InvalidConfig` error.
    pub fn invalid_config(reason: impl Into<String>) -> Self {
        Self::InvalidConfig {
            reason: reason.into(),
        }
    }

    /// Returns `true` if this error indicates the module was not found.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::ModuleNotFound { .. })
    }

    /// Returns `true` if the callee reported the failure inside a well-formed
    /// response rather than the call itself failing.
    pub fn is_application(&self) -> bool {
        matches!(self, Self::Application { .. })
    }

    /// The application error message, if this is an application error.
    pub fn application_message(&self) -> Option<&str> {
        match self {
            Self::Application { message } => Some(message),
            _ => None,
        }
    }
}
