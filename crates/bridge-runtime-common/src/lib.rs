//! Common types, errors, and utilities for bridge-runtime.
//!
//! This crate provides shared functionality used across the bridge-runtime
//! workspace, on both sides of the host/guest boundary:
//! - Error types using `thiserror` for type-safe error handling
//! - The packed pointer/length [`Channel`] value
//! - The JSON call envelope ([`CallRequest`], [`CallResponse`])
//! - Configuration structures for runtime settings

pub mod channel;
pub mod config;
pub mod config_file;
pub mod envelope;
pub mod error;

pub use channel::Channel;
pub use config::{
    DuplicatePolicy, EngineConfig, ExecutionConfig, GuestAbiConfig, RegistryConfig, RuntimeConfig,
};
pub use config_file::{ConfigFile, ConfigFileError, ModuleSpec};
pub use envelope::{CallRequest, CallResponse, Params};
pub use error::{HostFunctionError, RuntimeError};
