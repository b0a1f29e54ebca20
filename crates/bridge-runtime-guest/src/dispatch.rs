//! Method table for the guest's dispatch entry point.

use std::collections::HashMap;

use serde_json::Value;

use bridge_runtime_common::{CallResponse, Params, envelope};

/// Error returned for methods with no registered handler.
pub const METHOD_NOT_FOUND: &str = "method not found";

/// A guest method handler. `Err` becomes the envelope's `error` field.
pub type Handler = Box<dyn Fn(Params) -> Result<Value, String> + Send + Sync>;

/// Maps method names to handlers and speaks the envelope on their behalf.
#[derive(Default)]
pub struct Dispatcher {
    handlers: HashMap<String, Handler>,
}

impl Dispatcher {
    /// Create an empty dispatcher.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handler` under `method`, replacing any previous handler.
    pub fn register<F>(&mut self, method: impl Into<String>, handler: F) -> &mut Self
    where
        F: Fn(Params) -> Result<Value, String> + Send + Sync + 'static,
    {
        self.handlers.insert(method.into(), Box::new(handler));
        self
    }

    /// Builder form of [`register`](Self::register).
    #[must_use]
    pub fn with<F>(mut self, method: impl Into<String>, handler: F) -> Self
    where
        F: Fn(Params) -> Result<Value, String> + Send + Sync + 'static,
    {
        self.register(method, handler);
        self
    }

    /// Decode a request envelope, run its handler and encode the response.
    ///
    /// Never fails: unknown methods and undecodable requests are answered
    /// with an `error` envelope.
    pub fn handle(&self, request: &[u8]) -> Vec<u8> {
        let response = match envelope::decode_request(request) {
            Ok(request) => match self.handlers.get(&request.method) {
                Some(handler) => match handler(request.into_params()) {
                    Ok(result) => CallResponse::ok(result),
                    Err(message) => CallResponse::err(message),
                },
                None => CallResponse::err(METHOD_NOT_FOUND),
            },
            Err(e) => CallResponse::err(e.to_string()),
        };

        envelope::encode_response(&response)
            .unwrap_or_else(|_| br#"{"error":"failed to encode response"}"#.to_vec())
    }

    /// Sorted names of the registered methods.
    pub fn methods(&self) -> Vec<&str> {
        let mut methods: Vec<_> = self.handlers.keys().map(String::as_str).collect();
        methods.sort_unstable();
        methods
    }
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("methods", &self.methods())
            .finish()
    }
}
