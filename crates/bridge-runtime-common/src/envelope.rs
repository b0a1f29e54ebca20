//! JSON call envelope.
//!
//! Requests are `{"method": "...", "params": {...}}`; responses are
//! `{"result": ...}` or `{"error": "..."}`. Both directions (host → guest and
//! guest → host) use the same envelope.
//!
//! An envelope that cannot be decoded is a [`RuntimeError::Protocol`]: the
//! receiver cannot know whether the callee produced anything. A decoded
//! response with a non-empty `error` is a [`RuntimeError::Application`].

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::RuntimeError;

/// Call parameters: a JSON object keyed by parameter name.
pub type Params = serde_json::Map<String, Value>;

/// A request to invoke `method` on the other side of the boundary.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct CallRequest {
    /// Name of the method to invoke.
    pub method: String,

    /// Parameters; `None` when absent or `null` on the wire.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<Params>,
}

impl CallRequest {
    /// Create a request.
    pub fn new(method: impl Into<String>, params: Option<Params>) -> Self {
        Self {
            method: method.into(),
            params,
        }
    }

    /// Take the parameters, treating absent parameters as an empty object.
    pub fn into_params(self) -> Params {
        self.params.unwrap_or_default()
    }
}

/// The outcome of a call.
///
/// Exactly one of `result` and `error` is meaningful. A non-empty `error`
/// marks the call failed regardless of `result`.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct CallResponse {
    /// Result value on success.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,

    /// Error message on failure.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl CallResponse {
    /// A successful response.
    pub fn ok(result: Value) -> Self {
        Self {
            result: Some(result),
            error: None,
        }
    }

    /// A failed response.
    pub fn err(message: impl Into<String>) -> Self {
        Self {
            result: None,
            error: Some(message.into()),
        }
    }

    /// Returns `true` if the response reports a failure.
    pub fn is_error(&self) -> bool {
        self.error.as_deref().is_some_and(|e| !e.is_empty())
    }

    /// Convert into the call outcome.
    ///
    /// A missing `result` on success is `null`.
    pub fn into_result(self) -> Result<Value, RuntimeError> {
        match self.error {
            Some(message) if !message.is_empty() => Err(RuntimeError::application(message)),
            _ => Ok(self.result.unwrap_or(Value::Null)),
        }
    }
}

impl From<Result<Value, RuntimeError>> for CallResponse {
    fn from(outcome: Result<Value, RuntimeError>) -> Self {
        match outcome {
            Ok(value) => Self::ok(value),
            Err(RuntimeError::Application { message }) => Self::err(message),
            Err(RuntimeError::HostFunction(e)) => Self::err(e.to_string()),
            Err(e) => Self::err(e.to_string()),
        }
    }
}

/// Serialize a request.
pub fn encode_request(request: &CallRequest) -> Result<Vec<u8>, RuntimeError> {
    serde_json::to_vec(request)
        .map_err(|e| RuntimeError::protocol(format!("Failed to encode request: {e}")))
}

/// Deserialize a request.
pub fn decode_request(bytes: &[u8]) -> Result<CallRequest, RuntimeError> {
    serde_json::from_slice(bytes)
        .map_err(|e| RuntimeError::protocol(format!("Malformed request envelope: {e}")))
}

/// Serialize a response.
pub fn encode_response(response: &CallResponse) -> Result<Vec<u8>, RuntimeError> {
    serde_json::to_vec(response)
        .map_err(|e| RuntimeError::protocol(format!("Failed to encode response: {e}")))
}

/// Deserialize a response.
pub fn decode_response(bytes: &[u8]) -> Result<CallResponse, RuntimeError> {
    serde_json::from_slice(bytes)
        .map_err(|e| RuntimeError::protocol(format!("Malformed response envelope: {e}")))
}
