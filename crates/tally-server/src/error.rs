//! RPC error codes and the wire error object.

use serde::{Serialize, Serializer};
use serde_json::Value;

/// Closed set of error codes this service emits.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    /// Body could not be parsed.
    ParseError,
    /// Envelope failed validation.
    InvalidRequest,
    /// Method is allow-listed but has no handler.
    MethodNotFound,
    /// Params are missing or unusable.
    InvalidParams,
    /// Internal failure outside storage.
    InternalError,
    /// Storage failure or caught panic.
    ServerError,
}

impl ErrorCode {
    /// Numeric value sent on the wire.
    pub const fn code(self) -> i32 {
        match self {
            Self::ParseError => 32700,
            Self::InvalidRequest => 32600,
            Self::MethodNotFound => 32601,
            Self::InvalidParams => 32602,
            Self::InternalError => 32603,
            Self::ServerError => 32000,
        }
    }

    /// Label used for logs and metrics.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::ParseError => "PARSE_ERROR",
            Self::InvalidRequest => "INVALID_REQUEST",
            Self::MethodNotFound => "METHOD_NOT_FOUND",
            Self::InvalidParams => "INVALID_PARAMS",
            Self::InternalError => "INTERNAL_ERROR",
            Self::ServerError => "SERVER_ERROR",
        }
    }
}

impl Serialize for ErrorCode {
    fn serialize<S: Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_i32(self.code())
    }
}

/// Error object carried by a failed [`crate::Response`].
///
/// Empty messages and null data are left out of the serialized form.
#[derive(Clone, Debug, PartialEq, Serialize, thiserror::Error)]
#[error("{} ({})", .message.as_deref().unwrap_or(""), .code.code())]
pub struct RpcError {
    /// Closed-set error code.
    pub code: ErrorCode,
    /// Human-readable message.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    /// Structured details, e.g. the underlying storage error.
    pub data: Option<Value>,
}

impl RpcError {
    /// Error with a message and no data.
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        let message = message.into();
        Self {
            code,
            message: (!message.is_empty()).then_some(message),
            data: None,
        }
    }

    /// Attach structured details. Null is ignored.
    pub fn with_data(mut self, data: Value) -> Self {
        self.data = (!data.is_null()).then_some(data);
        self
    }

    /// Fixed response for any envelope that failed validation.
    pub fn invalid_request() -> Self {
        Self::new(ErrorCode::InvalidRequest, "Request is not valid!")
    }

    /// Allow-listed method without a handler.
    pub fn method_not_found(method: &str) -> Self {
        Self::new(ErrorCode::MethodNotFound, format!("Method '{method}' is not implemented!"))
    }

    /// Unusable params.
    pub fn invalid_params(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidParams, message)
    }

    /// Storage failure or caught panic.
    pub fn server_error(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::ServerError, message)
    }
}
