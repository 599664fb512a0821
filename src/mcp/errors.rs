//! JSON-RPC error handling
//!
//! Error codes and the serializable `error` object used in JSON-RPC 2.0
//! responses. Standard codes follow the JSON-RPC specification; the two
//! domain codes cover connection teardown and backend timeouts.

use crate::error::GatewayError;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// JSON-RPC 2.0 error codes used by the gateway
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RpcErrorCode {
    // Standard JSON-RPC error codes
    ParseError = -32700,
    InvalidRequest = -32600,
    MethodNotFound = -32601,
    InvalidParams = -32602,
    InternalError = -32603,

    // Domain codes
    ConnectionClosed = -32000,
    RequestTimeout = -32001,
}

impl RpcErrorCode {
    /// Get the error code as i32
    pub fn code(&self) -> i32 {
        *self as i32
    }

    /// Get a default message for this error code
    pub fn default_message(&self) -> &'static str {
        match self {
            RpcErrorCode::ParseError => "Parse error",
            RpcErrorCode::InvalidRequest => "Invalid request",
            RpcErrorCode::MethodNotFound => "Method not found",
            RpcErrorCode::InvalidParams => "Invalid params",
            RpcErrorCode::InternalError => "Internal error",
            RpcErrorCode::ConnectionClosed => "Connection closed",
            RpcErrorCode::RequestTimeout => "Request timeout",
        }
    }
}

/// Serializable JSON-RPC error object
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpcError {
    /// Error code
    pub code: i32,
    /// Error message
    pub message: String,
    /// Additional error data (optional)
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub data: Option<Value>,
}

impl RpcError {
    /// Create a new error with an explicit message
    pub fn new(code: RpcErrorCode, message: impl Into<String>) -> Self {
        Self {
            code: code.code(),
            message: message.into(),
            data: None,
        }
    }

    /// Create a parse error
    pub fn parse_error(message: impl Into<String>) -> Self {
        Self::new(RpcErrorCode::ParseError, message)
    }

    /// Create an invalid request error
    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::new(RpcErrorCode::InvalidRequest, message)
    }

    /// Create a method not found error
    pub fn method_not_found(message: impl Into<String>) -> Self {
        Self::new(RpcErrorCode::MethodNotFound, message)
    }

    /// Create an invalid params error
    pub fn invalid_params(message: impl Into<String>) -> Self {
        Self::new(RpcErrorCode::InvalidParams, message)
    }

    /// Create an internal error
    pub fn internal_error(message: impl Into<String>) -> Self {
        Self::new(RpcErrorCode::InternalError, message)
    }

    /// Create a connection closed error
    pub fn connection_closed(message: impl Into<String>) -> Self {
        Self::new(RpcErrorCode::ConnectionClosed, message)
    }
}

/// Map gateway errors onto JSON-RPC error objects
impl From<GatewayError> for RpcError {
    fn from(error: GatewayError) -> Self {
        match &error {
            GatewayError::InvalidParams { message } => RpcError::invalid_params(message.clone()),
            GatewayError::SessionNotFound { .. } => {
                RpcError::invalid_request(error.to_string())
            }
            GatewayError::Timeout { message } => {
                RpcError::new(RpcErrorCode::RequestTimeout, message.clone())
            }
            _ => RpcError::internal_error(error.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_code_values() {
        assert_eq!(RpcErrorCode::ParseError.code(), -32700);
        assert_eq!(RpcErrorCode::InvalidRequest.code(), -32600);
        assert_eq!(RpcErrorCode::MethodNotFound.code(), -32601);
        assert_eq!(RpcErrorCode::InvalidParams.code(), -32602);
        assert_eq!(RpcErrorCode::InternalError.code(), -32603);
        assert_eq!(RpcErrorCode::ConnectionClosed.code(), -32000);
        assert_eq!(RpcErrorCode::RequestTimeout.code(), -32001);
    }

    #[test]
    fn test_gateway_error_mapping() {
        let err: RpcError = GatewayError::invalid_params("missing argument 'x'").into();
        assert_eq!(err.code, -32602);
        assert!(err.message.contains('x'));

        let err: RpcError = GatewayError::session_not_found("abc").into();
        assert_eq!(err.code, -32600);

        let err: RpcError = GatewayError::timeout("backend call").into();
        assert_eq!(err.code, -32001);
    }

    #[test]
    fn test_serialization_skips_empty_data() {
        let err = RpcError::method_not_found("Tool not found");
        let value = serde_json::to_value(&err).unwrap();
        assert_eq!(value["code"], -32601);
        assert!(value.get("data").is_none());
    }
}
