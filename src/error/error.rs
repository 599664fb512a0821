//! Error types and handling for the MCP Gateway

use thiserror::Error;

/// Result type alias for MCP Gateway operations
pub type Result<T> = std::result::Result<T, GatewayError>;

/// Main error type for the MCP Gateway
#[derive(Error, Debug)]
pub enum GatewayError {
    /// Configuration errors
    #[error("Configuration error: {message}")]
    Config { message: String },

    /// Merge conflicts between configuration documents
    #[error("Configuration conflict: {message}")]
    Conflict { message: String },

    /// Session store errors
    #[error("Session error: {message}")]
    Session { message: String },

    /// Lookup of a session id with no live session
    #[error("Session not found: {id}")]
    SessionNotFound { id: String },

    /// Template parse errors (config time)
    #[error("Template error: {message}")]
    Template { message: String },

    /// Bad caller-supplied parameters (maps to JSON-RPC InvalidParams)
    #[error("Invalid params: {message}")]
    InvalidParams { message: String },

    /// Backend transport errors (network, subprocess, backend protocol)
    #[error("Transport error: {message}")]
    Transport { message: String },

    /// Timeouts on backend calls
    #[error("Timeout: {message}")]
    Timeout { message: String },

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization errors
    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    /// YAML parsing errors
    #[error("YAML parsing error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// HTTP client errors
    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),

    /// Redis errors (shared session store)
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    /// Generic errors
    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl GatewayError {
    /// Create a configuration error
    pub fn config<S: Into<String>>(message: S) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Create a merge conflict error
    pub fn conflict<S: Into<String>>(message: S) -> Self {
        Self::Conflict {
            message: message.into(),
        }
    }

    /// Create a session store error
    pub fn session<S: Into<String>>(message: S) -> Self {
        Self::Session {
            message: message.into(),
        }
    }

    /// Create a session-not-found error
    pub fn session_not_found<S: Into<String>>(id: S) -> Self {
        Self::SessionNotFound { id: id.into() }
    }

    /// Create a template parse error
    pub fn template<S: Into<String>>(message: S) -> Self {
        Self::Template {
            message: message.into(),
        }
    }

    /// Create an invalid-params error
    pub fn invalid_params<S: Into<String>>(message: S) -> Self {
        Self::InvalidParams {
            message: message.into(),
        }
    }

    /// Create a transport error
    pub fn transport<S: Into<String>>(message: S) -> Self {
        Self::Transport {
            message: message.into(),
        }
    }

    /// Create a timeout error
    pub fn timeout<S: Into<String>>(message: S) -> Self {
        Self::Timeout {
            message: message.into(),
        }
    }

    /// Get the error category for logging
    pub fn category(&self) -> &'static str {
        match self {
            GatewayError::Config { .. } => "config",
            GatewayError::Conflict { .. } => "conflict",
            GatewayError::Session { .. } => "session",
            GatewayError::SessionNotFound { .. } => "session",
            GatewayError::Template { .. } => "template",
            GatewayError::InvalidParams { .. } => "invalid_params",
            GatewayError::Transport { .. } => "transport",
            GatewayError::Timeout { .. } => "timeout",
            GatewayError::Io(_) => "io",
            GatewayError::Serde(_) => "serialization",
            GatewayError::Yaml(_) => "yaml",
            GatewayError::Http(_) => "http",
            GatewayError::Redis(_) => "redis",
            GatewayError::Internal(_) => "internal",
        }
    }
}
