//! MCP Gateway - API gateway for the Model-Context-Protocol
//!
//! This crate terminates MCP clients (JSON-RPC 2.0 over HTTP POST and SSE),
//! routes tool invocations by URL prefix to configured servers, and executes
//! them against HTTP endpoints or backend MCP servers reached over
//! streamable-HTTP or subprocess-stdio transports. Configuration hot-reloads
//! without dropping live sessions.

pub mod config;
pub mod error;
pub mod gateway;
pub mod mcp;
pub mod session;
pub mod template;
pub mod transport;
pub mod utils;

pub use config::{GatewaySettings, GatewaySnapshot};
pub use error::{GatewayError, Result};

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default settings file name
pub const DEFAULT_CONFIG_FILE: &str = "gateway.yaml";
