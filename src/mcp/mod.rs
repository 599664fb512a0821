//! MCP protocol implementation
//!
//! Wire types and error codes for the JSON-RPC 2.0 dialect spoken on the
//! public listener and towards backend MCP servers.

pub mod errors;
pub mod types;

pub use errors::{RpcError, RpcErrorCode};
pub use types::{
    CallToolParams, CallToolResult, Implementation, InitializeResult, JsonRpcRequest,
    JsonRpcResponse, ListToolsResult, ToolContent, ToolSchema,
};
