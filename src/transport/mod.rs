//! Backend transports
//!
//! Per-invocation adapters speaking MCP to backend servers. Both transports
//! are one-shot: a fresh client per call runs `initialize`, the requested
//! operation, and is discarded, so no backend state leaks across distinct
//! client sessions. Pooling would be a legitimate optimisation but must
//! preserve that isolation.

mod stdio;
mod streamable;

use crate::config::{McpServerConfig, McpServerType};
use crate::error::{GatewayError, Result};
use crate::mcp::{CallToolResult, ToolSchema};
use serde_json::Value;
use std::collections::HashMap;

/// Timeout for the backend `initialize` exchange
pub(crate) const CONNECT_TIMEOUT_SECS: u64 = 30;

/// Timeout for a backend tool call
pub(crate) const REQUEST_TIMEOUT_SECS: u64 = 120;

/// Execute a tool call against a backend MCP server
///
/// `headers` carries the forwarded client headers (streamable transport);
/// `env` the rendered environment (stdio transport).
pub async fn call_tool(
    server: &McpServerConfig,
    tool_name: &str,
    arguments: &Value,
    headers: &HashMap<String, String>,
    env: &HashMap<String, String>,
) -> Result<CallToolResult> {
    match server.server_type {
        McpServerType::Streamable => {
            let url = server_url(server)?;
            streamable::call_tool(url, headers, tool_name, arguments).await
        }
        McpServerType::Stdio => {
            let command = server_command(server)?;
            stdio::call_tool(command, &server.args, env, tool_name, arguments).await
        }
    }
}

/// Fetch the backend's tool list (used by proxied prefixes)
pub async fn list_tools(
    server: &McpServerConfig,
    headers: &HashMap<String, String>,
    env: &HashMap<String, String>,
) -> Result<Vec<ToolSchema>> {
    match server.server_type {
        McpServerType::Streamable => {
            let url = server_url(server)?;
            streamable::list_tools(url, headers).await
        }
        McpServerType::Stdio => {
            let command = server_command(server)?;
            stdio::list_tools(command, &server.args, env).await
        }
    }
}

fn server_url(server: &McpServerConfig) -> Result<&str> {
    server
        .url
        .as_deref()
        .filter(|u| !u.is_empty())
        .ok_or_else(|| {
            GatewayError::transport(format!("MCP server '{}' has no url", server.name))
        })
}

fn server_command(server: &McpServerConfig) -> Result<&str> {
    server
        .command
        .as_deref()
        .filter(|c| !c.is_empty())
        .ok_or_else(|| {
            GatewayError::transport(format!("MCP server '{}' has no command", server.name))
        })
}
