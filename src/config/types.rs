//! Configuration document types
//!
//! A `ConfigDocument` is the unit returned by the config store: servers,
//! routers, tools and backend MCP servers, merged into a `GatewaySnapshot`
//! before use.

use crate::mcp::ToolSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

/// One configuration document from the config store
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConfigDocument {
    /// Document name, defaults to the source file stem
    #[serde(default)]
    pub name: String,
    /// Logical servers exposing template tools
    #[serde(default)]
    pub servers: Vec<ServerConfig>,
    /// Prefix → server routing entries
    #[serde(default)]
    pub routers: Vec<RouterConfig>,
    /// Tool definitions
    #[serde(default)]
    pub tools: Vec<ToolDefinition>,
    /// Backend MCP servers used for remote proxying
    #[serde(rename = "mcpServers", default)]
    pub mcp_servers: Vec<McpServerConfig>,
}

/// A logical server: a named set of allowed tools plus free-form config
/// values exposed to tool templates
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Server name (unique within a snapshot)
    pub name: String,
    /// Human-readable description
    #[serde(default)]
    pub description: String,
    /// Names of tools callable through this server
    #[serde(rename = "allowedTools", default)]
    pub allowed_tools: Vec<String>,
    /// Free-form key/value config available to templates as `config.*`
    #[serde(default)]
    pub config: HashMap<String, String>,
}

/// Routes a URL prefix to a server or backend MCP server by name
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouterConfig {
    /// URL path segment preceding `/mcp`; exact match, unique, non-empty
    pub prefix: String,
    /// Name of the `servers` or `mcpServers` entry handling the prefix
    pub server: String,
}

/// Templated outbound HTTP request for an HTTP-method tool
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RequestTemplate {
    /// Target URL template
    #[serde(default)]
    pub url: String,
    /// Header templates, rendered per call
    #[serde(default)]
    pub headers: HashMap<String, String>,
    /// Body template; empty means forward the caller arguments as JSON
    #[serde(default)]
    pub body: String,
}

/// Templated projection of the backend response
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResponseTemplate {
    /// Body template; empty means return the raw response body
    #[serde(default)]
    pub body: String,
}

fn default_input_schema() -> Value {
    serde_json::json!({"type": "object", "properties": {}})
}

/// A tool definition
///
/// `method` is an HTTP verb for template tools, or `"streamable"`/`"stdio"`
/// for tools forwarded to a backend MCP server named by `server`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDefinition {
    /// Tool name (globally unique within a snapshot)
    pub name: String,
    /// Human-readable description
    #[serde(default)]
    pub description: String,
    /// HTTP verb, "streamable" or "stdio"
    pub method: String,
    /// JSON Schema for caller arguments
    #[serde(rename = "inputSchema", default = "default_input_schema")]
    pub input_schema: Value,
    /// Outbound request template (HTTP-method tools)
    #[serde(rename = "requestTemplate", default)]
    pub request_template: RequestTemplate,
    /// Response projection template
    #[serde(rename = "responseTemplate", default)]
    pub response_template: ResponseTemplate,
    /// Backend MCP server name for streamable/stdio tools; defaults to the
    /// tool's own name
    #[serde(default)]
    pub server: Option<String>,
    /// Environment templates passed to stdio backends
    #[serde(default)]
    pub env: HashMap<String, String>,
}

impl ToolDefinition {
    /// Whether this tool is forwarded to a backend MCP server rather than
    /// rendered as an HTTP request
    pub fn is_proxied(&self) -> bool {
        matches!(self.method.as_str(), "streamable" | "stdio")
    }

    /// Name of the backend MCP server a proxied tool targets
    pub fn backend_name(&self) -> &str {
        self.server.as_deref().unwrap_or(&self.name)
    }

    /// Client-facing projection of this tool
    pub fn schema(&self) -> ToolSchema {
        ToolSchema {
            name: self.name.clone(),
            description: if self.description.is_empty() {
                None
            } else {
                Some(self.description.clone())
            },
            input_schema: self.input_schema.clone(),
        }
    }
}

/// Transport type of a backend MCP server
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum McpServerType {
    /// JSON-RPC over HTTP request/response
    Streamable,
    /// Locally spawned subprocess speaking line-framed JSON-RPC on stdio
    Stdio,
}

/// A backend MCP server reachable through one of the transports
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct McpServerConfig {
    /// Server name (unique within a snapshot)
    pub name: String,
    /// Transport type
    #[serde(rename = "type")]
    pub server_type: McpServerType,
    /// Base URL for the streamable transport
    #[serde(default)]
    pub url: Option<String>,
    /// Command for the stdio transport
    #[serde(default)]
    pub command: Option<String>,
    /// Command arguments
    #[serde(default)]
    pub args: Vec<String>,
    /// Environment templates for the subprocess
    #[serde(default)]
    pub env: HashMap<String, String>,
}
