//! MCP protocol types
//!
//! Wire-level JSON-RPC 2.0 structures and the canonical MCP method set
//! (`initialize`, `notifications/initialized`, `tools/list`, `tools/call`).

use crate::error::{GatewayError, Result};
use crate::mcp::errors::RpcError;
use jsonschema::JSONSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Protocol version advertised in `initialize` responses
pub const LATEST_PROTOCOL_VERSION: &str = "2025-03-26";

/// Server name reported in `serverInfo`
pub const SERVER_NAME: &str = "mcp-gateway";

/// Header carrying the session id on requests and responses
pub const HEADER_MCP_SESSION_ID: &str = "Mcp-Session-Id";

/// Canonical MCP method names
pub const METHOD_INITIALIZE: &str = "initialize";
pub const METHOD_NOTIFICATION_INITIALIZED: &str = "notifications/initialized";
pub const METHOD_TOOLS_LIST: &str = "tools/list";
pub const METHOD_TOOLS_CALL: &str = "tools/call";

/// JSON-RPC 2.0 request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcRequest {
    /// Protocol marker, always "2.0"
    pub jsonrpc: String,
    /// Request id; absent for notifications
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub id: Option<Value>,
    /// Method name
    pub method: String,
    /// Method parameters
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub params: Option<Value>,
}

impl JsonRpcRequest {
    /// Build a request with a generated string id
    pub fn new(id: impl Into<Value>, method: &str, params: Option<Value>) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id: Some(id.into()),
            method: method.to_string(),
            params,
        }
    }

    /// A request without an id is a notification and gets no reply
    pub fn is_notification(&self) -> bool {
        self.id.is_none()
    }

    /// The response id to echo: the request id, or JSON null for notifications
    pub fn response_id(&self) -> Value {
        self.id.clone().unwrap_or(Value::Null)
    }
}

/// JSON-RPC 2.0 response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcResponse {
    pub jsonrpc: String,
    pub id: Value,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub error: Option<RpcError>,
}

impl JsonRpcResponse {
    /// Build a success response
    pub fn success(id: Value, result: Value) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id,
            result: Some(result),
            error: None,
        }
    }

    /// Build an error response
    pub fn error(id: Value, error: RpcError) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id,
            result: None,
            error: Some(error),
        }
    }
}

/// Tool description exposed to clients in `tools/list`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolSchema {
    /// Tool name (unique identifier)
    pub name: String,
    /// Human-readable description
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub description: Option<String>,
    /// JSON Schema for input parameters
    #[serde(rename = "inputSchema")]
    pub input_schema: Value,
}

impl ToolSchema {
    /// Check that the input schema compiles as a JSON Schema
    pub fn validate_input_schema(&self) -> Result<()> {
        match JSONSchema::compile(&self.input_schema) {
            Ok(_) => Ok(()),
            Err(e) => Err(GatewayError::config(format!(
                "Invalid JSON Schema for tool '{}': {}",
                self.name, e
            ))),
        }
    }
}

/// Parameters of a `tools/call` request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallToolParams {
    /// Tool name
    pub name: String,
    /// Caller arguments, an object
    #[serde(default)]
    pub arguments: Value,
}

/// A single content block inside a tool result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolContent {
    #[serde(rename = "type")]
    pub content_type: String,
    pub text: String,
}

impl ToolContent {
    /// Text content block
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            content_type: "text".to_string(),
            text: text.into(),
        }
    }
}

/// Result of a `tools/call`
///
/// Tool execution failures are data, not protocol errors: they travel as
/// `is_error = true` inside a successful JSON-RPC result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallToolResult {
    pub content: Vec<ToolContent>,
    #[serde(rename = "isError")]
    pub is_error: bool,
}

impl CallToolResult {
    /// Successful result wrapping plain text
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            content: vec![ToolContent::text(text)],
            is_error: false,
        }
    }

    /// Failed result carrying the error message as text
    pub fn error_text(text: impl Into<String>) -> Self {
        Self {
            content: vec![ToolContent::text(text)],
            is_error: true,
        }
    }
}

/// Result of `tools/list`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListToolsResult {
    pub tools: Vec<ToolSchema>,
}

/// `logging` capability marker (empty object on the wire)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LoggingCapability {}

/// `tools` capability flags
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolsCapability {
    #[serde(rename = "listChanged")]
    pub list_changed: bool,
}

/// Capabilities advertised by the gateway
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerCapabilities {
    pub logging: LoggingCapability,
    pub tools: ToolsCapability,
}

/// Name/version pair identifying an MCP implementation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Implementation {
    pub name: String,
    pub version: String,
}

/// Result of `initialize`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InitializeResult {
    #[serde(rename = "protocolVersion")]
    pub protocol_version: String,
    pub capabilities: ServerCapabilities,
    #[serde(rename = "serverInfo")]
    pub server_info: Implementation,
}

impl InitializeResult {
    /// The gateway's standard initialize response
    pub fn gateway() -> Self {
        Self {
            protocol_version: LATEST_PROTOCOL_VERSION.to_string(),
            capabilities: ServerCapabilities {
                logging: LoggingCapability::default(),
                tools: ToolsCapability { list_changed: true },
            },
            server_info: Implementation {
                name: SERVER_NAME.to_string(),
                version: env!("CARGO_PKG_VERSION").to_string(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_notification_detection() {
        let req: JsonRpcRequest =
            serde_json::from_value(json!({"jsonrpc": "2.0", "method": "notifications/initialized"}))
                .unwrap();
        assert!(req.is_notification());
        assert_eq!(req.response_id(), Value::Null);

        let req: JsonRpcRequest =
            serde_json::from_value(json!({"jsonrpc": "2.0", "id": 7, "method": "tools/list"}))
                .unwrap();
        assert!(!req.is_notification());
        assert_eq!(req.response_id(), json!(7));
    }

    #[test]
    fn test_call_tool_result_wire_shape() {
        let result = CallToolResult::text("hi");
        let value = serde_json::to_value(&result).unwrap();
        assert_eq!(value["content"][0]["type"], "text");
        assert_eq!(value["content"][0]["text"], "hi");
        assert_eq!(value["isError"], false);

        let result = CallToolResult::error_text("backend unreachable");
        let value = serde_json::to_value(&result).unwrap();
        assert_eq!(value["isError"], true);
    }

    #[test]
    fn test_initialize_result_shape() {
        let value = serde_json::to_value(InitializeResult::gateway()).unwrap();
        assert_eq!(value["protocolVersion"], LATEST_PROTOCOL_VERSION);
        assert_eq!(value["serverInfo"]["name"], "mcp-gateway");
        assert_eq!(value["capabilities"]["tools"]["listChanged"], true);
    }

    #[test]
    fn test_tool_schema_validation() {
        let tool = ToolSchema {
            name: "echo".to_string(),
            description: None,
            input_schema: json!({"type": "object", "properties": {"x": {"type": "string"}}}),
        };
        assert!(tool.validate_input_schema().is_ok());

        let bad = ToolSchema {
            name: "bad".to_string(),
            description: None,
            input_schema: json!({"type": 42}),
        };
        assert!(bad.validate_input_schema().is_err());
    }
}
