//! Streamable-HTTP backend transport
//!
//! JSON-RPC over HTTP request/response against the backend's MCP endpoint.
//! The backend may assign its own session id on `initialize`; it is carried
//! on the follow-up calls alongside the headers forwarded from the client.

use crate::error::{GatewayError, Result};
use crate::mcp::types::{
    HEADER_MCP_SESSION_ID, LATEST_PROTOCOL_VERSION, METHOD_INITIALIZE,
    METHOD_NOTIFICATION_INITIALIZED, METHOD_TOOLS_CALL, METHOD_TOOLS_LIST, SERVER_NAME,
};
use crate::mcp::{CallToolResult, JsonRpcRequest, JsonRpcResponse, ListToolsResult, ToolSchema};
use crate::transport::{CONNECT_TIMEOUT_SECS, REQUEST_TIMEOUT_SECS};
use reqwest::Client;
use serde_json::{json, Value};
use std::collections::HashMap;
use tokio::time::Duration;
use tracing::debug;

struct StreamableClient {
    http: Client,
    url: String,
    headers: HashMap<String, String>,
    backend_session: Option<String>,
    next_id: u64,
}

impl StreamableClient {
    fn new(url: &str, headers: &HashMap<String, String>) -> Result<Self> {
        let http = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .connect_timeout(Duration::from_secs(CONNECT_TIMEOUT_SECS))
            .build()
            .map_err(|e| GatewayError::transport(format!("failed to create HTTP client: {}", e)))?;
        Ok(Self {
            http,
            url: url.to_string(),
            headers: headers.clone(),
            backend_session: None,
            next_id: 1,
        })
    }

    async fn initialize(&mut self) -> Result<()> {
        let params = json!({
            "protocolVersion": LATEST_PROTOCOL_VERSION,
            "capabilities": {},
            "clientInfo": {
                "name": SERVER_NAME,
                "version": env!("CARGO_PKG_VERSION"),
            },
        });
        self.request(METHOD_INITIALIZE, Some(params)).await?;
        self.notify(METHOD_NOTIFICATION_INITIALIZED).await;
        Ok(())
    }

    async fn request(&mut self, method: &str, params: Option<Value>) -> Result<Value> {
        let id = self.next_id;
        self.next_id += 1;
        let request = JsonRpcRequest::new(id, method, params);

        let mut builder = self
            .http
            .post(&self.url)
            .header("Content-Type", "application/json")
            .header("Accept", "application/json");
        for (key, value) in &self.headers {
            builder = builder.header(key, value);
        }
        if let Some(ref session) = self.backend_session {
            builder = builder.header(HEADER_MCP_SESSION_ID, session);
        }

        let response = builder.json(&request).send().await.map_err(|e| {
            GatewayError::transport(format!("request to {} failed: {}", self.url, e))
        })?;

        let status = response.status();
        if let Some(session) = response
            .headers()
            .get(HEADER_MCP_SESSION_ID)
            .and_then(|v| v.to_str().ok())
        {
            self.backend_session = Some(session.to_string());
        }
        if !status.is_success() {
            return Err(GatewayError::transport(format!(
                "backend {} returned HTTP {}",
                self.url, status
            )));
        }

        let rpc: JsonRpcResponse = response.json().await.map_err(|e| {
            GatewayError::transport(format!("invalid JSON-RPC response from {}: {}", self.url, e))
        })?;
        if let Some(error) = rpc.error {
            return Err(GatewayError::transport(format!(
                "backend error {}: {}",
                error.code, error.message
            )));
        }
        rpc.result.ok_or_else(|| {
            GatewayError::transport(format!("backend {} returned an empty result", self.url))
        })
    }

    /// Fire-and-forget notification; backends answer 202 with no body
    async fn notify(&mut self, method: &str) {
        let notification = json!({"jsonrpc": "2.0", "method": method});
        let mut builder = self
            .http
            .post(&self.url)
            .header("Content-Type", "application/json");
        for (key, value) in &self.headers {
            builder = builder.header(key, value);
        }
        if let Some(ref session) = self.backend_session {
            builder = builder.header(HEADER_MCP_SESSION_ID, session);
        }
        if let Err(e) = builder.json(&notification).send().await {
            debug!("Notification '{}' to {} failed: {}", method, self.url, e);
        }
    }
}

/// One-shot tool call: initialize, call, discard the client
pub async fn call_tool(
    url: &str,
    headers: &HashMap<String, String>,
    tool_name: &str,
    arguments: &Value,
) -> Result<CallToolResult> {
    let mut client = StreamableClient::new(url, headers)?;
    client.initialize().await?;

    let result = client
        .request(
            METHOD_TOOLS_CALL,
            Some(json!({"name": tool_name, "arguments": arguments})),
        )
        .await?;
    serde_json::from_value(result).map_err(|e| {
        GatewayError::transport(format!("invalid tool result from {}: {}", url, e))
    })
}

/// One-shot tool listing
pub async fn list_tools(url: &str, headers: &HashMap<String, String>) -> Result<Vec<ToolSchema>> {
    let mut client = StreamableClient::new(url, headers)?;
    client.initialize().await?;

    let result = client.request(METHOD_TOOLS_LIST, None).await?;
    let list: ListToolsResult = serde_json::from_value(result).map_err(|e| {
        GatewayError::transport(format!("invalid tool list from {}: {}", url, e))
    })?;
    Ok(list.tools)
}
