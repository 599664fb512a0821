//! Subprocess-stdio backend transport
//!
//! Spawns the configured command and speaks line-framed JSON-RPC over its
//! stdin/stdout. The child is killed when the request is cancelled
//! (kill-on-drop) and after a bounded grace once the call completes.

use crate::error::{GatewayError, Result};
use crate::mcp::types::{
    LATEST_PROTOCOL_VERSION, METHOD_INITIALIZE, METHOD_NOTIFICATION_INITIALIZED,
    METHOD_TOOLS_CALL, METHOD_TOOLS_LIST, SERVER_NAME,
};
use crate::mcp::{CallToolResult, JsonRpcRequest, JsonRpcResponse, ListToolsResult, ToolSchema};
use crate::transport::REQUEST_TIMEOUT_SECS;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::time::{timeout, Duration};
use tracing::{debug, warn};

/// How long an exiting child gets after the call completes before it is
/// killed
const EXIT_GRACE: Duration = Duration::from_secs(3);

struct StdioClient {
    child: Child,
    stdin: ChildStdin,
    lines: Lines<BufReader<ChildStdout>>,
    next_id: u64,
}

impl StdioClient {
    async fn spawn(command: &str, args: &[String], env: &HashMap<String, String>) -> Result<Self> {
        let mut cmd = Command::new(command);
        cmd.args(args)
            .envs(env)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true);

        let mut child = cmd.spawn().map_err(|e| {
            GatewayError::transport(format!("failed to spawn '{}': {}", command, e))
        })?;

        let stdin = child.stdin.take().ok_or_else(|| {
            GatewayError::transport(format!("failed to open stdin of '{}'", command))
        })?;
        let stdout = child.stdout.take().ok_or_else(|| {
            GatewayError::transport(format!("failed to open stdout of '{}'", command))
        })?;

        Ok(Self {
            child,
            stdin,
            lines: BufReader::new(stdout).lines(),
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
        self.notify(METHOD_NOTIFICATION_INITIALIZED).await?;
        Ok(())
    }

    async fn write_line(&mut self, payload: &str) -> Result<()> {
        self.stdin
            .write_all(payload.as_bytes())
            .await
            .map_err(|e| GatewayError::transport(format!("failed to write to backend: {}", e)))?;
        self.stdin
            .write_all(b"\n")
            .await
            .map_err(|e| GatewayError::transport(format!("failed to write to backend: {}", e)))?;
        self.stdin
            .flush()
            .await
            .map_err(|e| GatewayError::transport(format!("failed to flush backend stdin: {}", e)))
    }

    async fn notify(&mut self, method: &str) -> Result<()> {
        let notification = json!({"jsonrpc": "2.0", "method": method});
        self.write_line(&notification.to_string()).await
    }

    async fn request(&mut self, method: &str, params: Option<Value>) -> Result<Value> {
        let id = self.next_id;
        self.next_id += 1;
        let request = JsonRpcRequest::new(id, method, params);
        self.write_line(&serde_json::to_string(&request)?).await?;

        let deadline = Duration::from_secs(REQUEST_TIMEOUT_SECS);
        let response = timeout(deadline, self.read_response(id))
            .await
            .map_err(|_| GatewayError::timeout(format!("backend call '{}' timed out", method)))??;

        if let Some(error) = response.error {
            return Err(GatewayError::transport(format!(
                "backend error {}: {}",
                error.code, error.message
            )));
        }
        response
            .result
            .ok_or_else(|| GatewayError::transport("backend returned an empty result"))
    }

    /// Read lines until the response matching `id`; server-to-client
    /// notifications and unparsable lines are skipped
    async fn read_response(&mut self, id: u64) -> Result<JsonRpcResponse> {
        loop {
            let line = self
                .lines
                .next_line()
                .await
                .map_err(|e| GatewayError::transport(format!("failed to read backend stdout: {}", e)))?
                .ok_or_else(|| GatewayError::transport("backend closed stdout"))?;
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<JsonRpcResponse>(&line) {
                Ok(response) if response.id == json!(id) => return Ok(response),
                Ok(response) => debug!("Skipping backend message with id {:?}", response.id),
                Err(_) => debug!("Skipping non-response backend line: {}", line),
            }
        }
    }

    /// Close stdin so a well-behaved server exits, then kill after the
    /// grace window. Runs detached so the caller's response is not delayed.
    fn shutdown(self) {
        let StdioClient {
            mut child, stdin, ..
        } = self;
        tokio::spawn(async move {
            drop(stdin);
            match timeout(EXIT_GRACE, child.wait()).await {
                Ok(Ok(status)) => debug!("Backend subprocess exited with {}", status),
                Ok(Err(e)) => warn!("Failed to wait for backend subprocess: {}", e),
                Err(_) => {
                    warn!("Backend subprocess outlived its grace period, killing");
                    if let Err(e) = child.kill().await {
                        warn!("Failed to kill backend subprocess: {}", e);
                    }
                }
            }
        });
    }
}

/// One-shot tool call through a spawned subprocess
pub async fn call_tool(
    command: &str,
    args: &[String],
    env: &HashMap<String, String>,
    tool_name: &str,
    arguments: &Value,
) -> Result<CallToolResult> {
    let mut client = StdioClient::spawn(command, args, env).await?;
    client.initialize().await?;

    let result = client
        .request(
            METHOD_TOOLS_CALL,
            Some(json!({"name": tool_name, "arguments": arguments})),
        )
        .await;
    client.shutdown();

    let result = result?;
    serde_json::from_value(result)
        .map_err(|e| GatewayError::transport(format!("invalid tool result from '{}': {}", command, e)))
}

/// One-shot tool listing through a spawned subprocess
pub async fn list_tools(
    command: &str,
    args: &[String],
    env: &HashMap<String, String>,
) -> Result<Vec<ToolSchema>> {
    let mut client = StdioClient::spawn(command, args, env).await?;
    client.initialize().await?;

    let result = client.request(METHOD_TOOLS_LIST, None).await;
    client.shutdown();

    let list: ListToolsResult = serde_json::from_value(result?)
        .map_err(|e| GatewayError::transport(format!("invalid tool list from '{}': {}", command, e)))?;
    Ok(list.tools)
}
