//! Request dispatch: prefix → server → tool resolution and execution
//!
//! Protocol errors (malformed JSON-RPC, unknown method, bad params, missing
//! session) become JSON-RPC `error` objects with a matching HTTP status.
//! Tool-execution failures (backend errors, non-2xx responses, subprocess
//! crashes) are data: a `CallToolResult` with `is_error = true` inside a
//! successful result.

use crate::config::{GatewaySnapshot, McpServerConfig, RouteTarget, ServerConfig, ToolDefinition};
use crate::error::{GatewayError, Result};
use crate::gateway::server::GatewayServer;
use crate::mcp::types::{
    HEADER_MCP_SESSION_ID, METHOD_INITIALIZE, METHOD_NOTIFICATION_INITIALIZED, METHOD_TOOLS_CALL,
    METHOD_TOOLS_LIST,
};
use crate::mcp::{
    CallToolParams, CallToolResult, InitializeResult, JsonRpcRequest, JsonRpcResponse,
    ListToolsResult, RpcError, RpcErrorCode,
};
use crate::session::{SessionConnection, SessionMessage, SessionMeta};
use crate::template::{render_map, render_str, TemplateContext};
use crate::transport;
use actix_web::http::StatusCode;
use actix_web::{web, HttpRequest, HttpResponse};
use reqwest::Client;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::time::Duration;
use tracing::{error, warn};
use uuid::Uuid;

/// Timeout for templated HTTP tool calls
const HTTP_TOOL_TIMEOUT_SECS: u64 = 30;

/// Derive the routing prefix from a request path: the segment before
/// `/mcp`, or `/` when nothing precedes it
pub fn prefix_of(path: &str) -> String {
    let prefix = path.strip_suffix("/mcp").unwrap_or(path);
    if prefix.is_empty() {
        "/".to_string()
    } else {
        prefix.to_string()
    }
}

pub(crate) fn header_value(req: &HttpRequest, name: &str) -> Option<String> {
    req.headers()
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.to_string())
}

/// Build a JSON-RPC protocol error response
pub fn protocol_error(
    id: Value,
    code: RpcErrorCode,
    message: &str,
    status: StatusCode,
    session_id: Option<&str>,
) -> HttpResponse {
    let body = JsonRpcResponse::error(id, RpcError::new(code, message));
    let mut builder = HttpResponse::build(status);
    if let Some(session_id) = session_id {
        builder.insert_header((HEADER_MCP_SESSION_ID, session_id));
    }
    builder.json(body)
}

/// 405 response for verbs outside the MCP surface
pub fn method_not_allowed() -> HttpResponse {
    let body = JsonRpcResponse::error(
        Value::Null,
        RpcError::new(RpcErrorCode::ConnectionClosed, "Method not allowed"),
    );
    HttpResponse::MethodNotAllowed()
        .insert_header(("Allow", "GET, POST, DELETE"))
        .json(body)
}

/// POST handler: parse, resolve the session, dispatch the method
pub async fn handle_post(
    req: HttpRequest,
    body: web::Bytes,
    server: &Arc<GatewayServer>,
) -> HttpResponse {
    let rpc: JsonRpcRequest = match serde_json::from_slice(&body) {
        Ok(rpc) => rpc,
        Err(_) => {
            return protocol_error(
                Value::Null,
                RpcErrorCode::ParseError,
                "Invalid JSON-RPC request",
                StatusCode::BAD_REQUEST,
                None,
            )
        }
    };

    // Dispatch resolves against whichever snapshot is published when the
    // request starts; a concurrent reload does not affect it.
    let snapshot = server.snapshot();

    let connection = if rpc.method == METHOD_INITIALIZE {
        let session_id = header_value(&req, HEADER_MCP_SESSION_ID)
            .unwrap_or_else(|| Uuid::new_v4().to_string());
        let meta = SessionMeta::streamable(session_id, prefix_of(req.path()));
        match server.sessions().register(meta).await {
            Ok(connection) => connection,
            Err(e) => {
                error!("Failed to register session: {}", e);
                return protocol_error(
                    rpc.response_id(),
                    RpcErrorCode::InternalError,
                    "Failed to create session",
                    StatusCode::INTERNAL_SERVER_ERROR,
                    None,
                );
            }
        }
    } else {
        let Some(session_id) = header_value(&req, HEADER_MCP_SESSION_ID) else {
            return protocol_error(
                rpc.response_id(),
                RpcErrorCode::InvalidRequest,
                "Missing session ID",
                StatusCode::BAD_REQUEST,
                None,
            );
        };
        match server.sessions().get(&session_id).await {
            Ok(connection) => connection,
            Err(_) => {
                return protocol_error(
                    rpc.response_id(),
                    RpcErrorCode::InvalidRequest,
                    "Invalid or expired session",
                    StatusCode::BAD_REQUEST,
                    Some(&session_id),
                )
            }
        }
    };

    handle_rpc(&req, rpc, &snapshot, &connection, server).await
}

/// DELETE handler: terminate the session
pub async fn handle_delete(req: HttpRequest, server: &Arc<GatewayServer>) -> HttpResponse {
    let Some(session_id) = header_value(&req, HEADER_MCP_SESSION_ID) else {
        return protocol_error(
            Value::Null,
            RpcErrorCode::InvalidRequest,
            "Missing session ID",
            StatusCode::BAD_REQUEST,
            None,
        );
    };
    if server.sessions().get(&session_id).await.is_err() {
        return protocol_error(
            Value::Null,
            RpcErrorCode::InvalidRequest,
            "Invalid or expired session",
            StatusCode::BAD_REQUEST,
            Some(&session_id),
        );
    }
    if let Err(e) = server.sessions().unregister(&session_id).await {
        error!("Failed to unregister session {}: {}", session_id, e);
        return protocol_error(
            Value::Null,
            RpcErrorCode::InternalError,
            "Failed to terminate session",
            StatusCode::INTERNAL_SERVER_ERROR,
            Some(&session_id),
        );
    }
    HttpResponse::Ok().body("Session terminated")
}

async fn handle_rpc(
    req: &HttpRequest,
    rpc: JsonRpcRequest,
    snapshot: &Arc<GatewaySnapshot>,
    connection: &Arc<SessionConnection>,
    server: &Arc<GatewayServer>,
) -> HttpResponse {
    let session_id = connection.meta().id.clone();
    let prefix = connection.meta().prefix.clone();

    match rpc.method.as_str() {
        METHOD_INITIALIZE => {
            let result = match serde_json::to_value(InitializeResult::gateway()) {
                Ok(result) => result,
                Err(e) => {
                    error!("Failed to serialize initialize result: {}", e);
                    return protocol_error(
                        rpc.response_id(),
                        RpcErrorCode::InternalError,
                        "Internal error",
                        StatusCode::INTERNAL_SERVER_ERROR,
                        Some(&session_id),
                    );
                }
            };
            respond(server, connection, &rpc, result).await
        }

        METHOD_NOTIFICATION_INITIALIZED => HttpResponse::Accepted()
            .insert_header((HEADER_MCP_SESSION_ID, session_id))
            .finish(),

        METHOD_TOOLS_LIST => match snapshot.target(&prefix) {
            Some(RouteTarget::Proxy(backend)) => {
                match proxy_list_tools(req, server, backend).await {
                    Ok(tools) => {
                        let result = json!(ListToolsResult { tools });
                        respond(server, connection, &rpc, result).await
                    }
                    Err(e) => {
                        error!("Failed to list tools from backend '{}': {}", backend.name, e);
                        protocol_error(
                            rpc.response_id(),
                            RpcErrorCode::InternalError,
                            "Failed to list backend tools",
                            StatusCode::INTERNAL_SERVER_ERROR,
                            Some(&session_id),
                        )
                    }
                }
            }
            _ => {
                let tools = snapshot.tools_for_prefix(&prefix).to_vec();
                respond(server, connection, &rpc, json!(ListToolsResult { tools })).await
            }
        },

        METHOD_TOOLS_CALL => handle_tools_call(req, rpc, snapshot, connection, server).await,

        _ => protocol_error(
            rpc.response_id(),
            RpcErrorCode::MethodNotFound,
            "Method not found",
            StatusCode::NOT_FOUND,
            Some(&session_id),
        ),
    }
}

async fn handle_tools_call(
    req: &HttpRequest,
    rpc: JsonRpcRequest,
    snapshot: &Arc<GatewaySnapshot>,
    connection: &Arc<SessionConnection>,
    server: &Arc<GatewayServer>,
) -> HttpResponse {
    let session_id = connection.meta().id.clone();
    let prefix = connection.meta().prefix.clone();

    let params: CallToolParams = match rpc.params.clone().map(serde_json::from_value) {
        Some(Ok(params)) => params,
        _ => {
            return protocol_error(
                rpc.response_id(),
                RpcErrorCode::InvalidParams,
                "Invalid tool call parameters",
                StatusCode::BAD_REQUEST,
                Some(&session_id),
            )
        }
    };

    let arguments = match &params.arguments {
        Value::Object(_) => params.arguments.clone(),
        Value::Null => json!({}),
        _ => {
            return protocol_error(
                rpc.response_id(),
                RpcErrorCode::InvalidParams,
                "Invalid tool arguments",
                StatusCode::BAD_REQUEST,
                Some(&session_id),
            )
        }
    };

    match snapshot.target(&prefix) {
        // Proxied prefix: forward the call as-is and let the backend
        // resolve the tool.
        Some(RouteTarget::Proxy(backend)) => {
            let result = proxy_call_tool(req, server, backend, &params.name, &arguments).await;
            let result = result.unwrap_or_else(|e| {
                error!("Tool '{}' failed on backend '{}': {}", params.name, backend.name, e);
                CallToolResult::error_text(e.to_string())
            });
            respond_tool_result(server, connection, &rpc, result).await
        }

        Some(RouteTarget::Server(server_config)) => {
            let allowed = snapshot
                .tools_for_prefix(&prefix)
                .iter()
                .any(|tool| tool.name == params.name);
            let tool = match snapshot.tool(&params.name) {
                Some(tool) if allowed => Arc::clone(tool),
                _ => {
                    return protocol_error(
                        rpc.response_id(),
                        RpcErrorCode::MethodNotFound,
                        "Tool not found",
                        StatusCode::NOT_FOUND,
                        Some(&session_id),
                    )
                }
            };

            let ctx = template_context(req, server, &arguments, Some(server_config));
            let outcome = if tool.is_proxied() {
                execute_proxied_tool(req, server, snapshot, &tool, &arguments, &ctx).await
            } else {
                execute_http_tool(&tool, &ctx, &arguments).await
            };

            match outcome {
                Ok(result) => respond_tool_result(server, connection, &rpc, result).await,
                // Missing caller arguments surface as protocol errors.
                Err(GatewayError::InvalidParams { message }) => protocol_error(
                    rpc.response_id(),
                    RpcErrorCode::InvalidParams,
                    &message,
                    StatusCode::BAD_REQUEST,
                    Some(&session_id),
                ),
                Err(e) => {
                    error!("Failed to execute tool '{}': {}", tool.name, e);
                    respond_tool_result(server, connection, &rpc, CallToolResult::error_text(e.to_string()))
                        .await
                }
            }
        }

        None => protocol_error(
            rpc.response_id(),
            RpcErrorCode::InvalidRequest,
            "Unknown prefix",
            StatusCode::NOT_FOUND,
            Some(&session_id),
        ),
    }
}

/// Headers forwarded to streamable backends: every client header with the
/// first value winning, minus the request-framing ones
pub fn forwarded_headers(req: &HttpRequest) -> HashMap<String, String> {
    let mut headers = HashMap::new();
    for (name, value) in req.headers() {
        let name = name.as_str();
        if matches!(
            name,
            "host" | "content-length" | "content-type" | "accept" | "connection"
        ) {
            continue;
        }
        if let Ok(value) = value.to_str() {
            headers.entry(name.to_string()).or_insert_with(|| value.to_string());
        }
    }
    headers
}

fn template_context(
    req: &HttpRequest,
    server: &Arc<GatewayServer>,
    arguments: &Value,
    server_config: Option<&Arc<ServerConfig>>,
) -> TemplateContext {
    let mut headers = HashMap::new();
    for (name, value) in req.headers() {
        if let Ok(value) = value.to_str() {
            headers
                .entry(name.as_str().to_string())
                .or_insert_with(|| value.to_string());
        }
    }
    let query: HashMap<String, String> =
        serde_urlencoded::from_str(req.query_string()).unwrap_or_default();

    let mut ctx = TemplateContext::new(arguments.clone())
        .with_request(headers, query, req.path())
        .with_env(server.env());
    if let Some(config) = server_config {
        ctx = ctx.with_config(&config.config);
    }
    ctx
}

async fn proxy_list_tools(
    req: &HttpRequest,
    server: &Arc<GatewayServer>,
    backend: &Arc<McpServerConfig>,
) -> Result<Vec<crate::mcp::ToolSchema>> {
    let ctx = template_context(req, server, &json!({}), None);
    let env = render_map(&backend.env, &ctx)?;
    let headers = forwarded_headers(req);
    transport::list_tools(backend, &headers, &env).await
}

async fn proxy_call_tool(
    req: &HttpRequest,
    server: &Arc<GatewayServer>,
    backend: &Arc<McpServerConfig>,
    tool_name: &str,
    arguments: &Value,
) -> Result<CallToolResult> {
    let ctx = template_context(req, server, arguments, None);
    let env = render_map(&backend.env, &ctx)?;
    let headers = forwarded_headers(req);
    transport::call_tool(backend, tool_name, arguments, &headers, &env).await
}

async fn execute_proxied_tool(
    req: &HttpRequest,
    server: &Arc<GatewayServer>,
    snapshot: &Arc<GatewaySnapshot>,
    tool: &Arc<ToolDefinition>,
    arguments: &Value,
    ctx: &TemplateContext,
) -> Result<CallToolResult> {
    let backend = snapshot
        .mcp_server(tool.backend_name())
        .ok_or_else(|| GatewayError::transport(format!(
            "MCP server '{}' not found",
            tool.backend_name()
        )))?;

    // Backend-level env first, tool-level entries override.
    let mut env = render_map(&backend.env, ctx)?;
    env.extend(render_map(&tool.env, ctx)?);
    let headers = forwarded_headers(req);
    transport::call_tool(backend, &tool.name, arguments, &headers, &env).await
}

/// Render and execute a templated HTTP tool
async fn execute_http_tool(
    tool: &ToolDefinition,
    ctx: &TemplateContext,
    arguments: &Value,
) -> Result<CallToolResult> {
    let url = render_str(&tool.request_template.url, ctx)?;
    let headers = render_map(&tool.request_template.headers, ctx)?;
    let body = if tool.request_template.body.is_empty() {
        serde_json::to_string(arguments)?
    } else {
        render_str(&tool.request_template.body, ctx)?
    };

    let client = Client::builder()
        .timeout(Duration::from_secs(HTTP_TOOL_TIMEOUT_SECS))
        .build()
        .map_err(|e| GatewayError::transport(format!("failed to create HTTP client: {}", e)))?;
    let method = reqwest::Method::from_bytes(tool.method.as_bytes())
        .map_err(|_| GatewayError::transport(format!("unsupported method '{}'", tool.method)))?;

    let mut builder = client.request(method, &url);
    for (key, value) in &headers {
        builder = builder.header(key, value);
    }
    if matches!(tool.method.as_str(), "POST" | "PUT" | "PATCH") {
        builder = builder.header("Content-Type", "application/json").body(body);
    }

    let response = match builder.send().await {
        Ok(response) => response,
        Err(e) => return Ok(CallToolResult::error_text(format!("HTTP request failed: {}", e))),
    };
    let status = response.status();
    let text = match response.text().await {
        Ok(text) => text,
        Err(e) => {
            return Ok(CallToolResult::error_text(format!(
                "Failed to read response body: {}",
                e
            )))
        }
    };
    if !status.is_success() {
        return Ok(CallToolResult::error_text(format!(
            "HTTP request failed with status {}: {}",
            status, text
        )));
    }

    let output = if tool.response_template.body.is_empty() {
        text
    } else {
        let data = serde_json::from_str(&text).unwrap_or(Value::Null);
        let response_ctx = ctx.clone().with_response(&text, data);
        render_str(&tool.response_template.body, &response_ctx)?
    };
    Ok(CallToolResult::text(output))
}

async fn respond_tool_result(
    server: &Arc<GatewayServer>,
    connection: &Arc<SessionConnection>,
    rpc: &JsonRpcRequest,
    result: CallToolResult,
) -> HttpResponse {
    match serde_json::to_value(&result) {
        Ok(result) => respond(server, connection, rpc, result).await,
        Err(e) => {
            error!("Failed to serialize tool result: {}", e);
            protocol_error(
                rpc.response_id(),
                RpcErrorCode::InternalError,
                "Internal error",
                StatusCode::INTERNAL_SERVER_ERROR,
                Some(&connection.meta().id),
            )
        }
    }
}

/// Frame a successful result: push through the session queue when an SSE
/// writer is attached, otherwise return it inline in the POST body
async fn respond(
    server: &Arc<GatewayServer>,
    connection: &Arc<SessionConnection>,
    rpc: &JsonRpcRequest,
    result: Value,
) -> HttpResponse {
    let session_id = connection.meta().id.clone();
    if rpc.is_notification() {
        return HttpResponse::Accepted()
            .insert_header((HEADER_MCP_SESSION_ID, session_id))
            .finish();
    }

    let response = JsonRpcResponse::success(rpc.response_id(), result);
    if connection.has_attached_writer() {
        match serde_json::to_string(&response) {
            Ok(data) => {
                let mut message = SessionMessage::message(data);
                message.id = Some(connection.next_event_id());
                if let Err(e) = server.sessions().send(connection, message).await {
                    warn!("Failed to push response to session {}: {}", session_id, e);
                } else {
                    return HttpResponse::Accepted()
                        .insert_header((HEADER_MCP_SESSION_ID, session_id))
                        .finish();
                }
            }
            Err(e) => error!("Failed to serialize response: {}", e),
        }
    }

    HttpResponse::Ok()
        .insert_header((HEADER_MCP_SESSION_ID, session_id))
        .json(response)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prefix_of() {
        assert_eq!(prefix_of("/user/mcp"), "/user");
        assert_eq!(prefix_of("/a/b/mcp"), "/a/b");
        assert_eq!(prefix_of("/mcp"), "/");
        assert_eq!(prefix_of("/user"), "/user");
    }
}
