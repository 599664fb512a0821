//! Config document merge and the immutable gateway snapshot
//!
//! `merge_configs` concatenates the documents pulled from the config store
//! into a `GatewaySnapshot`: fully validated, indexed, and immutable.
//! Duplicate prefixes, server names or tool names are fatal conflicts that
//! name both offending documents. Inputs are keyed through sorted maps, so
//! any permutation of the document list produces an identical snapshot.

use crate::config::types::{
    ConfigDocument, McpServerConfig, McpServerType, RouterConfig, ServerConfig, ToolDefinition,
};
use crate::error::{GatewayError, Result};
use crate::mcp::ToolSchema;
use crate::template::Template;
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::sync::Arc;

const HTTP_METHODS: &[&str] = &["GET", "POST", "PUT", "DELETE", "PATCH", "HEAD"];

/// What a prefix routes to: a logical server with template tools, or a
/// backend MCP server proxied through a transport
#[derive(Debug, Clone)]
pub enum RouteTarget {
    Server(Arc<ServerConfig>),
    Proxy(Arc<McpServerConfig>),
}

/// Immutable, fully-indexed view of the merged gateway configuration
///
/// Owned behind an `Arc` published by the reload controller; in-flight
/// requests keep older snapshots alive through their reference counts.
#[derive(Debug, Default)]
pub struct GatewaySnapshot {
    servers: BTreeMap<String, Arc<ServerConfig>>,
    tools: BTreeMap<String, Arc<ToolDefinition>>,
    mcp_servers: BTreeMap<String, Arc<McpServerConfig>>,
    routers: Vec<RouterConfig>,
    prefix_to_target: BTreeMap<String, RouteTarget>,
    prefix_to_tools: BTreeMap<String, Vec<ToolSchema>>,
}

impl GatewaySnapshot {
    /// Snapshot with no configuration at all
    pub fn empty() -> Self {
        Self::default()
    }

    /// Resolve a prefix to its route target
    pub fn target(&self, prefix: &str) -> Option<&RouteTarget> {
        self.prefix_to_target.get(prefix)
    }

    /// Tools visible on a prefix, in `allowedTools` order
    pub fn tools_for_prefix(&self, prefix: &str) -> &[ToolSchema] {
        self.prefix_to_tools
            .get(prefix)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Look up a tool definition by name
    pub fn tool(&self, name: &str) -> Option<&Arc<ToolDefinition>> {
        self.tools.get(name)
    }

    /// Look up a backend MCP server by name
    pub fn mcp_server(&self, name: &str) -> Option<&Arc<McpServerConfig>> {
        self.mcp_servers.get(name)
    }

    /// All configured routing entries
    pub fn routers(&self) -> &[RouterConfig] {
        &self.routers
    }

    /// Canonical JSON rendering of the indexed tables, used for
    /// reload diagnostics and determinism checks
    pub fn canonical_json(&self) -> Result<String> {
        let tools: BTreeMap<&String, &ToolDefinition> =
            self.tools.iter().map(|(k, v)| (k, v.as_ref())).collect();
        let servers: BTreeMap<&String, &ServerConfig> =
            self.servers.iter().map(|(k, v)| (k, v.as_ref())).collect();
        let mcp_servers: BTreeMap<&String, &McpServerConfig> =
            self.mcp_servers.iter().map(|(k, v)| (k, v.as_ref())).collect();
        let targets: BTreeMap<&String, Value> = self
            .prefix_to_target
            .iter()
            .map(|(prefix, target)| {
                let value = match target {
                    RouteTarget::Server(s) => json!({"server": s.name}),
                    RouteTarget::Proxy(p) => json!({"proxy": p.name}),
                };
                (prefix, value)
            })
            .collect();

        let canonical = json!({
            "servers": servers,
            "tools": tools,
            "mcpServers": mcp_servers,
            "prefixToTarget": targets,
            "prefixToTools": self.prefix_to_tools,
        });
        Ok(serde_json::to_string(&canonical)?)
    }
}

/// Merge config documents into a validated snapshot
pub fn merge_configs(documents: Vec<ConfigDocument>) -> Result<GatewaySnapshot> {
    // First pass: collect entities, rejecting duplicates across documents.
    let mut servers: BTreeMap<String, (Arc<ServerConfig>, String)> = BTreeMap::new();
    let mut tools: BTreeMap<String, (Arc<ToolDefinition>, String)> = BTreeMap::new();
    let mut mcp_servers: BTreeMap<String, (Arc<McpServerConfig>, String)> = BTreeMap::new();
    let mut routers: BTreeMap<String, (RouterConfig, String)> = BTreeMap::new();

    for doc in documents {
        for server in doc.servers {
            if let Some((_, other)) = servers.get(&server.name) {
                return Err(GatewayError::conflict(format!(
                    "duplicate server '{}' defined in documents '{}' and '{}'",
                    server.name, other, doc.name
                )));
            }
            servers.insert(server.name.clone(), (Arc::new(server), doc.name.clone()));
        }
        for tool in doc.tools {
            if let Some((_, other)) = tools.get(&tool.name) {
                return Err(GatewayError::conflict(format!(
                    "duplicate tool '{}' defined in documents '{}' and '{}'",
                    tool.name, other, doc.name
                )));
            }
            tools.insert(tool.name.clone(), (Arc::new(tool), doc.name.clone()));
        }
        for mcp_server in doc.mcp_servers {
            if let Some((_, other)) = mcp_servers.get(&mcp_server.name) {
                return Err(GatewayError::conflict(format!(
                    "duplicate MCP server '{}' defined in documents '{}' and '{}'",
                    mcp_server.name, other, doc.name
                )));
            }
            mcp_servers.insert(
                mcp_server.name.clone(),
                (Arc::new(mcp_server), doc.name.clone()),
            );
        }
        for router in doc.routers {
            if let Some((_, other)) = routers.get(&router.prefix) {
                return Err(GatewayError::conflict(format!(
                    "duplicate prefix '{}' defined in documents '{}' and '{}'",
                    router.prefix, other, doc.name
                )));
            }
            routers.insert(router.prefix.clone(), (router, doc.name.clone()));
        }
    }

    let servers: BTreeMap<String, Arc<ServerConfig>> =
        servers.into_iter().map(|(k, (v, _))| (k, v)).collect();
    let tools: BTreeMap<String, Arc<ToolDefinition>> =
        tools.into_iter().map(|(k, (v, _))| (k, v)).collect();
    let mcp_servers: BTreeMap<String, Arc<McpServerConfig>> =
        mcp_servers.into_iter().map(|(k, (v, _))| (k, v)).collect();
    let routers: Vec<RouterConfig> = routers.into_values().map(|(v, _)| v).collect();

    // Second pass: referential integrity and config-time validation.
    for tool in tools.values() {
        validate_tool(tool, &mcp_servers)?;
    }
    for server in servers.values() {
        for tool_name in &server.allowed_tools {
            if !tools.contains_key(tool_name) {
                return Err(GatewayError::config(format!(
                    "server '{}' allows unknown tool '{}'",
                    server.name, tool_name
                )));
            }
        }
    }
    for mcp_server in mcp_servers.values() {
        validate_mcp_server(mcp_server)?;
    }

    let mut prefix_to_target = BTreeMap::new();
    let mut prefix_to_tools = BTreeMap::new();
    for router in &routers {
        if router.prefix.is_empty() || !router.prefix.starts_with('/') {
            return Err(GatewayError::config(format!(
                "router prefix '{}' must be non-empty and start with '/'",
                router.prefix
            )));
        }
        let target = if let Some(server) = servers.get(&router.server) {
            let schemas: Vec<ToolSchema> = server
                .allowed_tools
                .iter()
                .filter_map(|name| tools.get(name))
                .map(|tool| tool.schema())
                .collect();
            prefix_to_tools.insert(router.prefix.clone(), schemas);
            RouteTarget::Server(Arc::clone(server))
        } else if let Some(mcp_server) = mcp_servers.get(&router.server) {
            RouteTarget::Proxy(Arc::clone(mcp_server))
        } else {
            return Err(GatewayError::config(format!(
                "router prefix '{}' references unknown server '{}'",
                router.prefix, router.server
            )));
        };
        prefix_to_target.insert(router.prefix.clone(), target);
    }

    Ok(GatewaySnapshot {
        servers,
        tools,
        mcp_servers,
        routers,
        prefix_to_target,
        prefix_to_tools,
    })
}

fn validate_tool(
    tool: &ToolDefinition,
    mcp_servers: &BTreeMap<String, Arc<McpServerConfig>>,
) -> Result<()> {
    if tool.name.trim().is_empty() {
        return Err(GatewayError::config("tool name cannot be empty"));
    }
    tool.schema().validate_input_schema()?;

    if tool.is_proxied() {
        let backend = tool.backend_name();
        if !mcp_servers.contains_key(backend) {
            return Err(GatewayError::config(format!(
                "tool '{}' targets unknown MCP server '{}'",
                tool.name, backend
            )));
        }
    } else {
        if !HTTP_METHODS.contains(&tool.method.as_str()) {
            return Err(GatewayError::config(format!(
                "tool '{}' has unsupported method '{}'",
                tool.name, tool.method
            )));
        }
        if tool.request_template.url.is_empty() {
            return Err(GatewayError::config(format!(
                "tool '{}' is missing a request template URL",
                tool.name
            )));
        }
        Template::parse(&tool.request_template.url)?;
        Template::parse(&tool.request_template.body)?;
        for value in tool.request_template.headers.values() {
            Template::parse(value)?;
        }
        Template::parse(&tool.response_template.body)?;
    }
    for value in tool.env.values() {
        Template::parse(value)?;
    }
    Ok(())
}

fn validate_mcp_server(server: &McpServerConfig) -> Result<()> {
    match server.server_type {
        McpServerType::Streamable => {
            if server.url.as_deref().unwrap_or("").is_empty() {
                return Err(GatewayError::config(format!(
                    "streamable MCP server '{}' requires a url",
                    server.name
                )));
            }
        }
        McpServerType::Stdio => {
            if server.command.as_deref().unwrap_or("").is_empty() {
                return Err(GatewayError::config(format!(
                    "stdio MCP server '{}' requires a command",
                    server.name
                )));
            }
        }
    }
    for value in server.env.values() {
        Template::parse(value)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc(name: &str) -> ConfigDocument {
        ConfigDocument {
            name: name.to_string(),
            ..Default::default()
        }
    }

    fn echo_tool(name: &str) -> ToolDefinition {
        serde_json::from_value(json!({
            "name": name,
            "method": "POST",
            "inputSchema": {"type": "object", "properties": {"x": {"type": "string"}}},
            "requestTemplate": {"url": "http://backend.test/echo", "body": "{{args.x}}"},
        }))
        .unwrap()
    }

    #[test]
    fn test_merge_builds_indices() {
        let mut d = doc("base");
        d.tools.push(echo_tool("echo"));
        d.servers.push(ServerConfig {
            name: "svc".to_string(),
            description: String::new(),
            allowed_tools: vec!["echo".to_string()],
            config: Default::default(),
        });
        d.routers.push(RouterConfig {
            prefix: "/svc".to_string(),
            server: "svc".to_string(),
        });

        let snapshot = merge_configs(vec![d]).unwrap();
        assert!(matches!(snapshot.target("/svc"), Some(RouteTarget::Server(_))));
        assert_eq!(snapshot.tools_for_prefix("/svc").len(), 1);
        assert_eq!(snapshot.tools_for_prefix("/svc")[0].name, "echo");
        assert!(snapshot.tool("echo").is_some());
        assert!(snapshot.target("/other").is_none());
    }

    #[test]
    fn test_duplicate_tool_names_both_documents() {
        let mut a = doc("alpha");
        a.tools.push(echo_tool("echo"));
        let mut b = doc("beta");
        b.tools.push(echo_tool("echo"));

        let err = merge_configs(vec![a, b]).unwrap_err();
        let message = err.to_string();
        assert!(message.contains("alpha"), "got: {}", message);
        assert!(message.contains("beta"), "got: {}", message);
        assert!(matches!(err, GatewayError::Conflict { .. }));
    }

    #[test]
    fn test_merge_is_order_independent() {
        let build = |order: Vec<&str>| {
            let docs: Vec<ConfigDocument> = order
                .into_iter()
                .map(|name| {
                    let mut d = doc(name);
                    let tool_name = format!("tool-{}", name);
                    d.tools.push(echo_tool(&tool_name));
                    d.servers.push(ServerConfig {
                        name: format!("srv-{}", name),
                        description: String::new(),
                        allowed_tools: vec![tool_name],
                        config: Default::default(),
                    });
                    d.routers.push(RouterConfig {
                        prefix: format!("/{}", name),
                        server: format!("srv-{}", name),
                    });
                    d
                })
                .collect();
            merge_configs(docs).unwrap().canonical_json().unwrap()
        };

        let forward = build(vec!["a", "b", "c"]);
        let backward = build(vec!["c", "a", "b"]);
        assert_eq!(forward, backward);
    }

    #[test]
    fn test_unknown_references_rejected() {
        let mut d = doc("base");
        d.routers.push(RouterConfig {
            prefix: "/ghost".to_string(),
            server: "missing".to_string(),
        });
        assert!(merge_configs(vec![d]).is_err());

        let mut d = doc("base");
        d.servers.push(ServerConfig {
            name: "svc".to_string(),
            description: String::new(),
            allowed_tools: vec!["missing".to_string()],
            config: Default::default(),
        });
        assert!(merge_configs(vec![d]).is_err());
    }

    #[test]
    fn test_bad_template_is_config_error() {
        let mut d = doc("base");
        let mut tool = echo_tool("echo");
        tool.request_template.url = "{{ args.x".to_string();
        d.tools.push(tool);
        let err = merge_configs(vec![d]).unwrap_err();
        assert!(matches!(err, GatewayError::Template { .. }));
    }

    #[test]
    fn test_proxied_tool_requires_backend() {
        let mut d = doc("base");
        d.tools.push(
            serde_json::from_value(json!({
                "name": "remote",
                "method": "streamable",
                "server": "backend",
            }))
            .unwrap(),
        );
        assert!(merge_configs(vec![d]).is_err());

        let mut d = doc("base");
        d.mcp_servers.push(
            serde_json::from_value(json!({
                "name": "backend",
                "type": "streamable",
                "url": "http://backend.test/mcp",
            }))
            .unwrap(),
        );
        d.tools.push(
            serde_json::from_value(json!({
                "name": "remote",
                "method": "streamable",
                "server": "backend",
            }))
            .unwrap(),
        );
        assert!(merge_configs(vec![d]).is_ok());
    }
}
