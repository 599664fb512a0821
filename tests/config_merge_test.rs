//! Unit tests for config document merging and snapshot determinism

use mcp_gateway::config::{merge_configs, ConfigDocument, GatewaySnapshot};
use mcp_gateway::error::GatewayError;
use serde_json::json;

fn document(name: &str, prefix: &str, tools: &[&str]) -> ConfigDocument {
    let tool_defs: Vec<_> = tools
        .iter()
        .map(|tool| {
            json!({
                "name": tool,
                "description": format!("{} tool", tool),
                "method": "GET",
                "inputSchema": {"type": "object", "properties": {}},
                "requestTemplate": {"url": format!("http://backend.test/{}", tool)},
            })
        })
        .collect();

    serde_json::from_value(json!({
        "name": name,
        "servers": [{
            "name": format!("srv-{}", name),
            "allowedTools": tools,
        }],
        "tools": tool_defs,
        "routers": [{
            "prefix": prefix,
            "server": format!("srv-{}", name),
        }],
        "mcpServers": [{
            "name": format!("backend-{}", name),
            "type": "streamable",
            "url": "http://backend.test/mcp",
        }],
    }))
    .unwrap()
}

fn canonical(snapshot: &GatewaySnapshot) -> String {
    snapshot.canonical_json().unwrap()
}

#[test]
fn test_merge_is_deterministic_across_permutations() {
    let docs = || {
        vec![
            document("a", "/a", &["alpha", "omega"]),
            document("b", "/b", &["beta"]),
            document("c", "/c", &["gamma"]),
        ]
    };

    let reference = canonical(&merge_configs(docs()).unwrap());
    let permutations: [[usize; 3]; 6] = [
        [0, 1, 2],
        [0, 2, 1],
        [1, 0, 2],
        [1, 2, 0],
        [2, 0, 1],
        [2, 1, 0],
    ];
    for order in permutations {
        let base = docs();
        let permuted: Vec<ConfigDocument> = order.iter().map(|&i| base[i].clone()).collect();
        let snapshot = merge_configs(permuted).unwrap();
        assert_eq!(canonical(&snapshot), reference);
    }
}

#[test]
fn test_tools_keep_allowed_tools_order() {
    let doc = document("a", "/a", &["zeta", "alpha", "mid"]);
    let snapshot = merge_configs(vec![doc]).unwrap();
    let names: Vec<&str> = snapshot
        .tools_for_prefix("/a")
        .iter()
        .map(|tool| tool.name.as_str())
        .collect();
    assert_eq!(names, vec!["zeta", "alpha", "mid"]);
}

#[test]
fn test_rebuilding_from_same_documents_yields_same_tools() {
    // A reload over unchanged documents must present the same tools in the
    // same order.
    let first = merge_configs(vec![document("a", "/a", &["one", "two"])]).unwrap();
    let second = merge_configs(vec![document("a", "/a", &["one", "two"])]).unwrap();
    assert_eq!(first.tools_for_prefix("/a"), second.tools_for_prefix("/a"));
    assert_eq!(canonical(&first), canonical(&second));
}

#[test]
fn test_duplicate_prefix_is_conflict() {
    let a = document("first", "/same", &["t1"]);
    let b = document("second", "/same", &["t2"]);
    let err = merge_configs(vec![a, b]).unwrap_err();
    assert!(matches!(err, GatewayError::Conflict { .. }));
    let message = err.to_string();
    assert!(message.contains("/same"));
    assert!(message.contains("first") && message.contains("second"));
}

#[test]
fn test_duplicate_server_name_is_conflict() {
    let mut a = document("first", "/a", &["t1"]);
    let mut b = document("second", "/b", &["t2"]);
    a.servers[0].name = "shared".to_string();
    a.routers[0].server = "shared".to_string();
    b.servers[0].name = "shared".to_string();
    b.routers[0].server = "shared".to_string();

    let err = merge_configs(vec![a, b]).unwrap_err();
    assert!(matches!(err, GatewayError::Conflict { .. }));
    assert!(err.to_string().contains("shared"));
}

#[test]
fn test_router_may_target_mcp_server() {
    let mut doc = document("a", "/a", &["t"]);
    doc.routers[0].server = "backend-a".to_string();
    let snapshot = merge_configs(vec![doc]).unwrap();
    assert!(snapshot.target("/a").is_some());
    // Proxied prefixes have no precomputed tool projection.
    assert!(snapshot.tools_for_prefix("/a").is_empty());
}

#[test]
fn test_invalid_input_schema_rejected() {
    let mut doc = document("a", "/a", &["t"]);
    doc.tools[0].input_schema = json!({"type": 42});
    assert!(merge_configs(vec![doc]).is_err());
}
