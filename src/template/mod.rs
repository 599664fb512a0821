//! Template engine for tool arguments, URLs, headers and environments
//!
//! Plain-text templates with `{{ expr }}` substitution, where `expr` is a
//! dot path rooted at one of `args`, `request`, `config`, `env` or
//! `response`. Rendering is pure: no I/O and no recursion into the result.
//! Templates are parsed when a snapshot is built, so syntax errors surface
//! as configuration errors rather than at call time.

use crate::error::{GatewayError, Result};
use serde_json::{json, Value};
use std::collections::HashMap;

/// Roots a template expression may start with
const ROOTS: &[&str] = &["args", "request", "config", "env", "response"];

/// A parsed template
#[derive(Debug, Clone)]
pub struct Template {
    source: String,
    segments: Vec<Segment>,
}

#[derive(Debug, Clone)]
enum Segment {
    Literal(String),
    Expr(Vec<String>),
}

impl Template {
    /// Parse a template, validating placeholder syntax and roots
    pub fn parse(source: &str) -> Result<Self> {
        let mut segments = Vec::new();
        let mut rest = source;

        while let Some(start) = rest.find("{{") {
            if !rest[..start].is_empty() {
                segments.push(Segment::Literal(rest[..start].to_string()));
            }
            let after = &rest[start + 2..];
            let end = after.find("}}").ok_or_else(|| {
                GatewayError::template(format!("unclosed '{{{{' in template '{}'", source))
            })?;

            let expr = after[..end].trim();
            if expr.is_empty() {
                return Err(GatewayError::template(format!(
                    "empty expression in template '{}'",
                    source
                )));
            }
            let path: Vec<String> = expr.split('.').map(|s| s.trim().to_string()).collect();
            if path.iter().any(|p| p.is_empty()) {
                return Err(GatewayError::template(format!(
                    "malformed expression '{}' in template '{}'",
                    expr, source
                )));
            }
            if !ROOTS.contains(&path[0].as_str()) {
                return Err(GatewayError::template(format!(
                    "unknown root '{}' in template '{}' (expected one of {})",
                    path[0],
                    source,
                    ROOTS.join(", ")
                )));
            }

            segments.push(Segment::Expr(path));
            rest = &after[end + 2..];
        }
        if !rest.is_empty() {
            segments.push(Segment::Literal(rest.to_string()));
        }

        Ok(Self {
            source: source.to_string(),
            segments,
        })
    }

    /// Render against a context
    ///
    /// A missing `args.*` path is the caller's fault and fails with
    /// `InvalidParams`; missing keys under the other roots render as the
    /// empty string.
    pub fn render(&self, ctx: &TemplateContext) -> Result<String> {
        let mut out = String::with_capacity(self.source.len());
        for segment in &self.segments {
            match segment {
                Segment::Literal(text) => out.push_str(text),
                Segment::Expr(path) => match ctx.lookup(path) {
                    Some(value) => out.push_str(&value_to_string(value)?),
                    None if path[0] == "args" => {
                        return Err(GatewayError::invalid_params(format!(
                            "missing argument '{}'",
                            path[1..].join(".")
                        )));
                    }
                    None => {}
                },
            }
        }
        Ok(out)
    }

    /// The original template text
    pub fn source(&self) -> &str {
        &self.source
    }
}

/// Parse and render in one step
pub fn render_str(template: &str, ctx: &TemplateContext) -> Result<String> {
    Template::parse(template)?.render(ctx)
}

/// Render every value of a string map (headers, env)
pub fn render_map(
    map: &HashMap<String, String>,
    ctx: &TemplateContext,
) -> Result<HashMap<String, String>> {
    let mut rendered = HashMap::with_capacity(map.len());
    for (key, value) in map {
        rendered.insert(key.clone(), render_str(value, ctx)?);
    }
    Ok(rendered)
}

/// Read-only snapshot of the process environment, taken once at startup
pub fn env_snapshot() -> HashMap<String, String> {
    std::env::vars().collect()
}

/// Lookup context for template rendering
#[derive(Debug, Clone)]
pub struct TemplateContext {
    args: Value,
    request: Value,
    config: Value,
    env: Value,
    response: Value,
}

impl TemplateContext {
    /// Context with caller arguments only
    pub fn new(args: Value) -> Self {
        Self {
            args,
            request: Value::Null,
            config: Value::Null,
            env: Value::Null,
            response: Value::Null,
        }
    }

    /// Attach the inbound HTTP request view (`request.headers`,
    /// `request.query`, `request.path`)
    pub fn with_request(
        mut self,
        headers: HashMap<String, String>,
        query: HashMap<String, String>,
        path: &str,
    ) -> Self {
        self.request = json!({
            "headers": headers,
            "query": query,
            "path": path,
        });
        self
    }

    /// Attach the server's free-form config subtree
    pub fn with_config(mut self, config: &HashMap<String, String>) -> Self {
        self.config = json!(config);
        self
    }

    /// Attach the process environment snapshot
    pub fn with_env(mut self, env: &HashMap<String, String>) -> Self {
        self.env = json!(env);
        self
    }

    /// Attach the backend response view (`response.body`, `response.data`)
    pub fn with_response(mut self, body: &str, data: Value) -> Self {
        self.response = json!({
            "body": body,
            "data": data,
        });
        self
    }

    fn lookup(&self, path: &[String]) -> Option<&Value> {
        let mut current = match path[0].as_str() {
            "args" => &self.args,
            "request" => &self.request,
            "config" => &self.config,
            "env" => &self.env,
            "response" => &self.response,
            _ => return None,
        };
        for part in &path[1..] {
            current = current.get(part)?;
        }
        Some(current)
    }
}

/// Convert a JSON value to its template string form
fn value_to_string(value: &Value) -> Result<String> {
    match value {
        Value::String(s) => Ok(s.clone()),
        Value::Number(n) => Ok(n.to_string()),
        Value::Bool(b) => Ok(b.to_string()),
        Value::Null => Ok("null".to_string()),
        Value::Array(_) | Value::Object(_) => serde_json::to_string(value)
            .map_err(|e| GatewayError::template(format!("failed to serialize value: {}", e))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_basic_substitution() {
        let ctx = TemplateContext::new(json!({"message": "hello world"}));
        let result = render_str("echo {{ args.message }}", &ctx).unwrap();
        assert_eq!(result, "echo hello world");
    }

    #[test]
    fn test_nested_args() {
        let ctx = TemplateContext::new(json!({"user": {"name": "ada", "id": 7}}));
        let result = render_str("{{args.user.name}}/{{args.user.id}}", &ctx).unwrap();
        assert_eq!(result, "ada/7");
    }

    #[test]
    fn test_missing_arg_is_invalid_params() {
        let ctx = TemplateContext::new(json!({}));
        let err = render_str("{{ args.missing }}", &ctx).unwrap_err();
        assert!(matches!(err, GatewayError::InvalidParams { .. }));
    }

    #[test]
    fn test_missing_request_key_renders_empty() {
        let ctx = TemplateContext::new(json!({}))
            .with_request(HashMap::new(), HashMap::new(), "/");
        let result = render_str("[{{ request.headers.Authorization }}]", &ctx).unwrap();
        assert_eq!(result, "[]");
    }

    #[test]
    fn test_non_string_values_json_encode() {
        let ctx = TemplateContext::new(json!({"tags": ["a", "b"], "count": 3}));
        let result = render_str("{{args.tags}} x{{args.count}}", &ctx).unwrap();
        assert_eq!(result, r#"["a","b"] x3"#);
    }

    #[test]
    fn test_config_and_env_roots() {
        let mut config = HashMap::new();
        config.insert("apiKey".to_string(), "secret".to_string());
        let mut env = HashMap::new();
        env.insert("HOME".to_string(), "/home/ada".to_string());
        let ctx = TemplateContext::new(json!({}))
            .with_config(&config)
            .with_env(&env);
        let result = render_str("{{config.apiKey}}:{{env.HOME}}", &ctx).unwrap();
        assert_eq!(result, "secret:/home/ada");
    }

    #[test]
    fn test_response_root() {
        let ctx = TemplateContext::new(json!({}))
            .with_response(r#"{"k":1}"#, json!({"k": 1}));
        assert_eq!(render_str("{{response.body}}", &ctx).unwrap(), r#"{"k":1}"#);
        assert_eq!(render_str("{{response.data.k}}", &ctx).unwrap(), "1");
    }

    #[test]
    fn test_parse_errors() {
        assert!(Template::parse("{{ args.x").is_err());
        assert!(Template::parse("{{ }}").is_err());
        assert!(Template::parse("{{ bogus.x }}").is_err());
        assert!(Template::parse("{{ args..x }}").is_err());
    }

    #[test]
    fn test_render_map() {
        let ctx = TemplateContext::new(json!({"token": "t0"}));
        let mut map = HashMap::new();
        map.insert("Authorization".to_string(), "Bearer {{args.token}}".to_string());
        let rendered = render_map(&map, &ctx).unwrap();
        assert_eq!(rendered["Authorization"], "Bearer t0");
    }
}
