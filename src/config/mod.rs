//! Configuration management for the MCP Gateway
//!
//! Service settings, config store documents, deterministic merge into an
//! immutable snapshot, the file-backed store, and the change notifier.

mod config;
mod merge;
mod notifier;
mod storage;
mod types;

pub use config::{
    GatewaySettings, ListenSettings, NotifierSettings, RedisSettings, SessionBackend,
    SessionSettings, StorageSettings,
};
pub use merge::{merge_configs, GatewaySnapshot, RouteTarget};
pub use notifier::{disabled_notifier, ConfigNotifier};
pub use storage::FileConfigStore;
pub use types::{
    ConfigDocument, McpServerConfig, McpServerType, RequestTemplate, ResponseTemplate,
    RouterConfig, ServerConfig, ToolDefinition,
};
