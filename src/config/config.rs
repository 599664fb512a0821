//! Gateway service settings
//!
//! The settings file (`gateway.yaml`) configures the listeners, the config
//! store location, hot-reload notification and the session store backend.
//! Routing configuration itself lives in the config store documents, not
//! here.

use crate::error::{GatewayError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Top-level service settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewaySettings {
    /// Listener configuration
    #[serde(default)]
    pub server: ListenSettings,
    /// Config store location
    #[serde(default)]
    pub storage: StorageSettings,
    /// Hot-reload notifier
    #[serde(default)]
    pub notifier: NotifierSettings,
    /// Session store backend
    #[serde(default)]
    pub session: SessionSettings,
}

/// Listener configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListenSettings {
    /// Host to bind both listeners to
    pub host: String,
    /// Public MCP port
    pub port: u16,
    /// Internal port serving `/_reload`
    pub inner_port: u16,
    /// PID file path; not written when unset
    #[serde(default)]
    pub pid_file: Option<PathBuf>,
}

impl Default for ListenSettings {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 5235,
            inner_port: 5335,
            pid_file: None,
        }
    }
}

/// Config store location: a YAML file or a directory of YAML files
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageSettings {
    pub path: PathBuf,
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            path: PathBuf::from("./configs"),
        }
    }
}

/// Hot-reload notifier settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotifierSettings {
    /// Watch the config store path for changes
    pub watch: bool,
}

impl Default for NotifierSettings {
    fn default() -> Self {
        Self { watch: true }
    }
}

/// Session store backend choice
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionBackend {
    /// In-process map; sessions die with the replica
    Local,
    /// Redis-backed store shared between replicas
    Redis,
}

/// Session store settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionSettings {
    pub backend: SessionBackend,
    #[serde(default)]
    pub redis: RedisSettings,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            backend: SessionBackend::Local,
            redis: RedisSettings::default(),
        }
    }
}

/// Redis connection settings for the shared session store
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedisSettings {
    /// Connection URL
    pub url: String,
    /// Pub/sub topic carrying session updates and events
    pub topic: String,
}

impl Default for RedisSettings {
    fn default() -> Self {
        Self {
            url: "redis://127.0.0.1:6379".to_string(),
            topic: "mcp-gateway:sessions".to_string(),
        }
    }
}

impl Default for GatewaySettings {
    fn default() -> Self {
        Self {
            server: ListenSettings::default(),
            storage: StorageSettings::default(),
            notifier: NotifierSettings::default(),
            session: SessionSettings::default(),
        }
    }
}

impl GatewaySettings {
    /// Load settings from a YAML file, falling back to defaults when the
    /// file does not exist
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path).map_err(|e| {
            GatewayError::config(format!("failed to read {}: {}", path.display(), e))
        })?;
        let settings: GatewaySettings = serde_yaml::from_str(&content)?;
        settings.validate()?;
        Ok(settings)
    }

    /// Validate settings consistency
    pub fn validate(&self) -> Result<()> {
        if self.server.host.is_empty() {
            return Err(GatewayError::config("server.host cannot be empty"));
        }
        if self.server.port == self.server.inner_port {
            return Err(GatewayError::config(
                "server.port and server.inner_port must differ",
            ));
        }
        if self.session.backend == SessionBackend::Redis && self.session.redis.url.is_empty() {
            return Err(GatewayError::config(
                "session.redis.url is required for the redis backend",
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let settings = GatewaySettings::default();
        assert_eq!(settings.server.port, 5235);
        assert_eq!(settings.server.inner_port, 5335);
        assert_eq!(settings.session.backend, SessionBackend::Local);
        settings.validate().unwrap();
    }

    #[test]
    fn test_yaml_round_trip() {
        let yaml = r#"
server:
  host: "127.0.0.1"
  port: 8080
  inner_port: 8081
storage:
  path: "./gateway-configs"
session:
  backend: redis
  redis:
    url: "redis://redis.internal:6379"
    topic: "gw:sessions"
"#;
        let settings: GatewaySettings = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(settings.server.host, "127.0.0.1");
        assert_eq!(settings.session.backend, SessionBackend::Redis);
        assert_eq!(settings.session.redis.topic, "gw:sessions");
        settings.validate().unwrap();
    }

    #[test]
    fn test_port_collision_rejected() {
        let mut settings = GatewaySettings::default();
        settings.server.inner_port = settings.server.port;
        assert!(settings.validate().is_err());
    }
}
