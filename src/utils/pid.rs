//! PID file management

use crate::error::{GatewayError, Result};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Writes the process id at startup and removes it at exit
#[derive(Debug, Clone)]
pub struct PidManager {
    path: Option<PathBuf>,
}

impl PidManager {
    /// A manager for the given path; `None` disables PID handling
    pub fn new(path: Option<PathBuf>) -> Self {
        Self { path }
    }

    /// The configured PID file path
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Write the current process id
    pub fn write(&self) -> Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    GatewayError::config(format!(
                        "failed to create PID directory {}: {}",
                        parent.display(),
                        e
                    ))
                })?;
            }
        }
        std::fs::write(path, std::process::id().to_string()).map_err(|e| {
            GatewayError::config(format!("failed to write PID file {}: {}", path.display(), e))
        })?;
        info!("Wrote PID file {}", path.display());
        Ok(())
    }

    /// Remove the PID file; failures are logged, not fatal
    pub fn remove(&self) {
        if let Some(path) = &self.path {
            if let Err(e) = std::fs::remove_file(path) {
                warn!("Failed to remove PID file {}: {}", path.display(), e);
            }
        }
    }
}

/// Read a process id from a PID file
pub fn read_pid(path: &Path) -> Result<i32> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        GatewayError::config(format!("failed to read PID file {}: {}", path.display(), e))
    })?;
    content.trim().parse().map_err(|_| {
        GatewayError::config(format!("invalid PID in file {}", path.display()))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_read_remove() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gateway.pid");
        let manager = PidManager::new(Some(path.clone()));

        manager.write().unwrap();
        assert_eq!(read_pid(&path).unwrap(), std::process::id() as i32);

        manager.remove();
        assert!(!path.exists());
    }

    #[test]
    fn test_disabled_manager_is_noop() {
        let manager = PidManager::new(None);
        manager.write().unwrap();
        manager.remove();
    }
}
