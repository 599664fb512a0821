//! File-backed config store
//!
//! The config store collaborator: `list()` returns every configuration
//! document under the configured path. A path may be a single YAML file
//! (possibly multi-document) or a directory of `.yaml`/`.yml` files, read
//! in file-name order so repeated listings are stable.

use crate::config::types::ConfigDocument;
use crate::error::{GatewayError, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Reads config documents from a file or directory
#[derive(Debug, Clone)]
pub struct FileConfigStore {
    path: PathBuf,
}

impl FileConfigStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// The path this store reads from
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// List all config documents
    pub fn list(&self) -> Result<Vec<ConfigDocument>> {
        let mut files = Vec::new();
        if self.path.is_dir() {
            for entry in std::fs::read_dir(&self.path).map_err(|e| {
                GatewayError::config(format!(
                    "failed to read config directory {}: {}",
                    self.path.display(),
                    e
                ))
            })? {
                let path = entry
                    .map_err(|e| GatewayError::config(format!("failed to list config dir: {}", e)))?
                    .path();
                if is_yaml(&path) {
                    files.push(path);
                }
            }
            files.sort();
        } else if self.path.exists() {
            files.push(self.path.clone());
        } else {
            return Err(GatewayError::config(format!(
                "config store path {} does not exist",
                self.path.display()
            )));
        }

        let mut documents = Vec::new();
        for file in &files {
            let content = std::fs::read_to_string(file).map_err(|e| {
                GatewayError::config(format!("failed to read {}: {}", file.display(), e))
            })?;
            let stem = file
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_else(|| "config".to_string());

            for (index, deserializer) in serde_yaml::Deserializer::from_str(&content).enumerate() {
                let value = serde_yaml::Value::deserialize(deserializer).map_err(|e| {
                    GatewayError::config(format!("invalid YAML in {}: {}", file.display(), e))
                })?;
                if value.is_null() {
                    continue;
                }
                let mut document: ConfigDocument =
                    serde_yaml::from_value(value).map_err(|e| {
                        GatewayError::config(format!(
                            "invalid config document in {}: {}",
                            file.display(),
                            e
                        ))
                    })?;
                if document.name.is_empty() {
                    document.name = if index == 0 {
                        stem.clone()
                    } else {
                        format!("{}#{}", stem, index)
                    };
                }
                documents.push(document);
            }
        }

        debug!(
            "Loaded {} config document(s) from {}",
            documents.len(),
            self.path.display()
        );
        Ok(documents)
    }
}

fn is_yaml(path: &Path) -> bool {
    matches!(
        path.extension().and_then(|e| e.to_str()),
        Some("yaml") | Some("yml")
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_list_directory_sorted() {
        let dir = tempfile::tempdir().unwrap();
        for (file, server) in [("b.yaml", "beta"), ("a.yaml", "alpha")] {
            let mut f = std::fs::File::create(dir.path().join(file)).unwrap();
            writeln!(f, "servers:\n  - name: {}", server).unwrap();
        }
        std::fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

        let store = FileConfigStore::new(dir.path());
        let docs = store.list().unwrap();
        assert_eq!(docs.len(), 2);
        assert_eq!(docs[0].name, "a");
        assert_eq!(docs[0].servers[0].name, "alpha");
        assert_eq!(docs[1].name, "b");
    }

    #[test]
    fn test_multi_document_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("all.yaml");
        std::fs::write(
            &path,
            "servers:\n  - name: one\n---\nservers:\n  - name: two\n",
        )
        .unwrap();

        let store = FileConfigStore::new(&path);
        let docs = store.list().unwrap();
        assert_eq!(docs.len(), 2);
        assert_eq!(docs[0].name, "all");
        assert_eq!(docs[1].name, "all#1");
    }

    #[test]
    fn test_missing_path_is_error() {
        let store = FileConfigStore::new("/definitely/not/here.yaml");
        assert!(store.list().is_err());
    }
}
