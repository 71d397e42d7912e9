//! Persistence of the configured plugin list

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tokio::sync::RwLock;

use crate::application::errors::StorageError;
use crate::domain::traits::PluginStore;

#[derive(Debug, Default, Deserialize, Serialize)]
struct StateFile {
    #[serde(default)]
    plugins: Vec<String>,
}

/// YAML file-based store
pub struct YamlPluginStore {
    path: PathBuf,
}

impl YamlPluginStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl PluginStore for YamlPluginStore {
    async fn load(&self) -> Result<Vec<String>, StorageError> {
        let content = match tokio::fs::read_to_string(&self.path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let state: StateFile = serde_yaml::from_str(&content)
            .map_err(|e| StorageError::Serialization(e.to_string()))?;
        Ok(state.plugins)
    }

    async fn save(&self, plugins: &[String]) -> Result<(), StorageError> {
        let state = StateFile {
            plugins: plugins.to_vec(),
        };
        let yaml = serde_yaml::to_string(&state)
            .map_err(|e| StorageError::Serialization(e.to_string()))?;

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }

        // Readers never see a half-written file
        let tmp = self.path.with_extension(format!("tmp-{}", uuid::Uuid::new_v4()));
        tokio::fs::write(&tmp, yaml).await?;
        if let Err(e) = tokio::fs::rename(&tmp, &self.path).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(e.into());
        }
        Ok(())
    }
}

/// In-memory store
#[derive(Default)]
pub struct MemoryPluginStore {
    plugins: RwLock<Vec<String>>,
}

impl MemoryPluginStore {
    pub fn new(plugins: Vec<String>) -> Self {
        Self {
            plugins: RwLock::new(plugins),
        }
    }

    pub async fn snapshot(&self) -> Vec<String> {
        self.plugins.read().await.clone()
    }
}

#[async_trait]
impl PluginStore for MemoryPluginStore {
    async fn load(&self) -> Result<Vec<String>, StorageError> {
        Ok(self.plugins.read().await.clone())
    }

    async fn save(&self, plugins: &[String]) -> Result<(), StorageError> {
        *self.plugins.write().await = plugins.to_vec();
        Ok(())
    }
}
