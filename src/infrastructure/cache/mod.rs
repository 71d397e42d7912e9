//! Artifact cache - downloaded repository archives keyed by owner, repository and branch

use std::path::PathBuf;

use crate::application::errors::DownloadError;
use crate::domain::entities::PluginRef;

/// On-disk archive store
pub struct ArtifactCache {
    root: PathBuf,
}

impl ArtifactCache {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Archive location for the plugin's repository branch
    pub fn path_for(&self, plugin: &PluginRef) -> PathBuf {
        self.root.join(plugin.cache_file_name())
    }

    /// Cached archive bytes, `None` on a miss
    pub async fn read(&self, plugin: &PluginRef) -> Result<Option<Vec<u8>>, DownloadError> {
        match tokio::fs::read(self.path_for(plugin)).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Store archive bytes; a failed write leaves no partial entry behind
    pub async fn write(&self, plugin: &PluginRef, bytes: &[u8]) -> Result<PathBuf, DownloadError> {
        let path = self.path_for(plugin);
        tokio::fs::create_dir_all(&self.root)
            .await
            .map_err(|e| DownloadError::CacheWriteFailure(format!("{}: {}", self.root.display(), e)))?;

        let tmp = self
            .root
            .join(format!(".{}.{}.part", plugin.cache_file_name(), uuid::Uuid::new_v4()));

        let result = async {
            tokio::fs::write(&tmp, bytes).await?;
            tokio::fs::rename(&tmp, &path).await
        }
        .await;

        if let Err(e) = result {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(DownloadError::CacheWriteFailure(format!(
                "{}: {}",
                path.display(),
                e
            )));
        }

        Ok(path)
    }
}
