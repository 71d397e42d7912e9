use async_trait::async_trait;

use crate::application::errors::StorageError;

/// PluginStore trait - persistence of the configured plugin list
#[async_trait]
pub trait PluginStore: Send + Sync {
    async fn load(&self) -> Result<Vec<String>, StorageError>;
    async fn save(&self, plugins: &[String]) -> Result<(), StorageError>;
}
