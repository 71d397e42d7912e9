use async_trait::async_trait;

use crate::application::errors::DownloadError;

/// HttpClient trait - one buffered GET
#[async_trait]
pub trait HttpClient: Send + Sync {
    /// Fetch `url` and return the full response body
    async fn get(&self, url: &str) -> Result<Vec<u8>, DownloadError>;
}
