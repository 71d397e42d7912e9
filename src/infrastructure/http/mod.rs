//! reqwest-backed HTTP client

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;

use crate::application::errors::DownloadError;
use crate::domain::traits::HttpClient;

const USER_AGENT: &str = concat!("carik-plugins/", env!("CARGO_PKG_VERSION"));

/// HTTP client used for registry documents and archives
pub struct ReqwestHttpClient {
    client: Client,
}

impl ReqwestHttpClient {
    pub fn new(timeout_secs: u64) -> Result<Self, DownloadError> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| DownloadError::NetworkFailure(e.to_string()))?;

        Ok(Self { client })
    }
}

#[async_trait]
impl HttpClient for ReqwestHttpClient {
    async fn get(&self, url: &str) -> Result<Vec<u8>, DownloadError> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| DownloadError::NetworkFailure(e.to_string()))?;

        if !response.status().is_success() {
            return Err(DownloadError::HttpStatus {
                status: response.status().as_u16(),
                url: url.to_string(),
            });
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| DownloadError::NetworkFailure(e.to_string()))?;
        Ok(bytes.to_vec())
    }
}
