//! Fetching artifact bytes from their source URL.

use super::{DownloadError, DownloadErrorType};
use anyhow::{Context, Result};
use async_trait::async_trait;
use std::time::Duration;

#[async_trait]
pub trait AssetFetcher: Send + Sync {
    /// Fetch the full body at `url`.
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, DownloadError>;
}

pub struct HttpAssetFetcher {
    client: reqwest::Client,
}

impl HttpAssetFetcher {
    pub fn new(timeout_secs: u64) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .context("Failed to build download HTTP client")?;
        Ok(Self { client })
    }
}

fn classify(error: reqwest::Error) -> DownloadError {
    if error.is_timeout() {
        DownloadError::new(DownloadErrorType::Timeout, error.to_string())
    } else if let Some(status) = error.status() {
        DownloadError::http_status(status.as_u16())
    } else {
        DownloadError::new(DownloadErrorType::Connection, error.to_string())
    }
}

#[async_trait]
impl AssetFetcher for HttpAssetFetcher {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, DownloadError> {
        let response = self.client.get(url).send().await.map_err(classify)?;

        let status = response.status();
        if !status.is_success() {
            return Err(DownloadError::http_status(status.as_u16()));
        }

        let body = response.bytes().await.map_err(classify)?;
        Ok(body.to_vec())
    }
}
