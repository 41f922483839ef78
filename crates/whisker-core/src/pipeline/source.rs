//! Remote image source: the metadata endpoint and per-image downloads.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::config::Config;
use crate::error::{ConfigError, DiscoveryError, PipelineError, PipelineResult};

/// One object of the metadata response. Fields other than `url` are ignored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceEntry {
    pub url: String,
}

/// Where a batch gets its images from.
#[async_trait]
pub trait ImageSource: Send + Sync {
    /// List up to `limit` images, in response order.
    async fn discover(&self, limit: usize) -> Result<Vec<SourceEntry>, DiscoveryError>;

    /// Raw bytes of one image.
    async fn fetch(&self, index: usize, url: &str) -> PipelineResult<Vec<u8>>;
}

/// HTTP implementation: `GET base_url?limit=N` with an optional
/// `x-api-key` header, then a plain `GET` per image URL.
pub struct HttpSource {
    base_url: String,
    api_key: Option<String>,
    client: reqwest::Client,
}

impl HttpSource {
    /// A source whose requests never time out on their own.
    pub fn new(base_url: impl Into<String>, api_key: Option<String>) -> Self {
        Self {
            base_url: base_url.into(),
            api_key,
            client: reqwest::Client::new(),
        }
    }

    /// Bound every metadata and image request by `timeout`.
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_else(|e| {
                tracing::warn!("Falling back to default HTTP client: {e}");
                reqwest::Client::new()
            });
        self
    }

    /// Build from `[source]`, resolving `${ENV}` references.
    pub fn from_config(config: &Config) -> Result<Self, ConfigError> {
        let source = Self::new(config.base_url()?, config.api_key());
        Ok(match config.source.request_timeout_secs {
            Some(secs) => source.with_request_timeout(Duration::from_secs(secs)),
            None => source,
        })
    }
}

#[async_trait]
impl ImageSource for HttpSource {
    async fn discover(&self, limit: usize) -> Result<Vec<SourceEntry>, DiscoveryError> {
        let mut request = self.client.get(&self.base_url).query(&[("limit", limit)]);
        if let Some(key) = &self.api_key {
            request = request.header("x-api-key", key);
        }

        let resp = request.send().await.map_err(|e| DiscoveryError::Request {
            url: self.base_url.clone(),
            message: e.to_string(),
        })?;

        let status = resp.status();
        if !status.is_success() {
            return Err(DiscoveryError::Status {
                url: self.base_url.clone(),
                status: status.as_u16(),
            });
        }

        let body = resp.bytes().await.map_err(|e| DiscoveryError::Request {
            url: self.base_url.clone(),
            message: e.to_string(),
        })?;
        let mut entries: Vec<SourceEntry> =
            serde_json::from_slice(&body).map_err(|e| DiscoveryError::Malformed {
                url: self.base_url.clone(),
                message: e.to_string(),
            })?;

        if entries.len() > limit {
            tracing::debug!(
                "Metadata endpoint returned {} entries, keeping {limit}",
                entries.len()
            );
            entries.truncate(limit);
        }
        Ok(entries)
    }

    async fn fetch(&self, index: usize, url: &str) -> PipelineResult<Vec<u8>> {
        let download_error = |message: String, status_code: Option<u16>| PipelineError::Download {
            index,
            url: url.to_string(),
            message,
            status_code,
        };

        let resp = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| download_error(format!("request failed: {e}"), None))?;

        let status = resp.status();
        if !status.is_success() {
            let message = format!("HTTP {status}");
            return Err(download_error(message, Some(status.as_u16())));
        }

        let bytes = resp
            .bytes()
            .await
            .map_err(|e| download_error(format!("reading body failed: {e}"), None))?;
        Ok(bytes.to_vec())
    }
}
