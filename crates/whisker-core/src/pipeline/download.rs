//! Concurrent download stage.

use futures_util::stream::{self, StreamExt};
use std::sync::Arc;

use super::decode::ImageDecoder;
use super::retry::{backoff_duration, is_retryable};
use super::source::ImageSource;
use crate::config::{LimitsConfig, SourceConfig};
use crate::error::{PipelineError, PipelineResult};
use crate::types::ImageRecord;

/// Fetches and decodes every pending record with bounded concurrency.
///
/// All downloads are driven from the calling task; only decoding is moved
/// to the blocking pool.
pub struct Downloader {
    source: Arc<dyn ImageSource>,
    decoder: ImageDecoder,
    max_concurrent: usize,
    retry_attempts: u32,
    retry_delay_ms: u64,
}

impl Downloader {
    pub fn new(source: Arc<dyn ImageSource>, config: &SourceConfig, limits: LimitsConfig) -> Self {
        Self {
            source,
            decoder: ImageDecoder::new(limits),
            max_concurrent: config.max_concurrent_downloads.max(1),
            retry_attempts: config.retry_attempts,
            retry_delay_ms: config.retry_delay_ms,
        }
    }

    /// Download all records. Results are sorted by index regardless of
    /// completion order; `on_done` is called as each item settles.
    pub async fn download_all(
        &self,
        pending: &[ImageRecord],
        on_done: &(dyn Fn(usize, bool) + Sync),
    ) -> Vec<(usize, PipelineResult<ImageRecord>)> {
        let mut results: Vec<(usize, PipelineResult<ImageRecord>)> = stream::iter(pending)
            .map(|record| async move {
                let outcome = self.download_one(record).await;
                on_done(record.index(), outcome.is_ok());
                (record.index(), outcome)
            })
            .buffer_unordered(self.max_concurrent)
            .collect()
            .await;
        results.sort_by_key(|(index, _)| *index);
        results
    }

    /// Fetch with retries, then decode into a new record.
    pub async fn download_one(&self, record: &ImageRecord) -> PipelineResult<ImageRecord> {
        let index = record.index();
        let url = record.origin().ok_or_else(|| PipelineError::Download {
            index,
            url: String::new(),
            message: "record has no origin URL".to_string(),
            status_code: None,
        })?;

        let mut attempt = 0;
        let bytes = loop {
            match self.source.fetch(index, url).await {
                Ok(bytes) => break bytes,
                Err(e) if attempt < self.retry_attempts && is_retryable(&e) => {
                    let delay = backoff_duration(attempt, self.retry_delay_ms);
                    tracing::warn!(
                        index,
                        attempt = attempt + 1,
                        "Download failed, retrying in {:?}: {e}",
                        delay
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        };
        tracing::debug!(index, bytes = bytes.len(), "Downloaded {url}");

        let frame = self.decoder.decode(index, url, bytes).await?;
        Ok(record.with_image(frame))
    }
}
