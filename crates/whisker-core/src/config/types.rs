//! Sub-configuration structs and their defaults.

use crate::processor::Operation;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Remote image source settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceConfig {
    /// Metadata endpoint (supports ${ENV_VAR} syntax)
    pub base_url: String,

    /// Sent as `x-api-key` when set (supports ${ENV_VAR} syntax)
    pub api_key: String,

    /// Descriptors requested per batch
    pub limit: usize,

    /// Downloads in flight at once
    pub max_concurrent_downloads: usize,

    /// Extra attempts for transient download failures
    pub retry_attempts: u32,

    /// Base backoff between attempts in milliseconds
    pub retry_delay_ms: u64,

    /// Per-request HTTP timeout in seconds; omitted means no timeout
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_timeout_secs: Option<u64>,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            base_url: "${BASE_URL}".to_string(),
            api_key: "${API_KEY}".to_string(),
            limit: 10,
            max_concurrent_downloads: 16,
            retry_attempts: 2,
            retry_delay_ms: 500,
            request_timeout_secs: None,
        }
    }
}

/// Feature extraction settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProcessingConfig {
    /// Worker threads in the process-stage pool
    pub parallel_workers: usize,

    /// Extractor applied to every downloaded image
    pub operation: Operation,

    /// Also persist `original - edges` as `{i}_enhanced.png`
    pub write_enhanced: bool,

    /// Harris trace penalty
    pub harris_k: f32,

    /// Harris relative response threshold
    pub harris_threshold: f32,
}

impl Default for ProcessingConfig {
    fn default() -> Self {
        Self {
            parallel_workers: std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(4),
            operation: Operation::default(),
            write_enhanced: false,
            harris_k: 0.04,
            harris_threshold: 0.01,
        }
    }
}

/// Resource limits to protect against problematic downloads.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LimitsConfig {
    /// Maximum image dimension (width or height)
    pub max_image_dimension: u32,

    /// Decode timeout in milliseconds
    pub decode_timeout_ms: u64,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_image_dimension: 10000,
            decode_timeout_ms: 5000,
        }
    }
}

/// Output settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Directory receiving `{i}_original.png` / `{i}_processed.png`
    pub dir: PathBuf,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("data"),
        }
    }
}

/// Logging settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (error, warn, info, debug, trace)
    pub level: String,

    /// Console format (pretty, json)
    pub format: String,

    /// Durable log file; omitted means console only
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
            file: Some(PathBuf::from("whisker.log")),
        }
    }
}

/// Resolve a `${ENV_VAR}` reference, pass literals through, and map the
/// empty string (or an unset variable) to `None`.
pub fn resolve_env_var(value: &str) -> Option<String> {
    if value.starts_with("${") && value.ends_with('}') {
        let var_name = &value[2..value.len() - 1];
        std::env::var(var_name).ok().filter(|v| !v.is_empty())
    } else if value.is_empty() {
        None
    } else {
        Some(value.to_string())
    }
}
