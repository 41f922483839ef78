//! Error types for the Whisker pipeline.
//!
//! Errors are organized by stage. Only configuration and discovery failures
//! abort a batch; everything in [`PipelineError`] is per-item and ends up as an
//! exclusion in the batch report.

use std::path::PathBuf;
use thiserror::Error;

/// Top-level error type for Whisker operations.
#[derive(Error, Debug)]
pub enum WhiskerError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// The metadata request failed; the batch cannot start
    #[error("Discovery error: {0}")]
    Discovery(#[from] DiscoveryError),

    /// General I/O errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// The process-stage worker pool could not be started
    #[error("Worker pool error: {0}")]
    WorkerPool(#[from] rayon::ThreadPoolBuildError),
}

/// Configuration-specific errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Failed to read the config file from disk
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    /// Failed to parse TOML configuration
    #[error("Failed to parse config: {0}")]
    ParseError(#[from] toml::de::Error),

    /// Configuration values are invalid
    #[error("Invalid configuration: {0}")]
    ValidationError(String),

    /// A required value is unset (or references an unset env var)
    #[error("Missing configuration value: {0}")]
    MissingValue(&'static str),
}

/// Failure of the single metadata request that starts a batch.
#[derive(Error, Debug)]
pub enum DiscoveryError {
    /// Transport-level failure (DNS, connect, TLS, ...)
    #[error("Metadata request to {url} failed: {message}")]
    Request { url: String, message: String },

    /// Non-2xx response from the metadata endpoint
    #[error("Metadata endpoint {url} returned HTTP {status}")]
    Status { url: String, status: u16 },

    /// Body was not a JSON array of objects carrying a `url`
    #[error("Malformed metadata response from {url}: {message}")]
    Malformed { url: String, message: String },
}

/// Errors raised by the convolution engine and feature extractors.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum FilterError {
    /// Image has a zero-length spatial axis
    #[error("Image is empty ({height}x{width})")]
    EmptyImage { height: usize, width: usize },

    /// Kernel has a zero-length axis
    #[error("Kernel is empty")]
    EmptyKernel,

    /// Kernel does not fit inside the padded image
    #[error("Kernel {kernel:?} exceeds padded image {padded:?}")]
    KernelTooLarge {
        kernel: (usize, usize),
        padded: (usize, usize),
    },

    /// Only 2D (H×W) and 3D (H×W×C) arrays are supported
    #[error("Unsupported image rank {0}, expected 2 or 3")]
    UnsupportedRank(usize),

    /// Too few channels for the requested operation
    #[error("Expected at least {expected} channels, found {actual}")]
    ChannelCount { expected: usize, actual: usize },

    /// Gamma must be strictly positive and finite
    #[error("Gamma must be > 0, got {0}")]
    InvalidGamma(f64),

    /// A detector parameter is out of range
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    /// Two payloads could not be combined element-wise
    #[error("Shape mismatch: {left:?} vs {right:?}")]
    ShapeMismatch { left: Vec<usize>, right: Vec<usize> },

    /// Array reshaping failed
    #[error("Shape error: {0}")]
    Shape(String),
}

impl From<ndarray::ShapeError> for FilterError {
    fn from(e: ndarray::ShapeError) -> Self {
        FilterError::Shape(e.to_string())
    }
}

/// Per-item pipeline errors, keyed by ordinal index.
#[derive(Error, Debug, Clone)]
pub enum PipelineError {
    /// Network failure or non-2xx response while fetching image bytes
    #[error("Download failed for #{index} ({url}): {message}")]
    Download {
        index: usize,
        url: String,
        message: String,
        status_code: Option<u16>,
    },

    /// Downloaded bytes are not a decodable raster image
    #[error("Decode error for #{index} ({url}): {message}")]
    Decode {
        index: usize,
        url: String,
        message: String,
    },

    /// Record reached processing without a payload
    #[error("Record #{index} has no image data")]
    MissingData { index: usize },

    /// The extractor rejected the image
    #[error("Filter failed for #{index}: {source}")]
    Filter {
        index: usize,
        #[source]
        source: FilterError,
    },

    /// The worker running this item panicked
    #[error("Worker crashed while processing #{index}: {message}")]
    WorkerPanic { index: usize, message: String },

    /// Encoding or writing an output file failed
    #[error("Failed to write {path}: {message}")]
    Persist { path: PathBuf, message: String },
}

/// Convenience type alias for Whisker results.
pub type Result<T> = std::result::Result<T, WhiskerError>;

/// Convenience type alias for per-item pipeline results.
pub type PipelineResult<T> = std::result::Result<T, PipelineError>;

/// Convenience type alias for filter results.
pub type FilterResult<T> = std::result::Result<T, FilterError>;
