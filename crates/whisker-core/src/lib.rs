//! Whisker Core - image ingestion and feature-extraction library.
//!
//! Whisker pulls a batch of images from a remote metadata endpoint, runs a
//! spatial-filter extractor over each one, and writes the originals and the
//! results as PNG files.
//!
//! # Architecture
//!
//! ```text
//! Discover → Download (async, concurrent) → Process (thread pool) → Persist (async)
//! ```
//!
//! The numeric side lives in [`filters`] and is usable on its own; the
//! [`processor`] facade applies it to [`ImageRecord`]s, and [`pipeline`]
//! schedules the stages.
//!
//! # Usage
//!
//! ```rust,ignore
//! use whisker_core::{Config, Pipeline};
//!
//! #[tokio::main]
//! async fn main() -> whisker_core::Result<()> {
//!     let config = Config::load()?;
//!     let pipeline = Pipeline::from_config(&config)?;
//!
//!     let report = pipeline.run(config.source.limit).await?;
//!     println!("Persisted {} of {}", report.persisted, report.discovered);
//!     Ok(())
//! }
//! ```

// Module declarations
pub mod config;
pub mod error;
pub mod filters;
pub mod pipeline;
pub mod processor;
pub mod types;

// Re-exports for convenient access
pub use config::Config;
pub use error::{
    ConfigError, DiscoveryError, FilterError, PipelineError, PipelineResult, Result, WhiskerError,
};
pub use filters::{Border, FeatureExtractor, HarrisParams, Kernel, Precision};
pub use pipeline::{
    read_image_file, write_image_file, HttpSource, ImageSource, ImageStore, OutputKind, Pipeline,
    Progress, ProgressFn,
};
pub use processor::{ImageProcessor, Operation};
pub use types::{BatchReport, Exclusion, Frame, ImageRecord, Stage};

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
