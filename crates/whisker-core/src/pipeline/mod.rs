//! Batch orchestration.
//!
//! A batch runs four stages, each finishing completely before the next
//! starts:
//! - **discover**: one metadata request; entries get 1-based indices
//! - **download**: concurrent fetch + decode on the async runtime
//! - **process**: the configured extractor on a dedicated thread pool
//! - **persist**: concurrent PNG writes
//!
//! Per-item failures become [`Exclusion`]s. An item that fails to download
//! skips every later stage; an item that fails to process still has its
//! original persisted. Only configuration and discovery errors fail the
//! batch.

pub mod decode;
pub mod download;
pub mod persist;
pub mod pool;
pub mod retry;
pub mod source;

// Re-exports for convenient access
pub use decode::ImageDecoder;
pub use download::Downloader;
pub use persist::{read_image_file, write_image_file, ImageStore, OutputKind};
pub use pool::WorkerPool;
pub use source::{HttpSource, ImageSource, SourceEntry};

use futures_util::future::join_all;
use std::sync::Arc;
use std::time::Instant;

use crate::config::Config;
use crate::error::{PipelineError, PipelineResult, Result};
use crate::processor::{ImageProcessor, Operation};
use crate::types::{BatchReport, Exclusion, ImageRecord, Stage};

/// Progress notifications emitted while a batch runs.
#[derive(Debug, Clone, PartialEq)]
pub enum Progress {
    StageStarted {
        stage: Stage,
        items: usize,
    },
    ItemFinished {
        stage: Stage,
        index: usize,
        ok: bool,
    },
    StageFinished {
        stage: Stage,
        succeeded: usize,
        excluded: usize,
    },
}

/// Callback receiving [`Progress`] events.
pub type ProgressFn = Arc<dyn Fn(&Progress) + Send + Sync>;

/// Output of one item's process job.
struct Derived {
    processed: ImageRecord,
    enhanced: Option<ImageRecord>,
}

/// A downloaded item on its way to persist; `derived` is `None` when the
/// process job failed.
struct Processed {
    original: Arc<ImageRecord>,
    derived: Option<Derived>,
}

/// Fetch → download → process → persist over one batch.
pub struct Pipeline {
    source: Arc<dyn ImageSource>,
    downloader: Downloader,
    processor: Arc<ImageProcessor>,
    store: ImageStore,
    workers: usize,
    write_enhanced: bool,
    progress: Option<ProgressFn>,
}

impl Pipeline {
    /// Build a pipeline over an arbitrary source.
    pub fn new(config: &Config, source: Arc<dyn ImageSource>) -> Self {
        let limits = config.limits.clone();
        Self {
            downloader: Downloader::new(Arc::clone(&source), &config.source, limits),
            source,
            processor: Arc::new(ImageProcessor::new(&config.processing)),
            store: ImageStore::new(config.output_dir()),
            workers: config.processing.parallel_workers,
            write_enhanced: config.processing.write_enhanced,
            progress: None,
        }
    }

    /// Build a pipeline over the HTTP source described by `[source]`.
    ///
    /// Fails with a configuration error if the base URL is unset.
    pub fn from_config(config: &Config) -> Result<Self> {
        config.validate()?;
        let source = HttpSource::from_config(config)?;
        Ok(Self::new(config, Arc::new(source)))
    }

    pub fn with_progress(mut self, progress: ProgressFn) -> Self {
        self.progress = Some(progress);
        self
    }

    /// Run one batch of up to `limit` images.
    pub async fn run(&self, limit: usize) -> Result<BatchReport> {
        let start = Instant::now();
        let operation = self.processor.operation();
        tracing::info!(limit, %operation, output = ?self.store.dir(), "Starting pipeline");

        let mut report = BatchReport::default();

        let pending = self.discover(limit).await?;
        report.discovered = pending.len();

        let downloaded = self.download(&pending, &mut report).await;
        report.downloaded = downloaded.len();

        let processed = self.process(downloaded, &mut report).await?;
        self.persist(processed, &mut report).await;

        report.total_seconds = start.elapsed().as_secs_f64();
        tracing::info!(
            "Finished pipeline in {:.2?}: {} persisted, {} excluded",
            start.elapsed(),
            report.persisted,
            report.excluded()
        );
        Ok(report)
    }

    async fn discover(&self, limit: usize) -> Result<Vec<ImageRecord>> {
        self.emit(Progress::StageStarted {
            stage: Stage::Discover,
            items: limit,
        });
        tracing::info!("Fetching image list...");

        let entries = self.source.discover(limit).await?;
        let pending: Vec<ImageRecord> = entries
            .into_iter()
            .enumerate()
            .map(|(i, entry)| ImageRecord::pending(i + 1, entry.url))
            .collect();

        self.finish_stage(Stage::Discover, pending.len(), 0);
        Ok(pending)
    }

    async fn download(
        &self,
        pending: &[ImageRecord],
        report: &mut BatchReport,
    ) -> Vec<Arc<ImageRecord>> {
        self.emit(Progress::StageStarted {
            stage: Stage::Download,
            items: pending.len(),
        });
        tracing::info!("Downloading {} images...", pending.len());

        let notify = |index: usize, ok: bool| {
            self.emit(Progress::ItemFinished {
                stage: Stage::Download,
                index,
                ok,
            })
        };
        let results = self.downloader.download_all(pending, &notify).await;

        let mut downloaded = Vec::with_capacity(results.len());
        for (index, outcome) in results {
            match outcome {
                Ok(record) => downloaded.push(Arc::new(record)),
                Err(e) => exclude(report, index, Stage::Download, &e),
            }
        }

        let failed = pending.len() - downloaded.len();
        self.finish_stage(Stage::Download, downloaded.len(), failed);
        downloaded
    }

    /// Run the extractor over every downloaded record. Every record is
    /// returned, in input order, whether or not its job succeeded.
    async fn process(
        &self,
        downloaded: Vec<Arc<ImageRecord>>,
        report: &mut BatchReport,
    ) -> Result<Vec<Processed>> {
        let total = downloaded.len();
        self.emit(Progress::StageStarted {
            stage: Stage::Process,
            items: total,
        });

        // The pool lives only for this stage.
        let pool = WorkerPool::new(self.workers)?;
        tracing::info!(
            "Processing {} images on {} workers...",
            total,
            pool.workers()
        );

        let processor = Arc::clone(&self.processor);
        let write_enhanced = self.write_enhanced;
        let inputs: Vec<(usize, Arc<ImageRecord>)> = downloaded
            .iter()
            .map(|record| (record.index(), Arc::clone(record)))
            .collect();
        let results = pool
            .run_all(inputs, move |original| derive(&processor, &original, write_enhanced))
            .await;
        drop(pool);

        // run_all preserves input order, so originals line up one-to-one
        let mut items = Vec::with_capacity(total);
        for ((index, outcome), original) in results.into_iter().zip(downloaded) {
            self.emit(Progress::ItemFinished {
                stage: Stage::Process,
                index,
                ok: outcome.is_ok(),
            });
            let derived = match outcome {
                Ok(derived) => Some(derived),
                Err(e) => {
                    exclude(report, index, Stage::Process, &e);
                    None
                }
            };
            items.push(Processed { original, derived });
        }

        report.processed = items.iter().filter(|item| item.derived.is_some()).count();
        self.finish_stage(Stage::Process, report.processed, total - report.processed);
        Ok(items)
    }

    /// Write every original, plus the derived outputs of items that
    /// processed successfully.
    async fn persist(&self, items: Vec<Processed>, report: &mut BatchReport) {
        self.emit(Progress::StageStarted {
            stage: Stage::Persist,
            items: items.len(),
        });
        tracing::info!("Saving {} items to {:?}...", items.len(), self.store.dir());

        if let Err(e) = self.store.ensure_dir().await {
            tracing::error!(
                "Failed to create output directory {:?}: {e}",
                self.store.dir()
            );
        }

        let writes = items.into_iter().map(|item| async move {
            let index = item.original.index();
            let complete = item.derived.is_some();
            let mut outputs = vec![(item.original, OutputKind::Original)];
            if let Some(derived) = item.derived {
                outputs.push((Arc::new(derived.processed), OutputKind::Processed));
                if let Some(enhanced) = derived.enhanced {
                    outputs.push((Arc::new(enhanced), OutputKind::Enhanced));
                }
            }
            let results = join_all(
                outputs
                    .into_iter()
                    .map(|(record, kind)| self.store.write(record, kind)),
            )
            .await;
            (index, complete, results)
        });
        let per_item = join_all(writes).await;

        let total = per_item.len();
        let mut persisted = 0;
        let mut failed = 0;
        for (index, complete, results) in per_item {
            let mut ok = true;
            for result in results {
                match result {
                    Ok(path) => report.files.push(path),
                    Err(e) => {
                        ok = false;
                        exclude(report, index, Stage::Persist, &e);
                    }
                }
            }
            if !ok {
                failed += 1;
            } else if complete {
                persisted += 1;
            }
            self.emit(Progress::ItemFinished {
                stage: Stage::Persist,
                index,
                ok,
            });
        }
        report.persisted = persisted;
        self.finish_stage(Stage::Persist, total - failed, failed);
    }

    fn finish_stage(&self, stage: Stage, succeeded: usize, excluded: usize) {
        tracing::info!(%stage, succeeded, excluded, "Stage complete");
        self.emit(Progress::StageFinished {
            stage,
            succeeded,
            excluded,
        });
    }

    fn emit(&self, event: Progress) {
        if let Some(progress) = &self.progress {
            progress(&event);
        }
    }
}

/// The CPU-bound job for one item.
fn derive(
    processor: &ImageProcessor,
    original: &ImageRecord,
    write_enhanced: bool,
) -> PipelineResult<Derived> {
    let processed = processor.apply(original)?;
    let enhanced = if write_enhanced {
        let edges = if processor.operation() == Operation::Edges {
            processed.clone()
        } else {
            processor.edge_detection(original)?
        };
        Some(processor.enhance(original, &edges)?)
    } else {
        None
    };
    Ok(Derived {
        processed,
        enhanced,
    })
}

fn exclude(report: &mut BatchReport, index: usize, stage: Stage, error: &PipelineError) {
    tracing::warn!(index, %stage, "Excluding item: {error}");
    report.exclusions.push(Exclusion {
        index,
        stage,
        reason: error.to_string(),
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DiscoveryError;
    use crate::types::Frame;
    use async_trait::async_trait;
    use image::{DynamicImage, ImageFormat, RgbImage};
    use ndarray::{Array2, Array3};
    use std::io::Cursor;
    use std::path::Path;
    use std::sync::Mutex;

    /// Serves generated PNGs; URLs containing "broken" fail with 500.
    struct FakeSource {
        urls: Vec<String>,
    }

    #[async_trait]
    impl ImageSource for FakeSource {
        async fn discover(
            &self,
            limit: usize,
        ) -> std::result::Result<Vec<SourceEntry>, DiscoveryError> {
            Ok(self
                .urls
                .iter()
                .take(limit)
                .map(|url| SourceEntry { url: url.clone() })
                .collect())
        }

        async fn fetch(&self, index: usize, url: &str) -> PipelineResult<Vec<u8>> {
            if url.contains("broken") {
                return Err(PipelineError::Download {
                    index,
                    url: url.to_string(),
                    message: "HTTP 500".to_string(),
                    status_code: Some(500),
                });
            }
            let image = DynamicImage::ImageRgb8(RgbImage::from_fn(8, 6, |x, y| {
                image::Rgb([(x * 30) as u8, (y * 40) as u8, 90])
            }));
            let mut buf = Cursor::new(Vec::new());
            image
                .write_to(&mut buf, ImageFormat::Png)
                .map_err(|e| PipelineError::Decode {
                    index,
                    url: url.to_string(),
                    message: e.to_string(),
                })?;
            Ok(buf.into_inner())
        }
    }

    struct FailingDiscovery;

    #[async_trait]
    impl ImageSource for FailingDiscovery {
        async fn discover(
            &self,
            _limit: usize,
        ) -> std::result::Result<Vec<SourceEntry>, DiscoveryError> {
            Err(DiscoveryError::Status {
                url: "http://meta".to_string(),
                status: 503,
            })
        }

        async fn fetch(&self, _index: usize, _url: &str) -> PipelineResult<Vec<u8>> {
            unreachable!("no items are discovered")
        }
    }

    fn config(dir: &Path) -> Config {
        let mut config = Config::default();
        config.output.dir = dir.to_path_buf();
        config.source.retry_attempts = 0;
        config.processing.parallel_workers = 2;
        config
    }

    fn source(urls: &[&str]) -> Arc<dyn ImageSource> {
        Arc::new(FakeSource {
            urls: urls.iter().map(|u| u.to_string()).collect(),
        })
    }

    fn file_names(report: &BatchReport) -> Vec<String> {
        report
            .files
            .iter()
            .filter_map(|p| p.file_name().map(|n| n.to_string_lossy().into_owned()))
            .collect()
    }

    #[tokio::test]
    async fn test_failed_download_is_excluded_downstream() {
        let dir = tempfile::tempdir().unwrap();
        let pipeline = Pipeline::new(&config(dir.path()), source(&["a", "broken", "c"]));
        let report = pipeline.run(10).await.unwrap();

        assert_eq!(report.discovered, 3);
        assert_eq!(report.downloaded, 2);
        assert_eq!(report.processed, 2);
        assert_eq!(report.persisted, 2);
        assert_eq!(report.excluded(), 1);
        assert_eq!(report.exclusions[0].index, 2);
        assert_eq!(report.exclusions[0].stage, Stage::Download);
        assert_eq!(
            file_names(&report),
            vec![
                "1_original.png",
                "1_processed.png",
                "3_original.png",
                "3_processed.png",
            ]
        );
    }

    #[tokio::test]
    async fn test_process_failure_keeps_original() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = config(dir.path());
        config.processing.operation = Operation::Corners;
        let pipeline = Pipeline::new(&config, source(&[]));

        let rgb = Frame::Rgb(Array3::from_elem((6, 8, 3), 90));
        // corner detection needs three channels
        let luma = Frame::Luma(Array2::from_elem((6, 8), 40.0));
        let downloaded = vec![
            Arc::new(ImageRecord::new(1, None, rgb)),
            Arc::new(ImageRecord::new(2, None, luma)),
        ];

        let mut report = BatchReport::default();
        let processed = pipeline.process(downloaded, &mut report).await.unwrap();
        pipeline.persist(processed, &mut report).await;

        assert_eq!(report.processed, 1);
        assert_eq!(report.persisted, 1);
        assert_eq!(report.exclusions.len(), 1);
        assert_eq!(report.exclusions[0].index, 2);
        assert_eq!(report.exclusions[0].stage, Stage::Process);
        assert_eq!(
            file_names(&report),
            vec!["1_original.png", "1_processed.png", "2_original.png"]
        );
        assert!(!dir.path().join("2_processed.png").exists());

        let back = pipeline.store.read(1, OutputKind::Original).await.unwrap();
        assert_eq!(back, Frame::Rgb(Array3::from_elem((6, 8, 3), 90)));
    }

    #[tokio::test]
    async fn test_failed_processing_still_writes_originals() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = config(dir.path());
        config.processing.operation = Operation::Corners;
        // out of range, so every corner job fails
        config.processing.harris_threshold = 1.5;
        let pipeline = Pipeline::new(&config, source(&["a", "b"]));
        let report = pipeline.run(2).await.unwrap();

        assert_eq!(report.downloaded, 2);
        assert_eq!(report.processed, 0);
        assert_eq!(report.persisted, 0);
        assert_eq!(report.exclusions_at(Stage::Process).count(), 2);
        assert_eq!(
            file_names(&report),
            vec!["1_original.png", "2_original.png"]
        );
        assert!(dir.path().join("2_original.png").exists());
    }

    #[tokio::test]
    async fn test_limit_is_forwarded() {
        let dir = tempfile::tempdir().unwrap();
        let pipeline = Pipeline::new(&config(dir.path()), source(&["a", "b", "c"]));
        let report = pipeline.run(1).await.unwrap();
        assert_eq!(report.discovered, 1);
        assert_eq!(report.files.len(), 2);
    }

    #[tokio::test]
    async fn test_discovery_failure_aborts() {
        let dir = tempfile::tempdir().unwrap();
        let pipeline = Pipeline::new(&config(dir.path()), Arc::new(FailingDiscovery));
        let err = pipeline.run(3).await.unwrap_err();
        assert!(err.to_string().contains("503"));
        assert!(std::fs::read_dir(dir.path()).unwrap().next().is_none());
    }

    #[tokio::test]
    async fn test_enhanced_output_is_optional() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = config(dir.path());
        config.processing.write_enhanced = true;
        config.processing.operation = Operation::Corners;
        let pipeline = Pipeline::new(&config, source(&["a"]));
        let report = pipeline.run(1).await.unwrap();
        assert_eq!(report.files.len(), 3);
        assert!(dir.path().join("1_enhanced.png").exists());
    }

    #[tokio::test]
    async fn test_progress_events() {
        let dir = tempfile::tempdir().unwrap();
        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&events);
        let on_progress: ProgressFn = Arc::new(move |event: &Progress| {
            sink.lock().unwrap().push(event.clone())
        });
        let pipeline = Pipeline::new(&config(dir.path()), source(&["a", "broken"]))
            .with_progress(on_progress);
        pipeline.run(5).await.unwrap();

        let events = events.lock().unwrap();
        assert_eq!(
            events.first(),
            Some(&Progress::StageStarted {
                stage: Stage::Discover,
                items: 5,
            })
        );
        assert!(events.contains(&Progress::StageFinished {
            stage: Stage::Download,
            succeeded: 1,
            excluded: 1,
        }));
        assert_eq!(
            events.last(),
            Some(&Progress::StageFinished {
                stage: Stage::Persist,
                succeeded: 1,
                excluded: 0,
            })
        );
    }
}
