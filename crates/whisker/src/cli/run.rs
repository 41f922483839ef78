//! The `whisker run` command: one batch through the full pipeline.

use clap::Args;
use indicatif::{ProgressBar, ProgressStyle};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use whisker_core::{BatchReport, Config, Operation, Pipeline, Progress, Stage};

/// Arguments for the `run` command.
#[derive(Args, Debug, Default)]
pub struct RunArgs {
    /// Number of images to request from the metadata endpoint
    #[arg(short, long)]
    pub limit: Option<usize>,

    /// Directory for the PNG outputs
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Extractor to apply (edges, corners, circles)
    #[arg(long)]
    pub operation: Option<Operation>,

    /// Number of processing threads
    #[arg(short, long)]
    pub workers: Option<usize>,

    /// Also write `original - edges` for each item
    #[arg(long)]
    pub enhanced: bool,

    /// Metadata endpoint (overrides source.base_url)
    #[arg(long, env = "BASE_URL")]
    pub base_url: Option<String>,

    /// API key sent as `x-api-key`
    #[arg(long, env = "API_KEY", hide_env_values = true)]
    pub api_key: Option<String>,

    /// Abort the batch after this many seconds
    #[arg(long)]
    pub timeout_secs: Option<u64>,

    /// Write the batch report as JSON to this file
    #[arg(long)]
    pub report: Option<PathBuf>,
}

const PROGRESS_TEMPLATE: &str =
    "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({percent}%) {msg}";

/// Execute the run command.
pub async fn execute(args: RunArgs, mut config: Config) -> anyhow::Result<()> {
    apply_overrides(&mut config, &args);
    config.validate()?;

    let limit = config.source.limit;
    let output_dir = config.output_dir();
    let timeout = args.timeout_secs.map(Duration::from_secs);
    let progress = create_progress_bar();
    let pipeline = Pipeline::from_config(&config)?
        .with_progress(progress_callback(progress.clone()));

    let outcome = run_batch(&pipeline, limit, timeout, &output_dir).await;
    progress.finish_and_clear();
    let report = outcome?;

    print_summary(&report);

    if let Some(path) = &args.report {
        std::fs::write(path, serde_json::to_string_pretty(&report)?)?;
        tracing::info!("Report written to {}", path.display());
    }

    Ok(())
}

/// Run one batch, giving up once `timeout` has elapsed.
///
/// Giving up abandons the batch but not its worker threads: jobs already
/// on the pool still run, and their results are discarded. Every `.png`
/// already in `output_dir` is complete, since files are renamed into place
/// only after they are fully written.
async fn run_batch(
    pipeline: &Pipeline,
    limit: usize,
    timeout: Option<Duration>,
    output_dir: &Path,
) -> anyhow::Result<BatchReport> {
    let Some(timeout) = timeout else {
        return Ok(pipeline.run(limit).await?);
    };
    match tokio::time::timeout(timeout, pipeline.run(limit)).await {
        Ok(report) => Ok(report?),
        Err(_) => anyhow::bail!(
            "Batch timed out after {:.1}s; files already written to {} are complete",
            timeout.as_secs_f64(),
            output_dir.display()
        ),
    }
}

/// Fold command-line flags into the loaded configuration.
fn apply_overrides(config: &mut Config, args: &RunArgs) {
    if let Some(limit) = args.limit {
        config.source.limit = limit;
    }
    if let Some(output) = &args.output {
        config.output.dir = output.clone();
    }
    if let Some(operation) = args.operation {
        config.processing.operation = operation;
    }
    if let Some(workers) = args.workers {
        config.processing.parallel_workers = workers;
    }
    if args.enhanced {
        config.processing.write_enhanced = true;
    }
    if let Some(base_url) = &args.base_url {
        config.source.base_url = base_url.clone();
    }
    if let Some(api_key) = &args.api_key {
        config.source.api_key = api_key.clone();
    }
}

fn create_progress_bar() -> ProgressBar {
    let pb = ProgressBar::new(0);
    let style = ProgressStyle::default_bar()
        .template(PROGRESS_TEMPLATE)
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("##-");
    pb.set_style(style);
    pb.set_message("starting...");
    pb
}

fn progress_callback(pb: ProgressBar) -> whisker_core::ProgressFn {
    Arc::new(move |event: &Progress| match event {
        Progress::StageStarted { stage, items } => {
            pb.set_message(stage.to_string());
            pb.set_length(*items as u64);
            pb.set_position(0);
        }
        Progress::ItemFinished { .. } => pb.inc(1),
        Progress::StageFinished { .. } => {}
    })
}

/// Print a formatted summary table after the batch.
fn print_summary(report: &BatchReport) {
    eprintln!();
    eprintln!("  ====================================");
    eprintln!("               Summary");
    eprintln!("  ====================================");
    eprintln!("    Discovered:   {:>8}", report.discovered);
    eprintln!("    Downloaded:   {:>8}", report.downloaded);
    eprintln!("    Processed:    {:>8}", report.processed);
    eprintln!("    Persisted:    {:>8}", report.persisted);
    if report.excluded() > 0 {
        eprintln!("    Excluded:     {:>8}", report.excluded());
    }
    eprintln!("  ------------------------------------");
    eprintln!("    Files:        {:>8}", report.files.len());
    eprintln!("    Duration:     {:>7.1}s", report.total_seconds);
    eprintln!(
        "    Rate:         {:>7.1} img/sec",
        report.images_per_second()
    );
    eprintln!("  ====================================");

    let stages = [
        Stage::Discover,
        Stage::Download,
        Stage::Process,
        Stage::Persist,
    ];
    for stage in stages {
        for exclusion in report.exclusions_at(stage) {
            eprintln!("    #{} {}: {}", exclusion.index, stage, exclusion.reason);
        }
    }
}
