//! The `whisker filter` command: one extractor on one local file.

use clap::Args;
use std::path::{Path, PathBuf};
use whisker_core::{
    read_image_file, write_image_file, Config, ImageProcessor, ImageRecord, Operation,
};

/// Arguments for the `filter` command.
#[derive(Args, Debug)]
pub struct FilterArgs {
    /// Image file to read
    pub input: PathBuf,

    /// Where to write the result (format chosen by extension)
    pub output: PathBuf,

    /// Extractor to apply (defaults to processing.operation)
    #[arg(long)]
    pub operation: Option<Operation>,

    /// Gamma-correct the input before extraction
    #[arg(long)]
    pub gamma: Option<f32>,
}

/// Execute the filter command.
pub async fn execute(args: FilterArgs, config: Config) -> anyhow::Result<()> {
    let input = expand(&args.input);
    let output = expand(&args.output);
    let operation = args.operation.unwrap_or(config.processing.operation);
    let processor = ImageProcessor::new(&config.processing);

    let written = filter_file(&processor, operation, args.gamma, input.clone(), output).await?;
    tracing::info!(%operation, "Filtered {}", input.display());
    println!("{}", written.display());
    Ok(())
}

async fn filter_file(
    processor: &ImageProcessor,
    operation: Operation,
    gamma: Option<f32>,
    input: PathBuf,
    output: PathBuf,
) -> anyhow::Result<PathBuf> {
    let origin = input.display().to_string();
    let frame = tokio::task::spawn_blocking(move || read_image_file(&input)).await??;
    let mut record = ImageRecord::new(0, Some(origin), frame);

    if let Some(gamma) = gamma {
        record = processor.gamma_correction(&record, gamma)?;
    }
    let result = processor.apply_operation(operation, &record)?;

    let frame = result.require_image()?.clone();
    let target = output.clone();
    tokio::task::spawn_blocking(move || write_image_file(&frame, &target)).await??;
    Ok(output)
}

fn expand(path: &Path) -> PathBuf {
    PathBuf::from(shellexpand::tilde(&path.to_string_lossy()).into_owned())
}
