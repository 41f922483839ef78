//! Whisker CLI - fetch remote images, extract features, and store the results.
//!
//! Whisker asks a metadata endpoint for a batch of image URLs, downloads
//! them concurrently, runs a spatial-filter extractor on a worker pool, and
//! writes originals and results as PNG files.
//!
//! # Usage
//!
//! ```bash
//! # Run a batch of 20 images with corner detection
//! whisker run --limit 20 --operation corners
//!
//! # Apply an extractor to a local file
//! whisker filter photo.jpg edges.png
//!
//! # View configuration
//! whisker config show
//! ```

use clap::{Parser, Subcommand};
use std::path::PathBuf;

mod cli;
mod logging;

/// Whisker - image ingestion and feature-extraction pipeline.
#[derive(Parser, Debug)]
#[command(name = "whisker")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Enable verbose (debug) logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Output logs in JSON format
    #[arg(long, global = true)]
    json_logs: bool,

    /// Read configuration from this file instead of the default location
    #[arg(long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

/// Available commands.
#[derive(Subcommand, Debug)]
enum Commands {
    /// Discover, download, process and persist one batch of images
    Run(cli::run::RunArgs),

    /// Apply an extractor to a local image file
    Filter(cli::filter::FilterArgs),

    /// View and manage configuration
    Config(cli::config::ConfigArgs),
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Logging isn't initialized yet, so config warnings go through eprintln.
    let loaded = match &cli.config {
        Some(path) => whisker_core::Config::load_from(path),
        None => whisker_core::Config::load(),
    };
    let config = match loaded {
        Ok(config) => config,
        Err(e) => {
            eprintln!(
                "Warning: Failed to load config: {e}\n  \
                 Using default configuration. Check your config file with `whisker config path`."
            );
            whisker_core::Config::default()
        }
    };
    logging::init_from_config(&config, cli.verbose, cli.json_logs);

    tracing::debug!("Whisker v{}", whisker_core::VERSION);

    match cli.command {
        Commands::Run(args) => cli::run::execute(args, config).await,
        Commands::Filter(args) => cli::filter::execute(args, config).await,
        Commands::Config(args) => cli::config::execute(args, config, cli.config).await,
    }
}
