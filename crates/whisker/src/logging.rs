//! Logging initialization and configuration.
//!
//! Uses the `tracing` ecosystem for structured logging: human-readable or
//! JSON on stderr, plus an optional plain-text log file.

use std::fs::OpenOptions;
use std::sync::Mutex;

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Level used when `RUST_LOG` is not set.
fn default_level(verbose: bool, configured: &str) -> &str {
    if verbose {
        "debug"
    } else if configured.trim().is_empty() {
        "info"
    } else {
        configured
    }
}

/// Initialize the logging subsystem from the Whisker configuration.
///
/// # Notes
///
/// - Console output goes to stderr (stdout is reserved for data output)
/// - The RUST_LOG environment variable overrides the configured level
/// - A log file that cannot be opened is reported and skipped
pub fn init_from_config(
    config: &whisker_core::Config,
    verbose_override: bool,
    json_logs_override: bool,
) {
    let level = default_level(verbose_override, &config.logging.level);
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let json_format = json_logs_override || config.logging.format == "json";

    let json_layer = json_format.then(|| fmt::layer().json().with_writer(std::io::stderr));
    let pretty_layer = (!json_format).then(|| {
        fmt::layer()
            .with_target(false)
            .with_writer(std::io::stderr)
            .with_ansi(true)
    });

    let file_layer = config.log_file().and_then(|path| {
        match OpenOptions::new().create(true).append(true).open(&path) {
            Ok(file) => Some(fmt::layer().with_ansi(false).with_writer(Mutex::new(file))),
            Err(e) => {
                eprintln!("Warning: Cannot open log file {}: {e}", path.display());
                None
            }
        }
    });

    let result = tracing_subscriber::registry()
        .with(filter)
        .with(json_layer)
        .with(pretty_layer)
        .with(file_layer)
        .try_init();

    if let Err(e) = result {
        eprintln!("Warning: Logging already initialized: {e}");
    }
}
