//! # Observability
//!
//! Logging setup for every tracker process.
//!
//! Crates in the pipeline only ever call `tracing` macros. Where the lines
//! end up is decided once, at startup, by the binary:
//!
//! - stderr, compact human-readable format (default)
//! - a JSONL file, one object per event, when `log_path` is set
//!
//! The JSONL file is append-only with per-line flushes, so several
//! processes sharing one data directory can write to the same file.
//!
//! ## Usage
//!
//! ```rust,ignore
//! fn main() {
//!     observability::init("trackerd");
//!     tracing::info!("pipeline started");
//! }
//! ```
//!
//! Or with configuration:
//!
//! ```rust,ignore
//! observability::init_with_config(observability::LogConfig {
//!     service_name: "trackerd".into(),
//!     default_level: "debug".into(),
//!     log_path: Some("/tmp/tracker.jsonl".into()),
//!     also_stderr: true,
//! });
//! ```

mod file;
mod json_layer;

use std::path::PathBuf;

pub use file::{default_log_path, CentralLogWriter, WriterFactory};
pub use json_layer::{JsonLayer, LogEntry};

/// Configuration for the logging system.
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Name of the process (e.g. "trackerd", "tracker-cli").
    /// Included in every JSONL line for filtering.
    pub service_name: String,

    /// Default log level filter (e.g. "debug", "info", "warn").
    /// Can be overridden by the `RUST_LOG` environment variable.
    pub default_level: String,

    /// JSONL output file. `None` logs to stderr only.
    pub log_path: Option<PathBuf>,

    /// Keep the stderr output when a JSONL file is configured.
    pub also_stderr: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            service_name: "unknown".into(),
            default_level: "info".into(),
            log_path: None,
            also_stderr: false,
        }
    }
}

/// Initialize logging with default settings.
pub fn init(service_name: &str) {
    init_with_config(LogConfig {
        service_name: service_name.into(),
        ..Default::default()
    });
}

/// Initialize logging with custom configuration.
///
/// Calling it a second time in the same process is a no-op; the first
/// subscriber stays installed.
pub fn init_with_config(config: LogConfig) {
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;
    use tracing_subscriber::{EnvFilter, Layer};

    let env_filter = || {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.default_level))
    };

    let Some(log_path) = config.log_path.clone() else {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(env_filter())
            .with_target(true)
            .compact()
            .with_writer(std::io::stderr)
            .try_init();
        return;
    };

    let writer = match CentralLogWriter::new(&log_path) {
        Ok(writer) => writer,
        Err(e) => {
            // Fall back to stderr so the process still has logs.
            eprintln!("failed to open log file {}: {}", log_path.display(), e);
            let _ = tracing_subscriber::fmt()
                .with_env_filter(env_filter())
                .compact()
                .with_writer(std::io::stderr)
                .try_init();
            return;
        }
    };

    let json_layer = JsonLayer::new(config.service_name.clone(), WriterFactory::new(writer));

    let stderr_layer = config.also_stderr.then(|| {
        tracing_subscriber::fmt::layer()
            .with_target(true)
            .compact()
            .with_writer(std::io::stderr)
            .with_filter(env_filter())
    });

    let installed = tracing_subscriber::registry()
        .with(json_layer.with_filter(env_filter()))
        .with(stderr_layer)
        .try_init();

    if installed.is_ok() {
        tracing::info!(log_path = %log_path.display(), "observability initialized");
    }
}

/// Re-export tracing macros for convenience.
pub use tracing::{debug, error, info, instrument, trace, warn};

/// Re-export Level for advanced filtering.
pub use tracing::Level;
