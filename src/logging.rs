//! Tracing subscriber setup for the binary.

use std::path::Path;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

/// File name of the optional log file written next to the cache.
pub const LOG_FILE_NAME: &str = "generation.log";

#[derive(Debug, Clone, Copy, Default)]
pub struct LogOptions {
    pub debug: bool,
    pub quiet: bool,
}

impl LogOptions {
    /// `--debug` and `--quiet` win over `RUST_LOG`; without either flag
    /// `RUST_LOG` is honored, falling back to `info`.
    pub fn filter(&self) -> EnvFilter {
        if self.debug {
            EnvFilter::new("debug")
        } else if self.quiet {
            EnvFilter::new("warn")
        } else {
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
        }
    }
}

/// Install the global subscriber: human-readable output on stderr plus, when
/// `log_dir` is given, a plain-text copy in `<log_dir>/generation.log`.
///
/// The returned guard flushes the file writer when dropped; keep it alive
/// until exit. Installing twice is a no-op.
pub fn init(options: LogOptions, log_dir: Option<&Path>) -> Option<WorkerGuard> {
    let (file_layer, guard) = match log_dir {
        Some(dir) => match std::fs::create_dir_all(dir) {
            Ok(()) => {
                let appender = tracing_appender::rolling::never(dir, LOG_FILE_NAME);
                let (writer, guard) = tracing_appender::non_blocking(appender);
                let layer = fmt::layer().with_writer(writer).with_ansi(false).with_target(false);
                (Some(layer), Some(guard))
            }
            Err(e) => {
                eprintln!("could not create log directory {}: {}", dir.display(), e);
                (None, None)
            }
        },
        None => (None, None),
    };

    let stderr_layer = fmt::layer().with_writer(std::io::stderr).with_target(false);

    let result = tracing_subscriber::registry()
        .with(options.filter())
        .with(stderr_layer)
        .with(file_layer)
        .try_init();
    if result.is_err() {
        tracing::debug!("tracing subscriber already installed");
    }
    guard
}
