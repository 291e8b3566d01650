//! # Error Types
//!
//! Typed errors for each subsystem. Cache and progress failures are normally
//! absorbed at the component boundary (see [`crate::cache::CacheManager`] and
//! [`crate::progress::ProgressTracker`]); these types describe what went wrong
//! before it was turned into a log line.

use std::path::{Path, PathBuf};
use thiserror::Error;

/// Invalid or unreadable configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config file {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config file {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("invalid value {value:?} for `{field}` (expected {expected})")]
    InvalidValue {
        field: &'static str,
        value: String,
        expected: &'static str,
    },
}

impl ConfigError {
    pub fn invalid(field: &'static str, value: impl Into<String>, expected: &'static str) -> Self {
        Self::InvalidValue {
            field,
            value: value.into(),
            expected,
        }
    }
}

/// Failure to open, read or write the summary cache.
#[derive(Error, Debug)]
pub enum CacheError {
    #[error("cache I/O {operation} failed for {}: {source}", path.display())]
    Io {
        operation: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("cache serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("cache schema at {} is incompatible: {reason}", path.display())]
    Schema { path: PathBuf, reason: String },

    #[error("cache location {} is not writable", path.display())]
    NotWritable { path: PathBuf },

    #[error("could not determine a home directory for the global cache")]
    NoHomeDirectory,

    #[error("cache store has been closed")]
    Closed,
}

impl CacheError {
    pub fn io(source: std::io::Error, path: impl AsRef<Path>, operation: &'static str) -> Self {
        Self::Io {
            operation,
            path: path.as_ref().to_path_buf(),
            source,
        }
    }
}

/// Internal progress tracker failures. Never surfaced by the tracker's public
/// task methods, which log them instead.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum ProgressError {
    #[error("progress tracker has not been initialized; pass a repository path on first use")]
    NotInitialized,

    #[error("progress tracker state lock is poisoned")]
    Poisoned,

    #[error("unknown task: {0}")]
    UnknownTask(String),

    #[error("task {name} is already {status} and cannot transition")]
    InvalidTransition { name: String, status: String },
}

/// Failure of the batch itself, as opposed to a single item.
#[derive(Error, Debug)]
pub enum ParallelError {
    #[error("failed to acquire a scheduling permit: {0}")]
    Scheduling(#[from] tokio::sync::AcquireError),
}

/// Failure while enumerating repository files.
#[derive(Error, Debug)]
pub enum ScanError {
    #[error("failed to walk {}: {source}", path.display())]
    Walk {
        path: PathBuf,
        #[source]
        source: walkdir::Error,
    },

    #[error("invalid blacklist pattern {pattern:?}: {source}")]
    Pattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },
}

/// Top-level error for library entry points that span several subsystems.
#[derive(Error, Debug)]
pub enum ScribeError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Cache(#[from] CacheError),

    #[error(transparent)]
    Progress(#[from] ProgressError),

    #[error(transparent)]
    Parallel(#[from] ParallelError),

    #[error(transparent)]
    Scan(#[from] ScanError),
}

pub type Result<T, E = ScribeError> = std::result::Result<T, E>;
