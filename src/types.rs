//! # Common Types
//!
//! This module contains the common types shared between the cache, the
//! summarization pipeline and the command line front end.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// A persisted summary, keyed by repository identity and fingerprint.
///
/// Entries are never mutated in place: a changed file produces a new
/// fingerprint and therefore a new entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheEntry {
    /// Namespace of the repository the summary belongs to
    pub repo_identity: String,
    /// Hex fingerprint of file content and config signature
    pub fingerprint: String,
    /// Path of the file the summary was produced for (diagnostics only)
    pub file_path: String,
    /// The summary text returned by the LLM
    pub summary: String,
    /// When the entry was written
    pub created_at: DateTime<Utc>,
}

/// A summary produced for one file during a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileSummary {
    /// Repository-relative path, with forward slashes
    pub path: String,
    /// Absolute path on disk
    pub absolute_path: PathBuf,
    /// Summary text
    pub summary: String,
    /// Whether the summary was served from the cache
    pub from_cache: bool,
}

/// Counts of where summaries came from during one run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Files answered from the cache
    pub from_cache: usize,
    /// Files sent to the LLM
    pub from_llm: usize,
    /// Binary or unreadable files that were skipped
    pub skipped: usize,
    /// Files whose summarization failed
    pub failed: usize,
}

impl CacheStats {
    /// Files that produced a summary.
    pub fn processed(&self) -> usize {
        self.from_cache + self.from_llm
    }

    /// Share of produced summaries that came from the cache, in percent.
    pub fn hit_rate(&self) -> f64 {
        let processed = self.processed();
        if processed == 0 {
            0.0
        } else {
            self.from_cache as f64 / processed as f64 * 100.0
        }
    }
}
