//! # codescribe
//!
//! `codescribe` is the file-summarization core of a repository documentation
//! generator. It asks a language model to summarize each source file and keeps
//! the answers in a local, content-addressed cache so unchanged files are never
//! summarized twice.
//!
//! ## Features
//!
//! - Fingerprints built from file content and the prompt/model configuration
//! - A per-repository summary store, inside the checkout or under the home directory
//! - Stable repository identities for local paths and remote URLs
//! - Bounded concurrent processing with per-file failure isolation
//! - Task tracking with live progress bars
//! - Test mode limited to the first few files
//!
//! ## Example
//!
//! ```no_run
//! use codescribe::cache::{CacheManager, RepoSource};
//! use codescribe::config::ScribeConfig;
//! use codescribe::pipeline::SummaryPipeline;
//! use codescribe::summarizer::{Summarizer, SummaryContext};
//! use std::path::PathBuf;
//! use std::sync::Arc;
//!
//! struct Echo;
//!
//! #[async_trait::async_trait]
//! impl Summarizer for Echo {
//!     async fn summarize(&self, path: &str, _: &str, _: &SummaryContext) -> anyhow::Result<String> {
//!         Ok(format!("summary of {}", path))
//!     }
//! }
//!
//! # async fn example() -> anyhow::Result<()> {
//! let root = PathBuf::from("path/to/repo");
//! let config = ScribeConfig::load(None)?;
//! let cache = Arc::new(CacheManager::new(&RepoSource::Local(root.clone()), &config));
//! let files = codescribe::scan::collect_files(&root, &config.blacklist, cache.cache_dir())?;
//!
//! let pipeline = SummaryPipeline::new(&root, config, cache);
//! let report = pipeline.run(files, Arc::new(Echo)).await?;
//! println!("{} summaries, {:.1}% from cache", report.summaries.len(), report.stats.hit_rate());
//! # Ok(())
//! # }
//! ```

pub mod cache;
pub mod config;
pub mod error;
pub mod logging;
pub mod parallel;
pub mod pipeline;
pub mod progress;
pub mod scan;
pub mod summarizer;
pub mod types;
pub mod utils;

// Re-export main types for convenience
pub use cache::CacheManager;
pub use config::ScribeConfig;
pub use error::{Result, ScribeError};
pub use parallel::{ParallelProcessor, ParallelResult};
pub use progress::ProgressTracker;
pub use types::{CacheEntry, CacheStats, FileSummary};
