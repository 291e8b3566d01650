//! # Summarization pipeline
//!
//! Drives the per-file step of documentation generation: every readable text
//! file is looked up in the cache, sent to the [`Summarizer`] on a miss, and
//! the new summary is stored for the next run. Files are processed through the
//! [`ParallelProcessor`], so one failing file never stops the others.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::cache::CacheManager;
use crate::config::ScribeConfig;
use crate::error::Result;
use crate::parallel::ParallelProcessor;
use crate::progress::ProgressTracker;
use crate::scan::{file_type, is_binary, relative_path};
use crate::summarizer::{render_prompt, Summarizer, SummaryContext};
use crate::types::{CacheStats, FileSummary};
use crate::utils::{format_cache_stats, format_duration};

/// Number of files processed when `test_mode` is set.
pub const TEST_MODE_FILE_LIMIT: usize = 5;

/// Outcome of one pipeline run.
#[derive(Debug, Default)]
pub struct PipelineReport {
    /// Produced summaries, in input order
    pub summaries: Vec<FileSummary>,
    /// Relative path and error message of every file that failed
    pub failures: Vec<(String, String)>,
    pub stats: CacheStats,
    pub elapsed: Duration,
}

/// What a run would do for one file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileStatus {
    Cached,
    Miss,
    Skipped(String),
}

#[derive(Default)]
struct StatsCounter {
    from_cache: AtomicUsize,
    from_llm: AtomicUsize,
    skipped: AtomicUsize,
}

impl StatsCounter {
    fn snapshot(&self, failed: usize) -> CacheStats {
        CacheStats {
            from_cache: self.from_cache.load(Ordering::Relaxed),
            from_llm: self.from_llm.load(Ordering::Relaxed),
            skipped: self.skipped.load(Ordering::Relaxed),
            failed,
        }
    }
}

struct SourceFile {
    relative: String,
    absolute: PathBuf,
    content: String,
}

#[derive(Clone)]
struct FileWorker {
    cache: Arc<CacheManager>,
    summarizer: Arc<dyn Summarizer>,
    counter: Arc<StatsCounter>,
    template: Arc<str>,
    model: Arc<str>,
}

impl FileWorker {
    async fn summarize(self, source: SourceFile) -> anyhow::Result<FileSummary> {
        let path = Path::new(&source.relative);
        if let Some(summary) = self.cache.get_summary(path, source.content.as_bytes()) {
            self.counter.from_cache.fetch_add(1, Ordering::Relaxed);
            return Ok(FileSummary {
                path: source.relative,
                absolute_path: source.absolute,
                summary,
                from_cache: true,
            });
        }

        let kind = file_type(&source.absolute);
        let context = SummaryContext {
            file_type: kind.to_string(),
            repo_identity: self.cache.identity().to_string(),
            model: self.model.to_string(),
            prompt: render_prompt(&self.template, &source.relative, kind, &source.content),
        };
        let summary = self
            .summarizer
            .summarize(&source.relative, &source.content, &context)
            .await?;

        self.cache.put_summary(path, source.content.as_bytes(), &summary);
        self.counter.from_llm.fetch_add(1, Ordering::Relaxed);
        Ok(FileSummary {
            path: source.relative,
            absolute_path: source.absolute,
            summary,
            from_cache: false,
        })
    }
}

pub struct SummaryPipeline {
    root: PathBuf,
    config: ScribeConfig,
    cache: Arc<CacheManager>,
    tracker: Option<Arc<ProgressTracker>>,
}

impl SummaryPipeline {
    pub fn new(root: impl Into<PathBuf>, config: ScribeConfig, cache: Arc<CacheManager>) -> Self {
        Self {
            root: root.into(),
            config,
            cache,
            tracker: None,
        }
    }

    pub fn with_tracker(mut self, tracker: Arc<ProgressTracker>) -> Self {
        self.tracker = Some(tracker);
        self
    }

    pub fn cache(&self) -> &CacheManager {
        &self.cache
    }

    /// Summarize `files`, paths either absolute or relative to the root.
    pub async fn run(&self, files: Vec<PathBuf>, summarizer: Arc<dyn Summarizer>) -> Result<PipelineReport> {
        let start = Instant::now();
        let stats = Arc::new(StatsCounter::default());
        let sources = self.load_sources(files, &stats).await;
        let names: Vec<String> = sources.iter().map(|source| source.relative.clone()).collect();

        if let Some(tracker) = &self.tracker {
            tracker.set_overall_message(format!(
                "Analyzing files (max {} concurrent)",
                self.config.concurrency()
            ));
        }

        let worker = FileWorker {
            cache: Arc::clone(&self.cache),
            summarizer,
            counter: Arc::clone(&stats),
            template: Arc::from(self.config.templates.file_summary()),
            model: Arc::from(self.config.model_id()),
        };

        let processor = ParallelProcessor::from_config(&self.config, self.tracker.clone());
        let results = processor
            .process_items(
                sources,
                move |source: SourceFile| worker.clone().summarize(source),
                |source| source.relative.clone(),
            )
            .await?;

        let mut report = PipelineReport::default();
        for (name, result) in names.into_iter().zip(results) {
            match result.into_result() {
                Ok(summary) => report.summaries.push(summary),
                Err(e) => report.failures.push((name, format!("{:#}", e))),
            }
        }

        report.stats = stats.snapshot(report.failures.len());
        report.elapsed = start.elapsed();

        tracing::info!("{}", format_cache_stats(&report.stats, self.cache.is_enabled()));
        tracing::info!("Total processing time: {}", format_duration(report.elapsed));
        for (path, error) in &report.failures {
            tracing::error!("Error processing file {}: {}", path, error);
        }
        Ok(report)
    }

    /// Report, without calling the summarizer, which files would be served
    /// from the cache.
    pub async fn status(&self, files: Vec<PathBuf>) -> Result<Vec<(String, FileStatus)>> {
        let mut statuses = Vec::new();
        let mut candidates = Vec::new();

        for file in self.limit(files) {
            let absolute = self.absolute(&file);
            let relative = relative_path(&self.root, &absolute);
            match read_text(&absolute).await {
                Ok(content) => candidates.push((relative, content)),
                Err(reason) => statuses.push((relative, FileStatus::Skipped(reason))),
            }
        }

        let cache = Arc::clone(&self.cache);
        let processor = ParallelProcessor::from_config(&self.config, self.tracker.clone());
        let results = processor
            .process_items(
                candidates,
                move |(relative, content): (String, String)| {
                    let cache = Arc::clone(&cache);
                    async move {
                        let status = match cache.get_summary(Path::new(&relative), content.as_bytes()) {
                            Some(_) => FileStatus::Cached,
                            None => FileStatus::Miss,
                        };
                        Ok::<_, anyhow::Error>((relative, status))
                    }
                },
                |(relative, _)| relative.clone(),
            )
            .await?;

        statuses.extend(results.into_iter().filter_map(|r| r.into_result().ok()));
        statuses.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(statuses)
    }

    /// Read every file, skipping binary and unreadable ones.
    async fn load_sources(&self, files: Vec<PathBuf>, stats: &StatsCounter) -> Vec<SourceFile> {
        let mut sources = Vec::new();
        for file in self.limit(files) {
            let absolute = self.absolute(&file);
            let relative = relative_path(&self.root, &absolute);
            match read_text(&absolute).await {
                Ok(content) => sources.push(SourceFile {
                    relative,
                    absolute,
                    content,
                }),
                Err(reason) => self.skip(&relative, &reason, stats),
            }
        }
        sources
    }

    fn skip(&self, relative: &str, reason: &str, stats: &StatsCounter) {
        stats.skipped.fetch_add(1, Ordering::Relaxed);
        tracing::debug!("skipping {}: {}", relative, reason);
        if let Some(tracker) = &self.tracker {
            tracker.skip_task(relative, reason);
        }
    }

    fn limit(&self, mut files: Vec<PathBuf>) -> Vec<PathBuf> {
        if self.config.test_mode && files.len() > TEST_MODE_FILE_LIMIT {
            tracing::info!("test mode: processing only the first {} files", TEST_MODE_FILE_LIMIT);
            files.truncate(TEST_MODE_FILE_LIMIT);
        }
        files
    }

    fn absolute(&self, file: &Path) -> PathBuf {
        if file.is_absolute() {
            file.to_path_buf()
        } else {
            self.root.join(file)
        }
    }
}

async fn read_text(path: &Path) -> std::result::Result<String, String> {
    let bytes = tokio::fs::read(path)
        .await
        .map_err(|e| format!("unreadable: {}", e))?;
    if is_binary(&bytes) {
        return Err("binary file".to_string());
    }
    String::from_utf8(bytes).map_err(|_| "binary file".to_string())
}
