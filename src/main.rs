//! codescribe command line tool
//!
//! Inspects and maintains the summary cache of a repository.

mod cli;

use anyhow::{bail, Context, Result};
use clap::Parser;
use git2::Repository;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempDir;
use tokio::task::spawn_blocking;

use codescribe::cache::{resolve_cache_dir, CacheManager, RepoSource, RepositoryIdentity};
use codescribe::config::{CacheLocation, ScribeConfig};
use codescribe::logging::{self, LogOptions};
use codescribe::pipeline::{FileStatus, SummaryPipeline};
use codescribe::progress::ProgressTracker;
use codescribe::scan::collect_files;

use cli::{Cli, Command};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = ScribeConfig::load(Some(&cli.config))
        .with_context(|| format!("failed to load configuration from {}", cli.config.display()))?;
    config.debug |= cli.debug;

    let target = cli.command.target().clone();
    if target.is_remote() {
        // A temporary clone must not hold the cache.
        config.cache.location = CacheLocation::Home;
    }
    if let Command::Status {
        no_cache,
        concurrency,
        ..
    } = &cli.command
    {
        config.no_cache |= *no_cache;
        if let Some(concurrency) = concurrency {
            config.set_concurrency(*concurrency);
        }
        config.validate()?;
    }

    let source = target.source();
    let identity = RepositoryIdentity::resolve(&source, config.github_repo_id.as_deref());
    let log_dir = if cli.log_file {
        resolve_cache_dir(&source, &config.cache, &identity, dirs::home_dir()).ok()
    } else {
        None
    };
    let _log_guard = logging::init(
        LogOptions {
            debug: config.debug,
            quiet: cli.quiet,
        },
        log_dir.as_deref(),
    );

    match cli.command {
        Command::Status { .. } => status(source, config, cli.quiet).await,
        Command::Clear { .. } => {
            let cache = CacheManager::new(&source, &config);
            if !cache.is_enabled() {
                bail!("cache is disabled or unavailable for {}", identity);
            }
            let removed = cache.clear()?;
            println!("Removed {} cached summaries for {}", removed, identity);
            Ok(())
        }
        Command::Prune { max_age_secs, .. } => {
            let cache = CacheManager::new(&source, &config);
            let removed = match max_age_secs {
                Some(secs) => {
                    let max_age = i64::try_from(secs)
                        .ok()
                        .and_then(chrono::Duration::try_seconds)
                        .context("--max-age-secs is out of range")?;
                    cache.prune_older_than(max_age)?
                }
                None => cache.prune_expired()?,
            };
            println!("Pruned {} cached summaries for {}", removed, identity);
            Ok(())
        }
        Command::Info { .. } => {
            let cache = CacheManager::new(&source, &config);
            println!("Repository:  {}", source);
            println!("Identity:    {}", cache.identity());
            match cache.cache_dir() {
                Some(dir) => println!("Cache dir:   {}", dir.display()),
                None => println!("Cache dir:   -"),
            }
            println!("Enabled:     {}", cache.is_enabled());
            println!("Entries:     {}", cache.entry_count());
            Ok(())
        }
    }
}

async fn status(source: RepoSource, config: ScribeConfig, quiet: bool) -> Result<()> {
    let (source, _checkout) = materialize(source).await?;
    let root = source
        .local_path()
        .map(Path::to_path_buf)
        .context("repository has no local checkout")?;
    if !root.is_dir() {
        bail!("{} is not a directory", root.display());
    }

    let tracker = if quiet {
        ProgressTracker::hidden(&root)
    } else {
        ProgressTracker::new(&root)
    };
    let guard = ProgressTracker::install_global(tracker);
    let tracker = Arc::clone(guard.tracker());

    let cache = Arc::new(CacheManager::new(&source, &config));
    let files = collect_files(&root, &config.blacklist, cache.cache_dir())?;
    tracing::info!("Found {} files in {}", files.len(), root.display());

    let pipeline = SummaryPipeline::new(&root, config, Arc::clone(&cache)).with_tracker(Arc::clone(&tracker));
    let statuses = pipeline.status(files).await?;
    tracker.cleanup();

    let (mut cached, mut missing, mut skipped) = (0, 0, 0);
    for (path, status) in &statuses {
        match status {
            FileStatus::Cached => {
                cached += 1;
                println!("cached   {}", path);
            }
            FileStatus::Miss => {
                missing += 1;
                println!("pending  {}", path);
            }
            FileStatus::Skipped(reason) => {
                skipped += 1;
                println!("skipped  {} ({})", path, reason);
            }
        }
    }
    println!(
        "\n{} cached, {} would be summarized, {} skipped (cache {})",
        cached,
        missing,
        skipped,
        if cache.is_enabled() { "enabled" } else { "disabled" }
    );

    let summary = tracker.summary();
    if summary.failed > 0 {
        eprintln!("{}", summary);
    }
    Ok(())
}

/// Clone a remote source into a temporary directory. Local sources are
/// returned unchanged.
async fn materialize(source: RepoSource) -> Result<(RepoSource, Option<TempDir>)> {
    match source {
        RepoSource::Remote { url, checkout: None } => {
            let dir = TempDir::new().context("failed to create a temporary checkout directory")?;
            let path: PathBuf = dir.path().to_path_buf();
            let clone_url = url.clone();
            tracing::info!("Cloning {}", url);
            spawn_blocking(move || Repository::clone(&clone_url, &path))
                .await
                .context("clone task failed")?
                .with_context(|| format!("failed to clone {}", url))?;
            let checkout = Some(dir.path().to_path_buf());
            Ok((RepoSource::Remote { url, checkout }, Some(dir)))
        }
        other => Ok((other, None)),
    }
}
