use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

use codescribe::cache::RepoSource;

#[derive(Parser, Debug)]
#[command(name = "codescribe", author, version, about, long_about = None)]
pub struct Cli {
    /// Path to a YAML configuration file
    #[arg(short, long, global = true, default_value = "config.yaml")]
    pub config: PathBuf,

    /// Enable debug logging
    #[arg(long, global = true)]
    pub debug: bool,

    /// Only log warnings and errors, and hide progress bars
    #[arg(short, long, global = true, conflicts_with = "debug")]
    pub quiet: bool,

    /// Also write logs to generation.log in the cache directory
    #[arg(long, global = true)]
    pub log_file: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Scan the repository and report which files are already cached
    Status {
        #[command(flatten)]
        target: Target,

        /// Ignore the cache entirely
        #[arg(long)]
        no_cache: bool,

        /// Maximum number of files processed concurrently
        #[arg(long)]
        concurrency: Option<usize>,
    },
    /// Remove every cached summary for the repository
    Clear {
        #[command(flatten)]
        target: Target,
    },
    /// Remove cached summaries older than a maximum age
    Prune {
        #[command(flatten)]
        target: Target,

        /// Maximum entry age in seconds; defaults to the configured TTL
        #[arg(long)]
        max_age_secs: Option<u64>,
    },
    /// Show the repository identity and cache location
    Info {
        #[command(flatten)]
        target: Target,
    },
}

impl Command {
    pub fn target(&self) -> &Target {
        match self {
            Self::Status { target, .. }
            | Self::Clear { target }
            | Self::Prune { target, .. }
            | Self::Info { target } => target,
        }
    }
}

/// Which repository to operate on.
#[derive(Args, Debug, Clone)]
#[group(required = true, multiple = false)]
pub struct Target {
    /// Path to a local repository
    #[arg(short, long)]
    pub repo: Option<PathBuf>,

    /// URL of a remote repository
    #[arg(short, long)]
    pub github: Option<String>,
}

impl Target {
    pub fn source(&self) -> RepoSource {
        match (&self.repo, &self.github) {
            (_, Some(url)) => RepoSource::Remote {
                url: url.clone(),
                checkout: None,
            },
            (Some(path), None) => RepoSource::Local(path.clone()),
            (None, None) => RepoSource::Local(PathBuf::from(".")),
        }
    }

    pub fn is_remote(&self) -> bool {
        self.github.is_some()
    }
}
