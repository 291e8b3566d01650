use chrono::{Duration, Utc};
use std::path::{Path, PathBuf};

use super::fingerprint::{fingerprint_raw, ConfigSignature, FingerprintKey};
use super::identity::{RepoSource, RepositoryIdentity};
use super::store::SummaryStore;
use crate::config::{CacheConfig, CacheLocation, ScribeConfig};
use crate::error::CacheError;

/// Cache policy for one repository: where the cache lives, whether it is in
/// use, and how summaries are keyed.
///
/// Caching is an optimization. When the store cannot be opened the manager
/// stays usable in a disabled state where every lookup misses and every write
/// is dropped.
pub struct CacheManager {
    identity: RepositoryIdentity,
    cache_dir: Option<PathBuf>,
    store: Option<SummaryStore>,
    signature: Vec<u8>,
    ttl: Option<Duration>,
}

impl CacheManager {
    /// Create a manager for `source`, creating the cache directory if needed.
    pub fn new(source: &RepoSource, config: &ScribeConfig) -> Self {
        Self::with_home(source, config, dirs::home_dir())
    }

    /// Same as [`CacheManager::new`] with an explicit home directory for the
    /// `home` location.
    pub fn with_home(source: &RepoSource, config: &ScribeConfig, home: Option<PathBuf>) -> Self {
        let identity = RepositoryIdentity::resolve(source, config.github_repo_id.as_deref());
        let signature = ConfigSignature::from_config(config).to_bytes();
        let ttl = config
            .cache
            .ttl_secs
            .and_then(|secs| i64::try_from(secs).ok())
            .and_then(Duration::try_seconds);

        let mut manager = Self {
            identity,
            cache_dir: None,
            store: None,
            signature,
            ttl,
        };

        if !config.cache_enabled() {
            tracing::debug!("cache disabled by configuration");
            return manager;
        }

        let dir = match resolve_cache_dir(source, &config.cache, &manager.identity, home) {
            Ok(dir) => dir,
            Err(e) => {
                tracing::warn!("cache disabled: {}", e);
                return manager;
            }
        };

        match SummaryStore::open(&dir, manager.identity.as_str()) {
            Ok(store) => {
                tracing::info!("cache location: {}", dir.display());
                manager.store = Some(store);
            }
            Err(e) => tracing::warn!("cache disabled, could not open {}: {}", dir.display(), e),
        }
        manager.cache_dir = Some(dir);
        manager
    }

    pub fn is_enabled(&self) -> bool {
        self.store.as_ref().is_some_and(|store| !store.is_closed())
    }

    pub fn identity(&self) -> &RepositoryIdentity {
        &self.identity
    }

    /// The resolved `<base>/<cache dir>/<identity>` directory, when caching
    /// was not disabled by configuration.
    pub fn cache_dir(&self) -> Option<&Path> {
        self.cache_dir.as_deref()
    }

    /// Cache key for `content` at `file_path` under the current
    /// configuration.
    pub fn fingerprint(&self, file_path: &Path, content: &[u8]) -> FingerprintKey {
        fingerprint_raw(&normalize_display(file_path), content, &self.signature)
    }

    /// The cached summary for this exact path and content, if any.
    pub fn get_summary(&self, file_path: &Path, content: &[u8]) -> Option<String> {
        let store = self.active_store()?;
        let key = self.fingerprint(file_path, content);

        match store.get(self.identity.as_str(), &key) {
            Ok(Some(entry)) => {
                if let Some(ttl) = self.ttl {
                    if entry.created_at + ttl < Utc::now() {
                        tracing::debug!("cache expired: {}", file_path.display());
                        return None;
                    }
                }
                tracing::debug!("cache hit: {}", file_path.display());
                Some(entry.summary)
            }
            Ok(None) => {
                tracing::debug!("cache miss: {}", file_path.display());
                None
            }
            Err(e) => {
                tracing::warn!("cache lookup failed for {}: {}", file_path.display(), e);
                None
            }
        }
    }

    /// Store `summary` for this content. Failures are logged, not returned.
    pub fn put_summary(&self, file_path: &Path, content: &[u8], summary: &str) {
        let Some(store) = self.active_store() else {
            return;
        };
        let key = self.fingerprint(file_path, content);
        let path = normalize_display(file_path);

        match store.put(self.identity.as_str(), &key, summary, &path) {
            Ok(()) => tracing::debug!("cached summary for {}", path),
            Err(e) => tracing::warn!("failed to cache summary for {}: {}", path, e),
        }
    }

    /// Drop the cached summary for this path and content. Returns whether
    /// one existed.
    pub fn invalidate(&self, file_path: &Path, content: &[u8]) -> bool {
        let Some(store) = self.active_store() else {
            return false;
        };
        store.remove(&self.fingerprint(file_path, content)).unwrap_or_else(|e| {
            tracing::warn!("failed to invalidate cache entry: {}", e);
            false
        })
    }

    /// Remove every entry for this repository.
    pub fn clear(&self) -> Result<usize, CacheError> {
        match self.active_store() {
            Some(store) => {
                let removed = store.clear()?;
                tracing::info!("cleared {} cached summaries for {}", removed, self.identity);
                Ok(removed)
            }
            None => Ok(0),
        }
    }

    /// Remove entries older than the configured TTL. Without a TTL nothing
    /// expires.
    pub fn prune_expired(&self) -> Result<usize, CacheError> {
        match self.ttl {
            Some(ttl) => self.prune_older_than(ttl),
            None => Ok(0),
        }
    }

    pub fn prune_older_than(&self, max_age: Duration) -> Result<usize, CacheError> {
        match self.active_store() {
            Some(store) => store.prune_older_than(max_age),
            None => Ok(0),
        }
    }

    pub fn entry_count(&self) -> usize {
        self.active_store().map_or(0, SummaryStore::len)
    }

    /// Release the store. The manager behaves as disabled afterwards.
    pub fn close(&self) {
        if let Some(store) = &self.store {
            store.close();
        }
    }

    fn active_store(&self) -> Option<&SummaryStore> {
        self.store.as_ref().filter(|store| !store.is_closed())
    }
}

/// Work out `<base>/<cache dir>/<identity>` without touching the filesystem.
///
/// `repo` places the cache inside the checkout; `home` (or a source with no
/// local checkout) places it under the user's home directory. An absolute
/// configured directory is used as the base directly.
pub fn resolve_cache_dir(
    source: &RepoSource,
    cache: &CacheConfig,
    identity: &RepositoryIdentity,
    home: Option<PathBuf>,
) -> Result<PathBuf, CacheError> {
    let checkout = source.local_path();
    let use_home = cache.location == CacheLocation::Home || checkout.is_none();

    let (name, base) = if use_home {
        (cache.global_directory.as_str(), home)
    } else {
        (cache.directory.as_str(), checkout.map(Path::to_path_buf))
    };

    let name = Path::new(name);
    let dir = if name.is_absolute() {
        name.to_path_buf()
    } else {
        base.ok_or(CacheError::NoHomeDirectory)?.join(name)
    };
    Ok(dir.join(identity.as_str()))
}

fn normalize_display(path: &Path) -> String {
    path.to_string_lossy().replace('\\', "/")
}
