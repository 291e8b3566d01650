//! On-disk summary store.
//!
//! Layout under the store root:
//!
//! ```text
//! store.json                      schema marker
//! summaries/<aa>/<fingerprint>.json  one entry per file
//! ```
//!
//! Each entry is written to a temporary file in its shard directory and then
//! renamed into place, so writers of different keys never touch the same file
//! and a reader never sees a half-written entry. Two writers of the same key
//! race and the last rename wins.

use chrono::{DateTime, Duration, Utc};
use lru::LruCache;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::{ErrorKind, Write};
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use tempfile::NamedTempFile;
use walkdir::WalkDir;

use super::fingerprint::FingerprintKey;
use crate::error::CacheError;
use crate::types::CacheEntry;

const SCHEMA_VERSION: u32 = 1;
const SCHEMA_FILE: &str = "store.json";
const ENTRIES_DIR: &str = "summaries";
const WRITE_PROBE: &str = ".write_probe";
const RECENT_CAPACITY: usize = 256;

type Result<T> = std::result::Result<T, CacheError>;

#[derive(Debug, Serialize, Deserialize)]
struct StoreMeta {
    schema_version: u32,
    repo_identity: String,
    created_at: DateTime<Utc>,
}

/// Persistent map from fingerprint to [`CacheEntry`] for one repository.
pub struct SummaryStore {
    root: PathBuf,
    repo_identity: String,
    /// Recently read or written entries. `None` once the store is closed.
    recent: Mutex<Option<LruCache<FingerprintKey, CacheEntry>>>,
}

impl SummaryStore {
    /// Open the store at `root`, creating the directory and schema marker if
    /// they do not exist yet.
    pub fn open(root: impl Into<PathBuf>, repo_identity: &str) -> Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root).map_err(|e| CacheError::io(e, &root, "create_dir_all"))?;
        probe_writable(&root)?;

        let meta_path = root.join(SCHEMA_FILE);
        match fs::read(&meta_path) {
            Ok(bytes) => {
                let meta: StoreMeta = serde_json::from_slice(&bytes).map_err(|e| CacheError::Schema {
                    path: meta_path.clone(),
                    reason: e.to_string(),
                })?;
                if meta.schema_version != SCHEMA_VERSION {
                    return Err(CacheError::Schema {
                        path: meta_path,
                        reason: format!(
                            "schema version {} (expected {})",
                            meta.schema_version, SCHEMA_VERSION
                        ),
                    });
                }
                if meta.repo_identity != repo_identity {
                    tracing::warn!(
                        "cache at {} was created for {}, now used for {}",
                        root.display(),
                        meta.repo_identity,
                        repo_identity
                    );
                }
            }
            Err(e) if e.kind() == ErrorKind::NotFound => {
                let meta = StoreMeta {
                    schema_version: SCHEMA_VERSION,
                    repo_identity: repo_identity.to_string(),
                    created_at: Utc::now(),
                };
                write_atomic(&root, &meta_path, &serde_json::to_vec_pretty(&meta)?)?;
            }
            Err(e) => return Err(CacheError::io(e, &meta_path, "read")),
        }

        let entries = root.join(ENTRIES_DIR);
        fs::create_dir_all(&entries).map_err(|e| CacheError::io(e, &entries, "create_dir_all"))?;

        let capacity = NonZeroUsize::new(RECENT_CAPACITY).unwrap_or(NonZeroUsize::MIN);
        Ok(Self {
            root,
            repo_identity: repo_identity.to_string(),
            recent: Mutex::new(Some(LruCache::new(capacity))),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Look up the entry for `fingerprint`. A miss is `Ok(None)`.
    pub fn get(&self, repo_identity: &str, fingerprint: &FingerprintKey) -> Result<Option<CacheEntry>> {
        {
            let mut recent = self.recent();
            let lru = recent.as_mut().ok_or(CacheError::Closed)?;
            if let Some(entry) = lru.get(fingerprint) {
                if entry.repo_identity == repo_identity {
                    return Ok(Some(entry.clone()));
                }
            }
        }

        let path = self.entry_path(fingerprint);
        let bytes = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(CacheError::io(e, &path, "read")),
        };

        let entry: CacheEntry = serde_json::from_slice(&bytes)?;
        if entry.repo_identity != repo_identity || entry.fingerprint != fingerprint.as_str() {
            tracing::debug!("ignoring cache entry {} written for another key", path.display());
            return Ok(None);
        }

        if let Some(lru) = self.recent().as_mut() {
            lru.put(fingerprint.clone(), entry.clone());
        }
        Ok(Some(entry))
    }

    /// Insert or replace the entry for `fingerprint`.
    pub fn put(
        &self,
        repo_identity: &str,
        fingerprint: &FingerprintKey,
        summary: &str,
        file_path: &str,
    ) -> Result<()> {
        if self.recent().is_none() {
            return Err(CacheError::Closed);
        }

        let entry = CacheEntry {
            repo_identity: repo_identity.to_string(),
            fingerprint: fingerprint.to_string(),
            file_path: file_path.to_string(),
            summary: summary.to_string(),
            created_at: Utc::now(),
        };

        let path = self.entry_path(fingerprint);
        let shard = self.root.join(ENTRIES_DIR).join(fingerprint.shard());
        fs::create_dir_all(&shard).map_err(|e| CacheError::io(e, &shard, "create_dir_all"))?;
        write_atomic(&shard, &path, &serde_json::to_vec(&entry)?)?;

        if let Some(lru) = self.recent().as_mut() {
            lru.put(fingerprint.clone(), entry);
        }
        Ok(())
    }

    /// Delete the entry for `fingerprint`. Returns whether one existed.
    pub fn remove(&self, fingerprint: &FingerprintKey) -> Result<bool> {
        if let Some(lru) = self.recent().as_mut() {
            lru.pop(fingerprint);
        }
        let path = self.entry_path(fingerprint);
        match fs::remove_file(&path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(CacheError::io(e, &path, "remove")),
        }
    }

    /// Delete every entry. Returns how many were removed.
    pub fn clear(&self) -> Result<usize> {
        let count = self.entry_paths().len();
        if let Some(lru) = self.recent().as_mut() {
            lru.clear();
        }

        let entries = self.root.join(ENTRIES_DIR);
        match fs::remove_dir_all(&entries) {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => return Err(CacheError::io(e, &entries, "remove_dir_all")),
        }
        fs::create_dir_all(&entries).map_err(|e| CacheError::io(e, &entries, "create_dir_all"))?;
        Ok(count)
    }

    /// Delete entries older than `max_age`, and any entry that no longer
    /// parses. Returns how many were removed.
    pub fn prune_older_than(&self, max_age: Duration) -> Result<usize> {
        let cutoff = Utc::now() - max_age;
        let mut removed = 0;

        for path in self.entry_paths() {
            let expired = match fs::read(&path) {
                Ok(bytes) => match serde_json::from_slice::<CacheEntry>(&bytes) {
                    Ok(entry) => entry.created_at < cutoff,
                    Err(_) => true,
                },
                Err(e) if e.kind() == ErrorKind::NotFound => continue,
                Err(e) => return Err(CacheError::io(e, &path, "read")),
            };
            if !expired {
                continue;
            }

            match fs::remove_file(&path) {
                Ok(()) => removed += 1,
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => return Err(CacheError::io(e, &path, "remove")),
            }
            if let Some(key) = path
                .file_stem()
                .and_then(|s| s.to_str())
                .and_then(FingerprintKey::parse)
            {
                if let Some(lru) = self.recent().as_mut() {
                    lru.pop(&key);
                }
            }
        }
        Ok(removed)
    }

    /// Number of entries on disk.
    pub fn len(&self) -> usize {
        self.entry_paths().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Release the in-memory state. Later reads and writes fail with
    /// [`CacheError::Closed`]. Calling this more than once is harmless.
    pub fn close(&self) {
        if self.recent().take().is_some() {
            tracing::debug!("closed cache store for {}", self.repo_identity);
        }
    }

    pub fn is_closed(&self) -> bool {
        self.recent().is_none()
    }

    fn entry_path(&self, fingerprint: &FingerprintKey) -> PathBuf {
        self.root
            .join(ENTRIES_DIR)
            .join(fingerprint.shard())
            .join(format!("{}.json", fingerprint))
    }

    fn entry_paths(&self) -> Vec<PathBuf> {
        WalkDir::new(self.root.join(ENTRIES_DIR))
            .min_depth(2)
            .max_depth(2)
            .into_iter()
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.file_type().is_file())
            .map(|entry| entry.into_path())
            .filter(|path| path.extension().is_some_and(|ext| ext == "json"))
            .collect()
    }

    fn recent(&self) -> MutexGuard<'_, Option<LruCache<FingerprintKey, CacheEntry>>> {
        // The guarded value is a plain cache; a panic while holding the lock
        // cannot leave it logically inconsistent.
        self.recent.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Drop for SummaryStore {
    fn drop(&mut self) {
        self.close();
    }
}

fn probe_writable(root: &Path) -> Result<()> {
    let probe = root.join(WRITE_PROBE);
    match fs::OpenOptions::new()
        .create(true)
        .truncate(true)
        .write(true)
        .open(&probe)
    {
        Ok(_) => {
            let _ = fs::remove_file(&probe);
            Ok(())
        }
        Err(_) => Err(CacheError::NotWritable {
            path: root.to_path_buf(),
        }),
    }
}

fn write_atomic(dir: &Path, target: &Path, bytes: &[u8]) -> Result<()> {
    let mut tmp = NamedTempFile::new_in(dir).map_err(|e| CacheError::io(e, dir, "create_temp"))?;
    tmp.write_all(bytes)
        .map_err(|e| CacheError::io(e, tmp.path(), "write"))?;
    tmp.persist(target)
        .map_err(|e| CacheError::io(e.error, target, "rename"))?;
    Ok(())
}
