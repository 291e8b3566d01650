//! Repository identity: the namespace under which a repository's summaries
//! are cached.

use sha2::{Digest, Sha256};
use std::fmt;
use std::path::{Component, Path, PathBuf};
use url::Url;

/// Local directory names shorter than this are prefixed with their parent.
const SHORT_NAME_LEN: usize = 5;

/// Hosts whose URLs are reduced to `org_name`.
const KNOWN_FORGES: &[&str] = &["github.com", "gitlab.com", "bitbucket.org"];

/// Where the repository comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RepoSource {
    /// A checkout on disk
    Local(PathBuf),
    /// A remote URL, optionally with the directory it was cloned into
    Remote { url: String, checkout: Option<PathBuf> },
}

impl RepoSource {
    /// Treat `input` as a URL when it has a scheme or scp-style `user@host:`
    /// prefix, otherwise as a local path.
    pub fn parse(input: &str) -> Self {
        if input.contains("://") || is_scp_like(input) {
            Self::Remote {
                url: input.to_string(),
                checkout: None,
            }
        } else {
            Self::Local(PathBuf::from(input))
        }
    }

    /// The directory holding the files, if there is one.
    pub fn local_path(&self) -> Option<&Path> {
        match self {
            Self::Local(path) => Some(path),
            Self::Remote { checkout, .. } => checkout.as_deref(),
        }
    }
}

impl fmt::Display for RepoSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Local(path) => write!(f, "{}", path.display()),
            Self::Remote { url, .. } => f.write_str(url),
        }
    }
}

fn is_scp_like(input: &str) -> bool {
    match input.split_once(':') {
        Some((user_host, path)) => {
            user_host.contains('@') && !user_host.contains('/') && !path.starts_with("//")
        }
        None => false,
    }
}

/// Normalized, filesystem-safe repository namespace.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RepositoryIdentity(String);

impl RepositoryIdentity {
    /// An explicit identifier wins over anything derived from the source.
    pub fn resolve(source: &RepoSource, explicit: Option<&str>) -> Self {
        if let Some(id) = explicit.filter(|id| !id.trim().is_empty()) {
            return Self(sanitize(id.trim()));
        }
        match source {
            RepoSource::Local(path) => Self::from_local_path(path),
            RepoSource::Remote { url, .. } => Self::from_remote_url(url),
        }
    }

    /// Directory name, disambiguated with the parent directory when short.
    pub fn from_local_path(path: &Path) -> Self {
        let path = absolutize(path);
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "root".to_string());

        let id = if name.chars().count() < SHORT_NAME_LEN {
            match path.parent().and_then(Path::file_name) {
                Some(parent) => format!("{}_{}", parent.to_string_lossy(), name),
                None => name,
            }
        } else {
            name
        };
        Self(sanitize(&id))
    }

    /// `org_name` for recognized forges, otherwise a digest of the URL.
    /// Never fails, whatever the input looks like.
    pub fn from_remote_url(url: &str) -> Self {
        match forge_org_and_name(url) {
            Some((org, name)) => Self(sanitize(&format!("{}_{}", org, name))),
            None => Self(url_digest(url)),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RepositoryIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

fn forge_org_and_name(url: &str) -> Option<(String, String)> {
    let url = url.trim();
    let (host, path) = match Url::parse(url) {
        Ok(parsed) => (parsed.host_str()?.to_ascii_lowercase(), parsed.path().to_string()),
        Err(_) => {
            let (user_host, path) = url.split_once(':')?;
            let (_, host) = user_host.rsplit_once('@')?;
            (host.to_ascii_lowercase(), path.to_string())
        }
    };

    let host = host.strip_prefix("www.").unwrap_or(&host);
    if !KNOWN_FORGES.contains(&host) {
        return None;
    }

    let mut segments = path.split('/').filter(|s| !s.is_empty());
    let org = segments.next()?;
    let name = segments.next()?.trim_end_matches(".git");
    if org.is_empty() || name.is_empty() {
        return None;
    }
    Some((org.to_string(), name.to_string()))
}

fn url_digest(url: &str) -> String {
    let digest = Sha256::digest(url.as_bytes());
    hex::encode(&digest[..8])
}

/// Make `path` absolute and drop `.`/`..` components without touching the
/// filesystem, so identities can be derived for paths that do not exist yet.
fn absolutize(path: &Path) -> PathBuf {
    let joined = if path.is_absolute() {
        path.to_path_buf()
    } else {
        match std::env::current_dir() {
            Ok(cwd) => cwd.join(path),
            Err(_) => path.to_path_buf(),
        }
    };

    let mut out = PathBuf::new();
    for component in joined.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

fn sanitize(id: &str) -> String {
    let cleaned: String = id
        .chars()
        .map(|c| match c {
            '/' | '\\' | '<' | '>' | ':' | '"' | '|' | '?' | '*' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect();
    if cleaned.is_empty() {
        "repository".to_string()
    } else {
        cleaned
    }
}
