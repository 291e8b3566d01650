//! Repository file enumeration.

use git2::Repository;
use regex::Regex;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use crate::config::BlacklistConfig;
use crate::error::ScanError;

const BINARY_SNIFF_LEN: usize = 8192;

struct Filter {
    extensions: Vec<String>,
    patterns: Vec<Regex>,
    exclude: Option<PathBuf>,
    repo: Option<Repository>,
}

impl Filter {
    fn new(root: &Path, blacklist: &BlacklistConfig, exclude: Option<&Path>) -> Result<Self, ScanError> {
        let patterns = blacklist
            .path_patterns
            .iter()
            .map(|pattern| {
                Regex::new(pattern).map_err(|source| ScanError::Pattern {
                    pattern: pattern.clone(),
                    source,
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        let extensions = blacklist
            .extensions
            .iter()
            .map(|ext| ext.trim_start_matches('.').to_ascii_lowercase())
            .collect();

        // Only honor ignore rules when the root is the repository's work tree.
        let repo = Repository::open(root).ok().filter(|repo| {
            repo.workdir()
                .and_then(|workdir| workdir.canonicalize().ok())
                .zip(root.canonicalize().ok())
                .map(|(workdir, root)| workdir == root)
                .unwrap_or(false)
        });

        Ok(Self {
            extensions,
            patterns,
            exclude: exclude.map(Path::to_path_buf),
            repo,
        })
    }

    fn rejects(&self, path: &Path, relative: &Path, is_dir: bool) -> bool {
        if self.exclude.as_deref().is_some_and(|exclude| path.starts_with(exclude)) {
            return true;
        }

        let relative_str = to_forward_slashes(relative);
        if self.patterns.iter().any(|re| re.is_match(&relative_str)) {
            return true;
        }

        if !is_dir {
            let blacklisted = path
                .extension()
                .map(|ext| ext.to_string_lossy().to_ascii_lowercase())
                .is_some_and(|ext| self.extensions.contains(&ext));
            if blacklisted {
                return true;
            }
        }

        match &self.repo {
            Some(repo) => repo.is_path_ignored(relative).unwrap_or(false),
            None => false,
        }
    }
}

/// List the files under `root` that are candidates for summarization.
///
/// Skips blacklisted extensions and path patterns, anything under `exclude`
/// (normally the cache directory) and, when `root` is a git work tree, paths
/// ignored by git. The result is sorted.
pub fn collect_files(
    root: &Path,
    blacklist: &BlacklistConfig,
    exclude: Option<&Path>,
) -> Result<Vec<PathBuf>, ScanError> {
    let filter = Filter::new(root, blacklist, exclude)?;
    let mut files = Vec::new();

    let walker = WalkDir::new(root).follow_links(false).into_iter().filter_entry(|entry| {
        if entry.depth() == 0 {
            return true;
        }
        let relative = entry.path().strip_prefix(root).unwrap_or(entry.path());
        !filter.rejects(entry.path(), relative, entry.file_type().is_dir())
    });

    for entry in walker {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) if e.depth() == 0 => {
                return Err(ScanError::Walk {
                    path: root.to_path_buf(),
                    source: e,
                })
            }
            Err(e) => {
                tracing::warn!("skipping unreadable entry: {}", e);
                continue;
            }
        };
        if entry.file_type().is_file() {
            files.push(entry.into_path());
        }
    }

    files.sort();
    tracing::debug!("found {} candidate files under {}", files.len(), root.display());
    Ok(files)
}

/// Whether `bytes` look like binary data: a NUL byte or invalid UTF-8 in the
/// leading chunk.
pub fn is_binary(bytes: &[u8]) -> bool {
    let head = &bytes[..bytes.len().min(BINARY_SNIFF_LEN)];
    if head.contains(&0) {
        return true;
    }
    match std::str::from_utf8(head) {
        Ok(_) => false,
        // A multi-byte character cut off by the sniff window is fine.
        Err(e) => e.error_len().is_some(),
    }
}

/// Human-readable language name used in prompts.
pub fn file_type(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .map(|ext| ext.to_string_lossy().to_ascii_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "rs" => "Rust",
        "py" => "Python",
        "js" | "mjs" | "cjs" => "JavaScript",
        "ts" | "tsx" => "TypeScript",
        "go" => "Go",
        "java" => "Java",
        "cs" => "C#",
        "c" | "h" => "C",
        "cpp" | "cc" | "hpp" => "C++",
        "rb" => "Ruby",
        "sh" | "bash" => "Shell",
        "md" => "Markdown",
        "toml" => "TOML",
        "yaml" | "yml" => "YAML",
        "json" => "JSON",
        "html" => "HTML",
        "css" => "CSS",
        "sql" => "SQL",
        _ => "Text",
    }
}

/// Repository-relative path with forward slashes.
pub fn relative_path(root: &Path, path: &Path) -> String {
    to_forward_slashes(path.strip_prefix(root).unwrap_or(path))
}

fn to_forward_slashes(path: &Path) -> String {
    path.components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::fs;
    use tempfile::TempDir;

    fn write(root: &Path, relative: &str, content: &[u8]) {
        let path = root.join(relative);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    fn names(root: &Path, files: &[PathBuf]) -> Vec<String> {
        files.iter().map(|f| relative_path(root, f)).collect()
    }

    #[test]
    fn test_blacklist_and_exclude() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();
        write(root, "src/main.rs", b"fn main() {}");
        write(root, "src/util.py", b"x = 1");
        write(root, "src/__pycache__/util.cpython-311.pyc", b"\0\0");
        write(root, "Cargo.lock", b"# lock");
        write(root, "logo.PNG", b"png");
        write(root, "node_modules/pkg/index.js", b"module.exports = 1");
        write(root, ".cache/repo/store.json", b"{}");

        let files = collect_files(root, &BlacklistConfig::default(), Some(&root.join(".cache"))).unwrap();
        assert_eq!(names(root, &files), vec!["src/main.rs", "src/util.py"]);
    }

    #[test]
    fn test_git_ignore_is_honored() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();
        Repository::init(root).unwrap();
        write(root, ".gitignore", b"generated/\n*.log\n");
        write(root, "lib.rs", b"pub fn f() {}");
        write(root, "debug.log", b"noise");
        write(root, "generated/out.rs", b"// generated");

        let files = collect_files(root, &BlacklistConfig::default(), None).unwrap();
        assert_eq!(names(root, &files), vec![".gitignore", "lib.rs"]);
    }

    #[test]
    fn test_invalid_pattern_is_an_error() {
        let temp_dir = TempDir::new().unwrap();
        let blacklist = BlacklistConfig {
            extensions: vec![],
            path_patterns: vec!["([unclosed".to_string()],
        };
        let err = collect_files(temp_dir.path(), &blacklist, None).unwrap_err();
        assert!(matches!(err, ScanError::Pattern { .. }));
    }

    #[test]
    fn test_missing_root_is_an_error() {
        let temp_dir = TempDir::new().unwrap();
        let err = collect_files(&temp_dir.path().join("missing"), &BlacklistConfig::default(), None)
            .unwrap_err();
        assert!(matches!(err, ScanError::Walk { .. }));
    }

    #[test]
    fn test_is_binary() {
        assert!(!is_binary(b"plain text\n"));
        assert!(!is_binary("héllo wörld".as_bytes()));
        assert!(is_binary(b"abc\0def"));
        assert!(is_binary(&[0xff, 0xfe, 0x41]));
        assert!(!is_binary(b""));

        // Multi-byte character split at the sniff boundary.
        let mut text = vec![b'a'; BINARY_SNIFF_LEN - 1];
        text.extend_from_slice("é".as_bytes());
        assert!(!is_binary(&text));
    }

    #[test]
    fn test_file_type() {
        assert_eq!(file_type(Path::new("src/lib.rs")), "Rust");
        assert_eq!(file_type(Path::new("app.PY")), "Python");
        assert_eq!(file_type(Path::new("LICENSE")), "Text");
    }
}
