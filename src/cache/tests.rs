#[cfg(test)]
mod tests {
    use super::super::*;
    use crate::config::{CacheLocation, ScribeConfig};
    use std::fs;
    use std::path::{Path, PathBuf};
    use tempfile::TempDir;

    fn setup_repo() -> (TempDir, PathBuf) {
        let temp_dir = TempDir::new().unwrap();
        let repo = temp_dir.path().join("sample-project");
        fs::create_dir_all(repo.join("src")).unwrap();
        fs::write(repo.join("src/lib.rs"), "pub fn add(a: i32, b: i32) -> i32 { a + b }\n").unwrap();
        (temp_dir, repo)
    }

    fn manager_for(repo: &Path, config: &ScribeConfig) -> CacheManager {
        CacheManager::with_home(&RepoSource::Local(repo.to_path_buf()), config, None)
    }

    #[test]
    fn test_round_trip() {
        let (_temp_dir, repo) = setup_repo();
        let manager = manager_for(&repo, &ScribeConfig::default());
        let path = Path::new("src/lib.rs");

        assert!(manager.is_enabled());
        assert_eq!(manager.get_summary(path, b"content v1"), None);

        manager.put_summary(path, b"content v1", "S");
        assert_eq!(manager.get_summary(path, b"content v1"), Some("S".to_string()));
        assert_eq!(manager.get_summary(path, b"content v2"), None);
    }

    #[test]
    fn test_identical_content_under_different_paths() {
        let (_temp_dir, repo) = setup_repo();
        let manager = manager_for(&repo, &ScribeConfig::default());

        manager.put_summary(Path::new("a.py"), b"x = 1\n", "python assignment");
        assert_eq!(manager.get_summary(Path::new("b.rs"), b"x = 1\n"), None);
        assert_ne!(
            manager.fingerprint(Path::new("a.py"), b"x = 1\n"),
            manager.fingerprint(Path::new("b.rs"), b"x = 1\n")
        );

        manager.put_summary(Path::new("b.rs"), b"x = 1\n", "rust statement");
        assert_eq!(manager.entry_count(), 2);
        assert_eq!(
            manager.get_summary(Path::new("a.py"), b"x = 1\n"),
            Some("python assignment".to_string())
        );
        assert_eq!(
            manager.get_summary(Path::new("b.rs"), b"x = 1\n"),
            Some("rust statement".to_string())
        );
    }

    #[test]
    fn test_repo_location_layout() {
        let (_temp_dir, repo) = setup_repo();
        let manager = manager_for(&repo, &ScribeConfig::default());

        let expected = repo.join(".cache").join("sample-project");
        assert_eq!(manager.cache_dir(), Some(expected.as_path()));
        assert!(expected.join("store.json").exists());
    }

    #[test]
    fn test_home_location_layout() {
        let (temp_dir, repo) = setup_repo();
        let home = temp_dir.path().join("home");
        let mut config = ScribeConfig::default();
        config.cache.location = CacheLocation::Home;

        let manager =
            CacheManager::with_home(&RepoSource::Local(repo.clone()), &config, Some(home.clone()));

        let expected = home.join(".codescribe_cache").join("sample-project");
        assert_eq!(manager.cache_dir(), Some(expected.as_path()));
        assert!(!repo.join(".cache").exists());
        assert!(manager.is_enabled());
    }

    #[test]
    fn test_absolute_directory_is_used_as_base() {
        let (temp_dir, repo) = setup_repo();
        let absolute = temp_dir.path().join("elsewhere");
        let mut config = ScribeConfig::default();
        config.cache.directory = absolute.to_string_lossy().into_owned();

        let manager = manager_for(&repo, &config);
        assert_eq!(manager.cache_dir(), Some(absolute.join("sample-project").as_path()));
    }

    #[test]
    fn test_remote_without_checkout_uses_home() {
        let temp_dir = TempDir::new().unwrap();
        let source = RepoSource::parse("https://github.com/acme/widgets");
        let manager = CacheManager::with_home(
            &source,
            &ScribeConfig::default(),
            Some(temp_dir.path().to_path_buf()),
        );
        assert_eq!(manager.identity().as_str(), "acme_widgets");
        assert_eq!(
            manager.cache_dir(),
            Some(temp_dir.path().join(".codescribe_cache").join("acme_widgets").as_path())
        );
    }

    #[test]
    fn test_construction_is_idempotent() {
        let (_temp_dir, repo) = setup_repo();
        let config = ScribeConfig::default();
        let first = manager_for(&repo, &config);
        first.put_summary(Path::new("a.rs"), b"a", "A");
        drop(first);

        let second = manager_for(&repo, &config);
        assert!(second.is_enabled());
        assert_eq!(second.get_summary(Path::new("a.rs"), b"a"), Some("A".to_string()));
    }

    #[test]
    fn test_disabled_cache_is_a_no_op() {
        let (_temp_dir, repo) = setup_repo();
        let mut config = ScribeConfig::default();
        config.cache.enabled = false;

        let manager = manager_for(&repo, &config);
        manager.put_summary(Path::new("src/lib.rs"), b"content", "S");

        assert!(!manager.is_enabled());
        assert_eq!(manager.get_summary(Path::new("src/lib.rs"), b"content"), None);
        assert!(!repo.join(".cache").exists());
        assert_eq!(manager.clear().unwrap(), 0);
    }

    #[test]
    fn test_no_cache_flag_disables() {
        let (_temp_dir, repo) = setup_repo();
        let mut config = ScribeConfig::default();
        config.no_cache = true;
        assert!(!manager_for(&repo, &config).is_enabled());
    }

    #[test]
    fn test_unwritable_location_degrades_to_disabled() {
        let (temp_dir, repo) = setup_repo();
        let blocker = temp_dir.path().join("blocker");
        fs::write(&blocker, "file, not a directory").unwrap();
        let mut config = ScribeConfig::default();
        config.cache.directory = blocker.to_string_lossy().into_owned();

        let manager = manager_for(&repo, &config);
        assert!(!manager.is_enabled());
        manager.put_summary(Path::new("x"), b"x", "X");
        assert_eq!(manager.get_summary(Path::new("x"), b"x"), None);
    }

    #[test]
    fn test_config_change_misses() {
        let (_temp_dir, repo) = setup_repo();
        let config = ScribeConfig::default();
        manager_for(&repo, &config).put_summary(Path::new("a.rs"), b"a", "A");

        let mut changed = config.clone();
        changed
            .templates
            .prompts
            .insert("file_summary".to_string(), "Describe {code} briefly".to_string());
        assert_eq!(manager_for(&repo, &changed).get_summary(Path::new("a.rs"), b"a"), None);

        let mut other_model = config.clone();
        other_model.ollama.model = "codellama".to_string();
        assert_eq!(manager_for(&repo, &other_model).get_summary(Path::new("a.rs"), b"a"), None);

        assert_eq!(
            manager_for(&repo, &config).get_summary(Path::new("a.rs"), b"a"),
            Some("A".to_string())
        );
    }

    #[test]
    fn test_invalidate_and_clear() {
        let (_temp_dir, repo) = setup_repo();
        let manager = manager_for(&repo, &ScribeConfig::default());
        manager.put_summary(Path::new("a.rs"), b"a", "A");
        manager.put_summary(Path::new("b.rs"), b"b", "B");

        assert!(!manager.invalidate(Path::new("b.rs"), b"a"));
        assert!(manager.invalidate(Path::new("a.rs"), b"a"));
        assert_eq!(manager.get_summary(Path::new("a.rs"), b"a"), None);
        assert_eq!(manager.entry_count(), 1);
        assert_eq!(manager.clear().unwrap(), 1);
        assert_eq!(manager.entry_count(), 0);
    }

    #[test]
    fn test_zero_ttl_expires_everything() {
        let (_temp_dir, repo) = setup_repo();
        let mut config = ScribeConfig::default();
        config.cache.ttl_secs = Some(0);
        let manager = manager_for(&repo, &config);

        manager.put_summary(Path::new("a.rs"), b"a", "A");
        std::thread::sleep(std::time::Duration::from_millis(20));
        assert_eq!(manager.get_summary(Path::new("a.rs"), b"a"), None);
        assert_eq!(manager.prune_expired().unwrap(), 1);
    }

    #[test]
    fn test_close_disables() {
        let (_temp_dir, repo) = setup_repo();
        let manager = manager_for(&repo, &ScribeConfig::default());
        manager.close();
        manager.close();
        assert!(!manager.is_enabled());
        assert_eq!(manager.get_summary(Path::new("a.rs"), b"a"), None);
    }
}
