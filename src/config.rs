//! # Configuration
//!
//! Typed configuration for a summarization run. Values come from three layers,
//! applied in order: built-in defaults, an optional YAML file (parsed into a
//! [`ConfigOverlay`] and deep-merged), and environment variable overrides.
//! The result is validated field by field before use.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use std::str::FromStr;

use crate::error::ConfigError;

/// Prompt used for per-file summaries when no custom template is configured.
pub const DEFAULT_FILE_SUMMARY_TEMPLATE: &str = "\
Analyze the following code file and provide a clear, concise summary:

File: {file_path}
Type: {file_type}

Code:
{code}

Generate a summary that includes:
1. Main purpose of the file
2. Key components and their roles
3. How it interacts with other modules
4. Any notable patterns or design choices

Keep the summary clear and concise.";

/// Name of the prompt template that drives file summaries.
pub const FILE_SUMMARY_TEMPLATE: &str = "file_summary";

const SUPPORTED_HASH_ALGORITHM: &str = "sha256";

/// Where the cache directory is placed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheLocation {
    /// Inside the target repository.
    #[default]
    Repo,
    /// Under the user's home directory, for read-only or ephemeral checkouts.
    Home,
}

impl FromStr for CacheLocation {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "repo" => Ok(Self::Repo),
            "home" => Ok(Self::Home),
            _ => Err(ConfigError::invalid("cache.location", s, "`repo` or `home`")),
        }
    }
}

impl fmt::Display for CacheLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Repo => f.write_str("repo"),
            Self::Home => f.write_str("home"),
        }
    }
}

/// LLM backend whose settings are active.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LlmProvider {
    #[default]
    Ollama,
    Bedrock,
}

impl FromStr for LlmProvider {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "ollama" => Ok(Self::Ollama),
            "bedrock" => Ok(Self::Bedrock),
            _ => Err(ConfigError::invalid("llm_provider", s, "`ollama` or `bedrock`")),
        }
    }
}

impl fmt::Display for LlmProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ollama => f.write_str("ollama"),
            Self::Bedrock => f.write_str("bedrock"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheConfig {
    pub enabled: bool,
    pub location: CacheLocation,
    /// Cache directory name relative to the repository, or an absolute path.
    pub directory: String,
    /// Cache directory name under the home directory when `location = home`.
    pub global_directory: String,
    /// Entries older than this are treated as misses.
    pub ttl_secs: Option<u64>,
    /// Accepted for compatibility with older config files; fingerprints are
    /// always SHA-256.
    pub hash_algorithm: String,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            location: CacheLocation::Repo,
            directory: ".cache".to_string(),
            global_directory: ".codescribe_cache".to_string(),
            ttl_secs: None,
            hash_algorithm: SUPPORTED_HASH_ALGORITHM.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OllamaConfig {
    pub model: String,
    pub base_url: String,
    pub max_tokens: u32,
    pub timeout_secs: u64,
    pub concurrency: usize,
    pub temperature: f32,
}

impl Default for OllamaConfig {
    fn default() -> Self {
        Self {
            model: "llama3".to_string(),
            base_url: "http://localhost:11434".to_string(),
            max_tokens: 4096,
            timeout_secs: 30,
            concurrency: 1,
            temperature: 0.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BedrockConfig {
    pub model_id: String,
    pub region: String,
    pub max_tokens: u32,
    pub timeout_secs: u64,
    pub concurrency: usize,
    pub temperature: f32,
}

impl Default for BedrockConfig {
    fn default() -> Self {
        Self {
            model_id: "us.anthropic.claude-3-5-sonnet-20241022-v2:0".to_string(),
            region: "us-east-1".to_string(),
            max_tokens: 8192,
            timeout_secs: 120,
            concurrency: 5,
            temperature: 0.0,
        }
    }
}

/// Files excluded from summarization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlacklistConfig {
    /// File extensions, with the leading dot.
    pub extensions: Vec<String>,
    /// Regular expressions matched against the repository-relative path.
    pub path_patterns: Vec<String>,
}

impl Default for BlacklistConfig {
    fn default() -> Self {
        Self {
            extensions: [".pyc", ".pyo", ".pyd", ".lock", ".png", ".jpg", ".gif", ".ico"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            path_patterns: vec![
                r"__pycache__".to_string(),
                r"(^|/)\.git(/|$)".to_string(),
                r"(^|/)target(/|$)".to_string(),
                r"(^|/)node_modules(/|$)".to_string(),
            ],
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TemplateConfig {
    /// Prompt templates by name; missing names fall back to built-in defaults.
    pub prompts: BTreeMap<String, String>,
}

impl TemplateConfig {
    /// The template text used for per-file summaries.
    pub fn file_summary(&self) -> &str {
        self.prompts
            .get(FILE_SUMMARY_TEMPLATE)
            .map(String::as_str)
            .unwrap_or(DEFAULT_FILE_SUMMARY_TEMPLATE)
    }
}

/// Fully resolved configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScribeConfig {
    pub debug: bool,
    pub no_cache: bool,
    /// Only process the first few files.
    pub test_mode: bool,
    /// Stable identifier such as `org/name`, used to namespace the cache
    /// independently of where the repository is checked out.
    pub github_repo_id: Option<String>,
    pub llm_provider: LlmProvider,
    pub ollama: OllamaConfig,
    pub bedrock: BedrockConfig,
    pub cache: CacheConfig,
    pub blacklist: BlacklistConfig,
    pub templates: TemplateConfig,
}

impl ScribeConfig {
    /// Load configuration from an optional YAML file, then the process
    /// environment, and validate the result.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Some(path) = path {
            if path.exists() {
                let overlay = ConfigOverlay::from_file(path)?;
                config = merge(config, overlay);
                tracing::debug!("loaded configuration from {}", path.display());
            } else {
                tracing::debug!("config file {} not found, using defaults", path.display());
            }
        }

        config.apply_env_overrides(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Apply environment overrides, reading variables through `lookup`.
    pub fn apply_env_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(provider) = lookup("LLM_PROVIDER") {
            self.llm_provider = provider.parse()?;
        }
        if let Some(debug) = lookup("DEBUG") {
            self.debug = parse_flag(&debug);
        }
        if let Some(region) = lookup("AWS_REGION") {
            self.bedrock.region = region;
        }
        if let Some(model_id) = lookup("AWS_BEDROCK_MODEL_ID") {
            self.bedrock.model_id = model_id;
        }
        if let Some(enabled) = lookup("CACHE_ENABLED") {
            self.cache.enabled = parse_flag(&enabled);
        }
        if let Some(location) = lookup("CACHE_LOCATION") {
            self.cache.location = location.parse()?;
        }
        if let Some(dir) = lookup("CACHE_GLOBAL_DIRECTORY") {
            self.cache.global_directory = dir;
        }
        Ok(())
    }

    /// Check every field with a restricted range of legal values.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.ollama.concurrency == 0 {
            return Err(ConfigError::invalid("ollama.concurrency", "0", "a positive integer"));
        }
        if self.bedrock.concurrency == 0 {
            return Err(ConfigError::invalid("bedrock.concurrency", "0", "a positive integer"));
        }
        for (field, temperature) in [
            ("ollama.temperature", self.ollama.temperature),
            ("bedrock.temperature", self.bedrock.temperature),
        ] {
            if !(0.0..=2.0).contains(&temperature) {
                return Err(ConfigError::invalid(
                    field,
                    temperature.to_string(),
                    "a number between 0.0 and 2.0",
                ));
            }
        }
        if self.cache.directory.trim().is_empty() {
            return Err(ConfigError::invalid("cache.directory", "", "a non-empty path"));
        }
        if self.cache.global_directory.trim().is_empty() {
            return Err(ConfigError::invalid("cache.global_directory", "", "a non-empty path"));
        }
        if !self.cache.hash_algorithm.eq_ignore_ascii_case(SUPPORTED_HASH_ALGORITHM) {
            tracing::warn!(
                "cache.hash_algorithm = {:?} is ignored; fingerprints always use sha256",
                self.cache.hash_algorithm
            );
        }
        Ok(())
    }

    /// Whether the cache should be used at all.
    pub fn cache_enabled(&self) -> bool {
        self.cache.enabled && !self.no_cache
    }

    /// Maximum number of concurrent LLM calls for the active provider.
    pub fn concurrency(&self) -> usize {
        match self.llm_provider {
            LlmProvider::Ollama => self.ollama.concurrency,
            LlmProvider::Bedrock => self.bedrock.concurrency,
        }
    }

    /// Override the active provider's concurrency limit.
    pub fn set_concurrency(&mut self, concurrency: usize) {
        match self.llm_provider {
            LlmProvider::Ollama => self.ollama.concurrency = concurrency,
            LlmProvider::Bedrock => self.bedrock.concurrency = concurrency,
        }
    }

    /// Model identifier of the active provider.
    pub fn model_id(&self) -> &str {
        match self.llm_provider {
            LlmProvider::Ollama => &self.ollama.model,
            LlmProvider::Bedrock => &self.bedrock.model_id,
        }
    }

    pub fn temperature(&self) -> f32 {
        match self.llm_provider {
            LlmProvider::Ollama => self.ollama.temperature,
            LlmProvider::Bedrock => self.bedrock.temperature,
        }
    }

    pub fn max_tokens(&self) -> u32 {
        match self.llm_provider {
            LlmProvider::Ollama => self.ollama.max_tokens,
            LlmProvider::Bedrock => self.bedrock.max_tokens,
        }
    }
}

fn parse_flag(value: &str) -> bool {
    matches!(value.trim().to_ascii_lowercase().as_str(), "true" | "1" | "yes")
}

/// A partial configuration as read from a file. Every field is optional and
/// only the fields present override the base configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ConfigOverlay {
    pub debug: Option<bool>,
    pub no_cache: Option<bool>,
    pub test_mode: Option<bool>,
    pub github_repo_id: Option<String>,
    pub llm_provider: Option<LlmProvider>,
    pub ollama: Option<OllamaOverlay>,
    pub bedrock: Option<BedrockOverlay>,
    pub cache: Option<CacheOverlay>,
    pub blacklist: Option<BlacklistOverlay>,
    pub templates: Option<TemplateOverlay>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct CacheOverlay {
    pub enabled: Option<bool>,
    pub location: Option<CacheLocation>,
    pub directory: Option<String>,
    pub global_directory: Option<String>,
    pub ttl_secs: Option<u64>,
    pub hash_algorithm: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct OllamaOverlay {
    pub model: Option<String>,
    pub base_url: Option<String>,
    pub max_tokens: Option<u32>,
    pub timeout_secs: Option<u64>,
    pub concurrency: Option<usize>,
    pub temperature: Option<f32>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct BedrockOverlay {
    pub model_id: Option<String>,
    pub region: Option<String>,
    pub max_tokens: Option<u32>,
    pub timeout_secs: Option<u64>,
    pub concurrency: Option<usize>,
    pub temperature: Option<f32>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct BlacklistOverlay {
    pub extensions: Option<Vec<String>>,
    pub path_patterns: Option<Vec<String>>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct TemplateOverlay {
    pub prompts: Option<BTreeMap<String, String>>,
}

impl ConfigOverlay {
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn from_yaml(text: &str) -> Result<Self, serde_yaml::Error> {
        if text.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(text)
    }
}

macro_rules! apply {
    ($target:expr, $value:expr) => {
        if let Some(value) = $value {
            $target = value;
        }
    };
}

/// Deep-merge `overlay` onto `base`. Fields present in the overlay win;
/// prompt maps are merged key by key.
pub fn merge(mut base: ScribeConfig, overlay: ConfigOverlay) -> ScribeConfig {
    apply!(base.debug, overlay.debug);
    apply!(base.no_cache, overlay.no_cache);
    apply!(base.test_mode, overlay.test_mode);
    if overlay.github_repo_id.is_some() {
        base.github_repo_id = overlay.github_repo_id;
    }
    apply!(base.llm_provider, overlay.llm_provider);

    if let Some(ollama) = overlay.ollama {
        apply!(base.ollama.model, ollama.model);
        apply!(base.ollama.base_url, ollama.base_url);
        apply!(base.ollama.max_tokens, ollama.max_tokens);
        apply!(base.ollama.timeout_secs, ollama.timeout_secs);
        apply!(base.ollama.concurrency, ollama.concurrency);
        apply!(base.ollama.temperature, ollama.temperature);
    }

    if let Some(bedrock) = overlay.bedrock {
        apply!(base.bedrock.model_id, bedrock.model_id);
        apply!(base.bedrock.region, bedrock.region);
        apply!(base.bedrock.max_tokens, bedrock.max_tokens);
        apply!(base.bedrock.timeout_secs, bedrock.timeout_secs);
        apply!(base.bedrock.concurrency, bedrock.concurrency);
        apply!(base.bedrock.temperature, bedrock.temperature);
    }

    if let Some(cache) = overlay.cache {
        apply!(base.cache.enabled, cache.enabled);
        apply!(base.cache.location, cache.location);
        apply!(base.cache.directory, cache.directory);
        apply!(base.cache.global_directory, cache.global_directory);
        if cache.ttl_secs.is_some() {
            base.cache.ttl_secs = cache.ttl_secs;
        }
        apply!(base.cache.hash_algorithm, cache.hash_algorithm);
    }

    if let Some(blacklist) = overlay.blacklist {
        apply!(base.blacklist.extensions, blacklist.extensions);
        apply!(base.blacklist.path_patterns, blacklist.path_patterns);
    }

    if let Some(prompts) = overlay.templates.and_then(|t| t.prompts) {
        base.templates.prompts.extend(prompts);
    }

    base
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::collections::HashMap;

    #[test]
    fn test_defaults_are_valid() {
        let config = ScribeConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.cache.location, CacheLocation::Repo);
        assert_eq!(config.concurrency(), 1);
        assert!(config.cache_enabled());
    }

    #[test]
    fn test_merge_overrides_only_present_fields() {
        let overlay = ConfigOverlay::from_yaml(
            r#"
llm_provider: bedrock
bedrock:
  concurrency: 3
cache:
  location: home
  ttl_secs: 60
templates:
  prompts:
    file_summary: "Summarize {code}"
"#,
        )
        .unwrap();

        let merged = merge(ScribeConfig::default(), overlay);
        assert_eq!(merged.llm_provider, LlmProvider::Bedrock);
        assert_eq!(merged.bedrock.concurrency, 3);
        assert_eq!(merged.bedrock.region, BedrockConfig::default().region);
        assert_eq!(merged.cache.location, CacheLocation::Home);
        assert_eq!(merged.cache.directory, ".cache");
        assert_eq!(merged.cache.ttl_secs, Some(60));
        assert_eq!(merged.templates.file_summary(), "Summarize {code}");
        assert_eq!(merged.concurrency(), 3);
    }

    #[test]
    fn test_unknown_location_is_rejected_at_parse_time() {
        let result = ConfigOverlay::from_yaml("cache:\n  location: attic\n");
        assert!(result.is_err());
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = [
            ("LLM_PROVIDER", "bedrock"),
            ("CACHE_ENABLED", "no"),
            ("CACHE_LOCATION", "home"),
            ("AWS_REGION", "eu-west-1"),
        ]
        .into_iter()
        .collect();

        let mut config = ScribeConfig::default();
        config
            .apply_env_overrides(|key| env.get(key).map(|v| v.to_string()))
            .unwrap();

        assert_eq!(config.llm_provider, LlmProvider::Bedrock);
        assert!(!config.cache.enabled);
        assert_eq!(config.cache.location, CacheLocation::Home);
        assert_eq!(config.bedrock.region, "eu-west-1");
    }

    #[test]
    fn test_invalid_env_provider() {
        let mut config = ScribeConfig::default();
        let err = config
            .apply_env_overrides(|key| (key == "LLM_PROVIDER").then(|| "openai".to_string()))
            .unwrap_err();
        assert!(matches!(
            err,
            ConfigError::InvalidValue { field: "llm_provider", .. }
        ));
    }

    #[test]
    fn test_zero_concurrency_fails_validation() {
        let mut config = ScribeConfig::default();
        config.ollama.concurrency = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_no_cache_disables_cache() {
        let mut config = ScribeConfig::default();
        config.no_cache = true;
        assert!(!config.cache_enabled());
    }

    #[test]
    fn test_load_missing_file_uses_defaults() {
        let dir = tempfile::TempDir::new().unwrap();
        let config = ScribeConfig::load(Some(&dir.path().join("missing.yaml"))).unwrap();
        assert_eq!(config.cache.directory, ".cache");
    }
}
