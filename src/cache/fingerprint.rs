//! Content fingerprints used as cache keys.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

use crate::config::ScribeConfig;

/// Bumped whenever the fingerprint encoding changes, so old entries miss.
const FINGERPRINT_VERSION: &[u8] = b"codescribe-fingerprint-v2";

/// The configuration inputs that change what the LLM returns for the same
/// file content. Any field added to the request sent to the model must be
/// added here too, otherwise a config change serves stale summaries.
#[derive(Debug, Clone, PartialEq)]
pub struct ConfigSignature {
    pub provider: String,
    pub model: String,
    pub prompt_template: String,
    pub temperature: f32,
    pub max_tokens: u32,
}

impl ConfigSignature {
    pub fn from_config(config: &ScribeConfig) -> Self {
        Self {
            provider: config.llm_provider.to_string(),
            model: config.model_id().to_string(),
            prompt_template: config.templates.file_summary().to_string(),
            temperature: config.temperature(),
            max_tokens: config.max_tokens(),
        }
    }

    /// Length-prefixed encoding, so that no two distinct signatures share
    /// the same bytes.
    pub fn to_bytes(&self) -> Vec<u8> {
        let temperature = self.temperature.to_bits().to_le_bytes();
        let max_tokens = self.max_tokens.to_le_bytes();
        let fields: [&[u8]; 5] = [
            self.provider.as_bytes(),
            self.model.as_bytes(),
            self.prompt_template.as_bytes(),
            &temperature,
            &max_tokens,
        ];

        let mut out = Vec::with_capacity(fields.iter().map(|f| f.len() + 8).sum());
        for field in fields {
            out.extend_from_slice(&(field.len() as u64).to_le_bytes());
            out.extend_from_slice(field);
        }
        out
    }
}

/// Hex-encoded SHA-256 cache key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FingerprintKey(String);

impl FingerprintKey {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Two-character prefix used to spread entries over subdirectories.
    pub fn shard(&self) -> &str {
        &self.0[..2]
    }

    /// Accept a stored key if it looks like one we produced.
    pub fn parse(s: &str) -> Option<Self> {
        (s.len() == 64 && s.bytes().all(|b| b.is_ascii_hexdigit()))
            .then(|| Self(s.to_ascii_lowercase()))
    }
}

impl fmt::Display for FingerprintKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Derive the cache key for `content` at `file_path` summarized under
/// `signature`.
///
/// The path is part of the key because it is rendered into the prompt, along
/// with the file type derived from its extension. `file_path` should be the
/// repository-relative path with `/` separators.
pub fn fingerprint(file_path: &str, content: &[u8], signature: &ConfigSignature) -> FingerprintKey {
    fingerprint_raw(file_path, content, &signature.to_bytes())
}

/// Same as [`fingerprint`] with a pre-encoded signature.
pub fn fingerprint_raw(file_path: &str, content: &[u8], config_signature: &[u8]) -> FingerprintKey {
    let content_hash = Sha256::digest(content);

    let mut hasher = Sha256::new();
    hasher.update(FINGERPRINT_VERSION);
    hasher.update(content_hash);
    hasher.update((config_signature.len() as u64).to_le_bytes());
    hasher.update(config_signature);
    hasher.update((file_path.len() as u64).to_le_bytes());
    hasher.update(file_path.as_bytes());
    FingerprintKey(hex::encode(hasher.finalize()))
}
