//! Content-addressed summary cache.
//!
//! Summaries are keyed by a [`FingerprintKey`] derived from file content and
//! the configuration that shapes the LLM's answer, and namespaced by a
//! [`RepositoryIdentity`]. [`CacheManager`] is the entry point; the store and
//! fingerprint function are exposed for tooling and benchmarks.

pub mod fingerprint;
pub mod identity;
mod manager;
pub mod store;
mod tests;

pub use fingerprint::{fingerprint, ConfigSignature, FingerprintKey};
pub use identity::{RepoSource, RepositoryIdentity};
pub use manager::{resolve_cache_dir, CacheManager};
pub use store::SummaryStore;
