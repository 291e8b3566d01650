//! The LLM collaborator.
//!
//! Provider clients live outside this crate; they plug in by implementing
//! [`Summarizer`]. Latency, retries and timeouts are the implementation's
//! concern.

use async_trait::async_trait;

/// Everything a provider needs besides the file itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SummaryContext {
    /// Language name derived from the file extension
    pub file_type: String,
    /// Namespace of the repository being summarized
    pub repo_identity: String,
    /// Model identifier of the active provider
    pub model: String,
    /// The fully rendered prompt
    pub prompt: String,
}

/// Produces a summary for one file.
#[async_trait]
pub trait Summarizer: Send + Sync {
    async fn summarize(&self, file_path: &str, content: &str, context: &SummaryContext) -> anyhow::Result<String>;
}

/// Fill the `{file_path}`, `{file_type}` and `{code}` placeholders of a prompt
/// template.
pub fn render_prompt(template: &str, file_path: &str, file_type: &str, code: &str) -> String {
    // Code goes last so placeholders inside file content stay untouched.
    template
        .replace("{file_path}", file_path)
        .replace("{file_type}", file_type)
        .replace("{code}", code)
}
