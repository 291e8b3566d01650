use std::time::Duration;

use crate::types::CacheStats;

/// Format a duration as `MM:SS`, or `HH:MM:SS` once it exceeds an hour.
pub fn format_duration(duration: Duration) -> String {
    let total = duration.as_secs();
    let (hours, minutes, seconds) = (total / 3600, (total / 60) % 60, total % 60);
    if hours > 0 {
        format!("{:02}:{:02}:{:02}", hours, minutes, seconds)
    } else {
        format!("{:02}:{:02}", minutes, seconds)
    }
}

/// One-line report of where a run's summaries came from.
pub fn format_cache_stats(stats: &CacheStats, cache_enabled: bool) -> String {
    if !cache_enabled {
        return format!(
            "Cache disabled: {} files processed by LLM, {} files skipped, {} failed",
            stats.from_llm, stats.skipped, stats.failed
        );
    }
    format!(
        "Cache statistics: {} files from cache ({:.1}%), {} files processed by LLM, {} files skipped, {} failed",
        stats.from_cache,
        stats.hit_rate(),
        stats.from_llm,
        stats.skipped,
        stats.failed
    )
}
