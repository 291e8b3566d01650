mod format;

pub use format::{format_cache_stats, format_duration};
