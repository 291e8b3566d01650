//! # Parallel Processor
//!
//! Runs one async operation over a batch of items with a hard cap on how many
//! are in flight at once. Every item gets a [`ParallelResult`] in the same
//! position as its input, and a failing (or panicking) item never affects its
//! siblings.

use futures::future::join_all;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::Semaphore;

use crate::config::ScribeConfig;
use crate::error::ParallelError;
use crate::progress::ProgressTracker;

/// Outcome of processing one item.
#[derive(Debug)]
pub struct ParallelResult<R> {
    pub success: bool,
    pub result: Option<R>,
    pub error: Option<anyhow::Error>,
}

impl<R> ParallelResult<R> {
    pub fn ok(result: R) -> Self {
        Self {
            success: true,
            result: Some(result),
            error: None,
        }
    }

    pub fn err(error: anyhow::Error) -> Self {
        Self {
            success: false,
            result: None,
            error: Some(error),
        }
    }

    /// Convert back into a `Result`.
    pub fn into_result(self) -> anyhow::Result<R> {
        match (self.result, self.error) {
            (Some(result), _) if self.success => Ok(result),
            (_, Some(error)) => Err(error),
            _ => Err(anyhow::anyhow!("item produced neither a result nor an error")),
        }
    }
}

/// Hard ceiling on in-flight operations. The work is I/O-bound, so the
/// limit does not depend on the CPU count.
pub const MAX_CONCURRENCY: usize = 512;

/// Bounded-concurrency batch executor.
pub struct ParallelProcessor {
    max_concurrent: usize,
    tracker: Option<Arc<ProgressTracker>>,
}

impl ParallelProcessor {
    /// `max_concurrent` is clamped to `1..=MAX_CONCURRENCY`.
    pub fn new(max_concurrent: usize, tracker: Option<Arc<ProgressTracker>>) -> Self {
        let limit = max_concurrent.clamp(1, MAX_CONCURRENCY);
        if limit != max_concurrent {
            tracing::warn!(
                "concurrency {} out of range, using {}",
                max_concurrent,
                limit
            );
        }
        Self {
            max_concurrent: limit,
            tracker,
        }
    }

    /// A processor limited to the active provider's configured concurrency.
    pub fn from_config(config: &ScribeConfig, tracker: Option<Arc<ProgressTracker>>) -> Self {
        Self::new(config.concurrency(), tracker)
    }

    pub fn max_concurrent(&self) -> usize {
        self.max_concurrent
    }

    pub fn tracker(&self) -> Option<&Arc<ProgressTracker>> {
        self.tracker.as_ref()
    }

    /// Run `operation` over every item.
    ///
    /// Results are returned in input order. `naming` labels each item for the
    /// progress tracker. The call itself only fails if a scheduling permit
    /// cannot be acquired.
    pub async fn process_items<T, R, F, Fut, N>(
        &self,
        items: Vec<T>,
        operation: F,
        naming: N,
    ) -> Result<Vec<ParallelResult<R>>, ParallelError>
    where
        T: Send + 'static,
        R: Send + 'static,
        F: Fn(T) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<R>> + Send + 'static,
        N: Fn(&T) -> String,
    {
        let total = items.len();
        let operation = Arc::new(operation);
        let semaphore = Arc::new(Semaphore::new(self.max_concurrent));
        let mut names = Vec::with_capacity(total);
        let mut handles = Vec::with_capacity(total);

        tracing::debug!(
            "processing {} items with at most {} concurrent",
            total,
            self.max_concurrent
        );

        for item in items {
            let name = naming(&item);
            let permit = semaphore.clone().acquire_owned().await?;
            let operation = Arc::clone(&operation);
            let tracker = self.tracker.clone();
            let task_name = name.clone();

            let handle = tokio::spawn(async move {
                let _permit = permit;
                if let Some(tracker) = &tracker {
                    tracker.start_task(&task_name, 1);
                }

                let outcome = operation(item).await;

                if let Some(tracker) = &tracker {
                    match &outcome {
                        Ok(_) => tracker.complete_task(&task_name, true, None),
                        Err(e) => tracker.complete_task(&task_name, false, Some(&e.to_string())),
                    }
                }
                outcome
            });
            names.push(name);
            handles.push(handle);
        }

        let joined = join_all(handles).await;
        let mut results = Vec::with_capacity(total);
        for (name, outcome) in names.into_iter().zip(joined) {
            let result = match outcome {
                Ok(Ok(value)) => ParallelResult::ok(value),
                Ok(Err(e)) => {
                    tracing::debug!("item {} failed: {:#}", name, e);
                    ParallelResult::err(e)
                }
                Err(e) => {
                    let message = if e.is_panic() {
                        "operation panicked".to_string()
                    } else {
                        format!("task join error: {}", e)
                    };
                    tracing::error!("item {}: {}", name, message);
                    if let Some(tracker) = &self.tracker {
                        tracker.complete_task(&name, false, Some(&message));
                    }
                    ParallelResult::err(anyhow::anyhow!(message))
                }
            };
            results.push(result);
        }

        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::progress::TaskStatus;
    use pretty_assertions::assert_eq;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn test_results_follow_input_order() {
        let processor = ParallelProcessor::new(5, None);
        let results = processor
            .process_items(
                vec![1u64, 2, 3, 4, 5],
                |n| async move {
                    tokio::time::sleep(Duration::from_millis((6 - n) * 20)).await;
                    Ok(n * 10)
                },
                |n| format!("item-{}", n),
            )
            .await
            .unwrap();

        let values: Vec<u64> = results.into_iter().map(|r| r.into_result().unwrap()).collect();
        assert_eq!(values, vec![10, 20, 30, 40, 50]);
    }

    #[tokio::test]
    async fn test_failure_is_isolated() {
        let processor = ParallelProcessor::new(2, None);
        let results = processor
            .process_items(
                vec![1, 2, 3, 4, 5],
                |n| async move {
                    if n == 3 {
                        anyhow::bail!("item {} exploded", n);
                    }
                    Ok(n)
                },
                |n| n.to_string(),
            )
            .await
            .unwrap();

        assert_eq!(results.len(), 5);
        let flags: Vec<bool> = results.iter().map(|r| r.success).collect();
        assert_eq!(flags, vec![true, true, false, true, true]);
        assert!(results[2].result.is_none());
        assert_eq!(results[2].error.as_ref().unwrap().to_string(), "item 3 exploded");
    }

    #[tokio::test]
    async fn test_panic_is_captured() {
        let processor = ParallelProcessor::new(2, None);
        let results = processor
            .process_items(
                vec![1, 2],
                |n| async move {
                    if n == 2 {
                        panic!("boom");
                    }
                    Ok(n)
                },
                |n| n.to_string(),
            )
            .await
            .unwrap();

        assert!(results[0].success);
        assert!(!results[1].success);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrency_bound() {
        let active = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        let processor = ParallelProcessor::new(2, None);

        let (a, p) = (Arc::clone(&active), Arc::clone(&peak));
        let results = processor
            .process_items(
                vec![1, 2, 3, 4, 5],
                move |n| {
                    let active = Arc::clone(&a);
                    let peak = Arc::clone(&p);
                    async move {
                        let now = active.fetch_add(1, Ordering::SeqCst) + 1;
                        peak.fetch_max(now, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(30)).await;
                        active.fetch_sub(1, Ordering::SeqCst);
                        Ok(n)
                    }
                },
                |n| n.to_string(),
            )
            .await
            .unwrap();

        assert_eq!(results.len(), 5);
        assert!(peak.load(Ordering::SeqCst) <= 2);
        assert!(peak.load(Ordering::SeqCst) >= 1);
    }

    #[tokio::test]
    async fn test_tracker_records_each_item() {
        let tracker = Arc::new(ProgressTracker::hidden("/tmp/repo"));
        let processor = ParallelProcessor::new(3, Some(Arc::clone(&tracker)));

        processor
            .process_items(
                vec!["a.rs", "b.rs", "c.rs"],
                |name| async move {
                    if name == "b.rs" {
                        anyhow::bail!("timeout");
                    }
                    Ok(())
                },
                |name| name.to_string(),
            )
            .await
            .unwrap();

        assert_eq!(tracker.task("a.rs").unwrap().status, TaskStatus::Success);
        let failed = tracker.task("b.rs").unwrap();
        assert_eq!(failed.status, TaskStatus::Error);
        assert_eq!(failed.message.as_deref(), Some("timeout"));

        let summary = tracker.summary();
        assert_eq!((summary.total, summary.successful, summary.failed), (3, 2, 1));
    }

    #[tokio::test]
    async fn test_empty_batch() {
        let processor = ParallelProcessor::new(1, None);
        let results = processor
            .process_items(Vec::<u8>::new(), |n| async move { Ok(n) }, |n| n.to_string())
            .await
            .unwrap();
        assert!(results.is_empty());
    }

    #[test]
    fn test_zero_concurrency_is_clamped() {
        assert_eq!(ParallelProcessor::new(0, None).max_concurrent(), 1);
        assert_eq!(
            ParallelProcessor::new(usize::MAX, None).max_concurrent(),
            MAX_CONCURRENCY
        );
    }

    #[test]
    fn test_configured_limit_is_kept_above_cpu_count() {
        assert_eq!(ParallelProcessor::new(200, None).max_concurrent(), 200);

        let mut config = ScribeConfig::default();
        config.set_concurrency(64);
        assert_eq!(ParallelProcessor::from_config(&config, None).max_concurrent(), 64);
    }
}
