use indicatif::{MultiProgress, ProgressBar, ProgressDrawTarget, ProgressStyle};
use once_cell::sync::OnceCell;
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use super::task::{Task, TaskStatus};
use crate::error::ProgressError;
use crate::utils::format_duration;

const OVERALL_TEMPLATE: &str = "{spinner:.green} {msg} [{elapsed_precise}] {pos}/{len} tasks";
const TASK_TEMPLATE: &str = "  {prefix:.bold} [{bar:30.cyan/blue}] {pos}/{len} {msg}";

static GLOBAL: OnceCell<Arc<ProgressTracker>> = OnceCell::new();

struct TrackedTask {
    task: Task,
    bar: Option<ProgressBar>,
}

#[derive(Default)]
struct TrackerState {
    tasks: HashMap<String, TrackedTask>,
    order: Vec<String>,
}

/// Records the lifecycle of named tasks and renders live progress bars.
///
/// None of the task methods fail or panic: unknown names, invalid
/// transitions and internal errors are logged as warnings, since progress
/// reporting must never abort the work it is reporting on.
pub struct ProgressTracker {
    repo_path: PathBuf,
    state: Mutex<TrackerState>,
    multi: MultiProgress,
    overall: ProgressBar,
    created_at: Instant,
    cleaned_up: AtomicBool,
}

impl ProgressTracker {
    /// A tracker drawing to stderr.
    pub fn new(repo_path: impl Into<PathBuf>) -> Self {
        Self::with_draw_target(repo_path, ProgressDrawTarget::stderr())
    }

    /// A tracker that keeps state and logs but draws nothing.
    pub fn hidden(repo_path: impl Into<PathBuf>) -> Self {
        Self::with_draw_target(repo_path, ProgressDrawTarget::hidden())
    }

    pub fn with_draw_target(repo_path: impl Into<PathBuf>, target: ProgressDrawTarget) -> Self {
        let ticking = ticks(&target);
        let multi = MultiProgress::with_draw_target(target);
        let overall = multi.add(ProgressBar::new(0));
        overall.set_style(style(OVERALL_TEMPLATE));
        overall.set_message("Overall Progress");
        if ticking {
            overall.enable_steady_tick(Duration::from_millis(120));
        }

        Self {
            repo_path: repo_path.into(),
            state: Mutex::new(TrackerState::default()),
            multi,
            overall,
            created_at: Instant::now(),
            cleaned_up: AtomicBool::new(false),
        }
    }

    /// The process-wide tracker. The first call must supply the repository
    /// path; asking before that fails with [`ProgressError::NotInitialized`].
    ///
    /// A tracker created here lives in a static and is never dropped, so
    /// nothing cleans it up at exit. Entry points should create it with
    /// [`ProgressTracker::install_global`] and hold the returned guard.
    pub fn get_instance(repo_path: Option<&Path>) -> Result<Arc<Self>, ProgressError> {
        if let Some(tracker) = GLOBAL.get() {
            return Ok(Arc::clone(tracker));
        }
        let path = repo_path.ok_or(ProgressError::NotInitialized)?;
        Ok(Arc::clone(GLOBAL.get_or_init(|| Arc::new(Self::new(path)))))
    }

    /// Install `tracker` as the process-wide instance and return a guard that
    /// cleans it up when dropped. If an instance already exists it is kept.
    pub fn install_global(tracker: ProgressTracker) -> TrackerGuard {
        let installed = match GLOBAL.try_insert(Arc::new(tracker)) {
            Ok(installed) => installed,
            Err((existing, unused)) => {
                tracing::warn!("progress tracker already initialized; keeping the existing instance");
                unused.cleanup();
                existing
            }
        };
        TrackerGuard {
            tracker: Arc::clone(installed),
        }
    }

    pub fn repo_path(&self) -> &Path {
        &self.repo_path
    }

    pub fn set_overall_message(&self, message: impl Into<String>) {
        self.overall.set_message(message.into());
    }

    /// Begin `name` in the `Running` state. An existing task with the same
    /// name is replaced.
    pub fn start_task(&self, name: &str, total_steps: u64) {
        if let Err(e) = self.try_start_task(name, total_steps) {
            tracing::warn!("start_task({}): {}", name, e);
        }
    }

    pub fn update_task(&self, name: &str, advance: u64, message: Option<&str>) {
        if let Err(e) = self.try_update_task(name, advance, message) {
            tracing::warn!("update_task({}): {}", name, e);
        }
    }

    pub fn complete_task(&self, name: &str, success: bool, message: Option<&str>) {
        if let Err(e) = self.try_complete_task(name, success, message) {
            tracing::warn!("complete_task({}): {}", name, e);
        }
    }

    /// Record `name` as skipped without running it.
    pub fn skip_task(&self, name: &str, reason: &str) {
        if let Err(e) = self.try_skip_task(name, reason) {
            tracing::warn!("skip_task({}): {}", name, e);
        }
    }

    /// Start `name` and return a guard that completes it. The guard marks the
    /// task failed if it is dropped without [`TaskGuard::succeed`] or
    /// [`TaskGuard::fail`], which covers early returns and panics.
    pub fn scope(&self, name: &str, total_steps: u64) -> TaskGuard<'_> {
        self.start_task(name, total_steps);
        TaskGuard {
            tracker: self,
            name: name.to_string(),
            done: false,
        }
    }

    /// Run `work` as task `name`, completing it from the future's result.
    pub async fn run_task<F, T, E>(&self, name: &str, work: F) -> Result<T, E>
    where
        F: Future<Output = Result<T, E>>,
        E: fmt::Display,
    {
        let guard = self.scope(name, 1);
        match work.await {
            Ok(value) => {
                guard.succeed(None);
                Ok(value)
            }
            Err(e) => {
                guard.fail(&e.to_string());
                Err(e)
            }
        }
    }

    /// Snapshot of one task.
    pub fn task(&self, name: &str) -> Option<Task> {
        self.lock().ok()?.tasks.get(name).map(|t| t.task.clone())
    }

    /// Snapshot of all tasks in creation order.
    pub fn tasks(&self) -> Vec<Task> {
        match self.lock() {
            Ok(state) => state
                .order
                .iter()
                .filter_map(|name| state.tasks.get(name))
                .map(|t| t.task.clone())
                .collect(),
            Err(_) => Vec::new(),
        }
    }

    /// Totals per terminal state plus the list of failures. Logs the result.
    pub fn summary(&self) -> TaskSummary {
        match self.try_summary() {
            Ok(summary) => {
                tracing::info!(
                    "Tasks: {} total, {} successful, {} failed, {} skipped ({} task time, {} elapsed)",
                    summary.total,
                    summary.successful,
                    summary.failed,
                    summary.skipped,
                    format_duration(summary.task_time),
                    format_duration(summary.elapsed),
                );
                for (name, message) in &summary.failures {
                    tracing::error!("failed task {}: {}", name, message.as_deref().unwrap_or("no message"));
                }
                summary
            }
            Err(e) => {
                tracing::error!("could not summarize tasks: {}", e);
                TaskSummary::default()
            }
        }
    }

    /// Stop all rendering. Runs once; later calls do nothing.
    pub fn cleanup(&self) {
        if self.cleaned_up.swap(true, Ordering::SeqCst) {
            return;
        }
        if let Ok(mut state) = self.lock() {
            for tracked in state.tasks.values_mut() {
                if let Some(bar) = tracked.bar.take() {
                    bar.finish_and_clear();
                }
            }
        }
        self.overall.finish();
        if let Err(e) = self.multi.clear() {
            tracing::debug!("failed to clear progress output: {}", e);
        }
    }

    pub fn is_cleaned_up(&self) -> bool {
        self.cleaned_up.load(Ordering::SeqCst)
    }

    fn try_start_task(&self, name: &str, total_steps: u64) -> Result<(), ProgressError> {
        let mut state = self.lock()?;
        let task = Task::running(name, total_steps);

        // After cleanup tasks are still recorded but no longer drawn.
        let bar = (!self.is_cleaned_up()).then(|| {
            let bar = self.multi.add(ProgressBar::new(task.total_steps));
            bar.set_style(style(TASK_TEMPLATE));
            bar.set_prefix(name.to_string());
            bar
        });

        let previous = state.tasks.insert(name.to_string(), TrackedTask { task, bar });
        match previous {
            Some(old) => {
                tracing::warn!("task {} already exists; restarting it", name);
                if let Some(bar) = old.bar {
                    bar.finish_and_clear();
                }
                if old.task.status.is_terminal() {
                    self.overall.inc_length(1);
                }
            }
            None => {
                state.order.push(name.to_string());
                self.overall.inc_length(1);
            }
        }
        tracing::info!("Started task: {}", name);
        Ok(())
    }

    fn try_update_task(&self, name: &str, advance: u64, message: Option<&str>) -> Result<(), ProgressError> {
        let mut state = self.lock()?;
        let tracked = state
            .tasks
            .get_mut(name)
            .ok_or_else(|| ProgressError::UnknownTask(name.to_string()))?;

        tracked.task.advance(advance);
        if let Some(bar) = &tracked.bar {
            bar.inc(advance);
            if let Some(message) = message {
                bar.set_message(message.to_string());
            }
        }
        Ok(())
    }

    fn try_complete_task(&self, name: &str, success: bool, message: Option<&str>) -> Result<(), ProgressError> {
        let mut state = self.lock()?;
        let tracked = state
            .tasks
            .get_mut(name)
            .ok_or_else(|| ProgressError::UnknownTask(name.to_string()))?;

        tracked.task.finish(success, message.map(str::to_string))?;
        if let Some(bar) = tracked.bar.take() {
            bar.set_position(tracked.task.total_steps);
            if let Some(message) = message {
                bar.set_message(message.to_string());
            }
            bar.finish_and_clear();
        }
        self.overall.inc(1);

        let duration = tracked
            .task
            .duration()
            .map(|d| format!(" ({:.2}s)", d.as_secs_f64()))
            .unwrap_or_default();
        let detail = message.unwrap_or("Done");
        if success {
            tracing::info!("Completed task: {}{} - {}", name, duration, detail);
        } else {
            tracing::error!("Completed task: {}{} - {}", name, duration, detail);
        }
        Ok(())
    }

    fn try_skip_task(&self, name: &str, reason: &str) -> Result<(), ProgressError> {
        let mut state = self.lock()?;
        let previous = state.tasks.insert(
            name.to_string(),
            TrackedTask {
                task: Task::skipped(name, reason),
                bar: None,
            },
        );
        match previous {
            Some(old) => {
                tracing::warn!("task {} already exists; marking it skipped", name);
                if let Some(bar) = old.bar {
                    bar.finish_and_clear();
                }
                if old.task.status.is_terminal() {
                    self.overall.inc_length(1);
                }
            }
            None => {
                state.order.push(name.to_string());
                self.overall.inc_length(1);
            }
        }
        self.overall.inc(1);
        tracing::info!("Skipped task: {} - {}", name, reason);
        Ok(())
    }

    fn try_summary(&self) -> Result<TaskSummary, ProgressError> {
        let state = self.lock()?;
        let mut summary = TaskSummary {
            elapsed: self.created_at.elapsed(),
            ..TaskSummary::default()
        };

        for name in &state.order {
            let Some(tracked) = state.tasks.get(name) else {
                continue;
            };
            let task = &tracked.task;
            summary.total += 1;
            if let Some(duration) = task.duration() {
                summary.task_time += duration;
            }
            match task.status {
                TaskStatus::Success => summary.successful += 1,
                TaskStatus::Error => {
                    summary.failed += 1;
                    summary.failures.push((task.name.clone(), task.message.clone()));
                }
                TaskStatus::Skipped => summary.skipped += 1,
                TaskStatus::Pending | TaskStatus::Running => summary.running += 1,
            }
        }
        Ok(summary)
    }

    fn lock(&self) -> Result<MutexGuard<'_, TrackerState>, ProgressError> {
        self.state.lock().map_err(|_| ProgressError::Poisoned)
    }
}

impl Drop for ProgressTracker {
    fn drop(&mut self) {
        self.cleanup();
    }
}

/// Whether the overall spinner needs a ticker thread for `target`.
fn ticks(target: &ProgressDrawTarget) -> bool {
    !target.is_hidden()
}

fn style(template: &str) -> ProgressStyle {
    ProgressStyle::with_template(template)
        .map(|style| style.progress_chars("█▉▊▋▌▍▎▏ "))
        .unwrap_or_else(|e| {
            tracing::debug!("invalid progress template {:?}: {}", template, e);
            ProgressStyle::default_bar()
        })
}

/// Completes a task started by [`ProgressTracker::scope`].
pub struct TaskGuard<'a> {
    tracker: &'a ProgressTracker,
    name: String,
    done: bool,
}

impl TaskGuard<'_> {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn update(&self, advance: u64, message: Option<&str>) {
        self.tracker.update_task(&self.name, advance, message);
    }

    pub fn succeed(mut self, message: Option<&str>) {
        self.done = true;
        self.tracker.complete_task(&self.name, true, message);
    }

    pub fn fail(mut self, message: &str) {
        self.done = true;
        self.tracker.complete_task(&self.name, false, Some(message));
    }
}

impl Drop for TaskGuard<'_> {
    fn drop(&mut self) {
        if self.done {
            return;
        }
        let reason = if std::thread::panicking() {
            "panicked"
        } else {
            "ended without completing"
        };
        self.tracker.complete_task(&self.name, false, Some(reason));
    }
}

/// Cleans up the global tracker when dropped. Hold it in `main` so rendering
/// is torn down on every exit path.
pub struct TrackerGuard {
    tracker: Arc<ProgressTracker>,
}

impl TrackerGuard {
    pub fn tracker(&self) -> &Arc<ProgressTracker> {
        &self.tracker
    }
}

impl Drop for TrackerGuard {
    fn drop(&mut self) {
        self.tracker.cleanup();
    }
}

/// Aggregate view of a tracker's tasks.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaskSummary {
    pub total: usize,
    pub successful: usize,
    pub failed: usize,
    pub skipped: usize,
    /// Tasks that never reached a terminal state
    pub running: usize,
    /// Sum of individual task durations
    pub task_time: Duration,
    /// Wall time since the tracker was created
    pub elapsed: Duration,
    /// Name and message of every failed task
    pub failures: Vec<(String, Option<String>)>,
}

impl fmt::Display for TaskSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Generation Summary:")?;
        writeln!(f, "Total time: {}", format_duration(self.elapsed))?;
        write!(
            f,
            "Tasks: {} total, {} successful, {} failed, {} skipped",
            self.total, self.successful, self.failed, self.skipped
        )?;
        if !self.failures.is_empty() {
            write!(f, "\n\nFailed tasks:")?;
            for (name, message) in &self.failures {
                write!(
                    f,
                    "\n{} {}: {}",
                    TaskStatus::Error.symbol(),
                    name,
                    message.as_deref().unwrap_or("no message")
                )?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn tracker() -> ProgressTracker {
        ProgressTracker::hidden("/tmp/repo")
    }

    #[test]
    fn test_start_then_complete() {
        let tracker = tracker();
        tracker.start_task("x", 1);
        assert_eq!(tracker.task("x").unwrap().status, TaskStatus::Running);

        tracker.complete_task("x", true, None);
        let task = tracker.task("x").unwrap();
        assert_eq!(task.status, TaskStatus::Success);
        assert!(task.duration().is_some());
    }

    #[test]
    fn test_skip_is_counted() {
        let tracker = tracker();
        tracker.start_task("a", 1);
        tracker.complete_task("a", true, None);
        tracker.skip_task("y", "reason");

        let task = tracker.task("y").unwrap();
        assert_eq!(task.status, TaskStatus::Skipped);
        assert_eq!(task.message.as_deref(), Some("reason"));

        let summary = tracker.summary();
        assert_eq!(summary.total, 2);
        assert_eq!(summary.successful, 1);
        assert_eq!(summary.skipped, 1);
    }

    #[test]
    fn test_unknown_names_are_ignored() {
        let tracker = tracker();
        tracker.update_task("ghost", 1, Some("hello"));
        tracker.complete_task("ghost", true, None);
        assert!(tracker.task("ghost").is_none());
        assert_eq!(tracker.summary().total, 0);
    }

    #[test]
    fn test_restart_overwrites() {
        let tracker = tracker();
        tracker.start_task("x", 1);
        tracker.complete_task("x", false, Some("first attempt"));
        tracker.start_task("x", 2);

        let task = tracker.task("x").unwrap();
        assert_eq!(task.status, TaskStatus::Running);
        assert_eq!(task.total_steps, 2);
        assert_eq!(tracker.tasks().len(), 1);
    }

    #[test]
    fn test_terminal_task_cannot_be_completed_again() {
        let tracker = tracker();
        tracker.start_task("x", 1);
        tracker.complete_task("x", true, None);
        tracker.complete_task("x", false, Some("late failure"));
        assert_eq!(tracker.task("x").unwrap().status, TaskStatus::Success);
    }

    #[test]
    fn test_update_advances_steps() {
        let tracker = tracker();
        tracker.start_task("x", 4);
        tracker.update_task("x", 3, Some("three"));
        assert_eq!(tracker.task("x").unwrap().completed_steps, 3);
    }

    #[test]
    fn test_summary_lists_failures() {
        let tracker = tracker();
        tracker.start_task("good", 1);
        tracker.complete_task("good", true, None);
        tracker.start_task("bad", 1);
        tracker.complete_task("bad", false, Some("timeout"));
        tracker.start_task("open", 1);

        let summary = tracker.summary();
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.running, 1);
        assert_eq!(summary.failures, vec![("bad".to_string(), Some("timeout".to_string()))]);
        assert!(summary.to_string().contains("bad: timeout"));
    }

    #[test]
    fn test_guard_fails_task_when_dropped() {
        let tracker = tracker();
        {
            let _guard = tracker.scope("early-return", 1);
        }
        let task = tracker.task("early-return").unwrap();
        assert_eq!(task.status, TaskStatus::Error);

        tracker.scope("finished", 1).succeed(Some("ok"));
        assert_eq!(tracker.task("finished").unwrap().status, TaskStatus::Success);
    }

    #[test]
    fn test_guard_fails_task_on_panic() {
        let tracker = tracker();
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let _guard = tracker.scope("explodes", 1);
            panic!("boom");
        }));
        assert!(result.is_err());

        let task = tracker.task("explodes").unwrap();
        assert_eq!(task.status, TaskStatus::Error);
        assert_eq!(task.message.as_deref(), Some("panicked"));
    }

    #[tokio::test]
    async fn test_run_task_records_outcome() {
        let tracker = tracker();
        let ok: Result<u32, String> = tracker.run_task("ok", async { Ok(7) }).await;
        assert_eq!(ok, Ok(7));

        let err: Result<u32, String> = tracker.run_task("err", async { Err("nope".to_string()) }).await;
        assert!(err.is_err());

        assert_eq!(tracker.task("ok").unwrap().status, TaskStatus::Success);
        let failed = tracker.task("err").unwrap();
        assert_eq!(failed.status, TaskStatus::Error);
        assert_eq!(failed.message.as_deref(), Some("nope"));
    }

    #[test]
    fn test_cleanup_is_idempotent() {
        let tracker = tracker();
        tracker.start_task("x", 1);
        tracker.cleanup();
        tracker.cleanup();
        assert!(tracker.is_cleaned_up());
        tracker.complete_task("x", true, None);
        assert_eq!(tracker.task("x").unwrap().status, TaskStatus::Success);
    }

    #[test]
    fn test_tasks_started_after_cleanup_are_not_drawn() {
        let tracker = tracker();
        tracker.cleanup();
        tracker.start_task("late", 2);
        tracker.update_task("late", 1, Some("half"));

        let task = tracker.task("late").unwrap();
        assert_eq!(task.status, TaskStatus::Running);
        assert_eq!(task.completed_steps, 1);
        assert!(tracker.lock().unwrap().tasks["late"].bar.is_none());

        tracker.complete_task("late", true, None);
        assert_eq!(tracker.summary().successful, 1);
    }

    #[test]
    fn test_hidden_target_does_not_tick() {
        assert!(!ticks(&ProgressDrawTarget::hidden()));
    }

    #[test]
    fn test_global_instance_requires_path_first() {
        // The global is shared by every test in the process; only this test
        // touches it.
        assert_eq!(
            ProgressTracker::get_instance(None).err(),
            Some(ProgressError::NotInitialized)
        );
        let guard = ProgressTracker::install_global(ProgressTracker::hidden("/tmp/global"));
        let again = ProgressTracker::get_instance(None).unwrap();
        assert!(Arc::ptr_eq(guard.tracker(), &again));
        assert_eq!(again.repo_path(), Path::new("/tmp/global"));
    }
}
