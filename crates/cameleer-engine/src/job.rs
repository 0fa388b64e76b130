//! C5: the Job — one firing's ordered, serial walk through a task's steps.
//!
//! A monotonically increasing id, a running result log, and a link back to
//! the owning task's context. No branching or fan-out between steps — a
//! job is a flat ordered sequence, walked front to back.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::Value;
use std::collections::HashMap;

use crate::config::resolved::ResolvedStep;
use crate::error::JobFailError;
use crate::result::StepResult;
use crate::task::TaskObject;

static NEXT_JOB_ID: AtomicU64 = AtomicU64::new(1);

/// One firing of one task: a serial run through its resolved steps.
pub struct Job {
    pub id: u64,
    pub task: Arc<dyn TaskObject>,
    pub resolve_bag: Arc<HashMap<String, Value>>,
    /// The steps this job walks, fixed at admission time from the firing's
    /// `ResolvedConfig` — carried on the job itself (rather than on the
    /// queue, which is step-agnostic) since every queue runs one shared,
    /// generic [`JobRunner`](crate::queue::JobRunner) regardless of which
    /// task submitted the job.
    pub steps: Vec<ResolvedStep>,
    results: Mutex<Vec<StepResult>>,
    steps_done: AtomicUsize,
}

impl Job {
    pub fn new(
        task: Arc<dyn TaskObject>,
        resolve_bag: Arc<HashMap<String, Value>>,
        steps: Vec<ResolvedStep>,
    ) -> Arc<Self> {
        Arc::new(Self {
            id: NEXT_JOB_ID.fetch_add(1, Ordering::Relaxed),
            task,
            resolve_bag,
            steps,
            results: Mutex::new(Vec::new()),
            steps_done: AtomicUsize::new(0),
        })
    }

    /// Run every step to conclusion, in order (I4/I5). This is the body of
    /// the generic [`JobRunner`](crate::queue::JobRunner) every queue
    /// shares; it is step-agnostic at the queue level precisely because it
    /// lives here instead.
    pub async fn run_all(self: &Arc<Self>) -> Result<(), JobFailError> {
        for (index, step) in self.steps.iter().enumerate() {
            crate::attempt::run_step(index, step, self.clone()).await?;
        }
        Ok(())
    }

    /// The task's static context, reachable from any step body via its
    /// `Job` handle (spec.md §3's context table, scoped per task).
    pub fn context(&self) -> &crate::context_store::TaskContextHandle {
        self.task.context()
    }

    /// Record a finished step's outcome (I4: results accumulate in step
    /// order, regardless of success or failure) and advance the done count.
    pub fn record(&self, result: StepResult) {
        self.results.lock().push(result);
        self.steps_done.fetch_add(1, Ordering::Relaxed);
    }

    pub fn results_snapshot(&self) -> Vec<StepResult> {
        self.results.lock().clone()
    }

    /// How many steps have concluded (successfully, by skip, or by final
    /// failure) so far — the job's `funcTasksDone` counter.
    pub fn steps_done(&self) -> usize {
        self.steps_done.load(Ordering::Relaxed)
    }

    /// Whether any *recorded* step concluded via `StepResult::Err` — i.e. a
    /// skip or `continueOnFinalFail` path. This is not the I5 job-level fail
    /// decision: a step that fails finally without `continueOnFinalFail` is
    /// never recorded here at all (see `attempt::run_step`), so a job can
    /// still finish `done` with `has_error_step() == true`.
    pub fn has_error_step(&self) -> bool {
        self.results.lock().iter().any(StepResult::is_error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context_store::StaticContextStore;
    use crate::logging::{ScopedLogger, TracingSink};
    use crate::task::Task;
    use serde_json::json;
    use std::time::Duration;

    async fn make_task() -> Arc<dyn TaskObject> {
        let store = StaticContextStore::load(
            std::env::temp_dir().join("job-test-unused.json"),
            Duration::from_secs(60),
        )
        .await;
        let handle = store.handle_for("Task", "t");
        let logger = ScopedLogger::new(Arc::new(TracingSink), "task.t");
        Task::new("t", "Task", handle, logger)
    }

    #[tokio::test]
    async fn job_ids_are_monotonic() {
        let task = make_task().await;
        let a = Job::new(task.clone(), Arc::new(HashMap::new()), Vec::new());
        let b = Job::new(task, Arc::new(HashMap::new()), Vec::new());
        assert!(b.id > a.id);
    }

    #[tokio::test]
    async fn recording_an_error_result_is_reflected_in_has_error_step() {
        let task = make_task().await;
        let job = Job::new(task, Arc::new(HashMap::new()), Vec::new());
        assert!(!job.has_error_step());
        job.record(StepResult::Ok(json!(1)));
        assert!(!job.has_error_step());
        job.record(StepResult::Err(json!("boom")));
        assert!(job.has_error_step());
        assert_eq!(job.steps_done(), 2);
    }
}
