//! A plain concurrency-limited queue: up to `concurrency` jobs run at once,
//! admission never rejects (jobs simply wait for a permit).

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::{broadcast, watch, Semaphore};

use super::{EventHub, Job, JobRunner, Queue, QueueEvent};
use crate::error::QueueError;

struct Inner {
    semaphore: Semaphore,
    runner: JobRunner,
    hub: EventHub,
    paused: Mutex<bool>,
    backlog: AtomicUsize,
    in_flight: AtomicUsize,
}

pub struct ParallelQueue {
    name: String,
    inner: Arc<Inner>,
}

impl ParallelQueue {
    pub fn new(name: impl Into<String>, concurrency: usize, runner: JobRunner) -> Arc<Self> {
        Arc::new(Self {
            name: name.into(),
            inner: Arc::new(Inner {
                semaphore: Semaphore::new(concurrency.max(1)),
                runner,
                hub: EventHub::new(),
                paused: Mutex::new(false),
                backlog: AtomicUsize::new(0),
                in_flight: AtomicUsize::new(0),
            }),
        })
    }
}

#[async_trait]
impl Queue for ParallelQueue {
    fn name(&self) -> &str {
        &self.name
    }

    async fn submit(&self, job: Arc<Job>, _cost: Option<f64>) -> Result<(), QueueError> {
        if *self.inner.paused.lock() {
            return Err(QueueError::Paused);
        }

        self.inner.backlog.fetch_add(1, Ordering::SeqCst);
        let job_id = job.id;
        let inner = self.inner.clone();

        // Spawned so `submit` returns once the job is accepted, not once it
        // finishes (spec.md §4.6's "admit, don't block the firing handler").
        tokio::spawn(async move {
            let _permit = inner.semaphore.acquire().await.expect("semaphore never closed");
            inner.backlog.fetch_sub(1, Ordering::SeqCst);
            let now_in_flight = inner.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            if now_in_flight == 1 {
                inner.hub.set_idle(false);
            }

            inner.hub.emit(QueueEvent::Run(job_id));
            let outcome = (inner.runner)(job).await;

            let remaining = inner.in_flight.fetch_sub(1, Ordering::SeqCst) - 1;
            if remaining == 0 {
                inner.hub.set_idle(true);
            }

            match outcome {
                Ok(()) => inner.hub.emit(QueueEvent::Done(job_id)),
                Err(e) => inner.hub.emit(QueueEvent::Failed(job_id, e.to_string())),
            }
        });

        Ok(())
    }

    fn pause(&self) {
        *self.inner.paused.lock() = true;
    }

    fn resume(&self) {
        *self.inner.paused.lock() = false;
    }

    fn is_paused(&self) -> bool {
        *self.inner.paused.lock()
    }

    fn backlog(&self) -> usize {
        self.inner.backlog.load(Ordering::SeqCst)
    }

    fn load(&self) -> f64 {
        let in_flight = self.inner.in_flight.load(Ordering::SeqCst);
        let capacity = self.inner.semaphore.available_permits() + in_flight;
        if capacity == 0 {
            return 1.0;
        }
        in_flight as f64 / capacity as f64
    }

    fn raw_load(&self) -> f64 {
        self.inner.in_flight.load(Ordering::SeqCst) as f64
    }

    fn subscribe_events(&self) -> broadcast::Receiver<QueueEvent> {
        self.inner.hub.subscribe_events()
    }

    fn subscribe_idle(&self) -> watch::Receiver<bool> {
        self.inner.hub.subscribe_idle()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context_store::StaticContextStore;
    use crate::logging::{ScopedLogger, TracingSink};
    use crate::task::Task;
    use std::time::Duration;

    async fn make_job() -> Arc<Job> {
        let store = StaticContextStore::load(
            std::env::temp_dir().join("parallel-queue-test-unused.json"),
            Duration::from_secs(60),
        )
        .await;
        let handle = store.handle_for("Task", "t");
        let logger = ScopedLogger::new(Arc::new(TracingSink), "task.t");
        let task = Task::new("t", "Task", handle, logger);
        Job::new(task, Arc::new(std::collections::HashMap::new()), Vec::new())
    }

    #[tokio::test]
    async fn submitted_job_runs_and_emits_done() {
        let runner: JobRunner = Arc::new(|_job| Box::pin(async move { Ok(()) }));
        let queue = ParallelQueue::new("q", 2, runner);
        let mut events = queue.subscribe_events();

        let job = make_job().await;
        let job_id = job.id;
        queue.submit(job, None).await.unwrap();

        let mut saw_run = false;
        let mut saw_done = false;
        for _ in 0..2 {
            match events.recv().await.unwrap() {
                QueueEvent::Run(id) if id == job_id => saw_run = true,
                QueueEvent::Done(id) if id == job_id => saw_done = true,
                _ => {}
            }
        }
        assert!(saw_run && saw_done);
    }

    #[tokio::test]
    async fn paused_queue_rejects_submission() {
        let runner: JobRunner = Arc::new(|_job| Box::pin(async move { Ok(()) }));
        let queue = ParallelQueue::new("q", 1, runner);
        queue.pause();

        let job = make_job().await;
        let err = queue.submit(job, None).await.unwrap_err();
        assert!(matches!(err, QueueError::Paused));
    }
}
