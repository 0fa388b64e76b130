//! A budget-aware queue: jobs carry a cost, the queue admits concurrently
//! as long as the sum of in-flight costs stays under its capacity, or —
//! when this queue was configured with `allow_exclusive_jobs` — admits a
//! single over-budget job exclusively while nothing else is running
//! (spec.md §4.4). `allowExclusiveJobs` is a property of the *queue*, not
//! of the job; a task's own `allowMultiple` flag governs single-instance
//! enforcement at the Engine layer (I3) and never reaches the queue.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::{broadcast, watch};

use super::{EventHub, Job, JobRunner, Queue, QueueEvent};
use crate::error::QueueError;

const DEFAULT_JOB_COST: f64 = 1.0;
const ADMISSION_POLL_INTERVAL: std::time::Duration = std::time::Duration::from_millis(5);

struct Inner {
    capacity: f64,
    allow_exclusive_jobs: bool,
    runner: JobRunner,
    hub: EventHub,
    paused: Mutex<bool>,
    in_flight_cost: Mutex<f64>,
    exclusive_holder: Mutex<bool>,
    backlog: AtomicUsize,
    in_flight_count: AtomicUsize,
}

pub struct CostQueue {
    name: String,
    inner: Arc<Inner>,
}

impl CostQueue {
    pub fn new(
        name: impl Into<String>,
        capacity: f64,
        allow_exclusive_jobs: bool,
        runner: JobRunner,
    ) -> Arc<Self> {
        Arc::new(Self {
            name: name.into(),
            inner: Arc::new(Inner {
                capacity,
                allow_exclusive_jobs,
                runner,
                hub: EventHub::new(),
                paused: Mutex::new(false),
                in_flight_cost: Mutex::new(0.0),
                exclusive_holder: Mutex::new(false),
                backlog: AtomicUsize::new(0),
                in_flight_count: AtomicUsize::new(0),
            }),
        })
    }

    pub fn allow_exclusive_jobs(&self) -> bool {
        self.inner.allow_exclusive_jobs
    }

    pub fn capacity(&self) -> f64 {
        self.inner.capacity
    }

    /// Try to reserve budget for this job. Returns `Some(is_exclusive)` on
    /// success, `None` if the job cannot be admitted right now.
    fn try_reserve(inner: &Inner, cost: f64) -> Option<bool> {
        let mut held_cost = inner.in_flight_cost.lock();
        let mut holder = inner.exclusive_holder.lock();

        if *holder {
            return None;
        }
        if *held_cost + cost <= inner.capacity {
            *held_cost += cost;
            return Some(false);
        }
        if inner.allow_exclusive_jobs && inner.in_flight_count.load(Ordering::SeqCst) == 0 {
            *held_cost += cost;
            *holder = true;
            return Some(true);
        }
        None
    }

    fn release(inner: &Inner, cost: f64, exclusive: bool) {
        *inner.in_flight_cost.lock() -= cost;
        if exclusive {
            *inner.exclusive_holder.lock() = false;
        }
    }
}

#[async_trait]
impl Queue for CostQueue {
    fn name(&self) -> &str {
        &self.name
    }

    async fn submit(&self, job: Arc<Job>, cost: Option<f64>) -> Result<(), QueueError> {
        if *self.inner.paused.lock() {
            return Err(QueueError::Paused);
        }

        let cost = cost.unwrap_or(DEFAULT_JOB_COST);

        // A job that exceeds capacity can only ever be admitted through
        // exclusive admission; if this queue doesn't offer that, it can
        // never fit, so fail fast instead of spin-polling forever.
        if cost > self.inner.capacity && !self.inner.allow_exclusive_jobs {
            return Err(QueueError::NoCapacity {
                queue: self.name.clone(),
                job_id: job.id,
                cost,
            });
        }

        self.inner.backlog.fetch_add(1, Ordering::SeqCst);
        let inner = self.inner.clone();
        let job_id = job.id;

        tokio::spawn(async move {
            // Admission is a spin-poll against the shared budget rather than
            // a permit queue, since capacity is a float and contention is a
            // handful of tasks, not thousands.
            let exclusive = loop {
                if let Some(exclusive) = Self::try_reserve(&inner, cost) {
                    break exclusive;
                }
                tokio::time::sleep(ADMISSION_POLL_INTERVAL).await;
            };

            inner.backlog.fetch_sub(1, Ordering::SeqCst);
            let now_in_flight = inner.in_flight_count.fetch_add(1, Ordering::SeqCst) + 1;
            if now_in_flight == 1 {
                inner.hub.set_idle(false);
            }

            inner.hub.emit(QueueEvent::Run(job_id));
            let outcome = (inner.runner)(job).await;

            Self::release(&inner, cost, exclusive);
            let remaining = inner.in_flight_count.fetch_sub(1, Ordering::SeqCst) - 1;
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
        if self.inner.capacity <= 0.0 {
            return 1.0;
        }
        (*self.inner.in_flight_cost.lock() / self.inner.capacity).min(1.0)
    }

    fn raw_load(&self) -> f64 {
        *self.inner.in_flight_cost.lock()
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
            std::env::temp_dir().join("cost-queue-test-unused.json"),
            Duration::from_secs(60),
        )
        .await;
        let handle = store.handle_for("Task", "t");
        let logger = ScopedLogger::new(Arc::new(TracingSink), "task.t");
        let task = Task::new("t", "Task", handle, logger);
        Job::new(task, Arc::new(std::collections::HashMap::new()), Vec::new())
    }

    #[tokio::test]
    async fn over_capacity_job_is_rejected_immediately_without_exclusive_admission() {
        let runner: JobRunner = Arc::new(|_job| Box::pin(async move { Ok(()) }));
        let queue = CostQueue::new("q", 2.0, false, runner);
        let job = make_job().await;
        let err = queue.submit(job, Some(5.0)).await.unwrap_err();
        assert!(matches!(err, QueueError::NoCapacity { .. }));
    }

    #[tokio::test]
    async fn over_capacity_job_is_admitted_exclusively_when_queue_allows_it() {
        let runner: JobRunner = Arc::new(|_job| Box::pin(async move { Ok(()) }));
        let queue = CostQueue::new("q", 0.5, true, runner);
        let mut events = queue.subscribe_events();

        let job = make_job().await;
        let job_id = job.id;
        queue.submit(job, Some(4.5)).await.unwrap();

        assert!(matches!(events.recv().await.unwrap(), QueueEvent::Run(id) if id == job_id));
    }

    #[tokio::test]
    async fn budget_allows_concurrent_low_cost_jobs() {
        let runner: JobRunner = Arc::new(|_job| {
            Box::pin(async move {
                tokio::time::sleep(Duration::from_millis(20)).await;
                Ok(())
            })
        });
        let queue = CostQueue::new("q", 2.0, false, runner);
        let mut events = queue.subscribe_events();

        queue.submit(make_job().await, Some(1.0)).await.unwrap();
        queue.submit(make_job().await, Some(1.0)).await.unwrap();

        let mut runs = 0;
        for _ in 0..4 {
            if matches!(events.recv().await.unwrap(), QueueEvent::Run(_)) {
                runs += 1;
            }
        }
        assert_eq!(runs, 2);
    }

    #[tokio::test]
    async fn exclusive_admission_waits_for_the_queue_to_go_idle() {
        let runner: JobRunner = Arc::new(|_job| {
            Box::pin(async move {
                tokio::time::sleep(Duration::from_millis(30)).await;
                Ok(())
            })
        });
        let queue = CostQueue::new("q", 1.0, true, runner);
        let mut events = queue.subscribe_events();

        // First job holds normal budget; second is over-capacity and must
        // wait for the first to finish before it can claim the queue
        // exclusively.
        queue.submit(make_job().await, Some(1.0)).await.unwrap();
        queue.submit(make_job().await, Some(5.0)).await.unwrap();

        let mut runs = Vec::new();
        for _ in 0..4 {
            if let QueueEvent::Run(id) = events.recv().await.unwrap() {
                runs.push(id);
            }
        }
        assert_eq!(runs.len(), 2);
    }
}
