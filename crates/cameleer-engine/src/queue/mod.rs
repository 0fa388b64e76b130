//! C6: the Queue Wrapper — admission and concurrency control in front of
//! job execution.
//!
//! A semaphore gates concurrency, a `broadcast` channel fans run/done/failed
//! events out to every observer, and a `watch` channel exposes idle/busy
//! without polling. Two concrete shapes cover spec.md §4.4/§4.6: a plain
//! concurrency-limited [`parallel::ParallelQueue`] and a budget-aware
//! [`cost::CostQueue`].

pub mod cost;
pub mod parallel;

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{broadcast, watch};

use crate::error::QueueError;
use crate::job::Job;

/// One observable event a queue emits as jobs move through it.
#[derive(Debug, Clone)]
pub enum QueueEvent {
    Run(u64),
    Done(u64),
    Failed(u64, String),
}

const QUEUE_EVENT_CHANNEL_CAPACITY: usize = 1024;

/// What actually runs a job once the queue admits it — the Engine supplies
/// this (a serial walk through the job's resolved steps); the queue itself
/// has no notion of steps.
pub type JobRunner =
    Arc<dyn Fn(Arc<Job>) -> futures::future::BoxFuture<'static, Result<(), crate::error::JobFailError>> + Send + Sync>;

/// Uniform admission surface over either concrete queue kind.
#[async_trait]
pub trait Queue: Send + Sync {
    fn name(&self) -> &str;

    /// Admit a job for execution, subject to this queue's capacity policy.
    /// Returns once the job has been *accepted*; it may still be queued
    /// behind other work before `run_runner` actually invokes it.
    ///
    /// Single-instance-per-task enforcement (I3, spec.md §4.6 step 4) is
    /// the Engine's responsibility, decided before a job ever reaches a
    /// queue — a queue only ever sees a job's `cost`, never a task's
    /// `allowMultiple`.
    async fn submit(&self, job: Arc<Job>, cost: Option<f64>) -> Result<(), QueueError>;

    fn pause(&self);
    fn resume(&self);
    fn is_paused(&self) -> bool;

    /// Jobs accepted but not yet started.
    fn backlog(&self) -> usize;

    /// A queue-defined load figure in `[0, 1]`, for introspection/UI.
    fn load(&self) -> f64;

    /// The raw (unnormalized) in-flight figure the queue-selection
    /// algorithm ranks candidates by (spec.md §4.6: `capabilities /
    /// max(load, 1)` for cost queues, plain ascending `load` for parallel
    /// queues) — a count of running jobs for a parallel queue, or the sum
    /// of in-flight costs for a cost queue.
    fn raw_load(&self) -> f64;

    fn subscribe_events(&self) -> broadcast::Receiver<QueueEvent>;

    /// `true` once emitted on this channel whenever the queue transitions
    /// to/from having zero jobs in flight.
    fn subscribe_idle(&self) -> watch::Receiver<bool>;
}

pub type QueueHandle = Arc<dyn Queue>;

pub(crate) struct EventHub {
    events: broadcast::Sender<QueueEvent>,
    idle_tx: watch::Sender<bool>,
}

impl EventHub {
    pub(crate) fn new() -> Self {
        let (events, _) = broadcast::channel(QUEUE_EVENT_CHANNEL_CAPACITY);
        let (idle_tx, _) = watch::channel(true);
        Self { events, idle_tx }
    }

    pub(crate) fn emit(&self, event: QueueEvent) {
        let _ = self.events.send(event);
    }

    pub(crate) fn set_idle(&self, idle: bool) {
        let _ = self.idle_tx.send_if_modified(|current| {
            if *current != idle {
                *current = idle;
                true
            } else {
                false
            }
        });
    }

    pub(crate) fn subscribe_events(&self) -> broadcast::Receiver<QueueEvent> {
        self.events.subscribe()
    }

    pub(crate) fn subscribe_idle(&self) -> watch::Receiver<bool> {
        self.idle_tx.subscribe()
    }
}
