//! C3 (Retry Interval) and C7 (Scheduler Fan-in): the `Schedule` abstraction
//! and its concrete realizations.
//!
//! A `Schedule` is anything that can be asked, repeatedly, "when does this
//! fire next" — a calendar expression, a fixed interval, or a purely manual
//! trigger. The Engine (C8) never talks to a concrete schedule type; it only
//! ever holds a [`ScheduleHandle`], the same type-erased-trait-object
//! pattern the registry (C10/C11) uses for task factories, applied here to
//! schedules instead.

pub mod calendar;
pub mod fanin;
pub mod interval;
pub mod manual;

use std::sync::Arc;

use async_trait::async_trait;

/// The result of waiting for a schedule's next firing (spec.md §4.2/§4.5).
#[derive(Debug, Clone, PartialEq)]
pub enum ScheduleFiring {
    /// It's time to run.
    Next,
    /// The schedule produced an unrecoverable error (e.g. a malformed
    /// calendar expression) and will not fire again.
    Error(String),
    /// The schedule is a bounded event source (spec.md §4.5's "end of a
    /// bounded calendar window") and has no more firings to give.
    Complete,
}

/// Anything the Engine can wait on for "when does this task run next".
///
/// Object-safe so schedules of different concrete types can be stored
/// uniformly as `Arc<dyn Schedule>` in a [`TaskConfig`](crate::config::task_config::TaskConfig).
#[async_trait]
pub trait Schedule: Send + Sync {
    /// Block until the next firing is due (or the schedule errors/completes).
    async fn next_firing(&self) -> ScheduleFiring;
}

pub type ScheduleHandle = Arc<dyn Schedule>;
