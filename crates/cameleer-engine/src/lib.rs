//! Cameleer: a single-process task orchestration engine.
//!
//! Declarative [`config::task_config::TaskConfig`]s are resolved afresh on
//! every [`schedule::ScheduleFiring`], admitted onto a [`queue::Queue`]
//! under a cost or parallelism budget, and walked step-by-step by
//! [`attempt::run_step`], with per-task persistent state in
//! [`context_store::StaticContextStore`]. [`engine::Cameleer`] is the single
//! entry point that wires these together; everything else in this crate is
//! usable standalone for testing.

pub mod attempt;
pub mod config;
pub mod context_store;
pub mod engine;
pub mod error;
pub mod job;
pub mod logging;
pub mod queue;
pub mod registry;
pub mod result;
pub mod schedule;
pub mod task;

pub use config::{CameleerDefaults, ResolvedConfig, TaskConfig};
pub use context_store::{StaticContextStore, TaskContextHandle};
pub use engine::{Cameleer, HostHooks, NoopHostHooks, QueueSpec, WorkEvent};
pub use error::CameleerError;
pub use job::Job;
pub use queue::{Queue, QueueHandle};
pub use registry::{ConfigurableClassRegistry, TaskRegistry};
pub use result::StepResult;
pub use schedule::{Schedule, ScheduleFiring, ScheduleHandle};
pub use task::{Task, TaskObject};
