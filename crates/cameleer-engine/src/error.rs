//! Error taxonomy (spec §7).
//!
//! Every component-level error enum derives [`thiserror::Error`] and is
//! wrapped, never discarded, as it crosses a boundary: `CannotResolve` at a
//! firing handler, `AttemptResolveArgs`/`AttemptResolveErrConf`/`AttemptFinalFail`
//! at the job, `JobFail` at the queue.

use serde_json::Value;

/// Raised by the Config Resolver (C2).
#[derive(Debug, thiserror::Error, Clone)]
pub enum ConfigError {
    /// A slot could not be shaped into the requested type after invoking
    /// every callable in its chain and awaiting every future.
    #[error("cannot resolve {field}: {reason}")]
    CannotResolve { field: String, reason: String },

    /// Resolution looped through more `Slot::Fn` indirections than
    /// `MAX_RESOLVE_DEPTH` allows (open question Q5, see DESIGN.md).
    #[error("resolution of {field} exceeded max depth {max_depth}")]
    DepthExceeded { field: String, max_depth: u32 },

    /// A callable in the `resolve` bag or elsewhere returned an error.
    #[error("callable for {field} failed: {reason}")]
    CallableFailed { field: String, reason: String },
}

/// Raised by a Run Attempt (C4).
#[derive(Debug, thiserror::Error, Clone)]
pub enum AttemptError {
    /// The step's args producer failed.
    #[error("resolving args for step {step}: {cause}")]
    ResolveArgs { step: String, cause: String },

    /// `canFail` could not be materialized.
    #[error("resolving error config for step {step}: {cause}")]
    ResolveErrConf { step: String, cause: String },

    /// The step failed with no remaining recovery: zero budget, budget
    /// exhausted, recovery schedule errored, or recovery schedule
    /// completed without a successful retry.
    #[error("step {step} failed finally: {cause}")]
    FinalFail { step: String, cause: Value },
}

/// Raised by a Job (C5); the terminal error a queue observes as `failed`.
#[derive(Debug, thiserror::Error, Clone)]
#[error("job {job_id} failed at step {step_index} ({step}): {source}")]
pub struct JobFailError {
    pub job_id: u64,
    pub step_index: usize,
    pub step: String,
    #[source]
    pub source: AttemptError,
}

/// Raised by the Engine (C8) when no queue can be selected for a firing.
#[derive(Debug, thiserror::Error, Clone)]
pub enum QueueSelectionError {
    #[error("no appropriate queue exists for task {task} (cost={cost:?})")]
    NoneAppropriate { task: String, cost: Option<f64> },

    #[error("none of the demanded queues is available for task {task}: {queues:?}")]
    NoneDemanded { task: String, queues: Vec<String> },
}

/// Raised at load time; fatal for the whole engine (duplicate names) or for
/// a single task (invalid config, failed instantiation).
#[derive(Debug, thiserror::Error, Clone)]
pub enum LoadError {
    #[error("task name {0:?} is already loaded")]
    DuplicateName(String),

    #[error("task {task:?} has invalid configuration: {reason}")]
    ConfigInvalid { task: String, reason: String },

    #[error("task {task:?} could not be instantiated: {reason}")]
    InstantiationFailed { task: String, reason: String },

    #[error("unsupported schedule kind for task {task:?}: {kind}")]
    ScheduleUnsupported { task: String, kind: String },

    #[error("at most one default {kind} queue is allowed, found a second named {name:?}")]
    DuplicateDefaultQueue { kind: String, name: String },
}

/// Raised by the registries (C10/C11).
#[derive(Debug, thiserror::Error, Clone)]
pub enum RegistryError {
    #[error("unknown type {name:?} under root {root:?}")]
    UnknownType { root: String, name: String },

    #[error("type {name:?} is already registered under root {root:?}")]
    DuplicateType { root: String, name: String },
}

/// Errors raised by queue admission / submission.
#[derive(Debug, thiserror::Error, Clone)]
pub enum QueueError {
    #[error("queue {queue} has no capacity for job {job_id} (cost={cost})")]
    NoCapacity { queue: String, job_id: u64, cost: f64 },

    #[error("queue is paused")]
    Paused,
}

/// Raised by the static task context store (C9).
#[derive(Debug, thiserror::Error)]
pub enum ContextStoreError {
    #[error("failed to serialize static context: {0}")]
    Serialize(#[source] serde_json::Error),

    #[error("failed to write static context file {path}: {source}")]
    Write {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// Raised by `interruptJob` (spec.md §4.6) when the named job is not
/// currently awaiting submission in an interruption window — it may have
/// already been submitted, already finished, or never existed.
#[derive(Debug, thiserror::Error, Clone)]
#[error("job {0} is not awaiting interruption")]
pub struct InterruptedError(pub u64);

/// Top-level aggregate error, used by the CLI and by engine public methods
/// that span several of the above.
#[derive(Debug, thiserror::Error)]
pub enum CameleerError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Load(#[from] LoadError),
    #[error(transparent)]
    Registry(#[from] RegistryError),
    #[error(transparent)]
    QueueSelection(#[from] QueueSelectionError),
    #[error(transparent)]
    Queue(#[from] QueueError),
    #[error(transparent)]
    ContextStore(#[from] ContextStoreError),
    #[error(transparent)]
    Interrupted(#[from] InterruptedError),
    #[error("unknown command: {0}")]
    UnknownCommand(String),
}
