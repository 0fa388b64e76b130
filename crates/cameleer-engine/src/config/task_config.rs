//! The declarative `TaskConfig` and its nested step/error-policy shapes
//! (spec.md §3).

use std::sync::Arc;

use futures::future::BoxFuture;
use serde_json::Value;

use crate::config::slot::{ResolveCtx, Slot};
use crate::error::ConfigError;
use crate::schedule::ScheduleHandle;

/// A step body: `(args, job) -> Result<Value, String>`. The error type is a
/// plain string/JSON cause, matching spec.md's "preserve the cause"
/// requirement (L2) without requiring every step to share one error type.
pub type StepBody = Arc<
    dyn Fn(Vec<Value>, Arc<crate::job::Job>) -> BoxFuture<'static, Result<Value, Value>>
        + Send
        + Sync,
>;

/// Producer for a step's positional args, invoked fresh on every attempt
/// (regular and every recovery). The job handle is appended as the last
/// argument by the Run Attempt, per spec.md §4.3 step 1 — callers only
/// supply the task-declared arguments here.
pub type ArgsProducer =
    Arc<dyn Fn(ResolveCtx) -> BoxFuture<'static, Result<Vec<Value>, ConfigError>> + Send + Sync>;

/// Producer for a recovery Schedule, invoked once when a step's regular
/// attempt fails and recovery is about to begin.
pub type ScheduleProducer =
    Arc<dyn Fn(ResolveCtx) -> BoxFuture<'static, Result<ScheduleHandle, ConfigError>> + Send + Sync>;

/// The `canFail` policy for one step, fully materialized (post-resolution).
#[derive(Clone)]
pub struct FunctionalTaskErrorConfig {
    pub schedule: Option<ScheduleProducer>,
    pub max_num_fails: u32,
    pub skip: bool,
    pub continue_on_final_fail: bool,
}

impl std::fmt::Debug for FunctionalTaskErrorConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FunctionalTaskErrorConfig")
            .field("schedule", &self.schedule.is_some())
            .field("max_num_fails", &self.max_num_fails)
            .field("skip", &self.skip)
            .field("continue_on_final_fail", &self.continue_on_final_fail)
            .finish()
    }
}

/// Declarative, pre-resolution shorthand for `canFail` (spec.md §3): either
/// the boolean shorthand or the full record.
#[derive(Clone)]
pub enum CanFail {
    /// `false` collapses to `{ maxNumFails: 0, continueOnFinalFail: false }`;
    /// `true` collapses to `{ continueOnFinalFail: true, ..defaults }`
    /// (Q3: the *defaults'* value, merged with any explicit fields — there
    /// are none in the bare-bool shorthand, so this is just the defaults).
    Bool(bool),
    /// A partial record; absent fields are merged from `CameleerDefaults`
    /// (explicit field takes precedence over defaults).
    Config(PartialErrorConfig),
}

impl Default for CanFail {
    fn default() -> Self {
        CanFail::Bool(true)
    }
}

/// A step's explicit `canFail` record before defaults are merged in. Every
/// field is optional; `None` means "use the engine default".
#[derive(Clone, Default)]
pub struct PartialErrorConfig {
    pub schedule: Option<ScheduleProducer>,
    pub max_num_fails: Option<u32>,
    pub skip: Option<bool>,
    pub continue_on_final_fail: Option<bool>,
}

/// One declarative step, either the bare-callable shorthand or the full
/// record (spec.md §3).
#[derive(Clone)]
pub struct StepDef {
    pub name: Option<String>,
    pub body: StepBody,
    pub args: Option<ArgsProducer>,
    pub can_fail: CanFail,
}

impl StepDef {
    /// The bare-callable shorthand: defaults applied everywhere.
    pub fn bare(body: StepBody) -> Self {
        Self {
            name: None,
            body,
            args: None,
            can_fail: CanFail::default(),
        }
    }
}

/// Engine-wide defaults merged into any step whose `canFail` record omits a
/// field (spec.md §4.1).
#[derive(Clone)]
pub struct CameleerDefaults {
    pub default_recovery_schedule: ScheduleProducer,
    pub default_max_num_fails: u32,
    pub default_skip: bool,
    pub default_continue_on_final_fail: bool,
    /// How long static-context writes are debounced before being flushed.
    pub static_task_context_serialize_interval: std::time::Duration,
}

/// The declarative `TaskConfig` (spec.md §3's table), as constructed by a
/// `ConfigProvider`. Every slot is `Slot<T>` so it can be a literal or a
/// callable re-evaluated on load (`schedule`, `enabled`) or per firing
/// (everything else).
#[derive(Clone)]
pub struct TaskConfig {
    pub name: String,
    pub type_name: String,
    pub enabled: Slot<bool>,
    pub schedule: ScheduleHandle,
    pub skip: Option<Slot<bool>>,
    pub cost: Option<Slot<f64>>,
    pub allow_multiple: Option<Slot<bool>>,
    pub queues: Option<Slot<Vec<String>>>,
    pub interrupt_timeout_secs: Option<Slot<f64>>,
    pub steps: Option<Slot<Vec<StepDef>>>,
    pub resolve_bag: Vec<(String, ArgsResolveEntry)>,
}

/// One entry of the `resolve` bag: a literal or a callable producing a
/// JSON value, evaluated in parallel with the rest of the bag before any
/// other slot is resolved (spec.md §4.1).
#[derive(Clone)]
pub enum ArgsResolveEntry {
    Value(Value),
    Fn(Arc<dyn Fn(Arc<dyn crate::task::TaskObject>) -> BoxFuture<'static, Result<Value, ConfigError>> + Send + Sync>),
}
