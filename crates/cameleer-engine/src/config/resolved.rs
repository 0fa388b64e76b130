//! `ResolvedConfig`: the materialized counterpart of a `TaskConfig`, fresh
//! on every firing (spec.md §3, never cached — see L1 for the idempotence
//! property this implies).

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;

use crate::config::task_config::{ArgsProducer, FunctionalTaskErrorConfig, StepBody};
use crate::schedule::ScheduleHandle;

/// A step, fully normalized: bare-callable shorthand has been expanded,
/// and `canFail` has been merged with `CameleerDefaults` (spec.md §4.1).
#[derive(Clone)]
pub struct ResolvedStep {
    pub name: String,
    pub body: StepBody,
    pub args: Option<ArgsProducer>,
    pub error_config: FunctionalTaskErrorConfig,
}

/// The fully materialized configuration for one firing.
#[derive(Clone)]
pub struct ResolvedConfig {
    pub skip: bool,
    pub cost: Option<f64>,
    pub allow_multiple: bool,
    pub queues: Vec<String>,
    pub interrupt_timeout_secs: Option<f64>,
    pub steps: Vec<ResolvedStep>,
    pub resolve_bag: Arc<HashMap<String, Value>>,
    pub schedule: ScheduleHandle,
}
