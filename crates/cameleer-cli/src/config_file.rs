//! The `ConfigProvider` boundary (spec.md §6) and its TOML realization.
//!
//! A config module in the original is a host module exporting
//! `getCameleerConfig()` / `getAllTaskConfigs()` / `getTaskConfig(name)`.
//! A statically-typed binary cannot dynamically load arbitrary task code the
//! way the original imports a JS module, so `ConfigProvider` here is a Rust
//! trait, and `cameleer-cli` ships the one realization of it that needs no
//! custom Rust: a TOML document whose tasks are all the built-in `Shell`
//! task kind from [`crate::shell_task`] (SPEC_FULL.md §4.10).

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use cameleer_engine::config::task_config::{CameleerDefaults, ScheduleProducer, TaskConfig};
use cameleer_engine::engine::QueueSpec;
use cameleer_engine::schedule::calendar::CalendarSchedule;
use cameleer_engine::schedule::interval::IntervalSchedule;
use cameleer_engine::schedule::manual::ManualSchedule;
use cameleer_engine::schedule::ScheduleHandle;
use serde::Deserialize;

use crate::shell_task::{ShellStepConfig, SHELL_TASK_TYPE};

/// What `cameleer-cli` needs from a loaded configuration: engine defaults,
/// the queues to create, and every task to load (spec.md §6: "an instance
/// implementing the ConfigProvider interface").
pub trait ConfigProvider: Send + Sync {
    fn engine_defaults(&self) -> CameleerDefaults;
    fn queue_specs(&self) -> Vec<QueueSpec>;
    fn all_task_configs(&self) -> anyhow::Result<Vec<TaskConfig>>;
    fn task_config(&self, name: &str) -> anyhow::Result<Option<TaskConfig>> {
        Ok(self.all_task_configs()?.into_iter().find(|c| c.name == name))
    }
    /// Path the static task context file should be persisted to.
    fn context_store_path(&self) -> std::path::PathBuf;
}

#[derive(Debug, Deserialize)]
struct RawDocument {
    #[serde(default)]
    engine: RawEngineDefaults,
    #[serde(default)]
    queues: Vec<RawQueue>,
    #[serde(default)]
    task: Vec<RawTask>,
}

#[derive(Debug, Deserialize)]
struct RawEngineDefaults {
    #[serde(default = "default_max_num_fails")]
    default_max_num_fails: u32,
    #[serde(default)]
    default_skip: bool,
    #[serde(default)]
    default_continue_on_final_fail: bool,
    #[serde(default = "default_serialize_interval_ms")]
    static_task_context_serialize_interval_ms: u64,
    #[serde(default = "default_context_path")]
    context_store_path: String,
    /// Period, in milliseconds, of the recovery schedule used when a step's
    /// `canFail` omits an explicit one (spec.md §4.1's default recovery
    /// schedule, C3).
    #[serde(default = "default_recovery_period_ms")]
    default_recovery_period_ms: u64,
    #[serde(default)]
    default_recovery_max_fails: Option<u32>,
}

fn default_max_num_fails() -> u32 {
    0
}
fn default_serialize_interval_ms() -> u64 {
    1000
}
fn default_context_path() -> String {
    "cameleer-context.json".to_string()
}
fn default_recovery_period_ms() -> u64 {
    5000
}

impl Default for RawEngineDefaults {
    fn default() -> Self {
        Self {
            default_max_num_fails: default_max_num_fails(),
            default_skip: false,
            default_continue_on_final_fail: false,
            static_task_context_serialize_interval_ms: default_serialize_interval_ms(),
            context_store_path: default_context_path(),
            default_recovery_period_ms: default_recovery_period_ms(),
            default_recovery_max_fails: None,
        }
    }
}

#[derive(Debug, Deserialize)]
struct RawQueue {
    name: String,
    #[serde(default)]
    default: bool,
    kind: RawQueueKindTag,
    parallelism: Option<usize>,
    capabilities: Option<f64>,
    #[serde(default)]
    allow_exclusive_jobs: bool,
}

#[derive(Debug, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
enum RawQueueKindTag {
    Parallel,
    Cost,
}

enum RawQueueKind {
    Parallel { parallelism: usize },
    Cost { capabilities: f64, allow_exclusive_jobs: bool },
}

impl RawQueue {
    fn kind(&self) -> anyhow::Result<RawQueueKind> {
        match self.kind {
            RawQueueKindTag::Parallel => Ok(RawQueueKind::Parallel {
                parallelism: self
                    .parallelism
                    .ok_or_else(|| anyhow::anyhow!("queue {:?}: parallel queue requires parallelism", self.name))?,
            }),
            RawQueueKindTag::Cost => Ok(RawQueueKind::Cost {
                capabilities: self
                    .capabilities
                    .ok_or_else(|| anyhow::anyhow!("queue {:?}: cost queue requires capabilities", self.name))?,
                allow_exclusive_jobs: self.allow_exclusive_jobs,
            }),
        }
    }
}

#[derive(Debug, Deserialize)]
struct RawTask {
    name: String,
    #[serde(default = "default_true")]
    enabled: bool,
    schedule: RawSchedule,
    #[serde(default)]
    skip: bool,
    cost: Option<f64>,
    #[serde(default)]
    allow_multiple: bool,
    #[serde(default)]
    queues: Vec<String>,
    interrupt_timeout_secs: Option<f64>,
    /// The single step this task runs: a shell command (the only built-in
    /// task kind `cameleer-cli` ships; see [`crate::shell_task`]).
    command: String,
    #[serde(default)]
    args: Vec<String>,
    #[serde(default)]
    can_fail: Option<RawCanFail>,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
enum RawSchedule {
    Manual,
    Interval {
        period_ms: u64,
        #[serde(default)]
        max_fires: Option<u32>,
        #[serde(default)]
        trigger_immediately: bool,
    },
    Cron {
        expr: String,
    },
}

#[derive(Debug, Deserialize)]
struct RawCanFail {
    #[serde(default)]
    disabled: bool,
    max_num_fails: Option<u32>,
    #[serde(default)]
    skip: Option<bool>,
    #[serde(default)]
    continue_on_final_fail: Option<bool>,
}

/// A `ConfigProvider` backed by a single TOML document (spec.md §6's
/// "configuration file" boundary, §4.10's `ConfigProvider` realization).
pub struct TomlConfigProvider {
    defaults: CameleerDefaults,
    queue_specs: Vec<RawQueue>,
    tasks: Vec<RawTask>,
    context_store_path: std::path::PathBuf,
}

impl TomlConfigProvider {
    pub fn from_path(path: &Path) -> anyhow::Result<Self> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("reading config file {}: {e}", path.display()))?;
        Self::from_str(&text)
    }

    pub fn from_str(text: &str) -> anyhow::Result<Self> {
        let doc: RawDocument = toml::from_str(text)
            .map_err(|e| anyhow::anyhow!("parsing config file: {e}"))?;

        for q in &doc.queues {
            q.kind()?;
        }

        let recovery_period = Duration::from_millis(doc.engine.default_recovery_period_ms);
        let recovery_max_fails = doc.engine.default_recovery_max_fails;
        let default_recovery_schedule: ScheduleProducer = Arc::new(move |_ctx| {
            Box::pin(async move {
                Ok(IntervalSchedule::new(recovery_period, recovery_max_fails, false).handle())
            })
        });

        let defaults = CameleerDefaults {
            default_recovery_schedule,
            default_max_num_fails: doc.engine.default_max_num_fails,
            default_skip: doc.engine.default_skip,
            default_continue_on_final_fail: doc.engine.default_continue_on_final_fail,
            static_task_context_serialize_interval: Duration::from_millis(
                doc.engine.static_task_context_serialize_interval_ms,
            ),
        };

        Ok(Self {
            defaults,
            queue_specs: doc.queues,
            tasks: doc.task,
            context_store_path: doc.engine.context_store_path.into(),
        })
    }
}

fn build_schedule(raw: &RawSchedule) -> anyhow::Result<ScheduleHandle> {
    Ok(match raw {
        RawSchedule::Manual => ManualSchedule::new().handle(),
        RawSchedule::Interval { period_ms, max_fires, trigger_immediately } => {
            IntervalSchedule::new(Duration::from_millis(*period_ms), *max_fires, *trigger_immediately).handle()
        }
        RawSchedule::Cron { expr } => CalendarSchedule::parse(expr, None)?.handle(),
    })
}

impl ConfigProvider for TomlConfigProvider {
    fn engine_defaults(&self) -> CameleerDefaults {
        self.defaults.clone()
    }

    fn queue_specs(&self) -> Vec<QueueSpec> {
        self.queue_specs
            .iter()
            .filter_map(|q| match q.kind() {
                Ok(RawQueueKind::Parallel { parallelism }) => Some(QueueSpec::Parallel {
                    name: q.name.clone(),
                    parallelism,
                    default: q.default,
                }),
                Ok(RawQueueKind::Cost { capabilities, allow_exclusive_jobs }) => Some(QueueSpec::Cost {
                    name: q.name.clone(),
                    capabilities,
                    allow_exclusive_jobs,
                    default: q.default,
                }),
                // A malformed queue entry (missing its kind-specific field)
                // is caught up front by `TomlConfigProvider::from_str`'s
                // validation pass, not here; this fallback only protects
                // against a future caller skipping that pass.
                Err(_) => None,
            })
            .collect()
    }

    fn all_task_configs(&self) -> anyhow::Result<Vec<TaskConfig>> {
        let mut seen = HashMap::new();
        let mut out = Vec::with_capacity(self.tasks.len());
        for raw in &self.tasks {
            if seen.insert(raw.name.clone(), ()).is_some() {
                anyhow::bail!("duplicate task name in config file: {:?}", raw.name);
            }
            let schedule = build_schedule(&raw.schedule)?;
            let step = ShellStepConfig {
                command: raw.command.clone(),
                args: raw.args.clone(),
                can_fail: raw.can_fail.as_ref().map(|c| crate::shell_task::RawCanFailShape {
                    disabled: c.disabled,
                    max_num_fails: c.max_num_fails,
                    skip: c.skip,
                    continue_on_final_fail: c.continue_on_final_fail,
                }),
            };

            out.push(TaskConfig {
                name: raw.name.clone(),
                type_name: SHELL_TASK_TYPE.to_string(),
                enabled: cameleer_engine::config::slot::Slot::value(raw.enabled),
                schedule,
                skip: Some(cameleer_engine::config::slot::Slot::value(raw.skip)),
                cost: raw.cost.map(cameleer_engine::config::slot::Slot::value),
                allow_multiple: Some(cameleer_engine::config::slot::Slot::value(raw.allow_multiple)),
                queues: Some(cameleer_engine::config::slot::Slot::value(raw.queues.clone())),
                interrupt_timeout_secs: raw
                    .interrupt_timeout_secs
                    .map(cameleer_engine::config::slot::Slot::value),
                steps: Some(cameleer_engine::config::slot::Slot::value(vec![step.into_step_def()])),
                resolve_bag: Vec::new(),
            });
        }
        Ok(out)
    }

    fn context_store_path(&self) -> std::path::PathBuf {
        self.context_store_path.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
        [engine]
        context_store_path = "/tmp/does-not-matter.json"

        [[queues]]
        name = "default"
        kind = "parallel"
        parallelism = 4
        default = true

        [[task]]
        name = "ping"
        command = "true"
        [task.schedule]
        kind = "manual"
    "#;

    #[test]
    fn parses_a_minimal_document() {
        let provider = TomlConfigProvider::from_str(SAMPLE).unwrap();
        let queues = provider.queue_specs();
        assert_eq!(queues.len(), 1);
        let tasks = provider.all_task_configs().unwrap();
        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0].name, "ping");
    }

    #[test]
    fn duplicate_task_names_are_rejected_at_parse_time() {
        let doc = format!("{SAMPLE}\n[[task]]\nname = \"ping\"\ncommand = \"true\"\n[task.schedule]\nkind = \"manual\"\n");
        let provider = TomlConfigProvider::from_str(&doc).unwrap();
        assert!(provider.all_task_configs().is_err());
    }
}
