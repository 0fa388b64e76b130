//! C8: the Cameleer Engine — ties the config resolver, scheduler fan-in,
//! queues, registries, and static context store into one running
//! orchestrator.
//!
//! A struct that owns every other subsystem behind `Arc`s, exposes a small
//! lifecycle surface (start/pause/shutdown), and logs every transition
//! through scoped loggers rather than bare `println!`. The per-task firing
//! handler is one background task per subscription, torn down by aborting
//! its `JoinHandle` rather than a cooperative cancellation flag.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use futures::stream::{Stream, StreamExt};
use parking_lot::{Mutex as SyncMutex, RwLock};
use tokio::sync::{broadcast, oneshot, Mutex as AsyncMutex, Notify};
use tokio::task::JoinHandle;
use tokio_stream::wrappers::BroadcastStream;

use crate::config::{self, CameleerDefaults, ResolveCtx, TaskConfig};
use crate::context_store::StaticContextStore;
use crate::error::{InterruptedError, LoadError, QueueSelectionError};
use crate::job::Job;
use crate::logging::{LogSink, ScopedLogger};
use crate::queue::cost::CostQueue;
use crate::queue::parallel::ParallelQueue;
use crate::queue::{JobRunner, Queue, QueueEvent, QueueHandle};
use crate::registry::{ConfigurableClassRegistry, TaskRegistry, BASE_TASK_TYPE};
use crate::schedule::fanin::SchedulerFanIn;
use crate::schedule::ScheduleFiring;
use crate::task::{Task, TaskObject};

const WORK_EVENT_CHANNEL_CAPACITY: usize = 4096;

/// Declarative queue shape, supplied once at [`Cameleer::new`] (spec.md §4.4).
pub enum QueueSpec {
    Parallel {
        name: String,
        parallelism: usize,
        default: bool,
    },
    Cost {
        name: String,
        capabilities: f64,
        allow_exclusive_jobs: bool,
        default: bool,
    },
}

struct QueueEntry {
    queue: QueueHandle,
    name: String,
    is_cost: bool,
    is_default: bool,
    /// `Some` only for cost queues; unused for parallel queues, whose
    /// appropriateness and ranking never consult capacity.
    capabilities: Option<f64>,
    allow_exclusive_jobs: bool,
}

/// One `(kind, task, job?)` transition on the work stream (spec.md §6: "each
/// job surfaces as one of {scheduled, interruptable, run, done, failed}
/// events on the work stream").
#[derive(Debug, Clone)]
pub enum WorkEvent {
    Scheduled { task: String },
    Interruptable { task: String, job_id: u64 },
    Run { task: String, job_id: u64 },
    Done { task: String, job_id: u64 },
    Failed { task: String, job_id: u64, reason: String },
}

impl WorkEvent {
    fn task_name(&self) -> &str {
        match self {
            WorkEvent::Scheduled { task }
            | WorkEvent::Interruptable { task, .. }
            | WorkEvent::Run { task, .. }
            | WorkEvent::Done { task, .. }
            | WorkEvent::Failed { task, .. } => task,
        }
    }
}

/// Whether a task currently has a job enqueued or running (I3).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TaskRunState {
    Idle,
    Busy,
}

struct LoadedTask {
    config: TaskConfig,
    task: Arc<dyn TaskObject>,
    state: SyncMutex<TaskRunState>,
}

/// Optional process-global wiring for uncaught failures (spec.md §4.6:
/// "global failure handlers"). The engine core never touches real process
/// globals directly — only through this trait — so it stays unit-testable
/// without a real process (the REDESIGN FLAGS note this section expands on).
pub trait HostHooks: Send + Sync {
    fn install(&self, logger: &ScopedLogger);
    fn remove(&self, logger: &ScopedLogger);
}

/// The default: no process-global wiring at all.
pub struct NoopHostHooks;

impl HostHooks for NoopHostHooks {
    fn install(&self, _logger: &ScopedLogger) {}
    fn remove(&self, _logger: &ScopedLogger) {}
}

fn job_runner() -> JobRunner {
    Arc::new(|job: Arc<Job>| Box::pin(async move { job.run_all().await }))
}

/// The engine. Every public method takes `&Arc<Self>` where it needs to hand
/// a clone to a spawned task.
pub struct Cameleer {
    defaults: CameleerDefaults,
    classes: Arc<ConfigurableClassRegistry>,
    task_registry: TaskRegistry,
    queues: Vec<Arc<QueueEntry>>,
    fanin: Arc<SchedulerFanIn>,
    context_store: Arc<StaticContextStore>,
    logger_sink: Arc<dyn LogSink>,
    engine_logger: ScopedLogger,
    tasks: RwLock<HashMap<String, Arc<LoadedTask>>>,
    firing_handlers: AsyncMutex<HashMap<String, JoinHandle<()>>>,
    work_events: broadcast::Sender<WorkEvent>,
    interrupts: SyncMutex<HashMap<u64, oneshot::Sender<()>>>,
    keep_alive: AsyncMutex<Option<JoinHandle<()>>>,
    host_hooks: Option<Arc<dyn HostHooks>>,
    shutdown_notify: Notify,
}

impl Cameleer {
    pub async fn new(
        queue_specs: Vec<QueueSpec>,
        defaults: CameleerDefaults,
        context_store_path: impl Into<std::path::PathBuf>,
        logger_sink: Arc<dyn LogSink>,
        host_hooks: Option<Arc<dyn HostHooks>>,
    ) -> Result<Arc<Self>, LoadError> {
        let classes = ConfigurableClassRegistry::new();
        let task_registry = TaskRegistry::new(classes.clone());

        let context_store = StaticContextStore::load(
            context_store_path,
            defaults.static_task_context_serialize_interval,
        )
        .await;

        let (work_events, _) = broadcast::channel(WORK_EVENT_CHANNEL_CAPACITY);
        let engine_logger = ScopedLogger::new(logger_sink.clone(), "engine");

        let mut queues = Vec::new();
        let mut default_parallel: Option<String> = None;
        let mut default_cost: Option<String> = None;

        for spec in queue_specs {
            let entry = match spec {
                QueueSpec::Parallel { name, parallelism, default } => {
                    if default {
                        if let Some(existing) = default_parallel.replace(name.clone()) {
                            return Err(LoadError::DuplicateDefaultQueue {
                                kind: "parallel".to_string(),
                                name: format!("{existing} and {name}"),
                            });
                        }
                    }
                    let queue: QueueHandle = ParallelQueue::new(name.clone(), parallelism, job_runner());
                    QueueEntry {
                        queue,
                        name,
                        is_cost: false,
                        is_default: default,
                        capabilities: None,
                        allow_exclusive_jobs: false,
                    }
                }
                QueueSpec::Cost { name, capabilities, allow_exclusive_jobs, default } => {
                    if default {
                        if let Some(existing) = default_cost.replace(name.clone()) {
                            return Err(LoadError::DuplicateDefaultQueue {
                                kind: "cost".to_string(),
                                name: format!("{existing} and {name}"),
                            });
                        }
                    }
                    let queue: QueueHandle =
                        CostQueue::new(name.clone(), capabilities, allow_exclusive_jobs, job_runner());
                    QueueEntry {
                        queue,
                        name,
                        is_cost: true,
                        is_default: default,
                        capabilities: Some(capabilities),
                        allow_exclusive_jobs,
                    }
                }
            };
            queues.push(Arc::new(entry));
        }

        Ok(Arc::new(Self {
            defaults,
            classes,
            task_registry,
            queues,
            fanin: SchedulerFanIn::new(),
            context_store,
            logger_sink,
            engine_logger,
            tasks: RwLock::new(HashMap::new()),
            firing_handlers: AsyncMutex::new(HashMap::new()),
            work_events,
            interrupts: SyncMutex::new(HashMap::new()),
            keep_alive: AsyncMutex::new(None),
            host_hooks,
            shutdown_notify: Notify::new(),
        }))
    }

    pub fn classes(&self) -> &Arc<ConfigurableClassRegistry> {
        &self.classes
    }

    pub fn task_registry(&self) -> &TaskRegistry {
        &self.task_registry
    }

    // ---- loadTasks --------------------------------------------------

    /// Load a batch of task configs (precondition: no tasks currently
    /// loaded into names already present — spec.md §4.6's `loadTasks`).
    /// Validates names up front so a duplicate fails the whole batch before
    /// any task is registered (I1).
    pub async fn load_tasks(self: &Arc<Self>, configs: Vec<TaskConfig>) -> Result<(), LoadError> {
        let mut seen = HashSet::new();
        for config in &configs {
            if !seen.insert(config.name.clone()) || self.tasks.read().contains_key(&config.name) {
                return Err(LoadError::DuplicateName(config.name.clone()));
            }
            if config.type_name != BASE_TASK_TYPE && !self.task_registry.resolves(&config.type_name) {
                return Err(LoadError::InstantiationFailed {
                    task: config.name.clone(),
                    reason: format!("unregistered task type {:?}", config.type_name),
                });
            }
        }

        for config in configs {
            let context = self.context_store.handle_for(&config.type_name, &config.name);
            let logger = ScopedLogger::new(self.logger_sink.clone(), format!("task.{}", config.name));
            let task: Arc<dyn TaskObject> =
                Task::new(config.name.clone(), config.type_name.clone(), context, logger);

            // I2: `enabled` is resolved exactly once, here, at load.
            let enabled_ctx = ResolveCtx {
                resolve_bag: Arc::new(HashMap::new()),
                task: task.clone(),
            };
            let enabled = config::resolve_slot(&config.enabled, &enabled_ctx, "enabled")
                .await
                .map_err(|e| LoadError::ConfigInvalid {
                    task: config.name.clone(),
                    reason: e.to_string(),
                })?;

            if !enabled {
                task.logger().info("task disabled (enabled=false); not loaded");
                continue;
            }

            let schedule = config.schedule.clone();
            let name = config.name.clone();
            let loaded = Arc::new(LoadedTask {
                config,
                task,
                state: SyncMutex::new(TaskRunState::Idle),
            });

            self.tasks.write().insert(name.clone(), loaded);
            self.fanin.add_schedule(name.clone(), schedule);
            let handle = self.spawn_firing_handler(name.clone());
            self.firing_handlers.lock().await.insert(name, handle);
        }

        Ok(())
    }

    fn spawn_firing_handler(self: &Arc<Self>, task_name: String) -> JoinHandle<()> {
        let engine = self.clone();
        tokio::spawn(async move {
            let mut firings = Box::pin(engine.fanin.observable_for_schedule(&task_name));
            while let Some(firing) = firings.next().await {
                match firing {
                    // Step 1 (spec.md §4.6): discard a firing representing
                    // the end of a ranged calendar event. None of this
                    // crate's `Schedule` impls model ranged events (only
                    // point-in-time firings), so this is presently a no-op
                    // guard kept for a future ranged-calendar schedule.
                    ScheduleFiring::Next => engine.process_firing(&task_name).await,
                    ScheduleFiring::Complete => {
                        engine
                            .engine_logger
                            .nested(format!("task.{task_name}"))
                            .info("schedule complete; no further firings");
                        break;
                    }
                    ScheduleFiring::Error(msg) => {
                        engine
                            .engine_logger
                            .nested(format!("task.{task_name}"))
                            .error(format!("schedule errored: {msg}"));
                        break;
                    }
                }
            }
        })
    }

    /// The 8-step firing algorithm (spec.md §4.6).
    async fn process_firing(self: &Arc<Self>, task_name: &str) {
        let loaded = match self.tasks.read().get(task_name).cloned() {
            Some(t) => t,
            None => return,
        };

        let resolved = match config::resolve(&loaded.config, &self.defaults, loaded.task.clone()).await {
            Ok(r) => r,
            Err(e) => {
                loaded.task.logger().warn(format!("config resolution failed: {e}"));
                return;
            }
        };

        if resolved.skip {
            loaded.task.logger().debug("firing skipped (skip=true)");
            return;
        }

        {
            let mut state = loaded.state.lock();
            if !resolved.allow_multiple && *state == TaskRunState::Busy {
                loaded
                    .task
                    .logger()
                    .debug("firing discarded: a prior job is still enqueued or running (I3)");
                return;
            }
            *state = TaskRunState::Busy;
        }

        let job = Job::new(loaded.task.clone(), resolved.resolve_bag.clone(), resolved.steps.clone());
        let _ = self.work_events.send(WorkEvent::Scheduled { task: task_name.to_string() });

        if let Some(secs) = resolved.interrupt_timeout_secs {
            if self.race_interruption_window(task_name, &job, secs).await {
                loaded.task.logger().info(format!("job {} interrupted before submission", job.id));
                self.release_busy(&loaded);
                return;
            }
        }

        let queue_entry = match self.select_queue(task_name, resolved.cost, &resolved.queues) {
            Ok(q) => q,
            Err(e) => {
                loaded.task.logger().error(format!("queue selection failed: {e}"));
                self.release_busy(&loaded);
                return;
            }
        };

        self.spawn_queue_listener(task_name.to_string(), job.id, queue_entry.clone(), loaded.clone());

        if let Err(e) = queue_entry.queue.submit(job.clone(), resolved.cost).await {
            loaded.task.logger().error(format!("submission failed: {e}"));
            self.release_busy(&loaded);
        }
    }

    /// Publish the "interruptable" event and race an external
    /// `interrupt_job` call against a `secs`-second timer. Returns `true` if
    /// interrupted.
    async fn race_interruption_window(self: &Arc<Self>, task_name: &str, job: &Arc<Job>, secs: f64) -> bool {
        let (tx, rx) = oneshot::channel();
        self.interrupts.lock().insert(job.id, tx);
        let _ = self
            .work_events
            .send(WorkEvent::Interruptable { task: task_name.to_string(), job_id: job.id });

        let timeout = tokio::time::sleep(std::time::Duration::from_secs_f64(secs.max(0.0)));
        tokio::pin!(timeout);
        let interrupted = tokio::select! {
            _ = rx => true,
            _ = &mut timeout => false,
        };
        self.interrupts.lock().remove(&job.id);
        interrupted
    }

    fn release_busy(&self, loaded: &Arc<LoadedTask>) {
        *loaded.state.lock() = TaskRunState::Idle;
    }

    /// Subscribe once to the chosen queue's run/done/failed events for this
    /// job (spec.md §4.6 step 7), republishing each as a [`WorkEvent`] and
    /// releasing I3's busy mark on the mutually-exclusive terminal event.
    fn spawn_queue_listener(
        self: &Arc<Self>,
        task_name: String,
        job_id: u64,
        entry: Arc<QueueEntry>,
        loaded: Arc<LoadedTask>,
    ) {
        let engine = self.clone();
        tokio::spawn(async move {
            let mut events = entry.queue.subscribe_events();
            loop {
                match events.recv().await {
                    Ok(QueueEvent::Run(id)) if id == job_id => {
                        let _ = engine
                            .work_events
                            .send(WorkEvent::Run { task: task_name.clone(), job_id });
                    }
                    Ok(QueueEvent::Done(id)) if id == job_id => {
                        let _ = engine
                            .work_events
                            .send(WorkEvent::Done { task: task_name.clone(), job_id });
                        engine.release_busy(&loaded);
                        break;
                    }
                    Ok(QueueEvent::Failed(id, reason)) if id == job_id => {
                        let _ = engine
                            .work_events
                            .send(WorkEvent::Failed { task: task_name.clone(), job_id, reason });
                        engine.release_busy(&loaded);
                        break;
                    }
                    Ok(_) => continue,
                    Err(broadcast::error::RecvError::Lagged(_)) => continue,
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });
    }

    // ---- queue selection ---------------------------------------------

    /// spec.md §4.6's queue-selection algorithm. Ties are broken by
    /// configuration order (I8): candidates are scanned in the order they
    /// were passed to [`Cameleer::new`], and a later candidate only replaces
    /// the current best on a strict improvement.
    fn select_queue(
        &self,
        task_name: &str,
        cost: Option<f64>,
        allowed: &[String],
    ) -> Result<Arc<QueueEntry>, QueueSelectionError> {
        let is_cost = cost.is_some();

        let appropriate: Vec<&Arc<QueueEntry>> = self
            .queues
            .iter()
            .filter(|q| {
                if is_cost {
                    let cost = cost.expect("is_cost implies cost is Some");
                    q.is_cost && (cost <= q.capabilities.unwrap_or(0.0) || q.allow_exclusive_jobs)
                } else {
                    !q.is_cost
                }
            })
            .collect();

        if appropriate.is_empty() {
            return Err(QueueSelectionError::NoneAppropriate { task: task_name.to_string(), cost });
        }

        let candidates: Vec<&Arc<QueueEntry>> = if allowed.is_empty() {
            if let Some(default_entry) = appropriate.iter().find(|q| q.is_default) {
                return Ok((*default_entry).clone());
            }
            appropriate
        } else {
            let restricted: Vec<&Arc<QueueEntry>> = appropriate
                .into_iter()
                .filter(|q| allowed.iter().any(|name| name == &q.name))
                .collect();
            if restricted.is_empty() {
                return Err(QueueSelectionError::NoneDemanded {
                    task: task_name.to_string(),
                    queues: allowed.to_vec(),
                });
            }
            restricted
        };

        let mut candidates = candidates.into_iter();
        let mut best = candidates.next().expect("checked non-empty above");
        let mut best_score = Self::rank_score(best, is_cost);

        for candidate in candidates {
            let score = Self::rank_score(candidate, is_cost);
            // Cost case: higher capabilities/load ratio wins. Parallel case:
            // lower load wins. Strict comparison preserves config-order on ties.
            let better = if is_cost { score > best_score } else { score < best_score };
            if better {
                best = candidate;
                best_score = score;
            }
        }

        Ok(best.clone())
    }

    fn rank_score(entry: &Arc<QueueEntry>, is_cost: bool) -> f64 {
        if is_cost {
            entry.capabilities.unwrap_or(0.0) / entry.queue.raw_load().max(1.0)
        } else {
            entry.queue.raw_load()
        }
    }

    // ---- lifecycle ----------------------------------------------------

    /// `run`: resume every queue and (re)arm the keep-alive timer. Idempotent.
    pub fn run(self: &Arc<Self>) {
        for entry in &self.queues {
            entry.queue.resume();
        }
        self.rearm_keep_alive();
        if let Some(hooks) = &self.host_hooks {
            hooks.install(&self.engine_logger);
        }
    }

    /// `runAsync`: run, then resolve once `shutdown` completes.
    pub async fn run_async(self: &Arc<Self>) {
        self.run();
        self.shutdown_notify.notified().await;
    }

    /// `pause`: pause every queue; jobs already running continue to completion.
    pub fn pause(&self) {
        for entry in &self.queues {
            entry.queue.pause();
        }
    }

    /// `pauseWait`: pause, then await idle on every queue.
    pub async fn pause_wait(&self) {
        self.pause();
        for entry in &self.queues {
            let mut idle = entry.queue.subscribe_idle();
            while !*idle.borrow() {
                if idle.changed().await.is_err() {
                    break;
                }
            }
        }
    }

    /// `clearTasks`: remove every task's schedule and tear down its firing
    /// handler; safe to call while queues are paused.
    ///
    /// This crate's queue primitives never buffer a cancelable backlog — a
    /// job that has been accepted by `submit` always runs to completion —
    /// so there is no separate "clear backlog" step beyond tearing the
    /// tasks down (see DESIGN.md).
    pub async fn clear_tasks(self: &Arc<Self>) {
        let names: Vec<String> = self.tasks.read().keys().cloned().collect();
        for name in names {
            self.fanin.remove_schedule(&name);
            if let Some(handle) = self.firing_handlers.lock().await.remove(&name) {
                handle.abort();
            }
            self.tasks.write().remove(&name);
        }
        self.interrupts.lock().clear();
    }

    /// `shutdown`: pauseWait, clearTasks, teardown, persist context, emit
    /// shutdown, unblock any `run_async` caller. Single-shot.
    pub async fn shutdown(self: &Arc<Self>) {
        self.pause_wait().await;
        self.clear_tasks().await;

        if let Some(handle) = self.keep_alive.lock().await.take() {
            handle.abort();
        }
        if let Some(hooks) = &self.host_hooks {
            hooks.remove(&self.engine_logger);
        }

        let _ = self.context_store.shutdown().await;
        self.engine_logger.info("shutdown complete");
        self.shutdown_notify.notify_one();
    }

    /// `interruptJob`: cancel a job's submission while it is still in its
    /// interruption window. Fails if the job is not currently awaiting one.
    pub fn interrupt_job(&self, job_id: u64) -> Result<(), InterruptedError> {
        match self.interrupts.lock().remove(&job_id) {
            Some(tx) => {
                let _ = tx.send(());
                Ok(())
            }
            None => Err(InterruptedError(job_id)),
        }
    }

    /// `getLogger(typeTag)`: a logger configured from the engine's logging
    /// policy, scoped to `typeTag`.
    pub fn get_logger(&self, type_tag: &str) -> ScopedLogger {
        ScopedLogger::new(self.logger_sink.clone(), format!("task.{type_tag}"))
    }

    /// `getObservableForWork(task)`: the work-event stream filtered to one task.
    pub fn get_observable_for_work(&self, task_name: &str) -> impl Stream<Item = WorkEvent> {
        let task_name = task_name.to_string();
        BroadcastStream::new(self.work_events.subscribe())
            .filter_map(|r| async move { r.ok() })
            .filter(move |event| {
                let matches = event.task_name() == task_name;
                async move { matches }
            })
    }

    /// The unfiltered work-event stream, for a manager/UI plug-in that wants
    /// every task's events (spec.md §1's "manager plug-in surface").
    pub fn observe_work(&self) -> impl Stream<Item = WorkEvent> {
        BroadcastStream::new(self.work_events.subscribe()).filter_map(|r| async move { r.ok() })
    }

    fn rearm_keep_alive(self: &Arc<Self>) {
        let Ok(mut guard) = self.keep_alive.try_lock() else {
            return;
        };
        if let Some(old) = guard.take() {
            old.abort();
        }
        let engine = self.clone();
        *guard = Some(tokio::spawn(async move {
            engine.keep_alive_loop().await;
        }));
    }

    /// A single timer armed for the next local-midnight boundary; on fire it
    /// logs a day marker and rearms (spec.md §4.6). Its only purpose is to
    /// keep the host runtime alive while the engine otherwise has nothing to
    /// await.
    async fn keep_alive_loop(self: Arc<Self>) {
        loop {
            let now = chrono::Utc::now();
            let next_midnight = (now + chrono::Duration::days(1))
                .date_naive()
                .and_hms_opt(0, 0, 0)
                .expect("midnight is always a valid time")
                .and_utc();
            let wait = (next_midnight - now)
                .to_std()
                .unwrap_or(std::time::Duration::from_secs(1));
            tokio::time::sleep(wait).await;
            self.engine_logger.info("keep-alive day marker");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::task_config::{ArgsResolveEntry, StepDef};
    use crate::config::slot::Slot;
    use crate::logging::{CollectingSink, TracingSink};
    use crate::schedule::manual::ManualSchedule;
    use serde_json::json;
    use std::time::Duration;

    fn defaults() -> CameleerDefaults {
        CameleerDefaults {
            default_recovery_schedule: Arc::new(|_ctx| {
                Box::pin(async move { Ok(ManualSchedule::new().handle()) })
            }),
            default_max_num_fails: 0,
            default_skip: false,
            default_continue_on_final_fail: false,
            static_task_context_serialize_interval: Duration::from_millis(200),
        }
    }

    fn bare_config(name: &str, schedule: crate::schedule::ScheduleHandle, body: crate::config::task_config::StepBody) -> TaskConfig {
        TaskConfig {
            name: name.to_string(),
            type_name: BASE_TASK_TYPE.to_string(),
            enabled: Slot::value(true),
            schedule,
            skip: None,
            cost: None,
            allow_multiple: None,
            queues: None,
            interrupt_timeout_secs: None,
            steps: Some(Slot::value(vec![StepDef::bare(body)])),
            resolve_bag: Vec::<(String, ArgsResolveEntry)>::new(),
        }
    }

    async fn temp_context_path(tag: &str) -> std::path::PathBuf {
        std::env::temp_dir().join(format!("cameleer-engine-test-{tag}-{}.json", std::process::id()))
    }

    #[tokio::test]
    async fn happy_path_runs_a_step_and_emits_work_events() {
        let path = temp_context_path("happy").await;
        let engine = Cameleer::new(
            vec![QueueSpec::Parallel { name: "default".into(), parallelism: 2, default: true }],
            defaults(),
            &path,
            Arc::new(TracingSink),
            None,
        )
        .await
        .unwrap();

        let manual = ManualSchedule::new();
        let body: crate::config::task_config::StepBody =
            Arc::new(|_args, _job| Box::pin(async move { Ok(json!("done")) }));
        let config = bare_config("t1", manual.handle(), body);

        let mut events = engine.get_observable_for_work("t1");
        engine.load_tasks(vec![config]).await.unwrap();
        engine.run();

        manual.trigger();

        let scheduled = events.next().await.unwrap();
        assert!(matches!(scheduled, WorkEvent::Scheduled { .. }));
        let run = events.next().await.unwrap();
        assert!(matches!(run, WorkEvent::Run { .. }));
        let done = events.next().await.unwrap();
        assert!(matches!(done, WorkEvent::Done { .. }));

        engine.shutdown().await;
        let _ = tokio::fs::remove_file(&path).await;
    }

    #[tokio::test]
    async fn duplicate_task_name_is_rejected() {
        let path = temp_context_path("dup").await;
        let engine = Cameleer::new(
            vec![QueueSpec::Parallel { name: "default".into(), parallelism: 1, default: true }],
            defaults(),
            &path,
            Arc::new(TracingSink),
            None,
        )
        .await
        .unwrap();

        let manual = ManualSchedule::new();
        let body: crate::config::task_config::StepBody =
            Arc::new(|_args, _job| Box::pin(async move { Ok(json!(1)) }));

        let err = engine
            .load_tasks(vec![
                bare_config("same", manual.handle(), body.clone()),
                bare_config("same", manual.handle(), body),
            ])
            .await
            .unwrap_err();
        assert!(matches!(err, LoadError::DuplicateName(_)));
        let _ = tokio::fs::remove_file(&path).await;
    }

    #[tokio::test]
    async fn duplicate_default_queue_of_the_same_kind_is_rejected() {
        let path = temp_context_path("dupq").await;
        let err = Cameleer::new(
            vec![
                QueueSpec::Parallel { name: "a".into(), parallelism: 1, default: true },
                QueueSpec::Parallel { name: "b".into(), parallelism: 1, default: true },
            ],
            defaults(),
            &path,
            Arc::new(TracingSink),
            None,
        )
        .await
        .unwrap_err();
        assert!(matches!(err, LoadError::DuplicateDefaultQueue { .. }));
    }

    #[tokio::test]
    async fn single_instance_enforcement_discards_overlapping_firing() {
        let path = temp_context_path("i3").await;
        let engine = Cameleer::new(
            vec![QueueSpec::Parallel { name: "default".into(), parallelism: 2, default: true }],
            defaults(),
            &path,
            Arc::new(TracingSink),
            None,
        )
        .await
        .unwrap();

        let manual = ManualSchedule::new();
        let gate = Arc::new(tokio::sync::Notify::new());
        let gate_for_body = gate.clone();
        let body: crate::config::task_config::StepBody = Arc::new(move |_args, _job| {
            let gate = gate_for_body.clone();
            Box::pin(async move {
                gate.notified().await;
                Ok(json!("finally"))
            })
        });
        let config = bare_config("slow", manual.handle(), body);

        let mut events = engine.get_observable_for_work("slow");
        engine.load_tasks(vec![config]).await.unwrap();
        engine.run();

        manual.trigger();
        assert!(matches!(events.next().await.unwrap(), WorkEvent::Scheduled { .. }));
        assert!(matches!(events.next().await.unwrap(), WorkEvent::Run { .. }));

        // A second firing while the first job is still running must be
        // discarded (I3): no further Scheduled/Run event should surface for
        // it before we let the first job finish.
        manual.trigger();
        tokio::time::sleep(Duration::from_millis(20)).await;

        gate.notify_one();
        let done = events.next().await.unwrap();
        assert!(matches!(done, WorkEvent::Done { .. }));

        engine.shutdown().await;
        let _ = tokio::fs::remove_file(&path).await;
    }

    #[tokio::test]
    async fn cost_queue_admission_scenario() {
        // spec.md §8 scenario 7: costs 1.1/2.1/4.5 across parallel-10,
        // cost-1.5 (no-exclusive), cost-2.5 (no-exclusive), cost-0.5
        // (allow-exclusive). Expected: t1 & t2 -> cost-2.5, t3 -> cost-0.5
        // via exclusive admission.
        let path = temp_context_path("cost-scenario").await;
        let engine = Cameleer::new(
            vec![
                QueueSpec::Parallel { name: "parallel-10".into(), parallelism: 10, default: false },
                QueueSpec::Cost { name: "cost-1.5".into(), capabilities: 1.5, allow_exclusive_jobs: false, default: false },
                QueueSpec::Cost { name: "cost-2.5".into(), capabilities: 2.5, allow_exclusive_jobs: false, default: true },
                QueueSpec::Cost { name: "cost-0.5".into(), capabilities: 0.5, allow_exclusive_jobs: true, default: false },
            ],
            defaults(),
            &path,
            Arc::new(TracingSink),
            None,
        )
        .await
        .unwrap();

        let t1 = engine.select_queue("t1", Some(1.1), &[]).unwrap();
        assert_eq!(t1.name, "cost-2.5");

        let t2 = engine.select_queue("t2", Some(2.1), &[]).unwrap();
        assert_eq!(t2.name, "cost-2.5");

        let t3 = engine.select_queue("t3", Some(4.5), &[]).unwrap();
        assert_eq!(t3.name, "cost-0.5");
        let _ = tokio::fs::remove_file(&path).await;
    }

    #[tokio::test]
    async fn queue_selection_fails_when_nothing_is_appropriate() {
        let path = temp_context_path("none-appropriate").await;
        let engine = Cameleer::new(
            vec![QueueSpec::Parallel { name: "only".into(), parallelism: 1, default: true }],
            defaults(),
            &path,
            Arc::new(TracingSink),
            None,
        )
        .await
        .unwrap();

        let err = engine.select_queue("t", Some(1.0), &[]).unwrap_err();
        assert!(matches!(err, QueueSelectionError::NoneAppropriate { .. }));
        let _ = tokio::fs::remove_file(&path).await;
    }

    #[tokio::test]
    async fn interrupt_job_cancels_submission() {
        let path = temp_context_path("interrupt").await;
        let engine = Cameleer::new(
            vec![QueueSpec::Parallel { name: "default".into(), parallelism: 1, default: true }],
            defaults(),
            &path,
            Arc::new(TracingSink),
            None,
        )
        .await
        .unwrap();

        let manual = ManualSchedule::new();
        let body: crate::config::task_config::StepBody =
            Arc::new(|_args, _job| Box::pin(async move { Ok(json!(1)) }));
        let mut config = bare_config("interruptible", manual.handle(), body);
        config.interrupt_timeout_secs = Some(Slot::value(5.0));

        let mut events = engine.get_observable_for_work("interruptible");
        engine.load_tasks(vec![config]).await.unwrap();
        engine.run();

        manual.trigger();
        assert!(matches!(events.next().await.unwrap(), WorkEvent::Scheduled { .. }));
        let interruptable = events.next().await.unwrap();
        let job_id = match interruptable {
            WorkEvent::Interruptable { job_id, .. } => job_id,
            other => panic!("expected Interruptable, got {other:?}"),
        };

        engine.interrupt_job(job_id).unwrap();

        // Interrupting twice fails: the window has already been consumed.
        assert!(engine.interrupt_job(job_id).is_err());

        engine.shutdown().await;
        let _ = tokio::fs::remove_file(&path).await;
    }

    #[test]
    fn collecting_sink_is_available_for_future_assertions_on_scoped_logs() {
        // Smoke-test the fixture this module's tests could extend with log
        // assertions later; exercised directly to keep the import live.
        let sink = CollectingSink::new();
        let logger = ScopedLogger::new(sink.clone(), "engine");
        logger.info("hello");
        assert_eq!(sink.lines.lock().len(), 1);
    }
}
