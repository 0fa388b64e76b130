//! The command set shared by both control surfaces (spec.md §6): a line of
//! whitespace-separated tokens, first token the command, rest the args.
//!
//! Both surfaces feed the same `CommandRouter::dispatch` — the HTTP side
//! from a decoded path segment, the stdin side from `tokio::io::stdin()`
//! lines.

use std::collections::HashMap;
use std::sync::Arc;

use cameleer_engine::engine::Cameleer;
use futures::future::BoxFuture;

use crate::config_file::ConfigProvider;

/// `(method name) -> handler`, the Rust-native stand-in for "invoke a
/// public engine method by name" (spec.md §6) — Rust has no runtime
/// reflection, so this table is built once at startup rather than derived
/// from the `Cameleer` type (SPEC_FULL.md §6, recorded as an Open Question
/// resolution in DESIGN.md).
pub type MethodHandler =
    Arc<dyn Fn(Arc<Cameleer>, Vec<String>) -> BoxFuture<'static, anyhow::Result<String>> + Send + Sync>;

/// Signaled once a `shutdown` command has been fully processed, so
/// `main` can exit the process (spec.md §6: "shutdown: full shutdown, then
/// process exit").
pub struct ShutdownSignal {
    notify: tokio::sync::Notify,
}

impl ShutdownSignal {
    pub fn new() -> Arc<Self> {
        Arc::new(Self { notify: tokio::sync::Notify::new() })
    }

    pub async fn wait(&self) {
        self.notify.notified().await;
    }

    fn fire(&self) {
        self.notify.notify_waiters();
    }
}

pub struct CommandRouter {
    engine: Arc<Cameleer>,
    config: Arc<dyn ConfigProvider>,
    methods: HashMap<String, MethodHandler>,
    shutdown: Arc<ShutdownSignal>,
}

impl CommandRouter {
    pub fn new(engine: Arc<Cameleer>, config: Arc<dyn ConfigProvider>, shutdown: Arc<ShutdownSignal>) -> Self {
        let mut methods: HashMap<String, MethodHandler> = HashMap::new();

        let interrupt_job: MethodHandler = Arc::new(|engine, args| {
            Box::pin(async move {
                let job_id: u64 = args
                    .first()
                    .ok_or_else(|| anyhow::anyhow!("interruptjob requires a job id argument"))?
                    .parse()
                    .map_err(|e| anyhow::anyhow!("invalid job id: {e}"))?;
                engine.interrupt_job(job_id)?;
                Ok(format!("interrupted job {job_id}"))
            })
        });
        methods.insert("interruptjob".to_string(), interrupt_job);

        Self { engine, config, methods, shutdown }
    }

    /// Parse and dispatch one command line. Unknown command is an error
    /// (spec.md §6).
    pub async fn dispatch(&self, line: &str) -> anyhow::Result<String> {
        let mut tokens = line.split_whitespace();
        let command = tokens
            .next()
            .ok_or_else(|| anyhow::anyhow!("empty command"))?
            .to_lowercase();
        let args: Vec<String> = tokens.map(str::to_string).collect();

        match command.as_str() {
            "run" => {
                self.engine.run();
                Ok(String::new())
            }
            "load" => {
                let configs = self.config.all_task_configs()?;
                self.engine.load_tasks(configs).await?;
                Ok(String::new())
            }
            "pause" => {
                self.engine.pause();
                Ok(String::new())
            }
            "pausewait" => {
                self.engine.pause_wait().await;
                Ok(String::new())
            }
            "shutdown" => {
                self.engine.shutdown().await;
                self.shutdown.fire();
                Ok(String::new())
            }
            other => match self.methods.get(other) {
                Some(handler) => handler(self.engine.clone(), args).await,
                None => Err(anyhow::anyhow!("unknown command: {other:?}")),
            },
        }
    }
}
