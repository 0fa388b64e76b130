//! The one built-in task kind `cameleer-cli` ships: a task whose single
//! step runs an external command.
//!
//! This is the "common case of declaring tasks without custom Rust types"
//! SPEC_FULL.md §4.10 calls for — since step bodies are Rust closures
//! (`cameleer_engine::config::task_config::StepBody`), a config file alone
//! cannot describe arbitrary step logic; a shell command is the one kind of
//! step a declarative document can fully describe. Registering it under the
//! name below with the engine's `TaskRegistry` (C10) would let a future
//! subclass schema validate extra fields; this crate's tasks never need
//! more than the base `Task` shape, so `SHELL_TASK_TYPE` is carried only as
//! the `TaskConfig::type_name` tag and is never actually registered as a
//! subclass — every loaded task here still constructs as the base `Task`.

use std::process::Stdio;
use std::sync::Arc;

use cameleer_engine::config::task_config::{CanFail, PartialErrorConfig, StepBody, StepDef};
use serde_json::{json, Value};
use tokio::process::Command;

pub const SHELL_TASK_TYPE: &str = "Task";

/// The declarative shape of a shell step's `canFail`, pre-merge-with-defaults
/// (spec.md §3: boolean shorthand or the full `FunctionalTaskErrorConfig`
/// record; the recovery `schedule` itself is always the engine's default —
/// a config file has no way to describe a distinct per-step recovery
/// schedule without Rust code).
pub struct RawCanFailShape {
    pub disabled: bool,
    pub max_num_fails: Option<u32>,
    pub skip: Option<bool>,
    pub continue_on_final_fail: Option<bool>,
}

pub struct ShellStepConfig {
    pub command: String,
    pub args: Vec<String>,
    pub can_fail: Option<RawCanFailShape>,
}

impl ShellStepConfig {
    pub fn into_step_def(self) -> StepDef {
        let command = self.command;
        let args = self.args;
        let body: StepBody = Arc::new(move |_args, _job| {
            let command = command.clone();
            let args = args.clone();
            Box::pin(async move { run_command(&command, &args).await })
        });

        let can_fail = match self.can_fail {
            None => CanFail::default(),
            Some(shape) if shape.disabled => CanFail::Bool(false),
            Some(shape) => CanFail::Config(PartialErrorConfig {
                schedule: None,
                max_num_fails: shape.max_num_fails,
                skip: shape.skip,
                continue_on_final_fail: shape.continue_on_final_fail,
            }),
        };

        StepDef {
            name: None,
            body,
            args: None,
            can_fail,
        }
    }
}

/// Run one command to completion, capturing stdout/stderr. Success yields
/// the captured stdout as a JSON string; a nonzero exit or a spawn failure
/// is the step's error cause (spec.md L2: the cause must be preserved
/// bit-exact for the job's fail-error to wrap).
async fn run_command(command: &str, args: &[String]) -> Result<Value, Value> {
    let output = Command::new(command)
        .args(args)
        .stdin(Stdio::null())
        .output()
        .await
        .map_err(|e| json!({ "error": format!("failed to spawn {command:?}: {e}") }))?;

    if !output.status.success() {
        return Err(json!({
            "error": format!("{command:?} exited with {}", output.status),
            "stderr": String::from_utf8_lossy(&output.stderr),
        }));
    }

    Ok(json!(String::from_utf8_lossy(&output.stdout).to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn successful_command_captures_stdout() {
        let out = run_command("echo", &["hello".to_string()]).await.unwrap();
        assert_eq!(out.as_str().unwrap().trim(), "hello");
    }

    #[tokio::test]
    async fn nonzero_exit_is_an_error() {
        let err = run_command("false", &[]).await.unwrap_err();
        assert!(err["error"].as_str().unwrap().contains("exited"));
    }

    #[tokio::test]
    async fn missing_binary_is_an_error() {
        let err = run_command("cameleer-definitely-not-a-real-binary", &[]).await.unwrap_err();
        assert!(err["error"].as_str().unwrap().contains("failed to spawn"));
    }
}
