//! C4: the Run Attempt — the algorithm that turns one resolved step's
//! regular attempt, plus however many recovery retries its `canFail` policy
//! allows, into exactly one [`StepResult`] (or a fatal [`JobFailError`]).
//!
//! Order of decisions (spec.md §4.3):
//! 1. resolve this attempt's args (fresh every time — regular and every
//!    recovery alike)
//! 2. run the step body
//! 3. on failure: `skip` shortcut (never attempt recovery, record the error
//!    and move on)
//! 4. zero-budget shortcut (`maxNumFails == 0` or no recovery schedule:
//!    behaves like an exhausted recovery loop)
//! 5. the recovery loop itself (I6: at most one retry in flight; I7: every
//!    exit is accounted for — success, budget exhausted, schedule
//!    `Complete`, schedule `Error`)
//! 6. `continueOnFinalFail` decides whether an exhausted step fails the job
//!    or is recorded as an error result and the job continues (I5).

use std::sync::Arc;

use serde_json::{json, Value};

use crate::config::resolved::ResolvedStep;
use crate::config::slot::ResolveCtx;
use crate::error::{AttemptError, JobFailError};
use crate::job::Job;
use crate::result::StepResult;
use crate::schedule::ScheduleFiring;

enum AttemptFailure {
    Args(String),
    Body(Value),
}

impl AttemptFailure {
    fn into_cause(self) -> Value {
        match self {
            AttemptFailure::Args(msg) => json!({ "error": "resolve_args_failed", "message": msg }),
            AttemptFailure::Body(v) => v,
        }
    }
}

fn ctx_for(job: &Arc<Job>) -> ResolveCtx {
    ResolveCtx {
        resolve_bag: job.resolve_bag.clone(),
        task: job.task.clone(),
    }
}

async fn try_once(step: &ResolvedStep, job: &Arc<Job>) -> Result<Value, AttemptFailure> {
    let args = match &step.args {
        Some(producer) => producer(ctx_for(job))
            .await
            .map_err(|e| AttemptFailure::Args(e.to_string()))?,
        None => Vec::new(),
    };
    (step.body)(args, job.clone())
        .await
        .map_err(AttemptFailure::Body)
}

/// I6/I7: retry against the step's recovery schedule until a try succeeds,
/// the budget is exhausted, or the schedule itself stops (`Complete` or
/// `Error`). Returns `Ok(value)` on a successful retry, or the failure that
/// ended the loop.
async fn run_recovery_loop(
    step: &ResolvedStep,
    job: &Arc<Job>,
) -> Result<Value, RecoveryExhausted> {
    let producer = step
        .error_config
        .schedule
        .as_ref()
        .ok_or(RecoveryExhausted::NoSchedule)?;

    let schedule = producer(ctx_for(job))
        .await
        .map_err(|e| RecoveryExhausted::ScheduleProducerFailed(e.to_string()))?;

    let mut attempts = 0u32;
    let mut last_failure: Option<AttemptFailure> = None;

    while attempts < step.error_config.max_num_fails {
        match schedule.next_firing().await {
            ScheduleFiring::Next => {
                attempts += 1;
                match try_once(step, job).await {
                    Ok(value) => return Ok(value),
                    Err(failure) => last_failure = Some(failure),
                }
            }
            ScheduleFiring::Complete => {
                return Err(RecoveryExhausted::ScheduleEnded(last_failure));
            }
            ScheduleFiring::Error(msg) => {
                return Err(RecoveryExhausted::ScheduleErrored(msg, last_failure));
            }
        }
    }

    Err(RecoveryExhausted::BudgetExhausted(last_failure))
}

enum RecoveryExhausted {
    NoSchedule,
    ScheduleProducerFailed(String),
    ScheduleEnded(Option<AttemptFailure>),
    ScheduleErrored(String, Option<AttemptFailure>),
    BudgetExhausted(Option<AttemptFailure>),
}

impl RecoveryExhausted {
    fn into_attempt_error(self, step_name: &str) -> AttemptError {
        match self {
            RecoveryExhausted::NoSchedule => AttemptError::FinalFail {
                step: step_name.to_string(),
                cause: json!({ "error": "no_recovery_schedule" }),
            },
            RecoveryExhausted::ScheduleProducerFailed(cause) => AttemptError::ResolveErrConf {
                step: step_name.to_string(),
                cause,
            },
            RecoveryExhausted::ScheduleEnded(last)
            | RecoveryExhausted::BudgetExhausted(last) => AttemptError::FinalFail {
                step: step_name.to_string(),
                cause: last
                    .map(AttemptFailure::into_cause)
                    .unwrap_or_else(|| json!({ "error": "recovery_exhausted" })),
            },
            RecoveryExhausted::ScheduleErrored(msg, last) => AttemptError::FinalFail {
                step: step_name.to_string(),
                cause: last.map(AttemptFailure::into_cause).unwrap_or_else(|| {
                    json!({ "error": "recovery_schedule_errored", "message": msg })
                }),
            },
        }
    }

    fn into_cause(self, step_name: &str) -> Value {
        match self.into_attempt_error(step_name) {
            AttemptError::FinalFail { cause, .. } => cause,
            other => json!({ "error": other.to_string() }),
        }
    }
}

/// Run one step to conclusion: a `StepResult` records the outcome on the
/// job (I4); `Err(JobFailError)` means the job itself fails here and no
/// further steps run (I5), unless `continueOnFinalFail` intervened first.
pub async fn run_step(
    step_index: usize,
    step: &ResolvedStep,
    job: Arc<Job>,
) -> Result<StepResult, JobFailError> {
    match try_once(step, &job).await {
        Ok(value) => {
            let result = StepResult::Ok(value);
            job.record(result.clone());
            Ok(result)
        }
        Err(first_failure) => {
            if step.error_config.skip {
                let result = StepResult::Err(first_failure.into_cause());
                job.record(result.clone());
                return Ok(result);
            }

            let recovery_eligible =
                step.error_config.max_num_fails > 0 && step.error_config.schedule.is_some();

            let outcome = if recovery_eligible {
                run_recovery_loop(step, &job).await
            } else {
                Err(RecoveryExhausted::BudgetExhausted(Some(first_failure)))
            };

            match outcome {
                Ok(value) => {
                    let result = StepResult::Ok(value);
                    job.record(result.clone());
                    Ok(result)
                }
                Err(exhausted) => {
                    if step.error_config.continue_on_final_fail {
                        let cause = exhausted.into_cause(&step.name);
                        let result = StepResult::Err(cause);
                        job.record(result.clone());
                        Ok(result)
                    } else {
                        Err(JobFailError {
                            job_id: job.id,
                            step_index,
                            step: step.name.clone(),
                            source: exhausted.into_attempt_error(&step.name),
                        })
                    }
                }
            }
        }
    }
}
