//! C1: the value a functional step produces.
//!
//! A [`StepResult`] is total: every completed step produces exactly one,
//! carrying either the step's return value or an error that the step's
//! `skip`/`continueOnFinalFail` policy allowed to stand in for it. It is
//! never constructed for a step whose Run Attempt raised a final failure
//! that propagates past the job (I5) — see `job.rs`.

use serde_json::Value;

/// The outcome of one functional step, as recorded in `Job::results`.
#[derive(Debug, Clone, PartialEq)]
pub enum StepResult {
    /// The step body returned successfully (on the first try or after a
    /// successful recovery attempt).
    Ok(Value),
    /// The step's error was recorded as its result rather than propagated,
    /// via `skip` or `continueOnFinalFail`.
    Err(Value),
}

impl StepResult {
    /// `true` iff this result was produced via the skip or
    /// continue-on-final-fail path (P3).
    pub fn is_error(&self) -> bool {
        matches!(self, StepResult::Err(_))
    }

    /// The carried JSON value, regardless of which variant produced it.
    pub fn value(&self) -> &Value {
        match self {
            StepResult::Ok(v) | StepResult::Err(v) => v,
        }
    }

    pub fn into_value(self) -> Value {
        match self {
            StepResult::Ok(v) | StepResult::Err(v) => v,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn ok_is_not_error() {
        let r = StepResult::Ok(json!(42));
        assert!(!r.is_error());
        assert_eq!(r.value(), &json!(42));
    }

    #[test]
    fn err_is_error() {
        let r = StepResult::Err(json!("boom"));
        assert!(r.is_error());
        assert_eq!(r.into_value(), json!("boom"));
    }
}
