//! A cron-expression-backed schedule (spec.md §4.5).
//!
//! `cron` is the one dependency this crate pulls in beyond its core stack
//! (see DESIGN.md) — there's no other crate here for parsing calendar
//! expressions.

use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use cron::Schedule as CronExpr;
use parking_lot::Mutex;

use super::{Schedule, ScheduleFiring, ScheduleHandle};
use crate::error::ConfigError;

/// A calendar schedule, optionally bounded to stop firing past a given
/// instant (spec.md §4.5: "the end of a bounded calendar window" as one
/// source of a `Complete` firing, distinct from an error).
pub struct CalendarSchedule {
    expr: CronExpr,
    not_after: Option<DateTime<Utc>>,
    completed: Mutex<bool>,
}

impl CalendarSchedule {
    pub fn parse(cron_expr: &str, not_after: Option<DateTime<Utc>>) -> Result<Arc<Self>, ConfigError> {
        let expr = CronExpr::from_str(cron_expr).map_err(|e| ConfigError::CannotResolve {
            field: "schedule".to_string(),
            reason: format!("invalid cron expression {cron_expr:?}: {e}"),
        })?;
        Ok(Arc::new(Self {
            expr,
            not_after,
            completed: Mutex::new(false),
        }))
    }

    pub fn handle(self: &Arc<Self>) -> ScheduleHandle {
        self.clone()
    }
}

#[async_trait]
impl Schedule for CalendarSchedule {
    async fn next_firing(&self) -> ScheduleFiring {
        if *self.completed.lock() {
            return ScheduleFiring::Complete;
        }

        let next = match self.expr.upcoming(Utc).next() {
            Some(t) => t,
            None => {
                *self.completed.lock() = true;
                return ScheduleFiring::Complete;
            }
        };

        if let Some(bound) = self.not_after {
            if next > bound {
                *self.completed.lock() = true;
                return ScheduleFiring::Complete;
            }
        }

        let wait = (next - Utc::now()).to_std().unwrap_or_default();
        tokio::time::sleep(wait).await;
        ScheduleFiring::Next
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn malformed_expression_is_a_config_error() {
        let err = CalendarSchedule::parse("not a cron expression", None).unwrap_err();
        assert!(matches!(err, ConfigError::CannotResolve { .. }));
    }

    #[test]
    fn every_second_parses() {
        assert!(CalendarSchedule::parse("* * * * * * *", None).is_ok());
    }
}
