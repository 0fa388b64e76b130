//! A fixed-period schedule, optionally bounded to a finite number of
//! firings (used for the regular-attempt retry interval and for recovery
//! schedules declared as a plain duration rather than a calendar).

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;

use super::{Schedule, ScheduleFiring, ScheduleHandle};

pub struct IntervalSchedule {
    period: std::time::Duration,
    max_fires: Option<u32>,
    trigger_immediately: bool,
    fired: Mutex<u32>,
}

impl IntervalSchedule {
    /// `max_fires` negative-as-unbounded from spec.md §4.2 is represented as
    /// `None` at this boundary (callers translate `< 0` to `None` when
    /// parsing declarative config). `trigger_immediately` makes the very
    /// first `next_firing` resolve without waiting out a full period, for
    /// schedules that should run once on arming and then settle into their
    /// regular cadence.
    pub fn new(period: std::time::Duration, max_fires: Option<u32>, trigger_immediately: bool) -> Arc<Self> {
        Arc::new(Self {
            period,
            max_fires,
            trigger_immediately,
            fired: Mutex::new(0),
        })
    }

    pub fn handle(self: &Arc<Self>) -> ScheduleHandle {
        self.clone()
    }
}

#[async_trait]
impl Schedule for IntervalSchedule {
    async fn next_firing(&self) -> ScheduleFiring {
        let fired = {
            let fired = *self.fired.lock();
            if let Some(max) = self.max_fires {
                if fired >= max {
                    return ScheduleFiring::Complete;
                }
            }
            fired
        };
        if !(fired == 0 && self.trigger_immediately) {
            tokio::time::sleep(self.period).await;
        }
        *self.fired.lock() += 1;
        ScheduleFiring::Next
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test(start_paused = true)]
    async fn fires_until_bound_then_completes() {
        let schedule = IntervalSchedule::new(Duration::from_millis(10), Some(2), false);
        assert_eq!(schedule.next_firing().await, ScheduleFiring::Next);
        assert_eq!(schedule.next_firing().await, ScheduleFiring::Next);
        assert_eq!(schedule.next_firing().await, ScheduleFiring::Complete);
    }

    #[tokio::test(start_paused = true)]
    async fn unbounded_never_completes_on_its_own() {
        let schedule = IntervalSchedule::new(Duration::from_millis(10), None, false);
        for _ in 0..5 {
            assert_eq!(schedule.next_firing().await, ScheduleFiring::Next);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn trigger_immediately_fires_the_first_call_without_waiting() {
        let schedule = IntervalSchedule::new(Duration::from_secs(3600), Some(2), true);
        let started = tokio::time::Instant::now();
        assert_eq!(schedule.next_firing().await, ScheduleFiring::Next);
        assert!(started.elapsed() < Duration::from_millis(1));
        // Subsequent firings still wait out the full period.
        assert_eq!(schedule.next_firing().await, ScheduleFiring::Next);
        assert!(started.elapsed() >= Duration::from_secs(3600));
    }
}
