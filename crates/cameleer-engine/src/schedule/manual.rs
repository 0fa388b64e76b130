//! A schedule with no clock of its own: it fires only when something calls
//! [`ManualSchedule::trigger`]. This is the fixture the end-to-end scenarios
//! and properties (P1-P8, L1-L2) are tested against, since it lets a test
//! fire a task deterministically rather than racing a real clock.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{mpsc, Mutex as AsyncMutex};

use super::{Schedule, ScheduleFiring, ScheduleHandle};

pub struct ManualSchedule {
    tx: mpsc::UnboundedSender<()>,
    rx: AsyncMutex<mpsc::UnboundedReceiver<()>>,
}

impl ManualSchedule {
    pub fn new() -> Arc<Self> {
        let (tx, rx) = mpsc::unbounded_channel();
        Arc::new(Self {
            tx,
            rx: AsyncMutex::new(rx),
        })
    }

    pub fn handle(self: &Arc<Self>) -> ScheduleHandle {
        self.clone()
    }

    /// Queue one firing. Triggers that arrive faster than the Engine drains
    /// them queue up rather than being dropped (every other schedule in this
    /// module also never drops a due firing).
    pub fn trigger(&self) {
        let _ = self.tx.send(());
    }
}

#[async_trait]
impl Schedule for ManualSchedule {
    async fn next_firing(&self) -> ScheduleFiring {
        let mut rx = self.rx.lock().await;
        match rx.recv().await {
            Some(()) => ScheduleFiring::Next,
            // All senders dropped: no more triggers are possible.
            None => ScheduleFiring::Complete,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn queued_triggers_are_each_delivered() {
        let schedule = ManualSchedule::new();
        schedule.trigger();
        schedule.trigger();

        assert_eq!(schedule.next_firing().await, ScheduleFiring::Next);
        assert_eq!(schedule.next_firing().await, ScheduleFiring::Next);
    }

    #[tokio::test]
    async fn trigger_before_await_is_not_lost() {
        let schedule = ManualSchedule::new();
        // Trigger happens-before the next_firing call, exercising the
        // unbounded queue rather than a rendezvous.
        schedule.trigger();
        tokio::task::yield_now().await;
        assert_eq!(schedule.next_firing().await, ScheduleFiring::Next);
    }
}
