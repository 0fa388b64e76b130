//! C7: the Scheduler Fan-in. Many independent schedules, one place the
//! Engine listens for "something is due".
//!
//! A single `broadcast::Sender` fans schedule firings out to every
//! listener, the same pattern the queue layer uses for run/done/failed
//! events applied here to due-schedules instead of job outcomes.

use std::collections::HashMap;
use std::sync::Arc;

use futures::stream::{Stream, StreamExt};
use parking_lot::Mutex;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio_stream::wrappers::BroadcastStream;

use super::{Schedule, ScheduleFiring, ScheduleHandle};

const FANIN_CHANNEL_CAPACITY: usize = 1024;

/// Routes every registered schedule's firings onto one channel, tagged by
/// the id the caller registered it under.
pub struct SchedulerFanIn {
    tx: broadcast::Sender<(String, ScheduleFiring)>,
    pumps: Mutex<HashMap<String, JoinHandle<()>>>,
}

impl SchedulerFanIn {
    pub fn new() -> Arc<Self> {
        let (tx, _rx) = broadcast::channel(FANIN_CHANNEL_CAPACITY);
        Arc::new(Self {
            tx,
            pumps: Mutex::new(HashMap::new()),
        })
    }

    /// Register a schedule under `id`, replacing and stopping any prior
    /// schedule registered under the same id.
    pub fn add_schedule(self: &Arc<Self>, id: impl Into<String>, schedule: ScheduleHandle) {
        let id = id.into();
        self.remove_schedule(&id);

        let tx = self.tx.clone();
        let pump_id = id.clone();
        let handle = tokio::spawn(async move {
            loop {
                let firing = schedule.next_firing().await;
                let terminal = matches!(firing, ScheduleFiring::Complete | ScheduleFiring::Error(_));
                // No receivers is not an error here: a schedule can fire
                // before anything has subscribed to its observable yet.
                let _ = tx.send((pump_id.clone(), firing));
                if terminal {
                    break;
                }
            }
        });

        self.pumps.lock().insert(id, handle);
    }

    /// Stop and forget a schedule. A no-op if `id` isn't registered.
    pub fn remove_schedule(&self, id: &str) {
        if let Some(handle) = self.pumps.lock().remove(id) {
            handle.abort();
        }
    }

    /// A stream of every firing across every registered schedule, tagged by
    /// schedule id.
    pub fn observable(&self) -> impl Stream<Item = (String, ScheduleFiring)> {
        BroadcastStream::new(self.tx.subscribe()).filter_map(|r| async move { r.ok() })
    }

    /// The firings for exactly one schedule id (spec's `getObservableForSchedule`).
    pub fn observable_for_schedule(&self, id: &str) -> impl Stream<Item = ScheduleFiring> {
        let id = id.to_string();
        self.observable()
            .filter_map(move |(fired_id, firing)| {
                let matches = fired_id == id;
                async move { matches.then_some(firing) }
            })
    }
}

impl Drop for SchedulerFanIn {
    fn drop(&mut self) {
        for (_, handle) in self.pumps.lock().drain() {
            handle.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schedule::manual::ManualSchedule;

    #[tokio::test]
    async fn firings_are_tagged_by_schedule_id() {
        let fanin = SchedulerFanIn::new();
        let a = ManualSchedule::new();
        let b = ManualSchedule::new();
        fanin.add_schedule("a", a.handle());
        fanin.add_schedule("b", b.handle());

        let mut all = fanin.observable();
        a.trigger();

        let (id, firing) = all.next().await.unwrap();
        assert_eq!(id, "a");
        assert_eq!(firing, ScheduleFiring::Next);
    }

    #[tokio::test]
    async fn removed_schedule_stops_firing() {
        let fanin = SchedulerFanIn::new();
        let a = ManualSchedule::new();
        fanin.add_schedule("a", a.handle());
        fanin.remove_schedule("a");

        a.trigger();
        // The pump task was aborted; nothing should arrive. We can't
        // positively prove absence without a timeout, so just confirm the
        // registry no longer tracks it.
        assert!(fanin.pumps.lock().get("a").is_none());
    }
}
