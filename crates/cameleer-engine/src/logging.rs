//! C12: pluggable logging facility.
//!
//! The engine never talks to `tracing` macros directly outside this module
//! — every log line goes through a [`LogSink`], so the engine core can be
//! driven in tests without a global subscriber and so embedders can redirect
//! output to a manager / UI plug-in (spec.md §1, "manager plug-in surface").

use std::sync::Arc;

/// Log levels, ordered least to most severe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Level {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

/// A sink that consumes (level, scope, message) triples.
///
/// `scope` is a dotted path such as `task.my_task` or
/// `task.my_task.job.17`; implementations may use it for filtering or for
/// prefixing output. A sink must never panic — a broken sink (e.g. a closed
/// pipe) is swallowed by the default implementation (I11).
pub trait LogSink: Send + Sync {
    fn log(&self, level: Level, scope: &str, message: &str);
}

/// Default sink: forwards to `tracing`.
pub struct TracingSink;

impl LogSink for TracingSink {
    fn log(&self, level: Level, scope: &str, message: &str) {
        match level {
            Level::Trace => tracing::trace!(scope, "{message}"),
            Level::Debug => tracing::debug!(scope, "{message}"),
            Level::Info => tracing::info!(scope, "{message}"),
            Level::Warn => tracing::warn!(scope, "{message}"),
            Level::Error => tracing::error!(scope, "{message}"),
        }
    }
}

/// A logger bound to one scope, handed to a task or job at admission time.
/// Fixed at construction rather than a mutable setter, so a task's logger
/// can never change out from under an in-flight attempt.
#[derive(Clone)]
pub struct ScopedLogger {
    sink: Arc<dyn LogSink>,
    scope: String,
}

impl ScopedLogger {
    pub fn new(sink: Arc<dyn LogSink>, scope: impl Into<String>) -> Self {
        Self {
            sink,
            scope: scope.into(),
        }
    }

    /// A logger for a nested scope, e.g. a job within a task.
    pub fn nested(&self, suffix: impl AsRef<str>) -> Self {
        Self {
            sink: self.sink.clone(),
            scope: format!("{}.{}", self.scope, suffix.as_ref()),
        }
    }

    pub fn trace(&self, message: impl AsRef<str>) {
        self.sink.log(Level::Trace, &self.scope, message.as_ref());
    }
    pub fn debug(&self, message: impl AsRef<str>) {
        self.sink.log(Level::Debug, &self.scope, message.as_ref());
    }
    pub fn info(&self, message: impl AsRef<str>) {
        self.sink.log(Level::Info, &self.scope, message.as_ref());
    }
    pub fn warn(&self, message: impl AsRef<str>) {
        self.sink.log(Level::Warn, &self.scope, message.as_ref());
    }
    pub fn error(&self, message: impl AsRef<str>) {
        self.sink.log(Level::Error, &self.scope, message.as_ref());
    }
}

/// A sink used in tests to assert on emitted lines without a global
/// subscriber.
#[cfg(test)]
pub struct CollectingSink {
    pub lines: parking_lot::Mutex<Vec<(Level, String, String)>>,
}

#[cfg(test)]
impl CollectingSink {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            lines: parking_lot::Mutex::new(Vec::new()),
        })
    }
}

#[cfg(test)]
impl LogSink for CollectingSink {
    fn log(&self, level: Level, scope: &str, message: &str) {
        self.lines
            .lock()
            .push((level, scope.to_string(), message.to_string()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nested_scope_is_dotted() {
        let sink = CollectingSink::new();
        let logger = ScopedLogger::new(sink.clone(), "task.demo");
        let job_logger = logger.nested("job.1");
        job_logger.info("started");

        let lines = sink.lines.lock();
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0].1, "task.demo.job.1");
        assert_eq!(lines[0].2, "started");
    }

    #[test]
    fn level_ordering() {
        assert!(Level::Trace < Level::Error);
        assert!(Level::Warn < Level::Error);
    }
}
