//! The loaded task object: the runtime counterpart of a `TaskConfig`.
//!
//! A concrete task type is registered with the [`crate::registry::TaskRegistry`]
//! (C10) and instantiated once per `loadTasks` call. The base `Task` type is
//! sufficient for the common case (a task is just its resolved config); a
//! subclass schema can carry additional typed fields by implementing
//! [`TaskObject`] directly and registering under a distinct type name.

use std::any::Any;
use std::sync::Arc;

use crate::context_store::TaskContextHandle;
use crate::logging::ScopedLogger;

/// Object-safe handle to a loaded task, passed to every callable slot and
/// to every step body as part of its job.
///
/// The logger and static context are injected once, at load time, and never
/// reassigned afterwards (see DESIGN.md, REDESIGN FLAGS).
pub trait TaskObject: Send + Sync {
    /// The task's unique name (I1).
    fn name(&self) -> &str;

    /// The registered type name this task was constructed as.
    fn type_name(&self) -> &str;

    /// This task's persistent static context.
    fn context(&self) -> &TaskContextHandle;

    /// This task's bound logger.
    fn logger(&self) -> &ScopedLogger;

    /// Downcast escape hatch for subclass-specific fields.
    fn as_any(&self) -> &dyn Any;
}

/// The base task type: no fields beyond the ones every task carries.
pub struct Task {
    name: String,
    type_name: String,
    context: TaskContextHandle,
    logger: ScopedLogger,
}

impl Task {
    pub fn new(
        name: impl Into<String>,
        type_name: impl Into<String>,
        context: TaskContextHandle,
        logger: ScopedLogger,
    ) -> Arc<Self> {
        Arc::new(Self {
            name: name.into(),
            type_name: type_name.into(),
            context,
            logger,
        })
    }
}

impl TaskObject for Task {
    fn name(&self) -> &str {
        &self.name
    }

    fn type_name(&self) -> &str {
        &self.type_name
    }

    fn context(&self) -> &TaskContextHandle {
        &self.context
    }

    fn logger(&self) -> &ScopedLogger {
        &self.logger
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
