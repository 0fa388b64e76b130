//! The `Slot<T>` sum type: a value, or a callable that produces another
//! slot once invoked and awaited.
//!
//! This is the direct Rust realization of the REDESIGN FLAGS note on the
//! original's promise-awaiting config resolver: "model values as a sum
//! type... evaluate to a concrete value using a single recursion." Every
//! "boolean or callable" / "number or callable" option in `TaskConfig`
//! (spec.md §3) is one `Slot<T>`.

use std::fmt;
use std::sync::Arc;

use futures::future::BoxFuture;

use crate::error::ConfigError;
use crate::task::TaskObject;

/// Context passed to every callable: the pre-resolved `resolve` bag and the
/// owning task, per spec.md §4.1 ("invoke it, passing the pre-resolved
/// resolve bag and the owning Task instance").
#[derive(Clone)]
pub struct ResolveCtx {
    pub resolve_bag: Arc<std::collections::HashMap<String, serde_json::Value>>,
    pub task: Arc<dyn TaskObject>,
}

/// A function slot. Boxed because `Slot<T>` needs to be `Clone`-free but
/// storable in a `TaskConfig`; `Fn` values are reference-counted so cloning
/// the enclosing config is cheap.
pub type SlotFn<T> =
    Arc<dyn Fn(ResolveCtx) -> BoxFuture<'static, Result<Slot<T>, ConfigError>> + Send + Sync>;

/// A literal value, or a callable that (possibly after several more
/// indirections) produces one.
pub enum Slot<T> {
    Value(T),
    Fn(SlotFn<T>),
}

impl<T: Clone> Clone for Slot<T> {
    fn clone(&self) -> Self {
        match self {
            Slot::Value(v) => Slot::Value(v.clone()),
            Slot::Fn(f) => Slot::Fn(f.clone()),
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for Slot<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Slot::Value(v) => f.debug_tuple("Slot::Value").field(v).finish(),
            Slot::Fn(_) => f.write_str("Slot::Fn(..)"),
        }
    }
}

impl<T> Slot<T> {
    pub fn value(v: T) -> Self {
        Slot::Value(v)
    }

    pub fn callable<F>(f: F) -> Self
    where
        F: Fn(ResolveCtx) -> BoxFuture<'static, Result<Slot<T>, ConfigError>>
            + Send
            + Sync
            + 'static,
    {
        Slot::Fn(Arc::new(f))
    }
}

/// Resolution depth guard (open question Q5, decided in SPEC_FULL.md §4.1).
pub const MAX_RESOLVE_DEPTH: u32 = 16;

/// Resolve a slot to a concrete value: if it's already a literal, return it;
/// otherwise invoke the callable, await its future, and loop on the result
/// until a literal is reached or the depth guard trips.
///
/// `field` is used only for error messages.
pub async fn resolve_slot<T>(
    slot: &Slot<T>,
    ctx: &ResolveCtx,
    field: &str,
) -> Result<T, ConfigError>
where
    T: Clone,
{
    let mut current: Slot<T> = slot.clone();
    for _ in 0..MAX_RESOLVE_DEPTH {
        match current {
            Slot::Value(v) => return Ok(v),
            Slot::Fn(f) => {
                current = f(ctx.clone()).await?;
            }
        }
    }
    Err(ConfigError::DepthExceeded {
        field: field.to_string(),
        max_depth: MAX_RESOLVE_DEPTH,
    })
}

/// `optionalToValue` from spec.md §4.1: if the raw slot is absent, use the
/// default; otherwise resolve it.
pub async fn optional_to_value<T: Clone>(
    default: T,
    raw: Option<&Slot<T>>,
    ctx: &ResolveCtx,
    field: &str,
) -> Result<T, ConfigError> {
    match raw {
        None => Ok(default),
        Some(slot) => resolve_slot(slot, ctx, field).await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context_store::StaticContextStore;
    use crate::logging::{ScopedLogger, TracingSink};
    use crate::task::Task;
    use std::collections::HashMap;
    use std::time::Duration;

    async fn ctx() -> ResolveCtx {
        let store = StaticContextStore::load(
            std::env::temp_dir().join("slot-test-unused.json"),
            Duration::from_secs(60),
        )
        .await;
        let handle = store.handle_for("Task", "t");
        let logger = ScopedLogger::new(Arc::new(TracingSink), "task.t");
        let task = Task::new("t", "Task", handle, logger);
        ResolveCtx {
            resolve_bag: Arc::new(HashMap::new()),
            task,
        }
    }

    #[tokio::test]
    async fn literal_resolves_to_itself() {
        let slot: Slot<i32> = Slot::value(42);
        let ctx = ctx().await;
        assert_eq!(resolve_slot(&slot, &ctx, "x").await.unwrap(), 42);
    }

    #[tokio::test]
    async fn callable_is_invoked_and_chained() {
        let slot: Slot<i32> = Slot::callable(|_ctx| {
            Box::pin(async move { Ok(Slot::callable(|_ctx| Box::pin(async move { Ok(Slot::value(7)) }))) })
        });
        let ctx = ctx().await;
        assert_eq!(resolve_slot(&slot, &ctx, "x").await.unwrap(), 7);
    }

    #[tokio::test]
    async fn absent_uses_default() {
        let ctx = ctx().await;
        let v = optional_to_value(99, None, &ctx, "x").await.unwrap();
        assert_eq!(v, 99);
    }

    fn forever(_ctx: ResolveCtx) -> BoxFuture<'static, Result<Slot<i32>, ConfigError>> {
        Box::pin(async move { Ok(Slot::callable(forever)) })
    }

    #[tokio::test]
    async fn infinite_chain_trips_depth_guard() {
        let slot: Slot<i32> = Slot::callable(forever);
        let ctx = ctx().await;
        let err = resolve_slot(&slot, &ctx, "x").await.unwrap_err();
        assert!(matches!(err, ConfigError::DepthExceeded { .. }));
    }
}
