//! C10 (Task Registry) and C11 (Configurable Class Registry).
//!
//! A name-keyed table of factories, type-erased behind an object-safe trait
//! so the engine never needs to know a concrete type. The same pattern is
//! applied twice — once to tasks, once to controls/managers — and each
//! registration lives under its own `RootKind` partition (spec.md §4.7:
//! "Root base classes are detected and treated as a partition key").
//!
//! Rust has no runtime class hierarchy to walk for a fully-qualified name,
//! so the "inheritance chain joined with a separator" becomes a flat string
//! key the caller chooses at registration time (by convention,
//! `"<RootKind>::<TypeName>"`, assembled by [`ConfigurableClassRegistry::register`]).

use std::sync::Arc;

use dashmap::DashMap;
use serde_json::Value;

use crate::error::RegistryError;

/// Which table a registration belongs to. Unregistering a root clears only
/// that partition (spec.md §4.7).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RootKind {
    Task,
    Control,
    Manager,
}

impl RootKind {
    fn label(self) -> &'static str {
        match self {
            RootKind::Task => "Task",
            RootKind::Control => "Control",
            RootKind::Manager => "Manager",
        }
    }
}

/// A registered factory: given the task's already-parsed base config and
/// the engine's defaults (as opaque JSON, since a concrete task type's own
/// extra fields are validated separately — see below), produce the
/// `TaskObject`'s extra, type-specific state.
///
/// The base `Task` fields (name, type, context, logger) are always
/// constructed by the engine itself at admission time (spec.md §4.7:
/// "construct with `(config, defaults)`"); a factory only needs to hand
/// back whatever a subclass wants to carry beyond that, which is modeled
/// here as an opaque `Value` a subclass's own code can interpret.
pub type TaskFactory =
    Arc<dyn Fn(&Value, &Value) -> Result<Value, String> + Send + Sync>;

/// A registered factory for a control or manager: `(engine-handle-opaque,
/// config) -> instance-opaque`, matching spec.md §4.7's `(engine, config)`
/// constructor shape for that root.
pub type ConfigurableFactory =
    Arc<dyn Fn(&Value, &Value) -> Result<Value, String> + Send + Sync>;

/// The C11 registry: one partition per [`RootKind`], each a concurrent
/// name -> factory table. [`crate::registry::TaskRegistry`] is a thin,
/// task-specific facade over the `Task` partition of one shared instance of
/// this type. `DashMap` over a `Mutex`/`RwLock`-guarded `HashMap` matches
/// the pack's own concurrent-registry convention (e.g. a connector
/// registry keyed the same way) since lookups and registrations both need
/// to happen without a single global lock serializing unrelated task types.
pub struct ConfigurableClassRegistry {
    tasks: DashMap<String, TaskFactory>,
    controls: DashMap<String, ConfigurableFactory>,
    managers: DashMap<String, ConfigurableFactory>,
}

impl ConfigurableClassRegistry {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            tasks: DashMap::new(),
            controls: DashMap::new(),
            managers: DashMap::new(),
        })
    }

    /// Register a task type. Fails on a duplicate name unless
    /// `force_override` is set (spec.md §4.7).
    pub fn register_task(
        &self,
        name: impl Into<String>,
        factory: TaskFactory,
        force_override: bool,
    ) -> Result<(), RegistryError> {
        Self::register_into(&self.tasks, RootKind::Task, name, factory, force_override)
    }

    pub fn register_control(
        &self,
        name: impl Into<String>,
        factory: ConfigurableFactory,
        force_override: bool,
    ) -> Result<(), RegistryError> {
        Self::register_into(&self.controls, RootKind::Control, name, factory, force_override)
    }

    pub fn register_manager(
        &self,
        name: impl Into<String>,
        factory: ConfigurableFactory,
        force_override: bool,
    ) -> Result<(), RegistryError> {
        Self::register_into(&self.managers, RootKind::Manager, name, factory, force_override)
    }

    fn register_into<F>(
        table: &DashMap<String, F>,
        root: RootKind,
        name: impl Into<String>,
        factory: F,
        force_override: bool,
    ) -> Result<(), RegistryError> {
        let name = name.into();
        if !force_override && table.contains_key(&name) {
            return Err(RegistryError::DuplicateType {
                root: root.label().to_string(),
                name,
            });
        }
        table.insert(name, factory);
        Ok(())
    }

    /// Validate `base_config` against the base shape (the caller supplies
    /// that check; this registry only knows about the `type` field's
    /// dispatch), locate the factory by `type_name`, and invoke it with
    /// `(base_config, defaults)`. Mirrors spec.md §4.7's two-stage
    /// validate-then-construct sequence, with the per-kind schema check left
    /// to the factory itself (no JSON-Schema crate in the dependency stack —
    /// see SPEC_FULL.md §4.7).
    pub fn instantiate_task(
        &self,
        type_name: &str,
        base_config: &Value,
        defaults: &Value,
    ) -> Result<Value, RegistryError> {
        let factory = self.tasks.get(type_name).ok_or_else(|| RegistryError::UnknownType {
            root: RootKind::Task.label().to_string(),
            name: type_name.to_string(),
        })?;
        factory(base_config, defaults).map_err(|reason| RegistryError::UnknownType {
            root: RootKind::Task.label().to_string(),
            name: format!("{type_name} (constructor failed: {reason})"),
        })
    }

    pub fn task_type_is_registered(&self, name: &str) -> bool {
        self.tasks.contains_key(name)
    }

    pub fn control_type_is_registered(&self, name: &str) -> bool {
        self.controls.contains_key(name)
    }

    pub fn manager_type_is_registered(&self, name: &str) -> bool {
        self.managers.contains_key(name)
    }

    /// Unregistering a root clears its whole partition (spec.md §4.7).
    pub fn clear_root(&self, root: RootKind) {
        match root {
            RootKind::Task => self.tasks.clear(),
            RootKind::Control => self.controls.clear(),
            RootKind::Manager => self.managers.clear(),
        }
    }
}

/// C10: a facade the Engine uses for the common case — resolving a task
/// `type` string (or falling back to the built-in base `Task` when the
/// `TaskConfig` names no subclass) to a concrete instantiation.
///
/// This crate ships no built-in task subclasses beyond the base `Task`
/// (spec.md §3: `type` defaults to "base Task"); embedders register their
/// own via [`ConfigurableClassRegistry::register_task`] before calling
/// [`crate::Cameleer::load_tasks`].
pub struct TaskRegistry {
    classes: Arc<ConfigurableClassRegistry>,
}

pub const BASE_TASK_TYPE: &str = "Task";

impl TaskRegistry {
    pub fn new(classes: Arc<ConfigurableClassRegistry>) -> Self {
        Self { classes }
    }

    /// `true` if `type_name` is either the built-in base type or has been
    /// registered by the embedder.
    pub fn resolves(&self, type_name: &str) -> bool {
        type_name == BASE_TASK_TYPE || self.classes.task_type_is_registered(type_name)
    }

    pub fn classes(&self) -> &Arc<ConfigurableClassRegistry> {
        &self.classes
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn duplicate_registration_is_rejected_without_force() {
        let registry = ConfigurableClassRegistry::new();
        let factory: TaskFactory = Arc::new(|_cfg, _defaults| Ok(Value::Null));
        registry.register_task("Widget", factory.clone(), false).unwrap();

        let err = registry.register_task("Widget", factory.clone(), false).unwrap_err();
        assert!(matches!(err, RegistryError::DuplicateType { .. }));

        // force_override allows replacing it.
        registry.register_task("Widget", factory, true).unwrap();
    }

    #[test]
    fn roots_are_independent_partitions() {
        let registry = ConfigurableClassRegistry::new();
        let task_factory: TaskFactory = Arc::new(|_cfg, _defaults| Ok(Value::Null));
        let control_factory: ConfigurableFactory = Arc::new(|_engine, _cfg| Ok(Value::Null));

        registry.register_task("Same", task_factory, false).unwrap();
        // Same name under a different root does not collide.
        registry.register_control("Same", control_factory, false).unwrap();

        assert!(registry.task_type_is_registered("Same"));
        assert!(registry.control_type_is_registered("Same"));
        assert!(!registry.manager_type_is_registered("Same"));
    }

    #[test]
    fn unknown_task_type_fails_to_instantiate() {
        let registry = ConfigurableClassRegistry::new();
        let err = registry
            .instantiate_task("Missing", &json!({}), &json!({}))
            .unwrap_err();
        assert!(matches!(err, RegistryError::UnknownType { .. }));
    }

    #[test]
    fn clearing_a_root_drops_only_that_partition() {
        let registry = ConfigurableClassRegistry::new();
        let task_factory: TaskFactory = Arc::new(|_cfg, _defaults| Ok(Value::Null));
        let manager_factory: ConfigurableFactory = Arc::new(|_engine, _cfg| Ok(Value::Null));
        registry.register_task("T", task_factory, false).unwrap();
        registry.register_manager("M", manager_factory, false).unwrap();

        registry.clear_root(RootKind::Task);

        assert!(!registry.task_type_is_registered("T"));
        assert!(registry.manager_type_is_registered("M"));
    }

    #[test]
    fn base_task_type_always_resolves() {
        let classes = ConfigurableClassRegistry::new();
        let registry = TaskRegistry::new(classes);
        assert!(registry.resolves(BASE_TASK_TYPE));
        assert!(!registry.resolves("SomeSubclass"));
    }
}
