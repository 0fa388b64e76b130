//! The Config Resolver (C2): `resolve(TaskConfig, CameleerDefaults) -> ResolvedConfig`.

use std::collections::HashMap;
use std::sync::Arc;

use futures::future::try_join_all;

use crate::config::resolved::{ResolvedConfig, ResolvedStep};
use crate::config::slot::{optional_to_value, resolve_slot, ResolveCtx};
use crate::config::task_config::{ArgsResolveEntry, CameleerDefaults, CanFail, TaskConfig};
use crate::error::ConfigError;
use crate::task::TaskObject;

/// `resolveErrorConfig` from spec.md §4.1/§4.3 step 3.
///
/// Q1 (DESIGN.md): a suspected key-swap bug in one prior implementation
/// assigned `schedule` from `canFail.skip`. Because every field here is a
/// distinct, named Rust struct field there is no opportunity to reproduce
/// that swap — each recognized key copies that key's own value.
///
/// Q3: when only `canFail = true` is given, `continueOnFinalFail` takes the
/// *defaults'* value (not a hardcoded `true`) — this falls out naturally
/// below, since the bool-shorthand and the all-`None` partial record take
/// the exact same merge path.
pub fn resolve_error_config(
    can_fail: &CanFail,
    defaults: &CameleerDefaults,
) -> crate::config::task_config::FunctionalTaskErrorConfig {
    use crate::config::task_config::FunctionalTaskErrorConfig;

    match can_fail {
        CanFail::Bool(false) => FunctionalTaskErrorConfig {
            schedule: None,
            max_num_fails: 0,
            skip: false,
            continue_on_final_fail: false,
        },
        CanFail::Bool(true) => FunctionalTaskErrorConfig {
            schedule: Some(defaults.default_recovery_schedule.clone()),
            max_num_fails: defaults.default_max_num_fails,
            skip: defaults.default_skip,
            continue_on_final_fail: defaults.default_continue_on_final_fail,
        },
        CanFail::Config(partial) => FunctionalTaskErrorConfig {
            schedule: partial
                .schedule
                .clone()
                .or_else(|| Some(defaults.default_recovery_schedule.clone())),
            max_num_fails: partial.max_num_fails.unwrap_or(defaults.default_max_num_fails),
            skip: partial.skip.unwrap_or(defaults.default_skip),
            continue_on_final_fail: partial
                .continue_on_final_fail
                .unwrap_or(defaults.default_continue_on_final_fail),
        },
    }
}

/// `resolve(TaskConfig, CameleerDefaults) -> ResolvedConfig` (spec.md §4.1).
///
/// The `resolve` bag is evaluated first, concurrently (spec.md: "processed
/// first, in parallel"); every other slot is then resolved in sequence,
/// each seeing the same bag.
pub async fn resolve(
    config: &TaskConfig,
    defaults: &CameleerDefaults,
    task: Arc<dyn TaskObject>,
) -> Result<ResolvedConfig, ConfigError> {
    let bag_entries = try_join_all(config.resolve_bag.iter().map(|(key, entry)| {
        let key = key.clone();
        let task = task.clone();
        async move {
            let value = match entry {
                ArgsResolveEntry::Value(v) => v.clone(),
                ArgsResolveEntry::Fn(f) => f(task).await?,
            };
            Ok::<_, ConfigError>((key, value))
        }
    }))
    .await?;

    let resolve_bag: Arc<HashMap<String, serde_json::Value>> =
        Arc::new(bag_entries.into_iter().collect());

    let ctx = ResolveCtx {
        resolve_bag: resolve_bag.clone(),
        task,
    };

    let skip = optional_to_value(false, config.skip.as_ref(), &ctx, "skip").await?;

    let cost = match &config.cost {
        None => None,
        Some(slot) => Some(resolve_slot(slot, &ctx, "cost").await?),
    };

    let allow_multiple =
        optional_to_value(false, config.allow_multiple.as_ref(), &ctx, "allowMultiple").await?;

    let queues = optional_to_value(Vec::new(), config.queues.as_ref(), &ctx, "queues").await?;

    let interrupt_timeout_secs = match &config.interrupt_timeout_secs {
        None => None,
        Some(slot) => Some(resolve_slot(slot, &ctx, "interruptTimeoutSecs").await?),
    };

    let raw_steps =
        optional_to_value(Vec::new(), config.steps.as_ref(), &ctx, "tasks").await?;

    let steps = raw_steps
        .into_iter()
        .enumerate()
        .map(|(i, step)| ResolvedStep {
            name: step.name.clone().unwrap_or_else(|| format!("step_{i}")),
            body: step.body.clone(),
            args: step.args.clone(),
            error_config: resolve_error_config(&step.can_fail, defaults),
        })
        .collect();

    Ok(ResolvedConfig {
        skip,
        cost,
        allow_multiple,
        queues,
        interrupt_timeout_secs,
        steps,
        resolve_bag,
        schedule: config.schedule.clone(),
    })
}
