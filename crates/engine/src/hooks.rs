//! Lifecycle hook composition.
//!
//! Two rules only: sequential for order-dependent hooks (`build_start`,
//! `build_end`, where writers must finalize after earlier plugins) and
//! parallel for independent per-plugin setup/teardown (`mounted`,
//! `before_load`, `after_load`). Hook failures are not swallowed; the first
//! one aborts the enclosing cycle.

use crate::engine::RegisteredPlugin;
use siteforge_core::{BuildContext, HookError, Plugin};
use std::sync::Arc;
use tokio::task::JoinSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Hook {
    Mounted,
    BuildStart,
    BeforeLoad,
    AfterLoad,
    BuildEnd,
}

impl std::fmt::Display for Hook {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Hook::Mounted => "mounted",
            Hook::BuildStart => "build_start",
            Hook::BeforeLoad => "before_load",
            Hook::AfterLoad => "after_load",
            Hook::BuildEnd => "build_end",
        };
        write!(f, "{name}")
    }
}

async fn invoke(plugin: &dyn Plugin, hook: Hook, ctx: &BuildContext) -> Result<(), HookError> {
    match hook {
        Hook::Mounted => plugin.mounted(ctx).await,
        Hook::BuildStart => plugin.build_start(ctx).await,
        Hook::BeforeLoad => plugin.before_load(ctx).await,
        Hook::AfterLoad => plugin.after_load(ctx).await,
        Hook::BuildEnd => plugin.build_end(ctx).await,
    }
}

/// One plugin at a time, registration order, each awaited fully before the
/// next starts.
pub(crate) async fn run_sequential(
    hook: Hook,
    plugins: &[Arc<RegisteredPlugin>],
    ctx: &Arc<BuildContext>,
) -> Result<(), HookError> {
    for entry in plugins {
        if let Err(err) = invoke(entry.plugin(), hook, ctx).await {
            log::error!("plugin {} failed during {hook}: {err}", entry.name());
            return Err(err);
        }
    }
    Ok(())
}

/// All plugins concurrently; resolves once every one has resolved, then
/// reports the first failure if any.
pub(crate) async fn run_parallel(
    hook: Hook,
    plugins: &[Arc<RegisteredPlugin>],
    ctx: &Arc<BuildContext>,
) -> Result<(), HookError> {
    let mut set = JoinSet::new();
    for entry in plugins {
        let entry = entry.clone();
        let ctx = ctx.clone();
        set.spawn(async move {
            invoke(entry.plugin(), hook, &ctx)
                .await
                .map_err(|err| (entry.name().to_string(), err))
        });
    }

    let mut first_failure: Option<HookError> = None;
    while let Some(joined) = set.join_next().await {
        match joined {
            Ok(Ok(())) => {}
            Ok(Err((name, err))) => {
                log::error!("plugin {name} failed during {hook}: {err}");
                first_failure.get_or_insert(err);
            }
            Err(join_err) => {
                log::error!("{hook} hook task aborted: {join_err}");
                first_failure
                    .get_or_insert_with(|| HookError::msg(format!("{hook} task aborted")));
            }
        }
    }
    match first_failure {
        Some(err) => Err(err),
        None => Ok(()),
    }
}
