//! End-of-cycle summary.

use crate::cycle::CycleId;
use crate::engine::RegisteredPlugin;
use log::{error, info, warn};
use serde::Serialize;
use siteforge_core::{BuildContext, Mode};
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Clone, Serialize)]
pub struct PluginLoads {
    pub plugin: String,
    pub loads: usize,
}

/// Aggregated outcome of one cycle.
#[derive(Debug, Clone, Serialize)]
pub struct CycleSummary {
    pub cycle: u64,
    pub files: usize,
    pub errors: usize,
    pub alerts: usize,
    pub elapsed_ms: u64,
    pub plugin_loads: Vec<PluginLoads>,
}

pub(crate) fn summarize(
    ctx: &BuildContext,
    plugins: &[Arc<RegisteredPlugin>],
    id: CycleId,
    elapsed: Duration,
) -> CycleSummary {
    let mut files = 0;
    let mut errors = 0;
    let mut alerts = 0;
    for file in ctx.files() {
        files += 1;
        errors += file.errors().len();
        alerts += file.alerts().len();
    }
    CycleSummary {
        cycle: id.as_u64(),
        files,
        errors,
        alerts,
        elapsed_ms: elapsed.as_millis() as u64,
        plugin_loads: plugins
            .iter()
            .map(|entry| PluginLoads {
                plugin: entry.name().to_string(),
                loads: entry.loads(),
            })
            .collect(),
    }
}

pub(crate) fn log_summary(ctx: &BuildContext, summary: &CycleSummary) {
    for file in ctx.files() {
        let errors = file.errors();
        if !errors.is_empty() {
            error!("{}", file.src());
            for message in errors {
                error!("  {message}");
            }
        }
        for message in file.alerts() {
            warn!("{}: {message}", file.src());
        }
    }

    let tail = match ctx.mode() {
        Mode::Dev => ", waiting for changes...",
        Mode::Build => ".",
    };
    info!(
        "cycle {}: {} file(s), {} error(s) in {}ms{tail}",
        summary.cycle, summary.files, summary.errors, summary.elapsed_ms
    );
}
