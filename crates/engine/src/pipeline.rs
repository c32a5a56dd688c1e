//! Per-file load pipeline.

use crate::engine::RegisteredPlugin;
use siteforge_core::{BuildContext, File};
use std::sync::Arc;

/// Thread one file through the matching plugins, strictly in registration
/// order, awaiting each load before the next. Later plugins commonly read
/// data an earlier plugin wrote, so a failure is appended to the file and
/// stops the rest of this file's chain; sibling files are unaffected. An
/// empty selection leaves the file fully loaded with no transform.
pub(crate) async fn run_pipeline(
    file: Arc<File>,
    plugins: Arc<Vec<Arc<RegisteredPlugin>>>,
    ctx: Arc<BuildContext>,
) {
    for entry in plugins.iter() {
        if !entry.plugin().filter(&file) {
            continue;
        }
        entry.record_load();
        if let Err(err) = entry.plugin().load(&file, &ctx).await {
            log::debug!("plugin {} failed on {}: {err}", entry.name(), file.src());
            file.add_error(err.to_string());
            break;
        }
    }
    file.mark_loaded();
}
