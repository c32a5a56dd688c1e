use crate::context::BuildContext;
use crate::error::{HookError, PluginError};
use crate::file::File;
use async_trait::async_trait;
use std::sync::Arc;

/// A build plugin.
///
/// Every capability is optional: the defaults match nothing, load nothing
/// and treat every hook as a no-op, so implementors override only the
/// methods they care about.
///
/// `load` runs per file, strictly after every earlier registered plugin
/// that also matched the file; it may mutate the file's data, append errors
/// and alerts, or pull further files into the cycle via
/// [`File::add_child`]. Lifecycle hooks bracket whole cycles; a hook
/// failure aborts the cycle it runs in.
#[async_trait]
pub trait Plugin: Send + Sync {
    fn name(&self) -> &str;

    /// Pure predicate selecting the files this plugin loads. Plugins
    /// without a filter never match.
    fn filter(&self, _file: &File) -> bool {
        false
    }

    async fn load(&self, _file: &Arc<File>, _ctx: &BuildContext) -> Result<(), PluginError> {
        Ok(())
    }

    /// Once per process, before the first cycle.
    async fn mounted(&self, _ctx: &BuildContext) -> Result<(), HookError> {
        Ok(())
    }

    async fn build_start(&self, _ctx: &BuildContext) -> Result<(), HookError> {
        Ok(())
    }

    async fn before_load(&self, _ctx: &BuildContext) -> Result<(), HookError> {
        Ok(())
    }

    async fn after_load(&self, _ctx: &BuildContext) -> Result<(), HookError> {
        Ok(())
    }

    async fn build_end(&self, _ctx: &BuildContext) -> Result<(), HookError> {
        Ok(())
    }
}
