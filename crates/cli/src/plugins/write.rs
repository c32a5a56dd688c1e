use async_trait::async_trait;
use siteforge_core::{BuildContext, File, FileKind, Plugin, PluginError};
use std::sync::Arc;

/// Materializes loaded files into the destination tree.
///
/// Documents get their rendered content when an earlier plugin produced
/// one, the raw source otherwise; everything else is copied byte-for-byte
/// to its hashed asset path. Registered last so every transform has already
/// run.
pub struct WritePlugin;

#[async_trait]
impl Plugin for WritePlugin {
    fn name(&self) -> &str {
        "write"
    }

    fn filter(&self, file: &File) -> bool {
        file.loadable() && file.kind() != FileKind::Generated
    }

    async fn load(&self, file: &Arc<File>, _ctx: &BuildContext) -> Result<(), PluginError> {
        let dest = file.dest();
        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        match file.kind() {
            FileKind::Document => {
                let content = match file.rendered() {
                    Some(rendered) => rendered,
                    None => file.read().await?.to_string(),
                };
                tokio::fs::write(dest, content).await?;
            }
            _ => {
                tokio::fs::copy(file.src(), dest).await?;
            }
        }
        log::debug!("wrote {} -> {}", file.src(), dest.display());
        Ok(())
    }
}
