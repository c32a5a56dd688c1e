use siteforge_core::{paths, CoreError, ResolvedOptions, Result};
use walkdir::WalkDir;

/// Discover the initial root set: every file under the source root that
/// matches the source glob, skipping `_`-prefixed drafts and fragments
/// (those enter the graph only when a page pulls them in as children).
pub fn scan_roots(options: &ResolvedOptions) -> Result<Vec<String>> {
    let root = &options.src_root;
    if !root.exists() {
        return Err(CoreError::InvalidPath(format!(
            "source root does not exist: {}",
            root.display()
        )));
    }

    let mut roots = Vec::new();
    for entry in WalkDir::new(root).sort_by_file_name() {
        let entry = match entry {
            Ok(entry) => entry,
            Err(err) => {
                log::warn!("failed to read entry: {err}");
                continue;
            }
        };
        if !entry.file_type().is_file() {
            continue;
        }
        let path = paths::normalize(&entry.path().to_string_lossy());
        if paths::is_ignored(&path) || !options.matches_src(&path) {
            continue;
        }
        roots.push(path);
    }

    log::info!("found {} source file(s)", roots.len());
    Ok(roots)
}
