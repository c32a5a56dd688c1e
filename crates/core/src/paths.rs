//! Path normalization and destination/link resolution.
//!
//! Every file is keyed by its normalized source path; the destination and
//! public link are derived once, at record creation, from the resolved
//! options. Assets get a content-independent path hash folded into their
//! name so colliding basenames from different directories stay distinct.

use crate::options::{FileKind, ResolvedOptions};
use sha2::{Digest, Sha256};
use std::path::PathBuf;

/// Canonical form used as the file-graph key: forward slashes, no leading
/// `./`.
pub fn normalize(path: &str) -> String {
    let path = path.replace('\\', "/");
    let mut path = path.as_str();
    while let Some(rest) = path.strip_prefix("./") {
        path = rest;
    }
    path.to_string()
}

/// Naming convention: any `_`-prefixed component keeps a path out of the
/// root set (drafts, partials, layout fragments).
pub fn is_ignored(path: &str) -> bool {
    normalize(path)
        .split('/')
        .any(|part| part.starts_with('_'))
}

/// Short stable digest of a path, used in hashed asset names.
pub fn short_hash(input: &str) -> String {
    let digest = Sha256::digest(input.as_bytes());
    let mut out = String::with_capacity(8);
    for byte in digest.iter().take(4) {
        out.push_str(&format!("{byte:02x}"));
    }
    out
}

/// Derived naming for one source path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DestInfo {
    pub dir: String,
    pub name: String,
    pub base: String,
    pub dest: PathBuf,
    pub link: String,
    pub kind: FileKind,
}

/// Resolve where a source file is written and how it is linked.
///
/// Documents keep their directory (relative to the source root) and land as
/// `.html` with extensionless links; `index` documents link to their
/// directory. Everything else lands under the asset directory, with the
/// hash pattern applied unless hashing is disabled.
pub fn resolve_dest(options: &ResolvedOptions, src: &str) -> DestInfo {
    let src = normalize(src);
    let (src_dir, file) = match src.rsplit_once('/') {
        Some((dir, file)) => (dir, file),
        None => ("", src.as_str()),
    };
    let (stem, ext) = match file.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() => (stem, ext.to_lowercase()),
        _ => (file, String::new()),
    };

    let kind = options.types.kind(&ext);
    let is_doc = kind == FileKind::Document;

    let mut name = stem.to_string();
    if !is_doc && options.hash_assets {
        let hash = short_hash(&src);
        name = options
            .asset_hash_pattern
            .replace("[hash]", &hash)
            .replace("[name]", stem);
        if !name.contains(&hash) {
            name = format!("{hash}-{name}");
        }
    }

    let out_ext = if is_doc { "html".to_string() } else { ext };
    let base = if out_ext.is_empty() {
        name.clone()
    } else {
        format!("{name}.{out_ext}")
    };

    let dir = if is_doc {
        let root = options.src_root.to_string_lossy().replace('\\', "/");
        if src_dir == root {
            String::new()
        } else if root.is_empty() {
            src_dir.to_string()
        } else {
            src_dir
                .strip_prefix(&format!("{root}/"))
                .unwrap_or(src_dir)
                .to_string()
        }
    } else {
        options.assets_dir.clone()
    };

    let mut dest = options.dest.clone();
    if !dir.is_empty() {
        dest.push(&dir);
    }
    dest.push(&base);

    let is_index = is_doc && stem == "index";
    let mut link = options.href.clone();
    if !dir.is_empty() {
        link.push_str(&dir);
        link.push('/');
    }
    if !is_index {
        if is_doc {
            link.push_str(&name);
        } else {
            link.push_str(&base);
        }
    }

    DestInfo {
        dir,
        name,
        base,
        dest,
        link,
        kind,
    }
}
