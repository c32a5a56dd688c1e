use crate::error::{CoreError, Result};
use globset::{Glob, GlobSet, GlobSetBuilder};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// How a file extension participates in the build.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileKind {
    /// Rendered page: keeps its directory, gets an `.html` destination and
    /// an extensionless link.
    Document,
    /// Copied under the asset directory with a hashed name.
    Asset,
    /// Produced by a downstream writer; never re-read as a source.
    Generated,
}

/// Extension → writer-type associations.
///
/// Unknown extensions are treated as assets. An empty extension is treated
/// as a document, matching the legacy convention of extensionless pages.
#[derive(Debug, Clone)]
pub struct TypeMap {
    kinds: HashMap<String, FileKind>,
}

impl TypeMap {
    fn with_overrides(overrides: &HashMap<String, FileKind>) -> Self {
        let mut kinds: HashMap<String, FileKind> = [
            ("html", FileKind::Document),
            ("htm", FileKind::Document),
            ("md", FileKind::Document),
            ("map", FileKind::Generated),
        ]
        .into_iter()
        .map(|(ext, kind)| (ext.to_string(), kind))
        .collect();
        for (ext, kind) in overrides {
            kinds.insert(ext.trim_start_matches('.').to_lowercase(), *kind);
        }
        Self { kinds }
    }

    pub fn kind(&self, ext: &str) -> FileKind {
        if ext.is_empty() {
            return FileKind::Document;
        }
        self.kinds
            .get(&ext.to_lowercase())
            .copied()
            .unwrap_or(FileKind::Asset)
    }

    /// Kind of a path, by its extension.
    pub fn kind_of(&self, src: &str) -> FileKind {
        let ext = Path::new(src)
            .extension()
            .and_then(|ext| ext.to_str())
            .unwrap_or("");
        self.kind(ext)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct SiteOptions {
    /// Base URL every generated link is joined onto.
    pub href: String,
    /// Directory (under `dest`) that hashed assets land in.
    pub assets: String,
}

impl Default for SiteOptions {
    fn default() -> Self {
        Self {
            href: "/".to_string(),
            assets: "assets".to_string(),
        }
    }
}

/// User-facing build options, as read from `siteforge.toml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct BuildOptions {
    /// Glob selecting the source files fed in as roots.
    pub src: String,
    /// Output directory.
    pub dest: String,
    pub site: SiteOptions,
    /// Naming pattern for hashed assets; `[hash]` and `[name]` expand.
    pub asset_hash_pattern: String,
    /// Disable to keep original asset names.
    pub hash_assets: bool,
    /// Extension overrides merged over the built-in associations.
    pub types: HashMap<String, FileKind>,
}

impl Default for BuildOptions {
    fn default() -> Self {
        Self {
            src: "src/**/*".to_string(),
            dest: "public".to_string(),
            site: SiteOptions::default(),
            asset_hash_pattern: "[hash]-[name]".to_string(),
            hash_assets: true,
            types: HashMap::new(),
        }
    }
}

impl BuildOptions {
    /// Read options from a TOML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)?;
        toml::from_str(&raw)
            .map_err(|err| CoreError::Options(format!("{}: {err}", path.display())))
    }

    /// Compile globs and fix up derived fields.
    pub fn resolve(self) -> Result<ResolvedOptions> {
        let glob = Glob::new(&self.src)
            .map_err(|err| CoreError::Options(format!("src glob {:?}: {err}", self.src)))?;
        let mut builder = GlobSetBuilder::new();
        builder.add(glob);
        let src_matcher = builder
            .build()
            .map_err(|err| CoreError::Options(err.to_string()))?;

        let mut href = self.site.href.clone();
        if !href.ends_with('/') {
            href.push('/');
        }

        Ok(ResolvedOptions {
            src_root: glob_root(&self.src),
            src: self.src,
            src_matcher,
            dest: PathBuf::from(self.dest),
            href,
            assets_dir: self.site.assets.trim_matches('/').to_string(),
            asset_hash_pattern: self.asset_hash_pattern,
            hash_assets: self.hash_assets,
            types: TypeMap::with_overrides(&self.types),
        })
    }
}

/// Options after glob compilation, shared read-only by every component.
#[derive(Debug, Clone)]
pub struct ResolvedOptions {
    pub src: String,
    pub src_root: PathBuf,
    src_matcher: GlobSet,
    pub dest: PathBuf,
    pub href: String,
    pub assets_dir: String,
    pub asset_hash_pattern: String,
    pub hash_assets: bool,
    pub types: TypeMap,
}

impl ResolvedOptions {
    pub fn matches_src(&self, path: &str) -> bool {
        self.src_matcher.is_match(path)
    }
}

/// Static directory prefix of a glob, i.e. the components before the first
/// one containing a meta character.
fn glob_root(pattern: &str) -> PathBuf {
    let mut root = if pattern.starts_with('/') {
        PathBuf::from("/")
    } else {
        PathBuf::new()
    };
    for part in pattern.split('/') {
        if part.is_empty() {
            continue;
        }
        if part.contains(['*', '?', '[', '{']) {
            break;
        }
        root.push(part);
    }
    root
}
