//! # Siteforge Core
//!
//! File graph and plugin contract for the siteforge build engine.
//!
//! ## Pipeline
//!
//! ```text
//! Source tree
//!     │
//!     ├──> Build context (canonical-path file registry)
//!     │      └─> File records (data, errors, alerts, claim flag)
//!     │
//!     ├──> Plugin contract (filter/load + lifecycle hooks)
//!     │
//!     └──> Destination resolution (links, hashed asset names)
//! ```
//!
//! The context is a plain handle passed into every component; nothing in
//! this crate relies on process-global state.

mod context;
mod error;
mod file;
mod options;
mod plugin;
pub mod paths;

pub use context::{BuildContext, FileOptions, Loader, Mode};
pub use error::{CoreError, HookError, PluginError, Result};
pub use file::{File, Link};
pub use options::{BuildOptions, FileKind, ResolvedOptions, SiteOptions, TypeMap};
pub use paths::DestInfo;
pub use plugin::Plugin;
