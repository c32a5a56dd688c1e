//! # Siteforge Engine
//!
//! Incremental build orchestration over the [`siteforge_core`] file graph.
//!
//! ## Cycle flow
//!
//! ```text
//! roots (scan / watch)
//!     │
//!     ├──> build_start ─ before_load        (lifecycle hooks)
//!     │
//!     ├──> load pipeline per file           (plugins in registration order)
//!     │      └─> children discovered mid-load fold into the same cycle
//!     │
//!     ├──> fixed-point drain, cycle closes
//!     │
//!     └──> after_load ─ build_end ─ summary
//! ```
//!
//! ## Example
//!
//! ```no_run
//! use siteforge_core::{BuildContext, BuildOptions, Mode};
//! use siteforge_engine::Engine;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let options = BuildOptions::default().resolve()?;
//!     let ctx = BuildContext::new(options, Mode::Build);
//!     let engine = Engine::new(ctx, vec![]);
//!
//!     engine.mount().await?;
//!     let summary = engine.rebuild(&["src/index.html".to_string()]).await?;
//!     println!("{} files, {} errors", summary.files, summary.errors);
//!     Ok(())
//! }
//! ```

mod cycle;
mod engine;
mod error;
mod hooks;
mod pipeline;
mod report;
mod watch;

pub use cycle::CycleId;
pub use engine::{Engine, RegisteredPlugin};
pub use error::{EngineError, Result};
pub use hooks::Hook;
pub use report::{CycleSummary, PluginLoads};
pub use watch::{
    apply_batch, plan_rebuild, RebuildPlan, WatchBatch, WatchConfig, WatchCoordinator,
};
