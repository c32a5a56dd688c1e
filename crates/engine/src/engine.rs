use crate::cycle::{CycleArena, CycleId};
use crate::error::{EngineError, Result};
use crate::hooks::{self, Hook};
use crate::pipeline::run_pipeline;
use crate::report::{self, CycleSummary};
use log::{debug, info, warn};
use siteforge_core::{BuildContext, File, FileOptions, Loader, Mode, Plugin};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Weak};
use std::time::Instant;

/// A plugin plus its per-cycle bookkeeping.
pub struct RegisteredPlugin {
    plugin: Arc<dyn Plugin>,
    loads: AtomicUsize,
}

impl RegisteredPlugin {
    pub fn new(plugin: Arc<dyn Plugin>) -> Self {
        Self {
            plugin,
            loads: AtomicUsize::new(0),
        }
    }

    pub fn plugin(&self) -> &dyn Plugin {
        self.plugin.as_ref()
    }

    pub fn name(&self) -> &str {
        self.plugin.name()
    }

    /// Files this plugin processed in the current cycle.
    pub fn loads(&self) -> usize {
        self.loads.load(Ordering::Relaxed)
    }

    pub(crate) fn record_load(&self) {
        self.loads.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn reset_loads(&self) {
        self.loads.store(0, Ordering::Relaxed);
    }
}

/// Build orchestrator: owns the plugin registry and the cycle arena, and is
/// installed into the context as its rebuild entry point.
pub struct Engine {
    ctx: Arc<BuildContext>,
    plugins: Arc<Vec<Arc<RegisteredPlugin>>>,
    cycles: CycleArena,
}

impl Engine {
    /// Wire an engine onto a context. Registration order of `plugins` is
    /// the order every per-file pipeline and sequential hook runs in.
    pub fn new(ctx: Arc<BuildContext>, plugins: Vec<Arc<dyn Plugin>>) -> Arc<Self> {
        let engine = Arc::new(Self {
            ctx: ctx.clone(),
            plugins: Arc::new(
                plugins
                    .into_iter()
                    .map(|plugin| Arc::new(RegisteredPlugin::new(plugin)))
                    .collect(),
            ),
            cycles: CycleArena::default(),
        });
        let engine_loader: Arc<dyn Loader> = engine.clone();
        let loader: Weak<dyn Loader> = Arc::downgrade(&engine_loader);
        ctx.install_loader(loader);
        engine
    }

    pub fn context(&self) -> &Arc<BuildContext> {
        &self.ctx
    }

    pub fn plugins(&self) -> &[Arc<RegisteredPlugin>] {
        &self.plugins
    }

    /// Run every `mounted` hook. Once per process, before the first cycle.
    pub async fn mount(&self) -> Result<()> {
        hooks::run_parallel(Hook::Mounted, &self.plugins, &self.ctx).await?;
        Ok(())
    }

    /// Run one full cycle over `roots` plus everything discovered from
    /// them.
    ///
    /// Hook order is fixed: `build_start`, `before_load`, all file loads,
    /// `after_load`, `build_end`. A hook failure aborts the cycle before
    /// any (further) file enters the pipeline. File-level errors never
    /// abort; they surface in the summary, which in build mode turns into
    /// [`EngineError::BuildFailed`].
    pub async fn rebuild(&self, roots: &[String]) -> Result<CycleSummary> {
        let started = Instant::now();
        for entry in self.plugins.iter() {
            entry.reset_loads();
        }

        hooks::run_sequential(Hook::BuildStart, &self.plugins, &self.ctx).await?;
        hooks::run_parallel(Hook::BeforeLoad, &self.plugins, &self.ctx).await?;

        let id = self.cycles.open();
        debug!("cycle {id}: open, {} root(s)", roots.len());
        for src in roots {
            let file = self.ctx.add_file(
                src,
                FileOptions {
                    root: true,
                    ..FileOptions::default()
                },
            );
            self.ctx.load(&file);
        }
        self.drain(id).await;
        self.cycles.close(id);

        hooks::run_parallel(Hook::AfterLoad, &self.plugins, &self.ctx).await?;
        hooks::run_sequential(Hook::BuildEnd, &self.plugins, &self.ctx).await?;

        let summary = report::summarize(&self.ctx, &self.plugins, id, started.elapsed());
        report::log_summary(&self.ctx, &summary);

        if self.ctx.mode() == Mode::Build && summary.errors > 0 {
            return Err(EngineError::BuildFailed {
                files: summary.files,
                errors: summary.errors,
            });
        }
        Ok(summary)
    }

    /// Await the in-flight set down to the empty fixed point. A single
    /// await is not enough: a completing load can synchronously enqueue a
    /// grandchild, so the set is re-taken after every batch.
    async fn drain(&self, id: CycleId) {
        loop {
            let batch = self.cycles.take_tasks(id);
            if batch.is_empty() {
                break;
            }
            debug!("cycle {id}: draining {} task(s)", batch.len());
            for handle in batch {
                if let Err(err) = handle.await {
                    warn!("cycle {id}: load task aborted: {err}");
                }
            }
        }
        info!("cycle {id}: in-flight set drained");
    }
}

impl Loader for Engine {
    /// Dispatch a freshly claimed file into the pipeline, folding the task
    /// into the open cycle when there is one.
    fn dispatch(&self, file: Arc<File>) {
        let handle = tokio::spawn(run_pipeline(
            file.clone(),
            self.plugins.clone(),
            self.ctx.clone(),
        ));
        if !self.cycles.register(handle) {
            debug!("load of {} runs outside any cycle", file.src());
        }
    }
}
