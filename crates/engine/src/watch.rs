//! Watch coordination.
//!
//! Raw filesystem events are bridged from `notify` into a debounced batch,
//! the batch is turned into an invalidation plan (a pure computation, so it
//! is testable without a watcher), and the plan is applied: every planned
//! path is removed from the graph, then the surviving roots are resubmitted
//! as one new cycle. The loop awaits the rebuild it triggered, so cycles
//! born from watch events never overlap.

use crate::engine::Engine;
use crate::error::{EngineError, Result};
use crate::report::CycleSummary;
use log::{debug, error, info, warn};
use notify::{
    Config as NotifyConfig, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher,
};
use siteforge_core::{paths, BuildContext, FileKind};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

#[derive(Debug, Clone, Copy)]
pub struct WatchConfig {
    /// Quiet period after the last event before a batch is applied.
    pub debounce: Duration,
    /// Fallback poll interval for the notify backend.
    pub poll_interval: Duration,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            debounce: Duration::from_millis(300),
            poll_interval: Duration::from_secs(2),
        }
    }
}

/// One debounced group of filesystem events, paths normalized.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WatchBatch {
    pub added: Vec<String>,
    pub changed: Vec<String>,
    pub removed: Vec<String>,
}

impl WatchBatch {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.changed.is_empty() && self.removed.is_empty()
    }
}

/// What a batch amounts to once filtered and widened.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RebuildPlan {
    /// Paths removed from the graph before resubmission, so they bypass
    /// the claim guard and are treated as fresh.
    pub invalidate: Vec<String>,
    /// Roots fed into the new cycle.
    pub roots: Vec<String>,
    /// Removals force a cycle even with no roots: a deletion can affect
    /// listing pages with no direct edge.
    pub forced: bool,
}

/// Turn a batch into an invalidation plan, or `None` when the batch amounts
/// to nothing and is dropped silently.
///
/// Added paths count only when unknown to the graph, not `_`-ignored, and
/// inside the source glob. Changed paths of generated types are dropped;
/// the rest are widened through the reverse-dependency map so a changed
/// fragment re-renders every page that included it. Removed paths always
/// invalidate and force the cycle.
pub fn plan_rebuild(ctx: &BuildContext, batch: &WatchBatch) -> Option<RebuildPlan> {
    let options = ctx.options();
    let mut roots: BTreeSet<String> = BTreeSet::new();
    let mut invalidate: BTreeSet<String> = BTreeSet::new();

    for path in &batch.added {
        let path = paths::normalize(path);
        if ctx.has_file(&path) || paths::is_ignored(&path) || !options.matches_src(&path) {
            continue;
        }
        roots.insert(path);
    }

    for path in &batch.changed {
        let path = paths::normalize(path);
        if options.types.kind_of(&path) == FileKind::Generated {
            continue;
        }
        if ctx.has_file(&path) {
            invalidate.insert(path.clone());
            roots.insert(path.clone());
        }
        for parent in ctx.parents_of(&path) {
            if ctx.has_file(&parent) {
                invalidate.insert(parent.clone());
                roots.insert(parent);
            }
        }
    }

    let mut forced = false;
    for path in &batch.removed {
        invalidate.insert(paths::normalize(path));
        forced = true;
    }

    if roots.is_empty() && !forced {
        return None;
    }
    Some(RebuildPlan {
        invalidate: invalidate.into_iter().collect(),
        roots: roots.into_iter().collect(),
        forced,
    })
}

/// Apply one batch: invalidate, then run a single cycle over the plan's
/// roots. Returns `None` for batches that planned to nothing.
pub async fn apply_batch(
    engine: &Arc<Engine>,
    batch: &WatchBatch,
) -> Result<Option<CycleSummary>> {
    let Some(plan) = plan_rebuild(engine.context(), batch) else {
        debug!("watch batch produced no work; dropped");
        return Ok(None);
    };
    for path in &plan.invalidate {
        engine.context().invalidate(path);
    }
    let summary = engine.rebuild(&plan.roots).await?;
    Ok(Some(summary))
}

/// Debounced accumulation of raw watcher events.
#[derive(Default)]
struct EventBatcher {
    added: BTreeSet<String>,
    changed: BTreeSet<String>,
    removed: BTreeSet<String>,
    last_event: Option<Instant>,
}

impl EventBatcher {
    fn record(&mut self, kind: &EventKind, path: String) {
        match kind {
            EventKind::Create(_) => {
                self.removed.remove(&path);
                self.added.insert(path);
            }
            EventKind::Remove(_) => {
                self.added.remove(&path);
                self.changed.remove(&path);
                self.removed.insert(path);
            }
            EventKind::Access(_) => return,
            _ => {
                if !self.added.contains(&path) {
                    self.changed.insert(path);
                }
            }
        }
        self.last_event = Some(Instant::now());
    }

    fn deadline(&self, debounce: Duration) -> Option<tokio::time::Instant> {
        self.last_event
            .map(|last| tokio::time::Instant::from_std(last + debounce))
    }

    fn take(&mut self) -> WatchBatch {
        self.last_event = None;
        WatchBatch {
            added: std::mem::take(&mut self.added).into_iter().collect(),
            changed: std::mem::take(&mut self.changed).into_iter().collect(),
            removed: std::mem::take(&mut self.removed).into_iter().collect(),
        }
    }
}

/// Long-running bridge between the filesystem watcher and the engine.
pub struct WatchCoordinator {
    shutdown_tx: mpsc::Sender<()>,
    handle: JoinHandle<()>,
}

impl WatchCoordinator {
    /// Watch the source root recursively and apply debounced batches. The
    /// context's dependency subscriptions are wired here, so children
    /// outside the source root get watched as they are registered.
    pub fn start(engine: Arc<Engine>, config: WatchConfig) -> Result<Self> {
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let mut watcher = RecommendedWatcher::new(
            move |result: notify::Result<Event>| {
                let _ = event_tx.send(result);
            },
            NotifyConfig::default().with_poll_interval(config.poll_interval),
        )
        .map_err(|err| EngineError::Watch(err.to_string()))?;

        let root = engine.context().options().src_root.clone();
        watcher
            .watch(&root, RecursiveMode::Recursive)
            .map_err(|err| EngineError::Watch(format!("{}: {err}", root.display())))?;

        let (subscribe_tx, subscribe_rx) = mpsc::unbounded_channel();
        engine.context().install_watch_subscriber(subscribe_tx);

        let base = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
        let (shutdown_tx, shutdown_rx) = mpsc::channel(1);
        let handle = tokio::spawn(watch_loop(
            engine,
            watcher,
            config,
            base,
            event_rx,
            subscribe_rx,
            shutdown_rx,
        ));
        Ok(Self {
            shutdown_tx,
            handle,
        })
    }

    pub async fn stop(self) {
        let _ = self.shutdown_tx.send(()).await;
        let _ = self.handle.await;
    }
}

async fn watch_loop(
    engine: Arc<Engine>,
    mut watcher: RecommendedWatcher,
    config: WatchConfig,
    base: PathBuf,
    mut event_rx: mpsc::UnboundedReceiver<notify::Result<Event>>,
    mut subscribe_rx: mpsc::UnboundedReceiver<String>,
    mut shutdown_rx: mpsc::Receiver<()>,
) {
    let mut batcher = EventBatcher::default();
    loop {
        let deadline = batcher.deadline(config.debounce);
        tokio::select! {
            Some(result) = event_rx.recv() => {
                match result {
                    Ok(event) => record_event(&mut batcher, &base, &event),
                    Err(err) => warn!("watcher error: {err}"),
                }
            }
            Some(path) = subscribe_rx.recv() => {
                if let Err(err) = watcher.watch(Path::new(&path), RecursiveMode::NonRecursive) {
                    debug!("failed to watch dependency {path}: {err}");
                }
            }
            _ = shutdown_rx.recv() => break,
            () = async {
                if let Some(deadline) = deadline {
                    tokio::time::sleep_until(deadline).await;
                }
            }, if deadline.is_some() => {
                let batch = batcher.take();
                match apply_batch(&engine, &batch).await {
                    Ok(Some(summary)) => {
                        info!(
                            "watch cycle {}: {} file(s), {} error(s)",
                            summary.cycle, summary.files, summary.errors
                        );
                    }
                    Ok(None) => {}
                    Err(err) => error!("watch rebuild failed: {err}"),
                }
            }
        }
    }
    debug!("watch loop stopped");
}

fn record_event(batcher: &mut EventBatcher, base: &Path, event: &Event) {
    for path in &event.paths {
        // directory churn is irrelevant; files inside arrive as their own events
        if std::fs::metadata(path).map(|meta| meta.is_dir()).unwrap_or(false) {
            continue;
        }
        let rel = path.strip_prefix(base).unwrap_or(path);
        batcher.record(&event.kind, paths::normalize(&rel.to_string_lossy()));
    }
}
