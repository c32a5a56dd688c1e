use async_trait::async_trait;
use pretty_assertions::assert_eq;
use serde_json::Value;
use siteforge_core::{BuildContext, BuildOptions, File, HookError, Mode, Plugin, PluginError};
use siteforge_engine::{apply_batch, Engine, EngineError, WatchBatch};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

fn context(mode: Mode) -> Arc<BuildContext> {
    let options = BuildOptions::default().resolve().expect("resolve");
    BuildContext::new(options, mode)
}

fn roots(paths: &[&str]) -> Vec<String> {
    paths.iter().map(|p| p.to_string()).collect()
}

/// Appends its name to the file's `trace` array, after an optional delay.
struct TracePlugin {
    name: String,
    delay: Duration,
}

impl TracePlugin {
    fn new(name: &str, delay_ms: u64) -> Arc<dyn Plugin> {
        Arc::new(Self {
            name: name.to_string(),
            delay: Duration::from_millis(delay_ms),
        })
    }
}

#[async_trait]
impl Plugin for TracePlugin {
    fn name(&self) -> &str {
        &self.name
    }

    fn filter(&self, file: &File) -> bool {
        file.src().ends_with(".html")
    }

    async fn load(&self, file: &Arc<File>, _ctx: &BuildContext) -> Result<(), PluginError> {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        let mut trace = file
            .data()
            .get("trace")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();
        trace.push(Value::String(self.name.clone()));
        file.insert_data("trace", Value::Array(trace));
        Ok(())
    }
}

/// Adds configured children while loading, like a render plugin pulling in
/// fragments and images.
struct SpawnPlugin {
    edges: HashMap<String, Vec<String>>,
    delay: Duration,
    log: Arc<Mutex<Vec<String>>>,
}

impl SpawnPlugin {
    fn new(
        edges: &[(&str, &[&str])],
        delay_ms: u64,
        log: &Arc<Mutex<Vec<String>>>,
    ) -> Arc<dyn Plugin> {
        Arc::new(Self {
            edges: edges
                .iter()
                .map(|(parent, children)| {
                    (
                        parent.to_string(),
                        children.iter().map(|c| c.to_string()).collect(),
                    )
                })
                .collect(),
            delay: Duration::from_millis(delay_ms),
            log: log.clone(),
        })
    }
}

#[async_trait]
impl Plugin for SpawnPlugin {
    fn name(&self) -> &str {
        "spawn"
    }

    fn filter(&self, file: &File) -> bool {
        self.edges.contains_key(file.src())
    }

    async fn load(&self, file: &Arc<File>, ctx: &BuildContext) -> Result<(), PluginError> {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        for child in &self.edges[file.src()] {
            file.add_child(ctx, child);
        }
        self.log.lock().unwrap().push(format!("loaded:{}", file.src()));
        Ok(())
    }
}

/// Records every hook invocation into a shared log.
struct HookRecorder {
    log: Arc<Mutex<Vec<String>>>,
    fail_before_load: bool,
}

impl HookRecorder {
    fn new(log: &Arc<Mutex<Vec<String>>>) -> Arc<dyn Plugin> {
        Arc::new(Self {
            log: log.clone(),
            fail_before_load: false,
        })
    }

    fn failing(log: &Arc<Mutex<Vec<String>>>) -> Arc<dyn Plugin> {
        Arc::new(Self {
            log: log.clone(),
            fail_before_load: true,
        })
    }

    fn push(&self, event: &str) {
        self.log.lock().unwrap().push(event.to_string());
    }
}

#[async_trait]
impl Plugin for HookRecorder {
    fn name(&self) -> &str {
        "recorder"
    }

    async fn mounted(&self, _ctx: &BuildContext) -> Result<(), HookError> {
        self.push("mounted");
        Ok(())
    }

    async fn build_start(&self, _ctx: &BuildContext) -> Result<(), HookError> {
        self.push("build_start");
        Ok(())
    }

    async fn before_load(&self, _ctx: &BuildContext) -> Result<(), HookError> {
        self.push("before_load");
        if self.fail_before_load {
            return Err(HookError::msg("preparation failed"));
        }
        Ok(())
    }

    async fn after_load(&self, _ctx: &BuildContext) -> Result<(), HookError> {
        self.push("after_load");
        Ok(())
    }

    async fn build_end(&self, _ctx: &BuildContext) -> Result<(), HookError> {
        self.push("build_end");
        Ok(())
    }
}

/// Appends two errors to one unlucky file, through the per-file channel.
struct GrumpyPlugin {
    target: String,
}

#[async_trait]
impl Plugin for GrumpyPlugin {
    fn name(&self) -> &str {
        "grumpy"
    }

    fn filter(&self, file: &File) -> bool {
        file.src().ends_with(".html")
    }

    async fn load(&self, file: &Arc<File>, _ctx: &BuildContext) -> Result<(), PluginError> {
        if file.src() == self.target {
            file.add_error("missing layout");
            file.add_error("unresolved include");
        }
        Ok(())
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn plugin_order_is_total_per_file_regardless_of_latency() {
    let ctx = context(Mode::Dev);
    let engine = Engine::new(
        ctx.clone(),
        vec![
            TracePlugin::new("a", 30),
            TracePlugin::new("b", 10),
            TracePlugin::new("c", 0),
        ],
    );

    engine
        .rebuild(&roots(&["src/page.html"]))
        .await
        .expect("rebuild");

    let file = ctx.get_file("src/page.html").expect("file");
    let trace: Vec<String> = file
        .data()
        .get("trace")
        .and_then(Value::as_array)
        .expect("trace")
        .iter()
        .map(|v| v.as_str().unwrap().to_string())
        .collect();
    assert_eq!(trace, vec!["a", "b", "c"]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn duplicate_load_requests_reach_the_pipeline_once() {
    let ctx = context(Mode::Dev);
    let engine = Engine::new(ctx.clone(), vec![TracePlugin::new("only", 5)]);

    // sixteen racing requests for the same path
    let summary = engine
        .rebuild(&vec!["src/page.html".to_string(); 16])
        .await
        .expect("rebuild");

    assert_eq!(summary.files, 1);
    assert_eq!(summary.plugin_loads[0].loads, 1);
    let trace = ctx.get_file("src/page.html").expect("file").data();
    assert_eq!(
        trace.get("trace"),
        Some(&Value::Array(vec![Value::String("only".into())]))
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn cycle_stays_open_until_the_grandchild_finishes() {
    let log = Arc::new(Mutex::new(Vec::new()));
    let ctx = context(Mode::Dev);
    let engine = Engine::new(
        ctx.clone(),
        vec![
            SpawnPlugin::new(
                &[
                    ("src/index.html", &["src/_partial.html"][..]),
                    ("src/_partial.html", &["src/logo.svg"][..]),
                    ("src/logo.svg", &[][..]),
                ],
                20,
                &log,
            ),
            HookRecorder::new(&log),
        ],
    );

    let summary = engine
        .rebuild(&roots(&["src/index.html"]))
        .await
        .expect("rebuild");

    assert_eq!(summary.files, 3);
    for src in ["src/index.html", "src/_partial.html", "src/logo.svg"] {
        assert!(ctx.get_file(src).expect(src).assigned(), "{src} not loaded");
    }

    // the grandchild load completed before the closing hooks ran
    let log = log.lock().unwrap().clone();
    let grandchild = log
        .iter()
        .position(|e| e == "loaded:src/logo.svg")
        .expect("grandchild load");
    let after_load = log.iter().position(|e| e == "after_load").expect("hook");
    let build_end = log.iter().position(|e| e == "build_end").expect("hook");
    assert!(grandchild < after_load);
    assert!(after_load < build_end);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn hook_bracket_wraps_every_load() {
    let log = Arc::new(Mutex::new(Vec::new()));
    let ctx = context(Mode::Dev);
    let engine = Engine::new(
        ctx,
        vec![
            HookRecorder::new(&log),
            SpawnPlugin::new(&[("src/a.html", &[][..]), ("src/b.html", &[][..])], 5, &log),
        ],
    );

    engine.mount().await.expect("mount");
    engine
        .rebuild(&roots(&["src/a.html", "src/b.html"]))
        .await
        .expect("rebuild");

    let log = log.lock().unwrap().clone();
    let position = |event: &str| log.iter().position(|e| e == event).expect("event");
    let loads: Vec<usize> = log
        .iter()
        .enumerate()
        .filter(|(_, e)| e.starts_with("loaded:"))
        .map(|(i, _)| i)
        .collect();

    assert_eq!(position("mounted"), 0);
    assert_eq!(loads.len(), 2);
    assert!(position("build_start") < position("before_load"));
    assert!(loads.iter().all(|&i| i > position("before_load")));
    assert!(loads.iter().all(|&i| i < position("after_load")));
    assert!(position("after_load") < position("build_end"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn file_errors_are_tallied_and_fatal_only_in_build_mode() {
    let sources = [
        "src/one.html",
        "src/two.html",
        "src/three.html",
        "src/four.html",
        "src/five.html",
    ];

    // dev mode: reported, not fatal
    let ctx = context(Mode::Dev);
    let engine = Engine::new(
        ctx,
        vec![Arc::new(GrumpyPlugin {
            target: "src/three.html".to_string(),
        })],
    );
    let summary = engine.rebuild(&roots(&sources)).await.expect("dev rebuild");
    assert_eq!(summary.files, 5);
    assert_eq!(summary.errors, 2);

    // build mode: same condition fails the cycle after reporting
    let ctx = context(Mode::Build);
    let engine = Engine::new(
        ctx,
        vec![Arc::new(GrumpyPlugin {
            target: "src/three.html".to_string(),
        })],
    );
    match engine.rebuild(&roots(&sources)).await {
        Err(EngineError::BuildFailed { files, errors }) => {
            assert_eq!(files, 5);
            assert_eq!(errors, 2);
        }
        other => panic!("expected BuildFailed, got {other:?}"),
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn failing_before_load_aborts_before_any_pipeline_entry() {
    let log = Arc::new(Mutex::new(Vec::new()));
    let ctx = context(Mode::Dev);
    let engine = Engine::new(
        ctx.clone(),
        vec![HookRecorder::failing(&log), TracePlugin::new("never", 0)],
    );

    let err = engine
        .rebuild(&roots(&["src/a.html", "src/b.html"]))
        .await
        .expect_err("must abort");
    assert!(matches!(err, EngineError::Hook(_)));

    // nothing entered the pipeline, nothing was even registered
    assert_eq!(ctx.file_count(), 0);
    assert!(engine.plugins().iter().all(|p| p.loads() == 0));
    assert!(!log.lock().unwrap().iter().any(|e| e.starts_with("loaded:")));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn per_cycle_counters_reset_and_claims_persist() {
    let ctx = context(Mode::Dev);
    let engine = Engine::new(ctx, vec![TracePlugin::new("t", 0)]);

    let first = engine
        .rebuild(&roots(&["src/page.html"]))
        .await
        .expect("first");
    assert_eq!(first.plugin_loads[0].loads, 1);

    // same root again: still claimed from the previous cycle, so the
    // pipeline is not re-entered and the counter stays at zero
    let second = engine
        .rebuild(&roots(&["src/page.html"]))
        .await
        .expect("second");
    assert!(second.cycle > first.cycle);
    assert_eq!(second.plugin_loads[0].loads, 0);
    assert_eq!(second.files, 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn changed_fragment_rebuilds_parents_in_one_cycle() {
    let log = Arc::new(Mutex::new(Vec::new()));
    let ctx = context(Mode::Dev);
    let engine = Engine::new(
        ctx.clone(),
        vec![SpawnPlugin::new(
            &[
                ("src/index.html", &["src/_partial.html"][..]),
                ("src/about.html", &["src/_partial.html"][..]),
                ("src/_partial.html", &[][..]),
            ],
            0,
            &log,
        )],
    );

    let first = engine
        .rebuild(&roots(&["src/index.html", "src/about.html"]))
        .await
        .expect("first");
    assert_eq!(first.files, 3);
    assert_eq!(first.plugin_loads[0].loads, 3);

    // one fragment change re-renders both parents, in exactly one cycle
    let batch = WatchBatch {
        changed: vec!["src/_partial.html".to_string()],
        ..WatchBatch::default()
    };
    let second = apply_batch(&engine, &batch)
        .await
        .expect("apply")
        .expect("summary");
    assert_eq!(second.cycle, first.cycle + 1);
    assert_eq!(second.files, 3);
    assert_eq!(second.plugin_loads[0].loads, 3);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn removal_forces_a_cycle_with_no_roots() {
    let log = Arc::new(Mutex::new(Vec::new()));
    let ctx = context(Mode::Dev);
    let engine = Engine::new(
        ctx.clone(),
        vec![SpawnPlugin::new(
            &[("src/index.html", &[][..]), ("src/gone.html", &[][..])],
            0,
            &log,
        )],
    );
    engine
        .rebuild(&roots(&["src/index.html", "src/gone.html"]))
        .await
        .expect("first");

    let batch = WatchBatch {
        removed: vec!["src/gone.html".to_string()],
        ..WatchBatch::default()
    };
    let summary = apply_batch(&engine, &batch)
        .await
        .expect("apply")
        .expect("forced cycle");
    assert_eq!(summary.files, 1);
    assert_eq!(summary.plugin_loads[0].loads, 0);
    assert!(!ctx.has_file("src/gone.html"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn empty_batches_trigger_no_cycle() {
    let ctx = context(Mode::Dev);
    let engine = Engine::new(ctx, vec![]);
    let outcome = apply_batch(&engine, &WatchBatch::default())
        .await
        .expect("apply");
    assert!(outcome.is_none());
}

/// A parent that waits for its child's parsed data, the way a listing page
/// waits for an article's front matter.
struct AwaitChildPlugin;

#[async_trait]
impl Plugin for AwaitChildPlugin {
    fn name(&self) -> &str {
        "await-child"
    }

    fn filter(&self, file: &File) -> bool {
        file.src() == "src/listing.html"
    }

    async fn load(&self, file: &Arc<File>, ctx: &BuildContext) -> Result<(), PluginError> {
        let child = file.add_child(ctx, "src/_entry.html");
        let data = child.data_async().await;
        file.insert_data("entry-title", data.get("title").cloned().unwrap_or(Value::Null));
        Ok(())
    }
}

struct TitlePlugin;

#[async_trait]
impl Plugin for TitlePlugin {
    fn name(&self) -> &str {
        "title"
    }

    fn filter(&self, file: &File) -> bool {
        file.src() == "src/_entry.html"
    }

    async fn load(&self, file: &Arc<File>, _ctx: &BuildContext) -> Result<(), PluginError> {
        tokio::time::sleep(Duration::from_millis(10)).await;
        file.insert_data("title", Value::String("hello".into()));
        Ok(())
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn parents_can_await_child_data_within_the_cycle() {
    let ctx = context(Mode::Dev);
    let engine = Engine::new(ctx.clone(), vec![Arc::new(AwaitChildPlugin), Arc::new(TitlePlugin)]);

    let summary = engine
        .rebuild(&roots(&["src/listing.html"]))
        .await
        .expect("rebuild");
    assert_eq!(summary.files, 2);

    let listing = ctx.get_file("src/listing.html").expect("listing");
    assert_eq!(
        listing.data().get("entry-title"),
        Some(&Value::String("hello".into()))
    );
}
