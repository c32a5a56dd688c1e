use crate::file::File;
use crate::options::ResolvedOptions;
use crate::paths;
use serde_json::{Map, Value};
use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, Mutex, OnceLock, Weak};
use tokio::sync::mpsc;

/// Operation mode of the whole process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Watch-and-serve style runs: cycle errors are reported, the process
    /// keeps going.
    Dev,
    /// One-shot builds: any file error at cycle close fails the run.
    Build,
}

impl std::fmt::Display for Mode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Mode::Dev => write!(f, "dev"),
            Mode::Build => write!(f, "build"),
        }
    }
}

/// Creation options for [`BuildContext::add_file`].
#[derive(Debug, Clone, Copy)]
pub struct FileOptions {
    /// Supplied directly by a scan or watch event, as opposed to discovered
    /// through another file.
    pub root: bool,
    /// Records that declare no load behavior are never fed to plugins.
    pub loadable: bool,
}

impl Default for FileOptions {
    fn default() -> Self {
        Self {
            root: false,
            loadable: true,
        }
    }
}

/// The rebuild entry point the context dispatches claimed files into.
///
/// Installed by the engine at startup; held weakly so the context never
/// keeps the engine alive on its own.
pub trait Loader: Send + Sync {
    fn dispatch(&self, file: Arc<File>);
}

/// Single source of truth for every known file, shared by handle with all
/// components and every plugin.
pub struct BuildContext {
    options: ResolvedOptions,
    mode: Mode,
    files: Mutex<HashMap<String, Arc<File>>>,
    global: Mutex<Map<String, Value>>,
    /// child path → parents that referenced it in their last render.
    deps: Mutex<HashMap<String, BTreeSet<String>>>,
    loader: OnceLock<Weak<dyn Loader>>,
    watch_subscriber: OnceLock<mpsc::UnboundedSender<String>>,
}

impl BuildContext {
    pub fn new(options: ResolvedOptions, mode: Mode) -> Arc<Self> {
        Arc::new(Self {
            options,
            mode,
            files: Mutex::new(HashMap::new()),
            global: Mutex::new(Map::new()),
            deps: Mutex::new(HashMap::new()),
            loader: OnceLock::new(),
            watch_subscriber: OnceLock::new(),
        })
    }

    pub fn options(&self) -> &ResolvedOptions {
        &self.options
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    /// Look up or create the record for `src`. Idempotent: a second call
    /// with the same path returns the same record.
    pub fn add_file(&self, src: &str, options: FileOptions) -> Arc<File> {
        let key = paths::normalize(src);
        let mut files = self.files.lock().unwrap();
        if let Some(existing) = files.get(&key) {
            return existing.clone();
        }
        let info = paths::resolve_dest(&self.options, &key);
        let file = File::new(key.clone(), info, options);
        files.insert(key, file.clone());
        file
    }

    pub fn has_file(&self, src: &str) -> bool {
        self.files
            .lock()
            .unwrap()
            .contains_key(&paths::normalize(src))
    }

    pub fn get_file(&self, src: &str) -> Option<Arc<File>> {
        self.files
            .lock()
            .unwrap()
            .get(&paths::normalize(src))
            .cloned()
    }

    /// Snapshot of the full mapping, ordered by source path so reports are
    /// deterministic.
    pub fn files(&self) -> Vec<Arc<File>> {
        let mut files: Vec<Arc<File>> = self.files.lock().unwrap().values().cloned().collect();
        files.sort_by(|a, b| a.src().cmp(b.src()));
        files
    }

    pub fn file_count(&self) -> usize {
        self.files.lock().unwrap().len()
    }

    /// Request a load for `file`.
    ///
    /// No-op when the record is already assigned or declares no load
    /// behavior; otherwise the claim flag is taken atomically and the file
    /// is dispatched to the installed engine, which registers the load into
    /// the open cycle. Any number of callers may race here for the same
    /// path; exactly one wins.
    pub fn load(&self, file: &Arc<File>) {
        if !file.loadable() || !file.claim() {
            return;
        }
        match self.loader.get().and_then(Weak::upgrade) {
            Some(loader) => loader.dispatch(file.clone()),
            None => log::debug!("load of {} requested before an engine was installed", file.src()),
        }
    }

    /// Install the rebuild entry point. Later installs are ignored.
    pub fn install_loader(&self, loader: Weak<dyn Loader>) {
        let _ = self.loader.set(loader);
    }

    /// Install the channel new dependency children are announced on, so the
    /// watch coordinator can subscribe them with the filesystem watcher.
    pub fn install_watch_subscriber(&self, tx: mpsc::UnboundedSender<String>) {
        let _ = self.watch_subscriber.set(tx);
    }

    /// Record that `parent` referenced `child` in its last render. A brand
    /// new child is also announced to the watch coordinator.
    pub fn register_dependency(&self, child: &str, parent: &str) {
        let child = paths::normalize(child);
        let parent = paths::normalize(parent);
        let is_new = {
            let mut deps = self.deps.lock().unwrap();
            let is_new = !deps.contains_key(&child);
            deps.entry(child.clone()).or_default().insert(parent);
            is_new
        };
        if is_new {
            if let Some(tx) = self.watch_subscriber.get() {
                let _ = tx.send(child);
            }
        }
    }

    /// Parents recorded for `child`, used to widen watch invalidation.
    pub fn parents_of(&self, child: &str) -> Vec<String> {
        self.deps
            .lock()
            .unwrap()
            .get(&paths::normalize(child))
            .map(|parents| parents.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Drop the record for `src` so the next touch recreates it fresh, with
    /// a clear claim flag and an empty content cache.
    pub fn invalidate(&self, src: &str) -> bool {
        self.files
            .lock()
            .unwrap()
            .remove(&paths::normalize(src))
            .is_some()
    }

    /// Snapshot of the free-form shared configuration.
    pub fn global(&self) -> Map<String, Value> {
        self.global.lock().unwrap().clone()
    }

    pub fn insert_global(&self, key: impl Into<String>, value: Value) {
        self.global.lock().unwrap().insert(key.into(), value);
    }
}
