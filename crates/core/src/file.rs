use crate::context::{BuildContext, FileOptions};
use crate::error::Result;
use crate::options::FileKind;
use crate::paths::DestInfo;
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::{Notify, OnceCell};

/// Reference to another file, handed back when a parent links a child.
#[derive(Debug, Clone)]
pub struct Link {
    pub link: String,
    pub title: Option<String>,
}

/// One entry in the file graph.
///
/// Records are `Arc`-shared between the graph, the load pipeline and any
/// plugin holding on to them. All mutable state sits behind a mutex that is
/// only held for plain field access, never across an await.
pub struct File {
    src: String,
    dir: String,
    name: String,
    base: String,
    dest: PathBuf,
    link: String,
    kind: FileKind,
    root: bool,
    loadable: bool,
    state: Mutex<FileState>,
    content: OnceCell<String>,
    loaded: AtomicBool,
    loaded_signal: Notify,
}

#[derive(Default)]
struct FileState {
    assigned: bool,
    data: Map<String, Value>,
    errors: Vec<String>,
    alerts: Vec<String>,
    children: Vec<String>,
    rendered: Option<String>,
}

impl File {
    pub(crate) fn new(src: String, info: DestInfo, options: FileOptions) -> Arc<Self> {
        Arc::new(Self {
            src,
            dir: info.dir,
            name: info.name,
            base: info.base,
            dest: info.dest,
            link: info.link,
            kind: info.kind,
            root: options.root,
            loadable: options.loadable,
            state: Mutex::new(FileState::default()),
            content: OnceCell::new(),
            loaded: AtomicBool::new(false),
            loaded_signal: Notify::new(),
        })
    }

    pub fn src(&self) -> &str {
        &self.src
    }

    pub fn dir(&self) -> &str {
        &self.dir
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn base(&self) -> &str {
        &self.base
    }

    pub fn dest(&self) -> &Path {
        &self.dest
    }

    pub fn link(&self) -> &str {
        &self.link
    }

    pub fn kind(&self) -> FileKind {
        self.kind
    }

    pub fn is_root(&self) -> bool {
        self.root
    }

    pub fn loadable(&self) -> bool {
        self.loadable
    }

    pub fn assigned(&self) -> bool {
        self.state.lock().unwrap().assigned
    }

    /// Claim the record for a single pipeline entry.
    ///
    /// Check-then-set under the state lock: any number of callers may race
    /// here and exactly one gets `true`. Claiming also clears errors from
    /// the previous attempt, so a corrected file re-validates cleanly.
    /// The flag is never cleared on the record; invalidation replaces the
    /// whole record instead.
    pub fn claim(&self) -> bool {
        let mut state = self.state.lock().unwrap();
        if state.assigned {
            return false;
        }
        state.assigned = true;
        state.errors.clear();
        true
    }

    /// Source content, read lazily and cached for the record's lifetime.
    pub async fn read(&self) -> Result<&str> {
        let content = self
            .content
            .get_or_try_init(|| async { tokio::fs::read_to_string(&self.src).await })
            .await?;
        Ok(content.as_str())
    }

    /// Content a plugin rendered for this file, if any. Writers prefer this
    /// over the raw source.
    pub fn rendered(&self) -> Option<String> {
        self.state.lock().unwrap().rendered.clone()
    }

    pub fn set_rendered(&self, content: impl Into<String>) {
        self.state.lock().unwrap().rendered = Some(content.into());
    }

    /// Snapshot of the structured data payload.
    pub fn data(&self) -> Map<String, Value> {
        self.state.lock().unwrap().data.clone()
    }

    pub fn insert_data(&self, key: impl Into<String>, value: Value) {
        self.state.lock().unwrap().data.insert(key.into(), value);
    }

    /// Merge a map into the data payload, overwriting existing keys.
    pub fn patch_data(&self, patch: Map<String, Value>) {
        let mut state = self.state.lock().unwrap();
        for (key, value) in patch {
            state.data.insert(key, value);
        }
    }

    pub fn errors(&self) -> Vec<String> {
        self.state.lock().unwrap().errors.clone()
    }

    pub fn alerts(&self) -> Vec<String> {
        self.state.lock().unwrap().alerts.clone()
    }

    pub fn add_error(&self, message: impl Into<String>) {
        self.state.lock().unwrap().errors.push(message.into());
    }

    pub fn add_alert(&self, message: impl Into<String>) {
        self.state.lock().unwrap().alerts.push(message.into());
    }

    pub fn children(&self) -> Vec<String> {
        self.state.lock().unwrap().children.clone()
    }

    /// Register `src` as a child of this file and feed it into the open
    /// cycle. Returns the child record (existing or fresh).
    pub fn add_child(&self, ctx: &BuildContext, src: &str) -> Arc<File> {
        let child = ctx.add_file(src, FileOptions::default());
        {
            let mut state = self.state.lock().unwrap();
            if !state.children.iter().any(|c| c == child.src()) {
                state.children.push(child.src().to_string());
            }
        }
        ctx.register_dependency(child.src(), &self.src);
        ctx.load(&child);
        child
    }

    /// Add `src` as a child and resolve its public link once it has loaded.
    /// The title comes from the child's `linkTitle` data key, when a plugin
    /// set one.
    pub async fn add_link(&self, ctx: &BuildContext, src: &str) -> Link {
        let child = self.add_child(ctx, src);
        let data = child.data_async().await;
        Link {
            link: child.link().to_string(),
            title: data
                .get("linkTitle")
                .and_then(|value| value.as_str())
                .map(str::to_string),
        }
    }

    /// Mark the load pipeline finished for this record and wake waiters.
    pub fn mark_loaded(&self) {
        self.loaded.store(true, Ordering::Release);
        self.loaded_signal.notify_waiters();
    }

    pub fn is_loaded(&self) -> bool {
        self.loaded.load(Ordering::Acquire)
    }

    /// Data payload once the record's load pipeline has completed.
    ///
    /// Only meaningful for records that entered the pipeline (e.g. via
    /// `add_child`); a record nobody loads never resolves.
    pub async fn data_async(&self) -> Map<String, Value> {
        loop {
            if self.loaded.load(Ordering::Acquire) {
                return self.data();
            }
            let notified = self.loaded_signal.notified();
            if self.loaded.load(Ordering::Acquire) {
                return self.data();
            }
            notified.await;
        }
    }
}

impl std::fmt::Debug for File {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("File")
            .field("src", &self.src)
            .field("link", &self.link)
            .field("kind", &self.kind)
            .field("root", &self.root)
            .field("assigned", &self.assigned())
            .finish()
    }
}
