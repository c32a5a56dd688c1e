//! Arena of in-flight rebuild cycles.
//!
//! Each top-level rebuild opens a record under a fresh monotonic id. Loads
//! spawned while a cycle is open register their task handle into the active
//! record; the drain loop repeatedly empties the set until it reaches a
//! fixed point, since a completing load can enqueue a grandchild. Closing
//! removes the record outright, so a registration arriving after close
//! finds nothing and the task simply completes detached.

use std::collections::HashMap;
use std::sync::Mutex;
use tokio::task::JoinHandle;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CycleId(u64);

impl CycleId {
    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for CycleId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CycleState {
    Open,
    Draining,
}

struct CycleRecord {
    state: CycleState,
    tasks: Vec<JoinHandle<()>>,
}

#[derive(Default)]
pub(crate) struct CycleArena {
    inner: Mutex<ArenaInner>,
}

#[derive(Default)]
struct ArenaInner {
    next_id: u64,
    active: Option<CycleId>,
    cycles: HashMap<CycleId, CycleRecord>,
}

impl CycleArena {
    /// Allocate a fresh id and make it the active cycle. Concurrent rebuild
    /// calls are not deduplicated here; the newest cycle simply becomes the
    /// registration target.
    pub(crate) fn open(&self) -> CycleId {
        let mut inner = self.inner.lock().unwrap();
        inner.next_id += 1;
        let id = CycleId(inner.next_id);
        inner.cycles.insert(
            id,
            CycleRecord {
                state: CycleState::Open,
                tasks: Vec::new(),
            },
        );
        inner.active = Some(id);
        id
    }

    /// Register a load task into the active cycle. Returns false when no
    /// cycle is open (the task keeps running detached).
    pub(crate) fn register(&self, handle: JoinHandle<()>) -> bool {
        let mut inner = self.inner.lock().unwrap();
        let Some(id) = inner.active else {
            return false;
        };
        match inner.cycles.get_mut(&id) {
            Some(record) => {
                record.tasks.push(handle);
                true
            }
            None => false,
        }
    }

    /// Take the current in-flight set, flipping the record into draining.
    /// Tasks registered while the taken batch runs land in the next take.
    pub(crate) fn take_tasks(&self, id: CycleId) -> Vec<JoinHandle<()>> {
        let mut inner = self.inner.lock().unwrap();
        match inner.cycles.get_mut(&id) {
            Some(record) => {
                record.state = CycleState::Draining;
                std::mem::take(&mut record.tasks)
            }
            None => Vec::new(),
        }
    }

    /// Remove the record; the id is never reused.
    pub(crate) fn close(&self, id: CycleId) {
        let mut inner = self.inner.lock().unwrap();
        inner.cycles.remove(&id);
        if inner.active == Some(id) {
            inner.active = None;
        }
    }

    #[cfg(test)]
    fn is_open(&self, id: CycleId) -> bool {
        self.inner.lock().unwrap().cycles.contains_key(&id)
    }
}
