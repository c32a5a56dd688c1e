use siteforge_core::{CoreError, HookError};
use thiserror::Error;

pub type Result<T> = std::result::Result<T, EngineError>;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Core(#[from] CoreError),

    #[error(transparent)]
    Hook(#[from] HookError),

    /// One-shot builds fail when a cycle closes with file errors; watch
    /// runs report the same condition and keep going.
    #[error("cycle closed with {errors} error(s) across {files} file(s)")]
    BuildFailed { files: usize, errors: usize },

    #[error("watcher error: {0}")]
    Watch(String),
}
