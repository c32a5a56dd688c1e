use thiserror::Error;

pub type Result<T> = std::result::Result<T, CoreError>;

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid options: {0}")]
    Options(String),

    #[error("invalid source path: {0}")]
    InvalidPath(String),
}

/// Failure of a single plugin while loading a single file.
///
/// These are recoverable: the engine appends them to the file's error list
/// and moves on to sibling files. They never unwind a cycle.
#[derive(Error, Debug)]
pub enum PluginError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Core(#[from] CoreError),

    #[error("{0}")]
    Message(String),
}

impl PluginError {
    pub fn msg(message: impl Into<String>) -> Self {
        Self::Message(message.into())
    }
}

/// Failure of a lifecycle hook. Fatal for the enclosing cycle.
#[derive(Error, Debug)]
pub enum HookError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("plugin {plugin} failed during {hook}: {message}")]
    Failed {
        plugin: String,
        hook: String,
        message: String,
    },

    #[error("{0}")]
    Other(String),
}

impl HookError {
    pub fn msg(message: impl Into<String>) -> Self {
        Self::Other(message.into())
    }
}
