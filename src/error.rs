use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::heap::HeapError;
use crate::resource::ResourceError;

/// Errors surfaced by the interpreter host.
#[derive(Debug, Error)]
pub enum HostError {
    /// The bounded heap refused an allocation while the interpreter ran.
    #[error("out of memory: {0}")]
    OutOfMemory(String),

    #[error("compile error: {0}")]
    Compile(String),

    /// Runtime fault inside a protected call.
    #[error("script error: {message}")]
    Script {
        message: String,
        traceback: Option<String>,
    },

    /// Fault outside any protection boundary. Interpreter state is no longer
    /// trustworthy and the process has to terminate.
    #[error("fatal interpreter error: {0}")]
    Panic(String),

    #[error(transparent)]
    Resource(#[from] ResourceError),

    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("chunk already loaded: {0}")]
    DuplicateChunk(String),

    #[error("interpreter setup failed: {0}")]
    Init(String),

    #[error(transparent)]
    Heap(#[from] HeapError),
}

impl HostError {
    pub fn script(message: impl Into<String>) -> Self {
        HostError::Script {
            message: message.into(),
            traceback: None,
        }
    }

    /// Errors the scene driver may recover from by entering its error state.
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, HostError::Panic(_))
    }

    pub fn traceback(&self) -> Option<&str> {
        match self {
            HostError::Script { traceback, .. } => traceback.as_deref(),
            _ => None,
        }
    }
}

impl From<mlua::Error> for HostError {
    fn from(err: mlua::Error) -> Self {
        match err {
            mlua::Error::SyntaxError { message, .. } => HostError::Compile(message),
            mlua::Error::MemoryError(message) => HostError::OutOfMemory(message),
            other => HostError::Init(other.to_string()),
        }
    }
}

/// Failures reading or parsing an engine configuration file.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("invalid config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid config: {0}")]
    Invalid(String),
}

pub type HostResult<T> = Result<T, HostError>;
