//! Resource sets the scripts register and draw from.
//!
//! Entries are registered while a scene's `load()` entry point runs, decoded
//! later on the loader thread, and looked up by the bridge on the script
//! thread. Each entry carries its own lock so a lookup never waits on an
//! unrelated decode.

mod id;
mod manager;
mod task;

pub use id::{ResourceId, RESOURCE_ID_CAPACITY};
pub use manager::{LoadState, Loaded, ResourceManager, ResourceSpec};
pub use task::{CancellationToken, LoadTask};

use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::platform::PlatformError;

#[derive(Debug, Error)]
pub enum ResourceError {
    #[error("Resource ID not found: {0}")]
    NotFound(String),

    #[error("Resource not loaded: {0}")]
    NotLoaded(String),

    #[error("Resource ID {id} already registered in set {set}")]
    AlreadyRegistered { set: u32, id: String },

    #[error("Resource {id} is a {actual}, not a {expected}")]
    WrongKind {
        id: String,
        expected: &'static str,
        actual: &'static str,
    },

    #[error("cannot unload {0} while it is loading")]
    UnloadWhileLoading(String),

    #[error("resources can only be registered from load()")]
    Sealed,

    #[error("invalid resource id {id:?}: {reason}")]
    InvalidId { id: String, reason: &'static str },

    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to decode {id}: {source}")]
    Decode {
        id: String,
        #[source]
        source: PlatformError,
    },

    #[error("resource load cancelled")]
    Cancelled,

    #[error("resource loader failed: {0}")]
    Worker(String),
}
