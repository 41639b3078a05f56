//! Sandboxed Lua script host with a console breakpoint debugger.
//!
//! A [`scene::Scene`] owns an [`host::InterpreterHost`], whose interpreter
//! allocates only from a [`heap::BoundedHeap`] and runs every script entry
//! under an instruction budget. Scripts reach the outside world through the
//! library tables in [`bridge`] and the collaborator traits in [`platform`].

pub mod bridge;
pub mod config;
pub mod debugger;
pub mod error;
pub mod heap;
pub mod host;
pub mod platform;
pub mod resource;
pub mod scene;

pub use config::{EngineConfig, HostConfig, SceneConfig};
pub use error::{ConfigError, HostError, HostResult};
pub use host::{CallMode, HostIo, InterpreterHost};
pub use scene::{KeyState, Scene, SceneIo, SceneState};
