//! Bounded heap backing every allocation the interpreter makes.
//!
//! The heap reserves a fixed maximum up front and commits lazily as the
//! interpreter grows. A request that would push the in-use total past the
//! maximum fails without touching any accounting, and the failure is latched
//! so the host can report it as an out-of-memory condition rather than a
//! generic script fault.

mod arena;
mod hook;

pub use arena::{BoundedHeap, HeapConfig, HeapError, HeapStats};
pub(crate) use hook::lua_alloc;

/// Step in which committed memory grows.
pub const COMMIT_GRANULARITY: usize = 64 * 1024;

/// Requests at or above this size are logged before they are served.
pub const DEFAULT_LARGE_ALLOC_WARNING: usize = 512 * 1024;
