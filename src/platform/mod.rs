//! Narrow interfaces to everything outside the script sandbox.
//!
//! The host only ever needs to read bytes for a named file, read a line of
//! console text, enqueue a textured quad or a string, and start or stop a
//! sound. Headless implementations of each live next to the traits so the CLI
//! and the tests run without a window or an audio device.

mod audio;
mod console;
mod files;
mod graphics;
mod log;

pub use audio::{Audio, AudioEvent, BgmHandle, HeadlessAudio, SoundHandle};
pub use console::{Console, ScriptedConsole, StdConsole, Transcript};
pub use files::{DiskFiles, FileSource, MemoryFiles};
pub use graphics::{
    DrawCommand, FontHandle, Graphics, HeadlessGraphics, TextureHandle, Transform,
};
pub use log::{CaptureSink, LogSink, TracingSink};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum PlatformError {
    #[error("unsupported {kind} data: {reason}")]
    Unsupported { kind: &'static str, reason: String },
}

impl PlatformError {
    pub(crate) fn unsupported(kind: &'static str, reason: impl Into<String>) -> Self {
        PlatformError::Unsupported {
            kind,
            reason: reason.into(),
        }
    }
}
