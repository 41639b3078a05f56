//! Breakpoint debugger driven by interpreter hook events.
//!
//! The controller is armed for the duration of every protected call. With
//! debugging off it only counts instructions; with debugging on it also
//! watches calls, returns and lines, and stops in a console command loop on
//! breakpoints and steps.

mod backtrace;
mod breakpoints;
mod commands;
mod context;
mod lineinfo;
mod session;
mod stepping;

pub use backtrace::{capture, render, stack_depth, FrameInfo};
pub use breakpoints::{BreakpointError, ChunkInfo};
pub use commands::{tokenize, Command, Flow, COMMANDS};
pub use context::{Debugger, INSTRUCTION_LIMIT_MESSAGE};
pub use lineinfo::{active_lines, LineInfoError};
pub use stepping::{BreakReason, DebugState};
