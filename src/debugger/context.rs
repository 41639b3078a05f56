use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use mlua::{DebugEvent, HookTriggers, Lua, VmState};
use tracing::{debug, warn};

use super::backtrace::stack_depth;
use super::breakpoints::{BreakpointError, ChunkInfo};
use super::session::BreakSession;
use super::stepping::{BreakReason, DebugState};
use crate::platform::Console;

pub const INSTRUCTION_LIMIT_MESSAGE: &str = "Instruction count exceeded";

pub(crate) struct DebuggerCore {
    pub(crate) enabled: bool,
    pub(crate) interactive: bool,
    pub(crate) break_on_entry: bool,
    pub(crate) state: DebugState,
    pub(crate) step_depth: usize,
    pub(crate) chunks: HashMap<String, ChunkInfo>,
    pub(crate) console: Box<dyn Console>,
    breaks: usize,
    hook_armed: bool,
}

impl DebuggerCore {
    pub(crate) fn set_breakpoint(&mut self, chunk: &str, line: usize) -> Result<(), BreakpointError> {
        let info = self
            .chunks
            .get_mut(chunk)
            .ok_or_else(|| BreakpointError::UnknownChunk(chunk.to_string()))?;
        if info.set_breakpoint(line) {
            debug!(chunk, line, "breakpoint set");
            Ok(())
        } else {
            Err(BreakpointError::InvalidLine {
                chunk: chunk.to_string(),
                line,
            })
        }
    }

    pub(crate) fn clear_breakpoint(&mut self, chunk: &str, line: usize) -> Result<bool, BreakpointError> {
        let info = self
            .chunks
            .get_mut(chunk)
            .ok_or_else(|| BreakpointError::UnknownChunk(chunk.to_string()))?;
        Ok(info.clear_breakpoint(line))
    }

    fn on_event(&mut self, lua: &Lua, event: &mlua::Debug) -> mlua::Result<()> {
        match event.event() {
            DebugEvent::Count => {
                return Err(mlua::Error::RuntimeError(INSTRUCTION_LIMIT_MESSAGE.to_string()));
            }
            DebugEvent::Call | DebugEvent::TailCall => {
                if self.state == DebugState::InitBreak && event.source().what != "C" {
                    self.state = DebugState::Continue;
                    self.interactive_break(lua, BreakReason::Entry);
                }
            }
            DebugEvent::Ret => {
                if self.state == DebugState::StepOut && stack_depth(lua) == self.step_depth {
                    debug!(depth = self.step_depth, "stepped out");
                    self.state = DebugState::StepIn;
                }
            }
            DebugEvent::Line => {
                let stepped = match self.state {
                    DebugState::StepIn => true,
                    DebugState::StepOver => stack_depth(lua) <= self.step_depth,
                    _ => false,
                };
                if stepped {
                    self.interactive_break(lua, BreakReason::Step);
                } else if self.hits_breakpoint(event) {
                    self.interactive_break(lua, BreakReason::Breakpoint);
                }
            }
            _ => {}
        }
        Ok(())
    }

    fn hits_breakpoint(&self, event: &mlua::Debug) -> bool {
        let source = event.source();
        let Some(chunk) = source.source.as_deref().and_then(|s| s.strip_prefix('@')) else {
            return false;
        };
        let Ok(line) = usize::try_from(event.curr_line()) else {
            return false;
        };
        self.chunks
            .get(chunk)
            .is_some_and(|info| info.has_breakpoint(line))
    }

    /// Block in the command loop until a command resumes execution.
    fn interactive_break(&mut self, lua: &Lua, reason: BreakReason) {
        if !self.interactive {
            self.state = DebugState::Continue;
            return;
        }
        self.breaks += 1;
        debug!(reason = reason.label(), "interactive break");
        BreakSession::new(self, lua).run(reason);
    }

    /// Console went away: stop prompting and let the script run.
    pub(crate) fn detach_console(&mut self, err: &std::io::Error) {
        warn!("debug console unavailable, continuing without breaks: {}", err);
        self.interactive = false;
        self.state = DebugState::Continue;
    }
}

/// Hook-driven breakpoint debugger attached to one interpreter.
#[derive(Clone)]
pub struct Debugger {
    inner: Rc<RefCell<DebuggerCore>>,
}

impl Debugger {
    pub fn new(enabled: bool, break_on_entry: bool, console: Box<dyn Console>) -> Self {
        Self {
            inner: Rc::new(RefCell::new(DebuggerCore {
                enabled,
                interactive: enabled,
                break_on_entry,
                state: DebugState::Continue,
                step_depth: 0,
                chunks: HashMap::new(),
                console,
                breaks: 0,
                hook_armed: false,
            })),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.inner.borrow().enabled
    }

    /// False once the console has failed; breaks are then skipped.
    pub fn is_interactive(&self) -> bool {
        self.inner.borrow().interactive
    }

    pub fn state(&self) -> DebugState {
        self.inner.borrow().state
    }

    /// How many times execution stopped in the command loop.
    pub fn break_count(&self) -> usize {
        self.inner.borrow().breaks
    }

    pub fn has_chunk(&self, chunk: &str) -> bool {
        self.inner.borrow().chunks.contains_key(chunk)
    }

    /// Remember a chunk's source and the lines breakpoints may be set on.
    pub fn register_chunk(
        &self,
        chunk: &str,
        source: &str,
        active_lines: impl IntoIterator<Item = usize>,
    ) {
        let info = ChunkInfo::new(source, active_lines);
        debug!(chunk, lines = info.line_count(), "registered chunk");
        self.inner.borrow_mut().chunks.insert(chunk.to_string(), info);
    }

    pub fn set_breakpoint(&self, chunk: &str, line: usize) -> Result<(), BreakpointError> {
        self.inner.borrow_mut().set_breakpoint(chunk, line)
    }

    pub fn clear_breakpoint(&self, chunk: &str, line: usize) -> Result<bool, BreakpointError> {
        self.inner.borrow_mut().clear_breakpoint(chunk, line)
    }

    pub fn valid_lines(&self, chunk: &str) -> Option<Vec<usize>> {
        self.inner.borrow().chunks.get(chunk).map(ChunkInfo::valid_lines)
    }

    pub fn breakpoints(&self, chunk: &str) -> Option<Vec<usize>> {
        self.inner.borrow().chunks.get(chunk).map(ChunkInfo::breakpoints)
    }

    /// Install the hook for one protected call. The hook comes off when the
    /// guard drops.
    pub(crate) fn arm<'lua>(&self, lua: &'lua Lua, instruction_limit: u32) -> HookGuard<'lua> {
        let mut core = self.inner.borrow_mut();
        assert!(!core.hook_armed, "a debug hook is already installed on this interpreter");
        core.hook_armed = true;
        core.state = if core.enabled && core.break_on_entry && core.interactive {
            DebugState::InitBreak
        } else {
            DebugState::Continue
        };

        let mut triggers = HookTriggers::new();
        let mut any = false;
        if core.enabled {
            triggers = triggers.on_calls().on_returns().every_line();
            any = true;
        }
        if instruction_limit > 0 {
            triggers = triggers.every_nth_instruction(instruction_limit);
            any = true;
        }
        drop(core);

        if any {
            let hooked = Rc::clone(&self.inner);
            lua.set_hook(triggers, move |lua, event| {
                hooked.borrow_mut().on_event(lua, &event)?;
                Ok(VmState::Continue)
            });
        }

        HookGuard {
            lua,
            core: Rc::clone(&self.inner),
        }
    }
}

pub(crate) struct HookGuard<'lua> {
    lua: &'lua Lua,
    core: Rc<RefCell<DebuggerCore>>,
}

impl Drop for HookGuard<'_> {
    fn drop(&mut self) {
        self.lua.remove_hook();
        let mut core = self.core.borrow_mut();
        core.hook_armed = false;
        core.state = DebugState::Continue;
    }
}
