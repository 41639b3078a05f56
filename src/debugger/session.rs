use mlua::Lua;

use super::backtrace::{capture, FrameInfo};
use super::commands::{dispatch, tokenize, Flow};
use super::context::DebuggerCore;
use super::stepping::BreakReason;

/// One stop in the command loop: the frames captured at the break and the
/// frame the user is looking at.
pub(crate) struct BreakSession<'a> {
    pub(crate) core: &'a mut DebuggerCore,
    pub(crate) lua: &'a Lua,
    pub(crate) frames: Vec<FrameInfo>,
    pub(crate) selected: usize,
}

impl<'a> BreakSession<'a> {
    pub(crate) fn new(core: &'a mut DebuggerCore, lua: &'a Lua) -> Self {
        let frames = capture(lua, 0);
        Self {
            core,
            lua,
            frames,
            selected: 0,
        }
    }

    pub(crate) fn run(mut self, reason: BreakReason) {
        self.banner(reason);

        loop {
            let input = match self.core.console.read_line() {
                Ok(input) => input,
                Err(e) => {
                    self.core.detach_console(&e);
                    return;
                }
            };

            let tokens = tokenize(&input);
            if tokens.is_empty() {
                continue;
            }
            if let Flow::Done = dispatch(&mut self, &tokens) {
                return;
            }
        }
    }

    pub(crate) fn say(&mut self, line: impl AsRef<str>) {
        self.core.console.write_line(line.as_ref());
    }

    pub(crate) fn selected_frame(&self) -> Option<&FrameInfo> {
        self.frames.get(self.selected)
    }

    /// Source text of `line` in `chunk`, if the chunk was loaded by the host.
    pub(crate) fn source_line(&self, chunk: &str, line: usize) -> Option<&str> {
        self.core.chunks.get(chunk)?.line(line)
    }

    fn banner(&mut self, reason: BreakReason) {
        let location = self
            .selected_frame()
            .map(|f| (f.source.clone(), f.chunk.clone(), f.line));

        match location {
            Some((source, chunk, line)) => {
                let at = match line {
                    Some(line) => format!("{}:{}", source, line),
                    None => source,
                };
                self.say(format!("\n🔍 Break ({}) at {}", reason.label(), at));
                let text = chunk
                    .zip(line)
                    .and_then(|(chunk, line)| self.source_line(&chunk, line))
                    .map(|text| text.trim().to_string());
                if let Some(text) = text {
                    self.say(format!("    {}", text));
                }
            }
            None => self.say(format!("\n🔍 Break ({})", reason.label())),
        }
    }
}
