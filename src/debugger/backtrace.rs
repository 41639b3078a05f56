use std::fmt;

use mlua::Lua;

const MAX_FRAMES: usize = 64;

/// Snapshot of one activation record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameInfo {
    pub level: usize,
    pub name: Option<String>,
    /// "global", "local", "method", "field", "upvalue" or empty.
    pub kind: Option<String>,
    /// "Lua", "C" or "main".
    pub what: String,
    pub source: String,
    /// Chunk name for frames running code this host loaded.
    pub chunk: Option<String>,
    pub line: Option<usize>,
}

impl FrameInfo {
    pub fn is_native(&self) -> bool {
        self.what == "C"
    }

    fn describe(&self) -> String {
        match (&self.name, self.what.as_str()) {
            (Some(name), _) => format!("function '{}'", name),
            (None, "main") => "main chunk".to_string(),
            (None, "C") => "?".to_string(),
            (None, _) => match self.line {
                Some(line) => format!("function <{}:{}>", self.source, line),
                None => format!("function <{}>", self.source),
            },
        }
    }
}

impl fmt::Display for FrameInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{} {}", self.level, self.name.as_deref().unwrap_or("?"))?;
        if let Some(kind) = self.kind.as_deref().filter(|k| !k.is_empty()) {
            write!(f, " ({})", kind)?;
        }
        write!(f, " [{}] {}", self.what, self.source)?;
        if let Some(line) = self.line {
            write!(f, ":{}", line)?;
        }
        Ok(())
    }
}

/// Frames from `skip` outward, innermost first.
pub fn capture(lua: &Lua, skip: usize) -> Vec<FrameInfo> {
    let mut frames = Vec::new();
    let mut level = skip;

    while frames.len() < MAX_FRAMES {
        let Some(debug) = lua.inspect_stack(level) else {
            break;
        };

        let names = debug.names();
        let source = debug.source();
        let raw_source = source.source.as_deref().unwrap_or("?").to_string();
        let chunk = raw_source.strip_prefix('@').map(str::to_string);
        let display_source = source
            .short_src
            .as_deref()
            .map(str::to_string)
            .unwrap_or_else(|| raw_source.clone());
        let line = usize::try_from(debug.curr_line()).ok().filter(|&l| l > 0);

        frames.push(FrameInfo {
            level: frames.len(),
            name: names.name.as_deref().map(str::to_string),
            kind: names.name_what.map(|w| w.to_string()),
            what: source.what.to_string(),
            source: display_source,
            chunk,
            line,
        });
        level += 1;
    }

    frames
}

/// Number of active frames, including the one at level 0.
pub fn stack_depth(lua: &Lua) -> usize {
    let mut depth = 0;
    while lua.inspect_stack(depth).is_some() {
        depth += 1;
    }
    depth
}

pub fn render(frames: &[FrameInfo]) -> String {
    let mut out = String::from("stack traceback:");
    for frame in frames {
        let location = match (frame.is_native(), frame.line) {
            (true, _) => "[C]".to_string(),
            (false, Some(line)) => format!("{}:{}", frame.source, line),
            (false, None) => frame.source.clone(),
        };
        out.push_str(&format!("\n\t{}: in {}", location, frame.describe()));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(name: Option<&str>, what: &str, line: Option<usize>) -> FrameInfo {
        FrameInfo {
            level: 0,
            name: name.map(str::to_string),
            kind: name.map(|_| "global".to_string()),
            what: what.to_string(),
            source: "game.lua".to_string(),
            chunk: Some("game.lua".to_string()),
            line,
        }
    }

    #[test]
    fn test_render_traceback() {
        let frames = vec![
            frame(Some("error"), "C", None),
            frame(Some("update"), "Lua", Some(12)),
            frame(None, "main", Some(3)),
        ];
        let text = render(&frames);
        assert_eq!(
            text,
            "stack traceback:\n\t[C]: in function 'error'\n\tgame.lua:12: in function 'update'\n\tgame.lua:3: in main chunk"
        );
    }

    #[test]
    fn test_display_frame() {
        let f = frame(Some("update"), "Lua", Some(12));
        assert_eq!(f.to_string(), "#0 update (global) [Lua] game.lua:12");
    }
}
