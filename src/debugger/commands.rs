use super::backtrace::stack_depth;
use super::session::BreakSession;
use super::stepping::DebugState;

const DEFAULT_SOURCE_CONTEXT: usize = 5;

/// Whether the command loop keeps prompting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Prompt,
    Done,
}

type Handler = fn(&mut BreakSession<'_>, &[String]) -> Flow;

pub struct Command {
    pub name: &'static str,
    pub usage: &'static str,
    pub summary: &'static str,
    handler: Handler,
}

pub static COMMANDS: &[Command] = &[
    Command {
        name: "help",
        usage: "help [command]",
        summary: "List commands, or describe one",
        handler: cmd_help,
    },
    Command {
        name: "bt",
        usage: "bt",
        summary: "Show the call stack",
        handler: cmd_backtrace,
    },
    Command {
        name: "cont",
        usage: "cont",
        summary: "Resume execution",
        handler: cmd_continue,
    },
    Command {
        name: "fr",
        usage: "fr [n]",
        summary: "Show or select the inspected frame",
        handler: cmd_frame,
    },
    Command {
        name: "src",
        usage: "src [n]",
        summary: "List source around the selected frame, n lines of context",
        handler: cmd_source,
    },
    Command {
        name: "si",
        usage: "si",
        summary: "Step into the next line",
        handler: cmd_step_in,
    },
    Command {
        name: "so",
        usage: "so",
        summary: "Step over calls to the next line",
        handler: cmd_step_over,
    },
    Command {
        name: "sout",
        usage: "sout",
        summary: "Run until the current function returns",
        handler: cmd_step_out,
    },
    Command {
        name: "bp",
        usage: "bp [list | set <line> [chunk] | clear <line> [chunk]]",
        summary: "List, set or clear breakpoints",
        handler: cmd_breakpoint,
    },
];

/// Split a console line into tokens. `"..."` groups words; unbalanced quotes
/// fall back to plain whitespace splitting.
pub fn tokenize(line: &str) -> Vec<String> {
    let mut lexer = shlex::Shlex::new(line);
    let tokens: Vec<String> = lexer.by_ref().collect();
    if lexer.had_error {
        return line.split_whitespace().map(str::to_string).collect();
    }
    tokens
}

pub fn find(name: &str) -> Option<&'static Command> {
    COMMANDS.iter().find(|c| c.name == name)
}

pub(crate) fn dispatch(session: &mut BreakSession<'_>, tokens: &[String]) -> Flow {
    let Some((name, args)) = tokens.split_first() else {
        return Flow::Prompt;
    };
    match find(name) {
        Some(command) => (command.handler)(session, args),
        None => {
            session.say(format!("❓ Unknown command: {} (try 'help')", name));
            Flow::Prompt
        }
    }
}

fn cmd_help(session: &mut BreakSession<'_>, args: &[String]) -> Flow {
    match args.first() {
        Some(name) => match find(name) {
            Some(command) => {
                session.say(format!("{} - {}", command.usage, command.summary));
            }
            None => session.say(format!("❓ Unknown command: {}", name)),
        },
        None => {
            session.say("Commands:");
            for command in COMMANDS {
                session.say(format!("  {:<50} {}", command.usage, command.summary));
            }
        }
    }
    Flow::Prompt
}

fn cmd_backtrace(session: &mut BreakSession<'_>, _args: &[String]) -> Flow {
    if session.frames.is_empty() {
        session.say("<no frames>");
        return Flow::Prompt;
    }
    let lines: Vec<String> = session
        .frames
        .iter()
        .map(|frame| {
            let marker = if frame.level == session.selected { "→" } else { " " };
            format!("{} {}", marker, frame)
        })
        .collect();
    for line in lines {
        session.say(line);
    }
    Flow::Prompt
}

fn cmd_continue(session: &mut BreakSession<'_>, _args: &[String]) -> Flow {
    session.core.state = DebugState::Continue;
    session.say("▶️  Continuing execution...");
    Flow::Done
}

fn cmd_frame(session: &mut BreakSession<'_>, args: &[String]) -> Flow {
    if let Some(arg) = args.first() {
        match arg.parse::<usize>() {
            Ok(n) if n < session.frames.len() => session.selected = n,
            Ok(n) => {
                session.say(format!("❌ No frame {} (stack has {})", n, session.frames.len()));
                return Flow::Prompt;
            }
            Err(_) => {
                session.say(format!("❌ Invalid frame number: {}", arg));
                return Flow::Prompt;
            }
        }
    }
    let line = match session.selected_frame() {
        Some(frame) => frame.to_string(),
        None => "<no frames>".to_string(),
    };
    session.say(line);
    Flow::Prompt
}

fn cmd_source(session: &mut BreakSession<'_>, args: &[String]) -> Flow {
    let context = match args.first().map(|a| a.parse::<usize>()) {
        None => DEFAULT_SOURCE_CONTEXT,
        Some(Ok(n)) => n,
        Some(Err(_)) => {
            session.say("❌ Usage: src [n]");
            return Flow::Prompt;
        }
    };

    let location = session
        .selected_frame()
        .and_then(|f| f.chunk.clone().zip(f.line));
    let Some((chunk, current)) = location else {
        session.say("❌ No source available for this frame");
        return Flow::Prompt;
    };
    let Some(info) = session.core.chunks.get(&chunk) else {
        session.say(format!("❌ No source loaded for {}", chunk));
        return Flow::Prompt;
    };

    let first = current.saturating_sub(context).max(1);
    let last = (current + context).min(info.line_count());
    let listing: Vec<String> = (first..=last)
        .map(|n| {
            let here = if n == current { '>' } else { ' ' };
            let bp = if info.has_breakpoint(n) { '*' } else { ' ' };
            format!("{}{}{:>4}  {}", here, bp, n, info.line(n).unwrap_or(""))
        })
        .collect();
    for line in listing {
        session.say(line);
    }
    Flow::Prompt
}

fn cmd_step_in(session: &mut BreakSession<'_>, _args: &[String]) -> Flow {
    session.core.state = DebugState::StepIn;
    session.say("⤵️  Step Into");
    Flow::Done
}

fn cmd_step_over(session: &mut BreakSession<'_>, _args: &[String]) -> Flow {
    session.core.state = DebugState::StepOver;
    session.core.step_depth = stack_depth(session.lua);
    session.say("⏭️  Step Over");
    Flow::Done
}

fn cmd_step_out(session: &mut BreakSession<'_>, _args: &[String]) -> Flow {
    session.core.state = DebugState::StepOut;
    session.core.step_depth = stack_depth(session.lua);
    let depth = session.core.step_depth;
    session.say(format!("⤴️  Step Out (from depth {})", depth));
    Flow::Done
}

fn cmd_breakpoint(session: &mut BreakSession<'_>, args: &[String]) -> Flow {
    match args.first().map(String::as_str) {
        None | Some("list") => list_breakpoints(session),
        Some(action @ ("set" | "clear")) => {
            let Some(line_arg) = args.get(1) else {
                session.say(format!("❌ Usage: bp {} <line> [chunk]", action));
                return Flow::Prompt;
            };
            let Ok(line) = line_arg.parse::<usize>() else {
                session.say(format!("❌ Invalid line number: {}", line_arg));
                return Flow::Prompt;
            };
            let chunk = match args.get(2) {
                Some(chunk) => chunk.clone(),
                None => match session.selected_frame().and_then(|f| f.chunk.clone()) {
                    Some(chunk) => chunk,
                    None => {
                        session.say("❌ Selected frame has no chunk; name one explicitly");
                        return Flow::Prompt;
                    }
                },
            };

            let message = if action == "set" {
                match session.core.set_breakpoint(&chunk, line) {
                    Ok(()) => format!("Breakpoint set at {}:{}", chunk, line),
                    Err(e) => format!("❌ {}", e),
                }
            } else {
                match session.core.clear_breakpoint(&chunk, line) {
                    Ok(true) => format!("Breakpoint cleared at {}:{}", chunk, line),
                    Ok(false) => format!("❌ No breakpoint at {}:{}", chunk, line),
                    Err(e) => format!("❌ {}", e),
                }
            };
            session.say(message);
        }
        Some(other) => session.say(format!("❓ Unknown bp action: {}", other)),
    }
    Flow::Prompt
}

fn list_breakpoints(session: &mut BreakSession<'_>) {
    let mut entries: Vec<(String, usize)> = session
        .core
        .chunks
        .iter()
        .flat_map(|(chunk, info)| {
            info.breakpoints()
                .into_iter()
                .map(move |line| (chunk.clone(), line))
        })
        .collect();
    entries.sort();

    if entries.is_empty() {
        session.say("No breakpoints set");
        return;
    }
    for (chunk, line) in entries {
        session.say(format!("  {}:{}", chunk, line));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tokenize_plain_words() {
        assert_eq!(tokenize("bp set 12 main.lua"), vec!["bp", "set", "12", "main.lua"]);
        assert!(tokenize("   ").is_empty());
    }

    #[test]
    fn test_tokenize_quoted_chunk_name() {
        assert_eq!(
            tokenize("bp set 3 \"scripts/my game.lua\""),
            vec!["bp", "set", "3", "scripts/my game.lua"]
        );
    }

    #[test]
    fn test_tokenize_unbalanced_quote_falls_back() {
        assert_eq!(tokenize("help \"bt"), vec!["help", "\"bt"]);
    }

    #[test]
    fn test_every_command_is_findable() {
        for command in COMMANDS {
            assert!(find(command.name).is_some(), "{} missing", command.name);
        }
        assert!(find("quit").is_none());
    }
}
