// tests/interactive_simulation.rs
// Drives the debugger through a scripted console

use std::sync::Arc;

use script_host::debugger::{BreakpointError, DebugState};
use script_host::platform::{MemoryFiles, ScriptedConsole, Transcript};
use script_host::{CallMode, HostConfig, HostIo, InterpreterHost};

const CALC: &str = r#"function add(a, b)
  local sum = a + b
  return sum
end

-- doubles the sum
function run()
  local x = add(1, 2)
  local y = x * 2
  return y
end
"#;

const BRANCH: &str = "function f(x)\n  if x then\n    return 1\n  else\n    return 2\n  end\nend";

#[cfg(test)]
mod interactive_tests {
    use super::*;

    // Debug host with CALC loaded as "calc.lua"
    fn debug_host(inputs: &[&str], break_on_entry: bool) -> (InterpreterHost, Transcript) {
        let console = ScriptedConsole::new(inputs.iter().copied());
        let transcript = console.transcript();
        let config = HostConfig {
            debug: true,
            break_on_entry,
            ..HostConfig::default()
        };
        let host = InterpreterHost::new(
            config,
            HostIo {
                files: Arc::new(MemoryFiles::new()),
                console: Box::new(console),
            },
        )
        .expect("host should start");
        host.load_source("calc.lua", CALC.as_bytes(), CallMode::Protected)
            .expect("calc.lua should load");
        (host, transcript)
    }

    fn lines(transcript: &Transcript) -> Vec<String> {
        transcript.borrow().clone()
    }

    fn breaks_at(transcript: &Transcript, reason: &str) -> Vec<String> {
        let prefix = format!("\n🔍 Break ({}) at ", reason);
        lines(transcript)
            .iter()
            .filter_map(|l| l.strip_prefix(&prefix).map(str::to_string))
            .collect()
    }

    #[test]
    fn test_breakpoint_then_backtrace() {
        let (host, transcript) = debug_host(&["bt", "cont"], false);
        host.debugger().set_breakpoint("calc.lua", 2).unwrap();

        let result: i64 = host.call_global_function("run", 100_000, ()).unwrap();
        assert_eq!(result, 6);
        assert_eq!(host.debugger().break_count(), 1);

        assert_eq!(breaks_at(&transcript, "breakpoint"), vec!["calc.lua:2"]);
        let output = lines(&transcript);
        assert!(
            output.iter().any(|l| l.contains("#0 add") && l.contains("calc.lua:2")),
            "frame 0 should be add: {:?}",
            output
        );
        assert!(
            output.iter().any(|l| l.contains("#1 ") && l.contains("calc.lua:8")),
            "frame 1 should be the caller: {:?}",
            output
        );
        assert!(output.iter().any(|l| l.contains("Continuing")));
    }

    #[test]
    fn test_invalid_breakpoints_rejected() {
        let (host, _) = debug_host(&[], false);
        let debugger = host.debugger();

        assert_eq!(
            debugger.set_breakpoint("calc.lua", 5),
            Err(BreakpointError::InvalidLine {
                chunk: "calc.lua".to_string(),
                line: 5
            }),
            "blank line"
        );
        assert!(debugger.set_breakpoint("calc.lua", 6).is_err(), "comment line");
        assert!(debugger.set_breakpoint("calc.lua", 400).is_err(), "past the end");
        assert_eq!(
            debugger.set_breakpoint("other.lua", 1),
            Err(BreakpointError::UnknownChunk("other.lua".to_string()))
        );
        assert_eq!(debugger.breakpoints("calc.lua"), Some(vec![]));
    }

    #[test]
    fn test_valid_lines_skip_blank_and_comments() {
        let (host, _) = debug_host(&[], false);
        assert_eq!(
            host.debugger().valid_lines("calc.lua"),
            Some(vec![1, 2, 3, 4, 7, 8, 9, 10, 11])
        );
    }

    #[test]
    fn test_keyword_only_lines_rejected() {
        let (host, transcript) = debug_host(&["cont"], false);
        host.load_source("branch.lua", BRANCH.as_bytes(), CallMode::Protected)
            .expect("branch.lua should load");
        let debugger = host.debugger();

        assert_eq!(debugger.valid_lines("branch.lua"), Some(vec![1, 2, 3, 5, 7]));
        assert!(debugger.set_breakpoint("branch.lua", 4).is_err(), "else line");
        assert!(debugger.set_breakpoint("branch.lua", 6).is_err(), "end of if");

        debugger.set_breakpoint("branch.lua", 5).unwrap();
        let result: i64 = host.call_global_function("f", 100_000, false).unwrap();
        assert_eq!(result, 2);
        assert_eq!(host.debugger().break_count(), 1);
        assert_eq!(breaks_at(&transcript, "breakpoint"), vec!["branch.lua:5"]);
    }

    #[test]
    fn test_console_eof_continues() {
        let (host, transcript) = debug_host(&[], false);
        host.debugger().set_breakpoint("calc.lua", 8).unwrap();

        let result: i64 = host.call_global_function("run", 100_000, ()).unwrap();
        assert_eq!(result, 6);
        assert!(!host.debugger().is_interactive(), "debugger should detach");
        assert_eq!(breaks_at(&transcript, "breakpoint"), vec!["calc.lua:8"]);

        // Later breakpoints are ignored once detached.
        let again: i64 = host.call_global_function("run", 100_000, ()).unwrap();
        assert_eq!(again, 6);
        assert_eq!(host.debugger().break_count(), 1);
        assert_eq!(host.debugger().state(), DebugState::Continue);
    }

    #[test]
    fn test_break_on_entry() {
        let (host, transcript) = debug_host(&["cont", "cont"], true);
        let result: i64 = host.call_global_function("run", 100_000, ()).unwrap();
        assert_eq!(result, 6);

        // One stop for the chunk itself, one for run().
        assert_eq!(host.debugger().break_count(), 2);
        assert_eq!(breaks_at(&transcript, "entry").len(), 2);
    }

    #[test]
    fn test_step_in_then_out() {
        let (host, transcript) = debug_host(&["si", "sout", "cont"], false);
        host.debugger().set_breakpoint("calc.lua", 8).unwrap();

        let result: i64 = host.call_global_function("run", 100_000, ()).unwrap();
        assert_eq!(result, 6);

        let steps = breaks_at(&transcript, "step");
        assert_eq!(steps.len(), 2, "steps: {:?}", steps);
        assert_eq!(steps[0], "calc.lua:2", "si should enter add");
        assert_eq!(steps[1], "calc.lua:9", "sout should land back in run");
    }

    #[test]
    fn test_step_over_skips_call() {
        let (host, transcript) = debug_host(&["so", "so", "cont"], false);
        host.debugger().set_breakpoint("calc.lua", 8).unwrap();

        let result: i64 = host.call_global_function("run", 100_000, ()).unwrap();
        assert_eq!(result, 6);
        assert_eq!(breaks_at(&transcript, "step"), vec!["calc.lua:9", "calc.lua:10"]);
    }

    #[test]
    fn test_breakpoint_commands() {
        let (host, transcript) = debug_host(&["bp set 10", "bp set 5", "bp", "cont", "cont"], false);
        host.debugger().set_breakpoint("calc.lua", 8).unwrap();

        let result: i64 = host.call_global_function("run", 100_000, ()).unwrap();
        assert_eq!(result, 6);

        let output = lines(&transcript);
        assert!(output.iter().any(|l| l == "Breakpoint set at calc.lua:10"), "{:?}", output);
        assert!(output.iter().any(|l| l.starts_with("❌") && l.contains("line 5")), "{:?}", output);
        assert!(output.iter().any(|l| l == "  calc.lua:8"));
        assert!(output.iter().any(|l| l == "  calc.lua:10"));
        assert_eq!(breaks_at(&transcript, "breakpoint"), vec!["calc.lua:8", "calc.lua:10"]);
        assert_eq!(host.debugger().breakpoints("calc.lua"), Some(vec![8, 10]));
    }

    #[test]
    fn test_source_listing_and_frames() {
        let (host, transcript) = debug_host(&["src 1", "fr 1", "src 0", "help bt", "frobnicate", "cont"], false);
        host.debugger().set_breakpoint("calc.lua", 2).unwrap();
        let _: i64 = host.call_global_function("run", 100_000, ()).unwrap();

        let output = lines(&transcript);
        assert!(output.iter().any(|l| l.starts_with(">*   2")), "{:?}", output);
        assert!(output.iter().any(|l| l.starts_with("     1")), "{:?}", output);
        assert!(output.iter().any(|l| l.starts_with("     3")), "{:?}", output);
        assert!(output.iter().any(|l| l.starts_with("#1 ") && l.ends_with("calc.lua:8")), "{:?}", output);
        assert!(output.iter().any(|l| l.starts_with(">    8")), "{:?}", output);
        assert!(output.iter().any(|l| l == "bt - Show the call stack"));
        assert!(output.iter().any(|l| l.contains("Unknown command: frobnicate")));
    }
}
