use std::cell::RefCell;
use std::collections::VecDeque;
use std::io::{self, BufRead, Write};
use std::rc::Rc;

/// Line-oriented console the debugger prompts on.
///
/// `read_line` failing means no console is attached; the debugger treats that
/// as "carry on without me".
pub trait Console {
    fn read_line(&mut self) -> io::Result<String>;
    fn write_line(&mut self, line: &str);
}

/// Prompts on stderr and reads stdin, leaving stdout to the host.
#[derive(Debug, Default)]
pub struct StdConsole;

impl StdConsole {
    pub fn new() -> Self {
        Self
    }
}

impl Console for StdConsole {
    fn read_line(&mut self) -> io::Result<String> {
        eprint!("> ");
        io::stderr().flush()?;

        let mut input = String::new();
        let read = io::stdin().lock().read_line(&mut input)?;
        if read == 0 {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "console input closed",
            ));
        }
        Ok(input.trim_end_matches(['\r', '\n']).to_string())
    }

    fn write_line(&mut self, line: &str) {
        eprintln!("{}", line);
    }
}

/// Everything a [`ScriptedConsole`] printed, shared with whoever built it.
pub type Transcript = Rc<RefCell<Vec<String>>>;

/// Console fed from a fixed list of lines. Runs dry with an EOF error.
#[derive(Debug, Default)]
pub struct ScriptedConsole {
    input: VecDeque<String>,
    output: Transcript,
}

impl ScriptedConsole {
    pub fn new<I, S>(lines: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            input: lines.into_iter().map(Into::into).collect(),
            output: Rc::new(RefCell::new(Vec::new())),
        }
    }

    pub fn transcript(&self) -> Transcript {
        Rc::clone(&self.output)
    }
}

impl Console for ScriptedConsole {
    fn read_line(&mut self) -> io::Result<String> {
        let line = self.input.pop_front().ok_or_else(|| {
            io::Error::new(io::ErrorKind::UnexpectedEof, "scripted input exhausted")
        })?;
        self.output.borrow_mut().push(format!("> {}", line));
        Ok(line)
    }

    fn write_line(&mut self, line: &str) {
        self.output.borrow_mut().push(line.to_string());
    }
}
