use std::cell::RefCell;

use tracing::info;

/// Destination for `trace:write` and `print` output from scripts.
pub trait LogSink {
    fn write(&self, line: &str);
}

/// Forwards script output to `tracing` under the `script` target.
#[derive(Debug, Default)]
pub struct TracingSink;

impl LogSink for TracingSink {
    fn write(&self, line: &str) {
        info!(target: "script", "{}", line);
    }
}

/// Keeps every line, for tests.
#[derive(Debug, Default)]
pub struct CaptureSink {
    lines: RefCell<Vec<String>>,
}

impl CaptureSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lines(&self) -> Vec<String> {
        self.lines.borrow().clone()
    }
}

impl LogSink for CaptureSink {
    fn write(&self, line: &str) {
        self.lines.borrow_mut().push(line.to_string());
    }
}
