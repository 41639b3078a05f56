use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum BreakpointError {
    #[error("no chunk named {0}")]
    UnknownChunk(String),

    #[error("line {line} of {chunk} is not a valid breakpoint location")]
    InvalidLine { chunk: String, line: usize },
}

/// Source and breakpoint flags for one loaded chunk. Lines are 1-based.
#[derive(Debug, Clone)]
pub struct ChunkInfo {
    lines: Vec<String>,
    valid: Vec<bool>,
    breakpoints: Vec<bool>,
}

impl ChunkInfo {
    /// `active_lines` are the lines the compiled chunk has instructions on.
    pub fn new(source: &str, active_lines: impl IntoIterator<Item = usize>) -> Self {
        let lines: Vec<String> = source.lines().map(str::to_string).collect();
        let mut valid = vec![false; lines.len()];
        for line in active_lines {
            if let Some(flag) = line.checked_sub(1).and_then(|i| valid.get_mut(i)) {
                *flag = true;
            }
        }
        let breakpoints = vec![false; lines.len()];
        Self {
            lines,
            valid,
            breakpoints,
        }
    }

    pub fn line_count(&self) -> usize {
        self.lines.len()
    }

    pub fn line(&self, line: usize) -> Option<&str> {
        self.lines.get(line.checked_sub(1)?).map(String::as_str)
    }

    pub fn is_valid(&self, line: usize) -> bool {
        line.checked_sub(1)
            .and_then(|i| self.valid.get(i).copied())
            .unwrap_or(false)
    }

    pub fn has_breakpoint(&self, line: usize) -> bool {
        line.checked_sub(1)
            .and_then(|i| self.breakpoints.get(i).copied())
            .unwrap_or(false)
    }

    /// Returns false if the line cannot hold a breakpoint.
    pub fn set_breakpoint(&mut self, line: usize) -> bool {
        if !self.is_valid(line) {
            return false;
        }
        self.breakpoints[line - 1] = true;
        true
    }

    /// Returns whether a breakpoint was actually removed.
    pub fn clear_breakpoint(&mut self, line: usize) -> bool {
        match line.checked_sub(1).and_then(|i| self.breakpoints.get_mut(i)) {
            Some(flag) => std::mem::replace(flag, false),
            None => false,
        }
    }

    pub fn valid_lines(&self) -> Vec<usize> {
        numbered(&self.valid)
    }

    pub fn breakpoints(&self) -> Vec<usize> {
        numbered(&self.breakpoints)
    }
}

fn numbered(flags: &[bool]) -> Vec<usize> {
    flags
        .iter()
        .enumerate()
        .filter(|&(_, &set)| set)
        .map(|(i, _)| i + 1)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_breakpoint_only_on_valid_lines() {
        let mut chunk = ChunkInfo::new("local a = 1\n-- note\n\nreturn a", [1, 4, 9]);
        assert_eq!(chunk.valid_lines(), vec![1, 4], "lines past the end are dropped");
        assert!(chunk.set_breakpoint(1));
        assert!(!chunk.set_breakpoint(2), "comment line accepted");
        assert!(!chunk.set_breakpoint(3), "blank line accepted");
        assert!(!chunk.set_breakpoint(0));
        assert!(!chunk.set_breakpoint(99));
        assert!(chunk.set_breakpoint(4));
        assert_eq!(chunk.breakpoints(), vec![1, 4]);

        assert!(chunk.clear_breakpoint(1));
        assert!(!chunk.clear_breakpoint(1));
        assert_eq!(chunk.breakpoints(), vec![4]);
    }
}
