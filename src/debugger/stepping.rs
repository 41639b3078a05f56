/// Where the hook controller is in its break/step cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DebugState {
    #[default]
    Continue,
    /// Break on the first Lua function entered by the next protected call.
    InitBreak,
    StepIn,
    StepOut,
    StepOver,
}

/// Why the debugger stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakReason {
    Entry,
    Breakpoint,
    Step,
}

impl BreakReason {
    pub fn label(self) -> &'static str {
        match self {
            BreakReason::Entry => "entry",
            BreakReason::Breakpoint => "breakpoint",
            BreakReason::Step => "step",
        }
    }
}
