//! Reason codes for session termination

use serde::{Deserialize, Serialize};

/// Why the session is being finalized
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[allow(non_camel_case_types)]
pub enum SubmitReason {
    // =========================================================================
    // S001: Candidate initiated
    // =========================================================================
    /// Submit button pressed
    S001_MANUAL,
    /// Exit chosen on the window-change modal
    S001_MODAL_EXIT,

    // =========================================================================
    // S002: Escalation
    // =========================================================================
    /// Voice warnings exceeded the ceiling
    S002_VOICE_CEILING,
    /// Window violations reached the ceiling
    S002_WINDOW_CEILING,

    // =========================================================================
    // S003: Clock
    // =========================================================================
    /// Countdown reached zero
    S003_TIMER_EXPIRED,
}

impl SubmitReason {
    /// Get the code string (for logging)
    pub fn code(&self) -> &'static str {
        match self {
            Self::S001_MANUAL => "S001_MANUAL",
            Self::S001_MODAL_EXIT => "S001_MODAL_EXIT",
            Self::S002_VOICE_CEILING => "S002_VOICE_CEILING",
            Self::S002_WINDOW_CEILING => "S002_WINDOW_CEILING",
            Self::S003_TIMER_EXPIRED => "S003_TIMER_EXPIRED",
        }
    }

    /// Get human-readable description
    pub fn description(&self) -> &'static str {
        match self {
            Self::S001_MANUAL => "Submitted by candidate",
            Self::S001_MODAL_EXIT => "Candidate chose to exit after a window change",
            Self::S002_VOICE_CEILING => "Too many voice warnings",
            Self::S002_WINDOW_CEILING => "Too many window changes",
            Self::S003_TIMER_EXPIRED => "Time is up",
        }
    }

    /// Engine-initiated submissions fall back to a local terminal state
    pub fn auto_triggered(&self) -> bool {
        !matches!(self, Self::S001_MANUAL)
    }
}

impl std::fmt::Display for SubmitReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.code(), self.description())
    }
}
