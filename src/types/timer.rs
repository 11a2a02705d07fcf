//! Timer display classification

use serde::{Deserialize, Serialize};

use crate::{TIMER_DANGER_SECS, TIMER_WARNING_SECS};

/// Display bucket for the remaining exam time
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimerClass {
    /// More than five minutes left
    Normal,
    /// Between one and five minutes left
    Warning,
    /// One minute or less
    Danger,
    /// No valid duration was supplied
    Unknown,
}

impl TimerClass {
    /// Classify a remaining-seconds value
    pub fn classify(remaining_seconds: i64) -> Self {
        if remaining_seconds <= TIMER_DANGER_SECS {
            TimerClass::Danger
        } else if remaining_seconds <= TIMER_WARNING_SECS {
            TimerClass::Warning
        } else {
            TimerClass::Normal
        }
    }

    /// Get ANSI color code for terminal display
    pub fn color_code(&self) -> &'static str {
        match self {
            TimerClass::Normal => "\x1b[32m",  // Green
            TimerClass::Warning => "\x1b[33m", // Orange/Yellow
            TimerClass::Danger => "\x1b[31m",  // Red
            TimerClass::Unknown => "\x1b[90m", // Gray
        }
    }

    /// Reset ANSI color
    pub fn color_reset() -> &'static str {
        "\x1b[0m"
    }
}

impl std::fmt::Display for TimerClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            TimerClass::Normal => "normal",
            TimerClass::Warning => "warning",
            TimerClass::Danger => "danger",
            TimerClass::Unknown => "unknown",
        };
        write!(f, "{}", name)
    }
}

/// Text and bucket the presentation layer renders
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimerDisplay {
    pub text: String,
    pub class: TimerClass,
    pub remaining_seconds: Option<i64>,
}

impl TimerDisplay {
    pub fn unknown() -> Self {
        Self {
            text: "--:--".to_string(),
            class: TimerClass::Unknown,
            remaining_seconds: None,
        }
    }

    pub fn for_remaining(seconds: i64) -> Self {
        let clamped = seconds.max(0);
        Self {
            text: format_mm_ss(clamped),
            class: TimerClass::classify(clamped),
            remaining_seconds: Some(clamped),
        }
    }
}

/// `MM:SS`, minutes are not wrapped into hours
pub fn format_mm_ss(seconds: i64) -> String {
    let seconds = seconds.max(0);
    format!("{:02}:{:02}", seconds / 60, seconds % 60)
}
