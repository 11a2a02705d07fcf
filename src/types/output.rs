//! Commands the engine emits for the presentation layer

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{BoundingBox, TimerClass, TimerDisplay};

/// One instruction for whatever renders the exam UI
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum UiCommand {
    /// Transient warning banner
    Warn { text: String, at: DateTime<Utc> },
    /// Event log line
    Log { text: String, at: DateTime<Utc> },
    ShowModal { title: String, message: String },
    HideModal,
    Timer(TimerDisplay),
    /// Violation and progress counters
    Counters {
        voice_warnings: u32,
        window_violations: u32,
        answered: usize,
        total_questions: usize,
    },
    /// Highlight face boxes (zero/multiple faces or sustained gaze)
    Attention {
        show: bool,
        face_count: usize,
        faces: Vec<BoundingBox>,
    },
    /// Submit control state
    SubmitControl { enabled: bool, label: String },
    /// User-visible error
    Error { message: String },
    /// Server confirmed the submission
    Complete {
        session_id: String,
        results_url: String,
    },
    /// Submitted locally without server confirmation
    LocalComplete { reason: String },
}

impl UiCommand {
    pub fn warn(text: impl Into<String>) -> Self {
        UiCommand::Warn {
            text: text.into(),
            at: Utc::now(),
        }
    }

    pub fn log(text: impl Into<String>) -> Self {
        UiCommand::Log {
            text: text.into(),
            at: Utc::now(),
        }
    }

    pub fn modal(title: impl Into<String>, message: impl Into<String>) -> Self {
        UiCommand::ShowModal {
            title: title.into(),
            message: message.into(),
        }
    }

    /// Terminal states end the command stream
    pub fn is_terminal(&self) -> bool {
        matches!(self, UiCommand::Complete { .. } | UiCommand::LocalComplete { .. })
    }

    /// Format for terminal display (with colors)
    pub fn to_terminal_string(&self) -> String {
        let reset = TimerClass::color_reset();
        match self {
            UiCommand::Warn { text, .. } => format!("\x1b[33m⚠ {}{}", text, reset),
            UiCommand::Error { message } => format!("\x1b[31m✖ {}{}", message, reset),
            UiCommand::ShowModal { title, message } => {
                format!("\x1b[1m[{}]\x1b[0m {}", title, message)
            }
            UiCommand::Timer(display) => format!(
                "{}⏱ {} ({}){}",
                display.class.color_code(),
                display.text,
                display.class,
                reset
            ),
            UiCommand::Complete { .. } | UiCommand::LocalComplete { .. } => {
                format!("\x1b[32m✓ {}{}", self.to_parseable_string(), reset)
            }
            _ => format!("\x1b[90m{}{}", self.to_parseable_string(), reset),
        }
    }

    /// Format for parseable output (no colors)
    pub fn to_parseable_string(&self) -> String {
        match self {
            UiCommand::Warn { text, at } => format!("warn | {} | {}", at.to_rfc3339(), text),
            UiCommand::Log { text, at } => format!("log | {} | {}", at.to_rfc3339(), text),
            UiCommand::ShowModal { title, message } => format!("modal | {} | {}", title, message),
            UiCommand::HideModal => "modal_hide".to_string(),
            UiCommand::Timer(display) => format!("timer | {} | {}", display.text, display.class),
            UiCommand::Counters {
                voice_warnings,
                window_violations,
                answered,
                total_questions,
            } => format!(
                "counters | voice={} | window={} | answered={}/{}",
                voice_warnings, window_violations, answered, total_questions
            ),
            UiCommand::Attention { show, face_count, .. } => {
                format!("attention | show={} | faces={}", show, face_count)
            }
            UiCommand::SubmitControl { enabled, label } => {
                format!("submit | enabled={} | {}", enabled, label)
            }
            UiCommand::Error { message } => format!("error | {}", message),
            UiCommand::Complete { session_id, results_url } => {
                format!("complete | session={} | {}", session_id, results_url)
            }
            UiCommand::LocalComplete { reason } => format!("local_complete | {}", reason),
        }
    }
}
