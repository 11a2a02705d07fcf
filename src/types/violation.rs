//! Violation identities and records

use serde::{Deserialize, Serialize};

use crate::types::{HeadDirection, Timestamp};

/// Source-specific violation class
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ViolationKind {
    NoPerson,
    MultiplePersons,
    HeadPose,
    Voice,
    WindowChange,
}

impl ViolationKind {
    pub fn code(&self) -> &'static str {
        match self {
            Self::NoPerson => "NO_PERSON",
            Self::MultiplePersons => "MULTIPLE_PERSONS",
            Self::HeadPose => "HEAD_POSE",
            Self::Voice => "VOICE",
            Self::WindowChange => "WINDOW_CHANGE",
        }
    }

    /// Registry key for a `kind + message` identity
    pub fn key(&self, message: &str) -> String {
        format!("{}:{}", self.code(), message)
    }
}

impl std::fmt::Display for ViolationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.code())
    }
}

pub const MSG_NO_PERSON: &str = "Person not present";
pub const MSG_MULTIPLE_PERSONS: &str = "Multiple persons detected";
pub const MSG_REMAIN_SILENT: &str = "Please remain silent";
pub const MSG_LOOKING_LEFT: &str = "Looking left — keep your head straight";
pub const MSG_LOOKING_RIGHT: &str = "Looking right — keep your head straight";

/// Gaze message for an off-center direction
pub fn gaze_message(direction: HeadDirection) -> Option<&'static str> {
    match direction {
        HeadDirection::Left => Some(MSG_LOOKING_LEFT),
        HeadDirection::Right => Some(MSG_LOOKING_RIGHT),
        HeadDirection::Center => None,
    }
}

/// A surfaced violation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Violation {
    pub kind: ViolationKind,
    pub message: String,
    /// First time this identity was allowed through
    pub first_seen_at: Timestamp,
    /// Identical violations are suppressed until this time
    pub last_suppressed_until: Timestamp,
}

impl Violation {
    pub fn key(&self) -> String {
        self.kind.key(&self.message)
    }
}
