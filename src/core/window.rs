//! Window-focus violation counter
//!
//! State transitions:
//! - IDLE → FIRST_OFFENSE_CONSUMED: first qualifying event, silently ignored
//! - FIRST_OFFENSE_CONSUMED → ESCALATING: second qualifying event, count = 1
//! - ESCALATING → SUBMITTED: count reaches the ceiling
//!
//! A single debounce window covers every kind, so a blur that fires
//! alongside a visibility change counts once.

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::config::EngineConfig;
use crate::types::{FocusEvent, FocusEventKind, Timestamp};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FocusState {
    Idle,
    FirstOffenseConsumed,
    Escalating,
    Submitted,
}

impl std::fmt::Display for FocusState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            FocusState::Idle => "IDLE",
            FocusState::FirstOffenseConsumed => "FIRST_OFFENSE_CONSUMED",
            FocusState::Escalating => "ESCALATING",
            FocusState::Submitted => "SUBMITTED",
        };
        write!(f, "{}", name)
    }
}

/// What the engine should do with one focus event
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FocusOutcome {
    /// Resize below tolerance, or counter already submitted
    NotQualifying,
    /// Inside the global debounce window
    Debounced,
    /// The one free pass
    GraceConsumed,
    /// Counted strike below the ceiling; dismiss the modal after the delay
    Strike {
        count: u32,
        message: String,
        dismiss_after_ms: u64,
    },
    /// Ceiling reached; submit after the delay
    Ceiling {
        count: u32,
        message: String,
        submit_after_ms: u64,
    },
}

pub const CEILING_TITLE: &str = "Test Submitted";
pub const CEILING_MESSAGE: &str = "Too many window changes. Submitting the test now.";
pub const STRIKE_TITLE: &str = "Attention";

#[derive(Debug)]
pub struct FocusViolationCounter {
    state: FocusState,
    count: u32,
    grace_used: bool,
    last_event_at: Option<Timestamp>,
    last_size: Option<(u32, u32)>,
    debounce_ms: u64,
    ceiling: u32,
    submit_delay_ms: u64,
    dismiss_delay_ms: u64,
    resize_tolerance_px: u32,
}

impl FocusViolationCounter {
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            state: FocusState::Idle,
            count: 0,
            grace_used: false,
            last_event_at: None,
            last_size: None,
            debounce_ms: config.window_debounce_ms,
            ceiling: config.max_window_violations,
            submit_delay_ms: config.window_submit_delay_ms,
            dismiss_delay_ms: config.window_modal_dismiss_ms,
            resize_tolerance_px: config.resize_tolerance_px,
        }
    }

    /// Baseline viewport size; later resizes are compared against it
    pub fn set_viewport(&mut self, width: u32, height: u32) {
        self.last_size = Some((width, height));
    }

    pub fn on_event(&mut self, event: FocusEvent) -> FocusOutcome {
        if self.state == FocusState::Submitted {
            return FocusOutcome::NotQualifying;
        }
        if let FocusEventKind::Resize { width, height } = event.kind {
            if !self.resize_is_meaningful(width, height) {
                return FocusOutcome::NotQualifying;
            }
            self.last_size = Some((width, height));
        }

        let now = event.t;
        if let Some(last) = self.last_event_at {
            if now.saturating_sub(last) < self.debounce_ms {
                return FocusOutcome::Debounced;
            }
        }
        self.last_event_at = Some(now);

        if !self.grace_used {
            self.grace_used = true;
            self.state = FocusState::FirstOffenseConsumed;
            info!(reason = event.kind.reason(), "window change ignored (first occurrence)");
            return FocusOutcome::GraceConsumed;
        }

        self.count += 1;
        let message = format!(
            "{}. Violation {} of {}.",
            event.kind.reason(),
            self.count,
            self.ceiling
        );
        warn!(count = self.count, ceiling = self.ceiling, "window change violation");

        if self.count >= self.ceiling {
            self.state = FocusState::Submitted;
            FocusOutcome::Ceiling {
                count: self.count,
                message,
                submit_after_ms: self.submit_delay_ms,
            }
        } else {
            self.state = FocusState::Escalating;
            FocusOutcome::Strike {
                count: self.count,
                message,
                dismiss_after_ms: self.dismiss_delay_ms,
            }
        }
    }

    /// Unknown baseline counts as a change
    fn resize_is_meaningful(&self, width: u32, height: u32) -> bool {
        match self.last_size {
            Some((w, h)) => {
                w.abs_diff(width) > self.resize_tolerance_px
                    || h.abs_diff(height) > self.resize_tolerance_px
            }
            None => true,
        }
    }

    pub fn state(&self) -> FocusState {
        self.state
    }

    pub fn count(&self) -> u32 {
        self.count
    }

    pub fn grace_used(&self) -> bool {
        self.grace_used
    }

    pub fn ceiling(&self) -> u32 {
        self.ceiling
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn blur(t: Timestamp) -> FocusEvent {
        FocusEvent {
            kind: FocusEventKind::WindowBlur,
            t,
        }
    }

    #[test]
    fn test_first_event_is_free() {
        let mut counter = FocusViolationCounter::new(&EngineConfig::default());
        assert_eq!(counter.on_event(blur(0)), FocusOutcome::GraceConsumed);
        assert_eq!(counter.count(), 0);
        assert_eq!(counter.state(), FocusState::FirstOffenseConsumed);
    }

    #[test]
    fn test_global_debounce_across_kinds() {
        let mut counter = FocusViolationCounter::new(&EngineConfig::default());
        counter.on_event(blur(0));
        let hidden = FocusEvent {
            kind: FocusEventKind::TabHidden,
            t: 400,
        };
        assert_eq!(counter.on_event(hidden), FocusOutcome::Debounced);
        assert_eq!(counter.count(), 0);
    }

    #[test]
    fn test_strike_message() {
        let mut counter = FocusViolationCounter::new(&EngineConfig::default());
        counter.on_event(blur(0));
        match counter.on_event(blur(1000)) {
            FocusOutcome::Strike { count, message, dismiss_after_ms } => {
                assert_eq!(count, 1);
                assert_eq!(message, "Window lost focus. Violation 1 of 3.");
                assert_eq!(dismiss_after_ms, 6000);
            }
            other => panic!("expected strike, got {:?}", other),
        }
        assert_eq!(counter.state(), FocusState::Escalating);
    }

    #[test]
    fn test_small_resize_ignored() {
        let mut counter = FocusViolationCounter::new(&EngineConfig::default());
        counter.set_viewport(1280, 720);
        let nudge = FocusEvent {
            kind: FocusEventKind::Resize { width: 1290, height: 715 },
            t: 0,
        };
        assert_eq!(counter.on_event(nudge), FocusOutcome::NotQualifying);
        assert!(!counter.grace_used());

        let shrink = FocusEvent {
            kind: FocusEventKind::Resize { width: 800, height: 600 },
            t: 10,
        };
        assert_eq!(counter.on_event(shrink), FocusOutcome::GraceConsumed);
    }

    #[test]
    fn test_submitted_is_terminal() {
        let mut counter = FocusViolationCounter::new(&EngineConfig::default());
        for i in 0..4 {
            counter.on_event(blur(i * 1000));
        }
        assert_eq!(counter.state(), FocusState::Submitted);
        assert_eq!(counter.on_event(blur(10_000)), FocusOutcome::NotQualifying);
        assert_eq!(counter.count(), 3);
    }
}
