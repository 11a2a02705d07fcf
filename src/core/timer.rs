//! Exam countdown timer
//!
//! Armed from a duration, ticks once per second, fires exactly once at zero
//! and is inert afterwards until re-armed. Without a valid duration the
//! display is `--:--` and nothing ever fires.

use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::types::TimerDisplay;

lazy_static! {
    static ref RE_HMS: Regex = Regex::new(r"^(\d+):(\d{1,2}):(\d{1,2})$").unwrap();
}

/// Exam duration as supplied by the content service
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DurationInput {
    /// Minutes, fractional allowed
    Minutes(f64),
    /// `HH:MM:SS` or a numeric minutes string
    Text(String),
}

/// Total seconds for a duration, `None` when absent or not positive
pub fn parse_duration_seconds(input: &DurationInput) -> Option<i64> {
    let seconds = match input {
        DurationInput::Minutes(minutes) => minutes_to_seconds(*minutes)?,
        DurationInput::Text(raw) => {
            let trimmed = raw.trim();
            if trimmed.is_empty() {
                return None;
            }
            if let Some(caps) = RE_HMS.captures(trimmed) {
                let hours: i64 = caps[1].parse().ok()?;
                let minutes: i64 = caps[2].parse().ok()?;
                let secs: i64 = caps[3].parse().ok()?;
                hours
                    .checked_mul(3600)?
                    .checked_add(minutes * 60 + secs)?
            } else {
                minutes_to_seconds(trimmed.parse::<f64>().ok()?)?
            }
        }
    };
    (seconds > 0).then_some(seconds)
}

fn minutes_to_seconds(minutes: f64) -> Option<i64> {
    if !minutes.is_finite() || minutes <= 0.0 {
        return None;
    }
    Some((minutes * 60.0).floor() as i64)
}

/// Result of one second elapsing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimerTick {
    pub remaining_seconds: i64,
    pub display: TimerDisplay,
    /// True on the single tick that reaches zero
    pub expired: bool,
}

#[derive(Debug, Default)]
pub struct ExamTimer {
    remaining: Option<i64>,
    running: bool,
    fired: bool,
}

impl ExamTimer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Arm (or re-arm) from a duration in seconds
    pub fn arm(&mut self, seconds: Option<i64>) -> TimerDisplay {
        match seconds.filter(|s| *s > 0) {
            Some(total) => {
                self.remaining = Some(total);
                self.running = true;
                self.fired = false;
                info!(seconds = total, "exam timer armed");
                TimerDisplay::for_remaining(total)
            }
            None => {
                self.remaining = None;
                self.running = false;
                self.fired = false;
                TimerDisplay::unknown()
            }
        }
    }

    /// Advance one second; `None` when not running
    pub fn tick(&mut self) -> Option<TimerTick> {
        if !self.running {
            return None;
        }
        let remaining = self.remaining?.saturating_sub(1).max(0);
        self.remaining = Some(remaining);

        let mut expired = false;
        if remaining == 0 {
            self.running = false;
            if !self.fired {
                self.fired = true;
                expired = true;
                info!("exam timer expired");
            }
        }

        Some(TimerTick {
            remaining_seconds: remaining,
            display: TimerDisplay::for_remaining(remaining),
            expired,
        })
    }

    /// Stop without firing; idempotent
    pub fn stop(&mut self) {
        self.running = false;
    }

    pub fn display(&self) -> TimerDisplay {
        match self.remaining {
            Some(r) => TimerDisplay::for_remaining(r),
            None => TimerDisplay::unknown(),
        }
    }

    pub fn remaining(&self) -> Option<i64> {
        self.remaining
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn has_fired(&self) -> bool {
        self.fired
    }
}
