//! Presence and head-pose monitor
//!
//! Per detection:
//! - 0 faces → "Person not present"
//! - >1 faces → "Multiple persons detected"
//! - head direction changed → reset hold clock, no gaze action
//! - same off-center direction held ≥ hold → gaze violation
//!
//! Presence and gaze are evaluated independently on every frame.

use tracing::debug;

use crate::config::EngineConfig;
use crate::core::DebounceRegistry;
use crate::types::{
    gaze_message, BoundingBox, FrameDetection, HeadDirection, Timestamp, Violation, ViolationKind,
    MSG_MULTIPLE_PERSONS, MSG_NO_PERSON,
};

/// How long the current direction has been observed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeadPoseHold {
    pub current_direction: HeadDirection,
    pub since: Timestamp,
}

impl Default for HeadPoseHold {
    fn default() -> Self {
        Self {
            current_direction: HeadDirection::Center,
            since: 0,
        }
    }
}

/// Result of one detection
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PresenceOutcome {
    pub violations: Vec<Violation>,
    /// Render collaborator should highlight the faces
    pub attention: bool,
    pub face_count: usize,
    pub faces: Vec<BoundingBox>,
}

#[derive(Debug)]
pub struct PresenceMonitor {
    hold: HeadPoseHold,
    hold_ms: u64,
    cooldown_ms: u64,
}

impl PresenceMonitor {
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            hold: HeadPoseHold::default(),
            hold_ms: config.head_hold_ms,
            cooldown_ms: config.violation_cooldown_ms,
        }
    }

    pub fn observe(
        &mut self,
        detection: &FrameDetection,
        registry: &mut DebounceRegistry,
    ) -> PresenceOutcome {
        let now = detection.t;
        let face_count = detection.faces.len();
        let mut violations = Vec::new();

        let presence = match face_count {
            0 => Some((ViolationKind::NoPerson, MSG_NO_PERSON)),
            1 => None,
            _ => Some((ViolationKind::MultiplePersons, MSG_MULTIPLE_PERSONS)),
        };
        if let Some((kind, message)) = presence {
            if let Some(v) = registry.raise(kind, message, now, self.cooldown_ms) {
                violations.push(v);
            }
        }

        let direction = detection.head_direction;
        if direction != self.hold.current_direction {
            debug!(from = %self.hold.current_direction, to = %direction, "head direction changed");
            self.hold = HeadPoseHold {
                current_direction: direction,
                since: now,
            };
        } else if self.gaze_sustained(now) {
            if let Some(message) = gaze_message(direction) {
                if let Some(v) = registry.raise(ViolationKind::HeadPose, message, now, self.cooldown_ms)
                {
                    violations.push(v);
                }
            }
        }

        PresenceOutcome {
            violations,
            attention: face_count != 1 || self.gaze_sustained(now),
            face_count,
            faces: detection.faces.clone(),
        }
    }

    /// Off-center direction held for at least the hold interval
    fn gaze_sustained(&self, now: Timestamp) -> bool {
        self.hold.current_direction.is_off_center()
            && now.saturating_sub(self.hold.since) >= self.hold_ms
    }

    pub fn hold(&self) -> HeadPoseHold {
        self.hold
    }
}
