//! Voice activity detector with self-calibration
//!
//! Phases:
//! - CALIBRATING: collect ambient RMS samples while the candidate is silent
//! - ARMED: compare each tick's RMS against the calibrated threshold
//!
//! Episode rules while ARMED:
//! - rms > threshold, no episode → start episode, `voice_start`
//! - rms > threshold, episode held ≥ hold → debounced warning + `voice_stop`
//! - rms ≤ threshold, episode active → `voice_stop`, close episode

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::config::EngineConfig;
use crate::core::DebounceRegistry;
use crate::types::{
    AmplitudeSample, Timestamp, Violation, ViolationKind, VoiceEventKind, VoiceTelemetryEvent,
    MSG_REMAIN_SILENT,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum VadPhase {
    Calibrating,
    Armed,
}

/// Speech episode as seen by the detector
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct VoiceEpisode {
    pub active: bool,
    pub started_at: Timestamp,
}

/// Threshold from ambient samples: `max(floor, mean * multiplier)`
///
/// Non-finite and negative samples are discarded; nothing left means floor.
pub fn threshold_from_samples(samples: &[f64], multiplier: f64, floor: f64) -> f64 {
    let valid: Vec<f64> = samples
        .iter()
        .copied()
        .filter(|s| s.is_finite() && *s >= 0.0)
        .collect();
    if valid.is_empty() {
        return floor;
    }
    let mean = valid.iter().sum::<f64>() / valid.len() as f64;
    (mean * multiplier).max(floor)
}

/// Root mean square of a PCM buffer
pub fn rms_of(buffer: &[f32]) -> f64 {
    if buffer.is_empty() {
        return 0.0;
    }
    let sum: f64 = buffer.iter().map(|&s| (s as f64) * (s as f64)).sum();
    (sum / buffer.len() as f64).sqrt()
}

/// Result of one runtime tick
#[derive(Debug, Clone, Default, PartialEq)]
pub struct VoiceOutcome {
    /// Telemetry to send, in order
    pub telemetry: Vec<VoiceTelemetryEvent>,
    /// Warning that passed the debounce
    pub warning: Option<Violation>,
    /// True on the single tick the count first exceeds the ceiling
    pub escalate: bool,
    /// Sample was above threshold
    pub speaking: bool,
}

#[derive(Debug)]
pub struct VoiceDetector {
    phase: VadPhase,
    calibration: Vec<f64>,
    threshold: f64,
    episode: VoiceEpisode,
    warning_count: u32,
    escalated: bool,
    hold_ms: u64,
    cooldown_ms: u64,
    ceiling: u32,
    multiplier: f64,
    floor: f64,
}

impl VoiceDetector {
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            phase: VadPhase::Calibrating,
            calibration: Vec::new(),
            threshold: config.voice_threshold_floor,
            episode: VoiceEpisode::default(),
            warning_count: 0,
            escalated: false,
            hold_ms: config.voice_hold_ms,
            cooldown_ms: config.violation_cooldown_ms,
            ceiling: config.max_voice_warnings,
            multiplier: config.calibration_multiplier,
            floor: config.voice_threshold_floor,
        }
    }

    /// Record one ambient sample; ignored once armed
    pub fn push_calibration(&mut self, rms: f64) {
        if self.phase == VadPhase::Calibrating {
            self.calibration.push(rms);
        }
    }

    /// Close the calibration window and arm the detector
    pub fn finish_calibration(&mut self) -> f64 {
        if self.phase == VadPhase::Armed {
            return self.threshold;
        }
        self.threshold = threshold_from_samples(&self.calibration, self.multiplier, self.floor);
        info!(
            samples = self.calibration.len(),
            threshold = self.threshold,
            "voice calibration complete"
        );
        self.calibration.clear();
        self.phase = VadPhase::Armed;
        self.threshold
    }

    /// Process one runtime sample
    pub fn tick(&mut self, sample: AmplitudeSample, registry: &mut DebounceRegistry) -> VoiceOutcome {
        let mut outcome = VoiceOutcome::default();
        if self.phase != VadPhase::Armed || !sample.rms.is_finite() {
            return outcome;
        }

        let now = sample.t;
        let speaking = sample.rms > self.threshold;
        outcome.speaking = speaking;

        if speaking {
            if !self.episode.active {
                self.episode = VoiceEpisode {
                    active: true,
                    started_at: now,
                };
                debug!(rms = sample.rms, "voice episode started");
                outcome.telemetry.push(self.event(VoiceEventKind::VoiceStart, sample.rms, None));
            } else if now.saturating_sub(self.episode.started_at) >= self.hold_ms {
                if let Some(violation) =
                    registry.raise(ViolationKind::Voice, MSG_REMAIN_SILENT, now, self.cooldown_ms)
                {
                    self.warning_count += 1;
                    info!(count = self.warning_count, "sustained voice warning");
                    outcome.telemetry.push(self.event(
                        VoiceEventKind::VoiceStop,
                        sample.rms,
                        Some(self.episode_secs(now)),
                    ));
                    outcome.warning = Some(violation);

                    if self.warning_count > self.ceiling && !self.escalated {
                        self.escalated = true;
                        outcome.escalate = true;
                    }
                }
            }
            outcome.telemetry.push(self.event(VoiceEventKind::Periodic, sample.rms, None));
        } else if self.episode.active {
            outcome.telemetry.push(self.event(
                VoiceEventKind::VoiceStop,
                sample.rms,
                Some(self.episode_secs(now)),
            ));
            self.episode.active = false;
            debug!("voice episode ended");
        }

        outcome
    }

    fn episode_secs(&self, now: Timestamp) -> f64 {
        now.saturating_sub(self.episode.started_at) as f64 / 1000.0
    }

    fn event(&self, kind: VoiceEventKind, rms: f64, duration: Option<f64>) -> VoiceTelemetryEvent {
        VoiceTelemetryEvent { kind, rms, duration }
    }

    pub fn phase(&self) -> VadPhase {
        self.phase
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    pub fn warning_count(&self) -> u32 {
        self.warning_count
    }

    pub fn episode(&self) -> VoiceEpisode {
        self.episode
    }

    pub fn escalated(&self) -> bool {
        self.escalated
    }
}
