//! Engine tunables
//!
//! Every field defaults to the crate-level constant of the same name, so a
//! config file only needs to mention what it overrides.

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::ConfigError;
use crate::{
    CALIBRATION_MULTIPLIER, CALIBRATION_SAMPLE_MS, CALIBRATION_WINDOW_MS,
    DEFAULT_EXAM_DURATION_MINUTES, FRAME_INTERVAL_MS, HEAD_HOLD_MS, MAX_VOICE_WARNINGS,
    MAX_WINDOW_VIOLATIONS, RESIZE_TOLERANCE_PX, VIOLATION_COOLDOWN_MS, VOICE_HOLD_MS,
    VOICE_THRESHOLD_FLOOR, VOICE_TICK_MS, WINDOW_DEBOUNCE_MS, WINDOW_MODAL_DISMISS_MS,
    WINDOW_SUBMIT_DELAY_MS,
};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub violation_cooldown_ms: u64,

    pub calibration_window_ms: u64,
    pub calibration_sample_ms: u64,
    pub voice_threshold_floor: f64,
    pub calibration_multiplier: f64,
    pub voice_tick_ms: u64,
    pub voice_hold_ms: u64,
    pub max_voice_warnings: u32,

    pub head_hold_ms: u64,
    pub frame_interval_ms: u64,

    pub window_debounce_ms: u64,
    pub max_window_violations: u32,
    pub window_submit_delay_ms: u64,
    pub window_modal_dismiss_ms: u64,
    pub resize_tolerance_px: u32,

    pub default_exam_duration_minutes: f64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            violation_cooldown_ms: VIOLATION_COOLDOWN_MS,
            calibration_window_ms: CALIBRATION_WINDOW_MS,
            calibration_sample_ms: CALIBRATION_SAMPLE_MS,
            voice_threshold_floor: VOICE_THRESHOLD_FLOOR,
            calibration_multiplier: CALIBRATION_MULTIPLIER,
            voice_tick_ms: VOICE_TICK_MS,
            voice_hold_ms: VOICE_HOLD_MS,
            max_voice_warnings: MAX_VOICE_WARNINGS,
            head_hold_ms: HEAD_HOLD_MS,
            frame_interval_ms: FRAME_INTERVAL_MS,
            window_debounce_ms: WINDOW_DEBOUNCE_MS,
            max_window_violations: MAX_WINDOW_VIOLATIONS,
            window_submit_delay_ms: WINDOW_SUBMIT_DELAY_MS,
            window_modal_dismiss_ms: WINDOW_MODAL_DISMISS_MS,
            resize_tolerance_px: RESIZE_TOLERANCE_PX,
            default_exam_duration_minutes: DEFAULT_EXAM_DURATION_MINUTES,
        }
    }
}

impl EngineConfig {
    /// Load from a JSON file and validate
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: EngineConfig = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values the loops cannot run with
    pub fn validate(&self) -> Result<(), ConfigError> {
        let cadences = [
            ("calibration_sample_ms", self.calibration_sample_ms),
            ("voice_tick_ms", self.voice_tick_ms),
            ("frame_interval_ms", self.frame_interval_ms),
        ];
        for (name, value) in cadences {
            if value == 0 {
                return Err(ConfigError::Invalid(format!("{name} must be greater than zero")));
            }
        }
        if !(self.calibration_multiplier.is_finite() && self.calibration_multiplier > 0.0) {
            return Err(ConfigError::Invalid(
                "calibration_multiplier must be a positive number".to_string(),
            ));
        }
        if !(self.voice_threshold_floor.is_finite() && self.voice_threshold_floor >= 0.0) {
            return Err(ConfigError::Invalid(
                "voice_threshold_floor must be a non-negative number".to_string(),
            ));
        }
        if self.max_window_violations == 0 {
            return Err(ConfigError::Invalid(
                "max_window_violations must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults_match_constants() {
        let config = EngineConfig::default();
        assert_eq!(config.violation_cooldown_ms, 5000);
        assert_eq!(config.max_voice_warnings, 5);
        assert_eq!(config.max_window_violations, 3);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"head_hold_ms": 1500, "calibration_multiplier": 3.0}}"#).unwrap();

        let config = EngineConfig::load_from(file.path()).unwrap();
        assert_eq!(config.head_hold_ms, 1500);
        assert_eq!(config.calibration_multiplier, 3.0);
        assert_eq!(config.voice_hold_ms, VOICE_HOLD_MS);
    }

    #[test]
    fn test_zero_cadence_rejected() {
        let config = EngineConfig {
            frame_interval_ms: 0,
            ..EngineConfig::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_malformed_file_is_parse_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "not json").unwrap();
        assert!(matches!(
            EngineConfig::load_from(file.path()),
            Err(ConfigError::Parse(_))
        ));
    }
}
