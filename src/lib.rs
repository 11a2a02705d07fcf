//! ExamGuard: integrity-monitoring engine for unattended exam sessions
//!
//! Signals (frame detections, microphone amplitude, window focus changes,
//! a countdown clock) flow through per-signal state machines into a
//! de-duplicated violation stream that can escalate to forced submission.

pub mod config;
pub mod core;
pub mod error;
pub mod remote;
pub mod telemetry;
pub mod types;

pub use config::EngineConfig;
pub use error::{ConfigError, EngineError, ServiceError};

// =============================================================================
// DEBOUNCE
// =============================================================================

/// Cooldown between two identical user-visible warnings (milliseconds)
pub const VIOLATION_COOLDOWN_MS: u64 = 5000;

// =============================================================================
// VOICE ACTIVITY
// =============================================================================

/// Calibration window length (milliseconds)
pub const CALIBRATION_WINDOW_MS: u64 = 4000;

/// Calibration sampling cadence (milliseconds)
pub const CALIBRATION_SAMPLE_MS: u64 = 140;

/// Lowest threshold calibration may produce
pub const VOICE_THRESHOLD_FLOOR: f64 = 0.01;

/// Mean ambient RMS is scaled by this to get the speech threshold
pub const CALIBRATION_MULTIPLIER: f64 = 2.5;

/// Runtime VAD tick (milliseconds)
pub const VOICE_TICK_MS: u64 = 200;

/// Voice must stay above threshold this long to count (milliseconds)
pub const VOICE_HOLD_MS: u64 = 350;

/// Forced submission once the voice warning count exceeds this
pub const MAX_VOICE_WARNINGS: u32 = 5;

// =============================================================================
// PRESENCE / HEAD POSE
// =============================================================================

/// Off-center head direction must persist this long (milliseconds)
pub const HEAD_HOLD_MS: u64 = 1000;

/// Frame capture cadence (milliseconds)
pub const FRAME_INTERVAL_MS: u64 = 300;

// =============================================================================
// WINDOW FOCUS
// =============================================================================

/// Global debounce across all window-violation kinds (milliseconds)
pub const WINDOW_DEBOUNCE_MS: u64 = 900;

/// Forced submission once the window violation count reaches this
pub const MAX_WINDOW_VIOLATIONS: u32 = 3;

/// Delay between the terminal modal and forced submission (milliseconds)
pub const WINDOW_SUBMIT_DELAY_MS: u64 = 900;

/// Strike modal auto-dismiss delay (milliseconds)
pub const WINDOW_MODAL_DISMISS_MS: u64 = 6000;

/// A resize counts only if a dimension moved by more than this (pixels)
pub const RESIZE_TOLERANCE_PX: u32 = 20;

// =============================================================================
// TIMER
// =============================================================================

/// Timer enters WARNING at or below this many seconds
pub const TIMER_WARNING_SECS: i64 = 300;

/// Timer enters DANGER at or below this many seconds
pub const TIMER_DANGER_SECS: i64 = 60;

/// Exam duration when the caller supplies none (minutes)
pub const DEFAULT_EXAM_DURATION_MINUTES: f64 = 5.0;

// =============================================================================
// SUBMISSION
// =============================================================================

/// Well-known key for the local fallback marker
pub const FALLBACK_MARKER_KEY: &str = "autoSubmitted";

// =============================================================================
// VERSION
// =============================================================================

pub const VERSION: &str = "1.0.0";
