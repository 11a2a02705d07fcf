//! Voice telemetry events

use serde::{Deserialize, Serialize};

/// Audit event kinds sent to the voice telemetry sink
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VoiceEventKind {
    VoiceStart,
    VoiceStop,
    Periodic,
}

impl VoiceEventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            VoiceEventKind::VoiceStart => "voice_start",
            VoiceEventKind::VoiceStop => "voice_stop",
            VoiceEventKind::Periodic => "periodic",
        }
    }
}

/// One telemetry event produced by the voice detector
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VoiceTelemetryEvent {
    pub kind: VoiceEventKind,
    pub rms: f64,
    /// Episode duration in seconds, only on `voice_stop`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration: Option<f64>,
}
