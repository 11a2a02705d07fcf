//! Core types for ExamGuard

mod signals;
mod violation;
mod timer;
mod reason;
mod output;
mod session;
mod telemetry;

pub use signals::{
    AmplitudeSample, BoundingBox, FocusEvent, FocusEventKind, FrameAnalysis, FrameDetection,
    HeadDirection, HeadPose, Signal, Timestamp,
};
pub use violation::{
    gaze_message, Violation, ViolationKind, MSG_LOOKING_LEFT, MSG_LOOKING_RIGHT,
    MSG_MULTIPLE_PERSONS, MSG_NO_PERSON, MSG_REMAIN_SILENT,
};
pub use timer::{format_mm_ss, TimerClass, TimerDisplay};
pub use reason::SubmitReason;
pub use output::UiCommand;
pub use session::{
    Answers, CloseSessionResponse, FallbackMarker, SessionHandle, StartSessionResponse,
};
pub use telemetry::{VoiceEventKind, VoiceTelemetryEvent};
