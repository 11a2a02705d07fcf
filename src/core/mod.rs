//! Core modules for ExamGuard

pub mod api;
pub mod arbiter;
pub mod debounce;
pub mod engine;
pub mod lifecycle;
pub mod ports;
pub mod presence;
pub mod sampler;
pub mod timer;
pub mod voice;
pub mod window;

pub use api::{create_router, run_server, AppState};
pub use arbiter::{results_url, FinalizeOutcome, SubmissionArbiter};
pub use debounce::DebounceRegistry;
pub use engine::{
    EngineEvent, EngineHandle, EngineServices, EngineSnapshot, EngineStatus, ExamSetup,
    ModalAction, Producers, SessionEngine,
};
pub use lifecycle::{Lifecycle, SessionClock};
pub use ports::{
    AmplitudeSource, FileMarkerStore, FrameAnalyzer, FrameSource, MarkerStore, MemoryMarkerStore,
    PcmAmplitudeSource, PcmSource, SessionService, VoiceTelemetry,
};
pub use presence::{PresenceMonitor, PresenceOutcome};
pub use timer::{parse_duration_seconds, DurationInput, ExamTimer};
pub use voice::{VadPhase, VoiceDetector, VoiceOutcome};
pub use window::{FocusOutcome, FocusState, FocusViolationCounter};
