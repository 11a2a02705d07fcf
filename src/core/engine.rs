//! Session engine: one ordered event queue, every state machine behind it
//!
//! Producers and the presentation layer only send `EngineEvent`s; the engine
//! task is the sole writer of detector, counter, timer and registry state,
//! and the only caller of the submission arbiter.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::EngineConfig;
use crate::core::arbiter::{FinalizeOutcome, SubmissionArbiter};
use crate::core::lifecycle::{Lifecycle, SessionClock};
use crate::core::ports::{
    AmplitudeSource, FrameAnalyzer, FrameSource, MarkerStore, SessionService, VoiceTelemetry,
};
use crate::core::presence::PresenceMonitor;
use crate::core::sampler::{
    run_audio_loop, run_frame_loop, run_timer_clock, spawn_telemetry_forwarder,
};
use crate::core::timer::{parse_duration_seconds, DurationInput, ExamTimer};
use crate::core::voice::{VadPhase, VoiceDetector};
use crate::core::window::{
    FocusOutcome, FocusState, FocusViolationCounter, CEILING_MESSAGE, CEILING_TITLE, STRIKE_TITLE,
};
use crate::core::DebounceRegistry;
use crate::error::EngineError;
use crate::types::{
    AmplitudeSample, Answers, FocusEvent, FrameDetection, SessionHandle, Signal, SubmitReason,
    Timestamp, TimerDisplay, UiCommand, ViolationKind, VoiceTelemetryEvent,
};

const EVENT_QUEUE_CAPACITY: usize = 256;
const UI_CHANNEL_CAPACITY: usize = 256;
const TELEMETRY_QUEUE_CAPACITY: usize = 64;

pub const SUBMIT_LABEL: &str = "Submit Test";

/// Everything the engine reacts to
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum EngineEvent {
    Signal(Signal),
    /// One second of exam time elapsed
    TimerTick,
    AnswerSelected { question_id: String, option: i64 },
    /// Candidate pressed submit; answers merge over the tracked ones
    SubmitRequested {
        #[serde(default)]
        answers: Answers,
    },
    ModalAction { action: ModalAction },
    /// Deferred auto-dismiss of a strike modal
    DismissModal { generation: u64 },
    /// Deferred forced submission
    ForceSubmit { reason: SubmitReason },
    Shutdown,
}

/// Buttons on the window-change modal
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModalAction {
    Continue,
    Exit,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EngineStatus {
    Running,
    Submitting,
    Completed,
    LocalComplete,
    Stopped,
}

impl EngineStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            EngineStatus::Completed | EngineStatus::LocalComplete | EngineStatus::Stopped
        )
    }
}

/// Read-only view for the presentation layer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineSnapshot {
    pub session_id: String,
    pub status: EngineStatus,
    pub vad_phase: VadPhase,
    pub voice_threshold: f64,
    pub voice_warnings: u32,
    pub window_violations: u32,
    pub focus_state: FocusState,
    pub grace_used: bool,
    pub timer: TimerDisplay,
    pub answered: usize,
    pub total_questions: usize,
}

/// External collaborators
#[derive(Clone)]
pub struct EngineServices {
    pub session: Arc<dyn SessionService>,
    pub telemetry: Arc<dyn VoiceTelemetry>,
    pub analyzer: Arc<dyn FrameAnalyzer>,
    pub markers: Arc<dyn MarkerStore>,
}

/// Per-exam inputs
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExamSetup {
    #[serde(default)]
    pub duration: Option<DurationInput>,
    #[serde(default)]
    pub total_questions: usize,
    /// Initial viewport, the baseline for resize detection
    #[serde(default)]
    pub viewport: Option<(u32, u32)>,
}

/// Device sources for the producer loops
#[derive(Default)]
pub struct Producers {
    pub frames: Option<Box<dyn FrameSource>>,
    pub audio: Option<Box<dyn AmplitudeSource>>,
}

/// Cloneable control surface of a running engine
#[derive(Debug, Clone)]
pub struct EngineHandle {
    events: mpsc::Sender<EngineEvent>,
    ui: broadcast::Sender<UiCommand>,
    snapshot: watch::Receiver<EngineSnapshot>,
    lifecycle: Lifecycle,
}

impl EngineHandle {
    pub async fn send(&self, event: EngineEvent) -> Result<(), EngineError> {
        self.events.send(event).await.map_err(|_| EngineError::Stopped)
    }

    /// Enqueue an externally produced signal
    pub async fn push_signal(&self, signal: Signal) -> Result<(), EngineError> {
        self.send(EngineEvent::Signal(signal)).await
    }

    pub fn subscribe(&self) -> broadcast::Receiver<UiCommand> {
        self.ui.subscribe()
    }

    pub fn snapshot(&self) -> EngineSnapshot {
        self.snapshot.borrow().clone()
    }

    pub fn snapshot_watch(&self) -> watch::Receiver<EngineSnapshot> {
        self.snapshot.clone()
    }

    /// Abort immediately; in-flight results are discarded
    pub fn cancel(&self) {
        self.lifecycle.cancel();
        let _ = self.events.try_send(EngineEvent::Shutdown);
    }
}

pub struct SessionEngine {
    config: EngineConfig,
    handle: SessionHandle,
    services: EngineServices,
    registry: DebounceRegistry,
    voice: VoiceDetector,
    presence: PresenceMonitor,
    focus: FocusViolationCounter,
    timer: ExamTimer,
    arbiter: Arc<SubmissionArbiter>,
    lifecycle: Lifecycle,
    clock: SessionClock,
    events_tx: mpsc::Sender<EngineEvent>,
    events_rx: mpsc::Receiver<EngineEvent>,
    ui: broadcast::Sender<UiCommand>,
    snapshot: watch::Sender<EngineSnapshot>,
    telemetry: Option<mpsc::Sender<VoiceTelemetryEvent>>,
    answers: Answers,
    total_questions: usize,
    modal_generation: u64,
    last_attention: Option<(bool, usize)>,
    status: EngineStatus,
}

impl SessionEngine {
    /// Build an engine for one session. Refuses to start without a handle.
    pub fn new(
        config: EngineConfig,
        handle: Option<SessionHandle>,
        services: EngineServices,
        setup: ExamSetup,
    ) -> Result<(Self, EngineHandle), EngineError> {
        let handle = handle.ok_or(EngineError::SessionMissing)?;
        config
            .validate()
            .map_err(|e| EngineError::InvalidConfig(e.to_string()))?;

        let lifecycle = Lifecycle::new();
        let clock = SessionClock::new();
        let (events_tx, events_rx) = mpsc::channel(EVENT_QUEUE_CAPACITY);
        let (ui, _) = broadcast::channel(UI_CHANNEL_CAPACITY);

        let arbiter = Arc::new(SubmissionArbiter::new(
            Some(handle.clone()),
            services.session.clone(),
            services.markers.clone(),
            lifecycle.clone(),
        ));

        let mut focus = FocusViolationCounter::new(&config);
        if let Some((w, h)) = setup.viewport {
            focus.set_viewport(w, h);
        }

        let mut timer = ExamTimer::new();
        let duration = setup
            .duration
            .clone()
            .unwrap_or(DurationInput::Minutes(config.default_exam_duration_minutes));
        timer.arm(parse_duration_seconds(&duration));

        let voice = VoiceDetector::new(&config);
        let initial = EngineSnapshot {
            session_id: handle.session_id.clone(),
            status: EngineStatus::Running,
            vad_phase: voice.phase(),
            voice_threshold: voice.threshold(),
            voice_warnings: 0,
            window_violations: 0,
            focus_state: focus.state(),
            grace_used: false,
            timer: timer.display(),
            answered: 0,
            total_questions: setup.total_questions,
        };
        let (snapshot, snapshot_rx) = watch::channel(initial);

        let engine_handle = EngineHandle {
            events: events_tx.clone(),
            ui: ui.clone(),
            snapshot: snapshot_rx,
            lifecycle: lifecycle.clone(),
        };

        let engine = Self {
            presence: PresenceMonitor::new(&config),
            config,
            handle,
            services,
            registry: DebounceRegistry::new(),
            voice,
            focus,
            timer,
            arbiter,
            lifecycle,
            clock,
            events_tx,
            events_rx,
            ui,
            snapshot,
            telemetry: None,
            answers: Answers::new(),
            total_questions: setup.total_questions,
            modal_generation: 0,
            last_attention: None,
            status: EngineStatus::Running,
        };
        Ok((engine, engine_handle))
    }

    /// Check device permissions and spawn the periodic producers
    ///
    /// A denied device is a precondition failure: nothing is spawned and the
    /// engine stays unarmed.
    pub fn spawn_producers(&mut self, producers: Producers) -> Result<Vec<JoinHandle<()>>, EngineError> {
        if let Some(frames) = producers.frames.as_ref() {
            if !frames.permission_granted() {
                return Err(self.precondition_failed(EngineError::PermissionDenied("Camera")));
            }
        }
        if let Some(audio) = producers.audio.as_ref() {
            if !audio.permission_granted() {
                return Err(self.precondition_failed(EngineError::PermissionDenied("Microphone")));
            }
        }

        let mut tasks = Vec::new();
        if self.timer.is_running() {
            tasks.push(tokio::spawn(run_timer_clock(
                self.lifecycle.clone(),
                self.events_tx.clone(),
            )));
        }
        if let Some(frames) = producers.frames {
            tasks.push(tokio::spawn(run_frame_loop(
                frames,
                self.services.analyzer.clone(),
                self.handle.session_id.clone(),
                Duration::from_millis(self.config.frame_interval_ms),
                self.clock,
                self.lifecycle.clone(),
                self.events_tx.clone(),
            )));
        }
        if let Some(audio) = producers.audio {
            self.emit(UiCommand::log("Calibrating microphone... stay silent"));
            tasks.push(tokio::spawn(run_audio_loop(
                audio,
                Duration::from_millis(self.config.calibration_window_ms),
                Duration::from_millis(self.config.calibration_sample_ms),
                Duration::from_millis(self.config.voice_tick_ms),
                self.clock,
                self.lifecycle.clone(),
                self.events_tx.clone(),
            )));
        }
        Ok(tasks)
    }

    fn precondition_failed(&mut self, err: EngineError) -> EngineError {
        warn!(error = %err, "engine precondition failed");
        self.emit(UiCommand::Error {
            message: err.to_string(),
        });
        self.set_status(EngineStatus::Stopped);
        err
    }

    /// Consume events until the session reaches a terminal state
    pub async fn run(mut self) -> EngineSnapshot {
        if self.status.is_terminal() {
            return self.snapshot.borrow().clone();
        }
        let (telemetry, _forwarder) = spawn_telemetry_forwarder(
            self.services.telemetry.clone(),
            self.handle.session_id.clone(),
            TELEMETRY_QUEUE_CAPACITY,
        );
        self.telemetry = Some(telemetry);

        info!(session_id = %self.handle.session_id, "engine started");
        self.emit(UiCommand::Timer(self.timer.display()));
        self.emit_counters();
        self.publish();

        while let Some(event) = self.events_rx.recv().await {
            if !self.handle_event(event).await {
                break;
            }
        }

        self.lifecycle.stop_producers();
        self.timer.stop();
        if !self.status.is_terminal() {
            self.set_status(EngineStatus::Stopped);
        }
        info!(session_id = %self.handle.session_id, status = ?self.status, "engine finished");
        self.snapshot.borrow().clone()
    }

    /// Apply one event; false when the engine should stop
    pub async fn handle_event(&mut self, event: EngineEvent) -> bool {
        if self.lifecycle.is_cancelled() {
            self.set_status(EngineStatus::Stopped);
            return false;
        }
        match event {
            EngineEvent::Signal(signal) => self.on_signal(signal).await,
            EngineEvent::TimerTick => self.on_timer_tick().await,
            EngineEvent::AnswerSelected { question_id, option } => {
                self.answers.insert(question_id, option);
                self.emit_counters();
            }
            EngineEvent::SubmitRequested { answers } => {
                self.answers.extend(answers);
                self.submit(SubmitReason::S001_MANUAL).await;
            }
            EngineEvent::ModalAction { action } => {
                self.emit(UiCommand::HideModal);
                if action == ModalAction::Exit {
                    self.submit(SubmitReason::S001_MODAL_EXIT).await;
                }
            }
            EngineEvent::DismissModal { generation } => {
                if generation == self.modal_generation && !self.status.is_terminal() {
                    self.emit(UiCommand::HideModal);
                }
            }
            EngineEvent::ForceSubmit { reason } => {
                self.emit(UiCommand::HideModal);
                self.submit(reason).await;
            }
            EngineEvent::Shutdown => {
                self.lifecycle.cancel();
                self.set_status(EngineStatus::Stopped);
            }
        }
        self.publish();
        !self.status.is_terminal()
    }

    async fn on_signal(&mut self, signal: Signal) {
        if self.status != EngineStatus::Running {
            debug!("signal after submission ignored");
            return;
        }
        match signal {
            Signal::CalibrationSample(sample) => self.voice.push_calibration(sample.rms),
            Signal::CalibrationComplete { .. } => {
                let threshold = self.voice.finish_calibration();
                self.emit(UiCommand::log(format!(
                    "Calibration done. Threshold ≈ {:.4}",
                    threshold
                )));
            }
            Signal::Amplitude(sample) => self.on_amplitude(sample).await,
            Signal::Frame(detection) => self.on_frame(&detection),
            Signal::Focus(event) => self.on_focus(event),
        }
    }

    async fn on_amplitude(&mut self, sample: AmplitudeSample) {
        let outcome = self.voice.tick(sample, &mut self.registry);
        for event in &outcome.telemetry {
            self.send_telemetry(*event);
        }
        if let Some(violation) = outcome.warning {
            self.emit(UiCommand::warn(violation.message.clone()));
            self.emit(UiCommand::log(violation.message));
            self.emit_counters();
        }
        if outcome.escalate {
            info!(count = self.voice.warning_count(), "voice warning ceiling exceeded");
            self.emit(UiCommand::modal(
                "Test Submitted",
                "Too many voice warnings. The test will be submitted automatically.",
            ));
            self.submit(SubmitReason::S002_VOICE_CEILING).await;
        }
    }

    fn on_frame(&mut self, detection: &FrameDetection) {
        let outcome = self.presence.observe(detection, &mut self.registry);
        for violation in outcome.violations {
            self.emit(UiCommand::warn(violation.message.clone()));
            self.emit(UiCommand::log(violation.message));
        }
        // Flagged frames always carry fresh boxes; a clear frame is sent once
        let attention = (outcome.attention, outcome.face_count);
        let changed = self.last_attention != Some(attention);
        if outcome.attention || changed {
            self.last_attention = Some(attention);
            self.emit(UiCommand::Attention {
                show: outcome.attention,
                face_count: outcome.face_count,
                faces: outcome.faces,
            });
        }
    }

    fn on_focus(&mut self, event: FocusEvent) {
        match self.focus.on_event(event) {
            FocusOutcome::NotQualifying | FocusOutcome::Debounced => {}
            FocusOutcome::GraceConsumed => {
                self.emit(UiCommand::log("WINDOW_CHANGE_IGNORED (first occurrence)"));
            }
            FocusOutcome::Strike {
                message,
                dismiss_after_ms,
                ..
            } => {
                self.modal_generation += 1;
                self.announce_window_violation(&message, event.t);
                self.defer(
                    EngineEvent::DismissModal {
                        generation: self.modal_generation,
                    },
                    dismiss_after_ms,
                );
            }
            FocusOutcome::Ceiling {
                message,
                submit_after_ms,
                ..
            } => {
                self.modal_generation += 1;
                self.announce_window_violation(&message, event.t);
                self.emit(UiCommand::modal(CEILING_TITLE, CEILING_MESSAGE));
                self.defer(
                    EngineEvent::ForceSubmit {
                        reason: SubmitReason::S002_WINDOW_CEILING,
                    },
                    submit_after_ms,
                );
            }
        }
    }

    fn announce_window_violation(&mut self, message: &str, now: Timestamp) {
        self.emit(UiCommand::modal(STRIKE_TITLE, message));
        if self
            .registry
            .raise(
                ViolationKind::WindowChange,
                message,
                now,
                self.config.violation_cooldown_ms,
            )
            .is_some()
        {
            self.emit(UiCommand::warn(message));
        }
        self.emit(UiCommand::log(format!("WINDOW_CHANGE: {}", message)));
        self.emit_counters();
    }

    async fn on_timer_tick(&mut self) {
        if let Some(tick) = self.timer.tick() {
            self.emit(UiCommand::Timer(tick.display));
            if tick.expired {
                self.emit(UiCommand::modal(
                    "Time is up",
                    "Submitting test automatically.",
                ));
                self.submit(SubmitReason::S003_TIMER_EXPIRED).await;
            }
        }
    }

    /// Route any termination through the arbiter
    async fn submit(&mut self, reason: SubmitReason) {
        if self.status != EngineStatus::Running {
            debug!(reason = reason.code(), "submission already handled");
            return;
        }
        self.timer.stop();
        self.set_status(EngineStatus::Submitting);
        let label = match reason {
            SubmitReason::S003_TIMER_EXPIRED => "Submitting (Time Up)...",
            _ => "Submitting...",
        };
        self.emit(UiCommand::SubmitControl {
            enabled: false,
            label: label.to_string(),
        });

        let arbiter = self.arbiter.clone();
        let answers = self.answers.clone();
        let outcome = arbiter.finalize(reason, &answers).await;
        match outcome {
            Ok(FinalizeOutcome::Completed {
                session_id,
                results_url,
            }) => {
                self.set_status(EngineStatus::Completed);
                self.emit(UiCommand::Complete {
                    session_id,
                    results_url,
                });
            }
            Ok(FinalizeOutcome::Rejected { message }) => {
                self.set_status(EngineStatus::Running);
                self.emit(UiCommand::Error {
                    message: format!("Error submitting test: {}", message),
                });
                self.emit(UiCommand::SubmitControl {
                    enabled: true,
                    label: SUBMIT_LABEL.to_string(),
                });
            }
            Ok(FinalizeOutcome::LocalFallback { marker }) => {
                self.set_status(EngineStatus::LocalComplete);
                self.emit(UiCommand::log(format!("AUTO_SUBMIT_FALLBACK: {}", marker.reason)));
                self.emit(UiCommand::LocalComplete {
                    reason: marker.reason,
                });
            }
            Ok(FinalizeOutcome::AlreadyInFlight) | Ok(FinalizeOutcome::AlreadyFinished) => {
                debug!(reason = reason.code(), "finalize was a no-op");
            }
            Ok(FinalizeOutcome::Discarded) => self.set_status(EngineStatus::Stopped),
            Err(e) => {
                self.set_status(EngineStatus::Running);
                self.emit(UiCommand::Error {
                    message: e.to_string(),
                });
            }
        }
    }

    fn defer(&self, event: EngineEvent, after_ms: u64) {
        let tx = self.events_tx.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(after_ms)).await;
            let _ = tx.send(event).await;
        });
    }

    fn send_telemetry(&self, event: VoiceTelemetryEvent) {
        if let Some(tx) = self.telemetry.as_ref() {
            if tx.try_send(event).is_err() {
                debug!(kind = event.kind.as_str(), "telemetry queue full, event dropped");
            }
        }
    }

    fn emit(&self, command: UiCommand) {
        // No subscribers is fine, nobody is rendering yet
        let _ = self.ui.send(command);
    }

    fn emit_counters(&self) {
        self.emit(UiCommand::Counters {
            voice_warnings: self.voice.warning_count(),
            window_violations: self.focus.count(),
            answered: self.answered(),
            total_questions: self.total_questions,
        });
    }

    fn set_status(&mut self, status: EngineStatus) {
        self.status = status;
        self.publish();
    }

    fn publish(&self) {
        let snapshot = self.build_snapshot();
        self.snapshot.send_replace(snapshot);
    }

    fn build_snapshot(&self) -> EngineSnapshot {
        EngineSnapshot {
            session_id: self.handle.session_id.clone(),
            status: self.status,
            vad_phase: self.voice.phase(),
            voice_threshold: self.voice.threshold(),
            voice_warnings: self.voice.warning_count(),
            window_violations: self.focus.count(),
            focus_state: self.focus.state(),
            grace_used: self.focus.grace_used(),
            timer: self.timer.display(),
            answered: self.answered(),
            total_questions: self.total_questions,
        }
    }

    /// Answered count, capped at the question total when one is known
    fn answered(&self) -> usize {
        if self.total_questions == 0 {
            self.answers.len()
        } else {
            self.answers.len().min(self.total_questions)
        }
    }

    pub fn status(&self) -> EngineStatus {
        self.status
    }

    pub fn arbiter(&self) -> Arc<SubmissionArbiter> {
        self.arbiter.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{FocusEventKind, FrameDetection, HeadDirection};

    #[test]
    fn test_event_script_lines() {
        let line = r#"{"event":"signal","signal":"focus","kind":{"type":"tab_hidden"},"t":1200}"#;
        let event: EngineEvent = serde_json::from_str(line).unwrap();
        assert_eq!(
            event,
            EngineEvent::Signal(Signal::Focus(FocusEvent {
                kind: FocusEventKind::TabHidden,
                t: 1200,
            }))
        );

        let line = r#"{"event":"signal","signal":"frame","faces":[],"head_direction":"Left","t":300}"#;
        let event: EngineEvent = serde_json::from_str(line).unwrap();
        assert_eq!(
            event,
            EngineEvent::Signal(Signal::Frame(FrameDetection {
                faces: vec![],
                head_direction: HeadDirection::Left,
                t: 300,
            }))
        );

        let event: EngineEvent = serde_json::from_str(r#"{"event":"timer_tick"}"#).unwrap();
        assert_eq!(event, EngineEvent::TimerTick);

        let event: EngineEvent =
            serde_json::from_str(r#"{"event":"modal_action","action":"exit"}"#).unwrap();
        assert_eq!(
            event,
            EngineEvent::ModalAction {
                action: ModalAction::Exit
            }
        );
    }

    #[test]
    fn test_submit_without_answers() {
        let event: EngineEvent = serde_json::from_str(r#"{"event":"submit_requested"}"#).unwrap();
        assert_eq!(
            event,
            EngineEvent::SubmitRequested {
                answers: Answers::new()
            }
        );
    }

    #[test]
    fn test_terminal_statuses() {
        assert!(!EngineStatus::Running.is_terminal());
        assert!(!EngineStatus::Submitting.is_terminal());
        assert!(EngineStatus::Completed.is_terminal());
        assert!(EngineStatus::LocalComplete.is_terminal());
        assert!(EngineStatus::Stopped.is_terminal());
    }
}
