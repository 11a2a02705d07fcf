//! Integration tests for the per-signal state machines
//!
//! Debounce, voice activity, presence/head pose, window focus and the timer,
//! driven through the public API with explicit timestamps.

use examguard::core::{
    parse_duration_seconds, DebounceRegistry, DurationInput, ExamTimer, FocusOutcome, FocusState,
    FocusViolationCounter, PresenceMonitor, VadPhase, VoiceDetector,
};
use examguard::core::voice::threshold_from_samples;
use examguard::types::{
    AmplitudeSample, BoundingBox, FocusEvent, FocusEventKind, FrameDetection, HeadDirection,
    TimerClass, ViolationKind, VoiceEventKind,
};
use examguard::EngineConfig;
use pretty_assertions::assert_eq;

fn face() -> BoundingBox {
    BoundingBox { x: 10, y: 10, w: 80, h: 80 }
}

fn frame(faces: usize, direction: HeadDirection, t: u64) -> FrameDetection {
    FrameDetection {
        faces: vec![face(); faces],
        head_direction: direction,
        t,
    }
}

fn focus(kind: FocusEventKind, t: u64) -> FocusEvent {
    FocusEvent { kind, t }
}

fn loud(t: u64) -> AmplitudeSample {
    AmplitudeSample { rms: 0.5, t }
}

// =============================================================================
// DEBOUNCE
// =============================================================================

#[test]
fn test_debounce_cooldown_boundary() {
    let mut registry = DebounceRegistry::new();
    let first = registry.allow("NO_PERSON:Person not present", 0, 5000);
    let second = registry.allow("NO_PERSON:Person not present", 4999, 5000);
    assert_eq!((first, second), (true, false));

    let mut registry = DebounceRegistry::new();
    let first = registry.allow("NO_PERSON:Person not present", 0, 5000);
    let second = registry.allow("NO_PERSON:Person not present", 5000, 5000);
    assert_eq!((first, second), (true, true));
}

#[test]
fn test_debounce_keys_are_independent() {
    let mut registry = DebounceRegistry::new();
    assert!(registry.raise(ViolationKind::NoPerson, "Person not present", 0, 5000).is_some());
    assert!(registry
        .raise(ViolationKind::MultiplePersons, "Multiple persons detected", 10, 5000)
        .is_some());
    assert!(registry.raise(ViolationKind::NoPerson, "Person not present", 20, 5000).is_none());
    assert_eq!(registry.len(), 2);
}

// =============================================================================
// VOICE
// =============================================================================

#[test]
fn test_calibration_thresholds() {
    assert_eq!(threshold_from_samples(&[0.0, 0.0, 0.0], 2.5, 0.01), 0.01);
    let threshold = threshold_from_samples(&[0.02, 0.02, 0.02], 2.5, 0.01);
    assert!((threshold - 0.05).abs() < 1e-12);
}

#[test]
fn test_detector_silent_until_armed() {
    let config = EngineConfig::default();
    let mut registry = DebounceRegistry::new();
    let mut detector = VoiceDetector::new(&config);
    assert_eq!(detector.phase(), VadPhase::Calibrating);

    let outcome = detector.tick(loud(0), &mut registry);
    assert!(outcome.telemetry.is_empty());
    assert!(!outcome.speaking);

    detector.push_calibration(0.02);
    detector.push_calibration(0.02);
    let threshold = detector.finish_calibration();
    assert!((threshold - 0.05).abs() < 1e-12);
    assert_eq!(detector.phase(), VadPhase::Armed);
}

#[test]
fn test_short_burst_is_not_a_warning() {
    let config = EngineConfig::default();
    let mut registry = DebounceRegistry::new();
    let mut detector = VoiceDetector::new(&config);
    detector.finish_calibration();

    let start = detector.tick(loud(0), &mut registry);
    assert_eq!(start.telemetry[0].kind, VoiceEventKind::VoiceStart);
    let mid = detector.tick(loud(200), &mut registry);
    assert!(mid.warning.is_none());
    let stop = detector.tick(AmplitudeSample { rms: 0.0, t: 400 }, &mut registry);
    assert_eq!(stop.telemetry[0].kind, VoiceEventKind::VoiceStop);
    assert_eq!(detector.warning_count(), 0);
}

#[test]
fn test_sixth_warning_escalates() {
    let config = EngineConfig::default();
    let mut registry = DebounceRegistry::new();
    let mut detector = VoiceDetector::new(&config);
    detector.finish_calibration();
    detector.tick(loud(0), &mut registry);

    let mut escalations = Vec::new();
    for n in 0..7u64 {
        let outcome = detector.tick(loud(400 + n * 5000), &mut registry);
        assert!(outcome.warning.is_some(), "tick {} should warn", n);
        escalations.push(outcome.escalate);
    }

    assert_eq!(
        escalations,
        vec![false, false, false, false, false, true, false]
    );
    assert_eq!(detector.warning_count(), 7);
    assert!(detector.escalated());
}

#[test]
fn test_voice_warnings_respect_cooldown() {
    let config = EngineConfig::default();
    let mut registry = DebounceRegistry::new();
    let mut detector = VoiceDetector::new(&config);
    detector.finish_calibration();

    let mut warnings = 0;
    for t in (0..5000).step_by(200) {
        if detector.tick(loud(t), &mut registry).warning.is_some() {
            warnings += 1;
        }
    }
    assert_eq!(warnings, 1);
}

// =============================================================================
// PRESENCE / HEAD POSE
// =============================================================================

#[test]
fn test_head_pose_requires_hold() {
    let config = EngineConfig::default();
    let mut registry = DebounceRegistry::new();
    let mut monitor = PresenceMonitor::new(&config);

    for t in [0, 400, 900] {
        let outcome = monitor.observe(&frame(1, HeadDirection::Left, t), &mut registry);
        assert!(outcome.violations.is_empty(), "no violation at {}", t);
    }
    let outcome = monitor.observe(&frame(1, HeadDirection::Left, 1100), &mut registry);
    assert_eq!(outcome.violations.len(), 1);
    assert_eq!(outcome.violations[0].kind, ViolationKind::HeadPose);
    assert!(outcome.attention);
}

#[test]
fn test_direction_change_resets_hold() {
    let config = EngineConfig::default();
    let mut registry = DebounceRegistry::new();
    let mut monitor = PresenceMonitor::new(&config);

    monitor.observe(&frame(1, HeadDirection::Left, 0), &mut registry);
    monitor.observe(&frame(1, HeadDirection::Right, 800), &mut registry);
    let outcome = monitor.observe(&frame(1, HeadDirection::Right, 1200), &mut registry);
    assert!(outcome.violations.is_empty());
    let outcome = monitor.observe(&frame(1, HeadDirection::Right, 1800), &mut registry);
    assert_eq!(outcome.violations.len(), 1);
}

#[test]
fn test_missing_and_multiple_faces() {
    let config = EngineConfig::default();
    let mut registry = DebounceRegistry::new();
    let mut monitor = PresenceMonitor::new(&config);

    let outcome = monitor.observe(&frame(0, HeadDirection::Center, 0), &mut registry);
    assert_eq!(outcome.violations[0].kind, ViolationKind::NoPerson);
    assert!(outcome.attention);

    let outcome = monitor.observe(&frame(0, HeadDirection::Center, 300), &mut registry);
    assert!(outcome.violations.is_empty());

    let outcome = monitor.observe(&frame(2, HeadDirection::Center, 600), &mut registry);
    assert_eq!(outcome.violations[0].kind, ViolationKind::MultiplePersons);
    assert_eq!(outcome.face_count, 2);

    let outcome = monitor.observe(&frame(1, HeadDirection::Center, 900), &mut registry);
    assert!(!outcome.attention);
}

// =============================================================================
// WINDOW FOCUS
// =============================================================================

#[test]
fn test_first_window_change_is_free() {
    let config = EngineConfig::default();
    let mut counter = FocusViolationCounter::new(&config);

    assert_eq!(
        counter.on_event(focus(FocusEventKind::TabHidden, 0)),
        FocusOutcome::GraceConsumed
    );
    assert_eq!(counter.count(), 0);
    assert_eq!(counter.state(), FocusState::FirstOffenseConsumed);

    match counter.on_event(focus(FocusEventKind::WindowBlur, 2000)) {
        FocusOutcome::Strike { count, .. } => assert_eq!(count, 1),
        other => panic!("expected strike, got {:?}", other),
    }
}

#[test]
fn test_window_ceiling_fires_once() {
    let config = EngineConfig::default();
    let mut counter = FocusViolationCounter::new(&config);
    counter.on_event(focus(FocusEventKind::TabHidden, 0));

    let mut ceilings = 0;
    for (i, kind) in [
        FocusEventKind::TabHidden,
        FocusEventKind::FullscreenExit,
        FocusEventKind::WindowBlur,
        FocusEventKind::TabHidden,
    ]
    .into_iter()
    .enumerate()
    {
        if let FocusOutcome::Ceiling { count, .. } =
            counter.on_event(focus(kind, 2000 * (i as u64 + 1)))
        {
            assert_eq!(count, 3);
            ceilings += 1;
        }
    }
    assert_eq!(ceilings, 1);
    assert_eq!(counter.state(), FocusState::Submitted);
}

#[test]
fn test_blur_alongside_hidden_counts_once() {
    let config = EngineConfig::default();
    let mut counter = FocusViolationCounter::new(&config);
    counter.on_event(focus(FocusEventKind::TabHidden, 0));

    assert!(matches!(
        counter.on_event(focus(FocusEventKind::TabHidden, 5000)),
        FocusOutcome::Strike { .. }
    ));
    assert_eq!(
        counter.on_event(focus(FocusEventKind::WindowBlur, 5100)),
        FocusOutcome::Debounced
    );
    assert_eq!(counter.count(), 1);
}

#[test]
fn test_small_resize_ignored() {
    let config = EngineConfig::default();
    let mut counter = FocusViolationCounter::new(&config);
    counter.set_viewport(1280, 800);

    assert_eq!(
        counter.on_event(focus(FocusEventKind::Resize { width: 1290, height: 805 }, 0)),
        FocusOutcome::NotQualifying
    );
    assert_eq!(
        counter.on_event(focus(FocusEventKind::Resize { width: 900, height: 800 }, 100)),
        FocusOutcome::GraceConsumed
    );
}

// =============================================================================
// TIMER
// =============================================================================

#[test]
fn test_hms_duration_classifies_warning() {
    let seconds = parse_duration_seconds(&DurationInput::Text("0:02:30".to_string()));
    assert_eq!(seconds, Some(150));

    let mut timer = ExamTimer::new();
    let display = timer.arm(seconds);
    assert_eq!(display.text, "02:30");
    assert_eq!(display.class, TimerClass::Warning);
}

#[test]
fn test_invalid_duration_is_unknown() {
    assert_eq!(parse_duration_seconds(&DurationInput::Minutes(0.0)), None);
    assert_eq!(parse_duration_seconds(&DurationInput::Text("soon".into())), None);

    let mut timer = ExamTimer::new();
    let display = timer.arm(None);
    assert_eq!(display.class, TimerClass::Unknown);
    assert_eq!(timer.tick(), None);
}

#[test]
fn test_timer_fires_exactly_once() {
    let mut timer = ExamTimer::new();
    timer.arm(Some(3));

    let mut fired = 0;
    for _ in 0..10 {
        if let Some(tick) = timer.tick() {
            if tick.expired {
                fired += 1;
                assert_eq!(tick.remaining_seconds, 0);
                assert_eq!(tick.display.class, TimerClass::Danger);
            }
        }
    }
    assert_eq!(fired, 1);
    assert!(timer.has_fired());
}
