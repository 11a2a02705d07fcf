//! Periodic producers feeding the engine queue
//!
//! Each loop owns its source, stamps samples with the session clock, and
//! exits as soon as the producer stop flag flips. The frame loop awaits the
//! analysis round trip before sleeping again, so at most one request is in
//! flight and a slow analyzer slows the loop down instead of piling up.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::core::engine::EngineEvent;
use crate::core::lifecycle::{stopped, Lifecycle, SessionClock};
use crate::core::ports::{AmplitudeSource, FrameAnalyzer, FrameSource, VoiceTelemetry};
use crate::types::{AmplitudeSample, Signal, VoiceTelemetryEvent};

/// Capture → analyze → enqueue, never overlapping
pub async fn run_frame_loop(
    mut source: Box<dyn FrameSource>,
    analyzer: Arc<dyn FrameAnalyzer>,
    session_id: String,
    interval: Duration,
    clock: SessionClock,
    lifecycle: Lifecycle,
    events: mpsc::Sender<EngineEvent>,
) {
    let mut stop = lifecycle.producer_signal();
    info!(interval_ms = interval.as_millis() as u64, "frame loop started");

    loop {
        tokio::select! {
            _ = stopped(&mut stop) => break,
            _ = tokio::time::sleep(interval) => {}
        }

        let frame = match source.capture().await {
            Ok(Some(frame)) => frame,
            Ok(None) => continue,
            Err(e) => {
                warn!(error = %e, "frame capture failed");
                continue;
            }
        };

        let analysis = tokio::select! {
            _ = stopped(&mut stop) => break,
            result = analyzer.analyze_frame(&session_id, &frame) => result,
        };
        if lifecycle.producers_stopped() {
            debug!("analysis finished after stop, discarded");
            break;
        }

        match analysis {
            Ok(analysis) => {
                let detection = analysis.into_detection(clock.now_ms());
                if events.send(EngineEvent::Signal(Signal::Frame(detection))).await.is_err() {
                    break;
                }
            }
            Err(e) => warn!(error = %e, "frame analysis failed, sample dropped"),
        }
    }

    source.close();
    info!("frame loop stopped");
}

/// Calibration window, then the runtime VAD tick
pub async fn run_audio_loop(
    mut source: Box<dyn AmplitudeSource>,
    calibration_window: Duration,
    calibration_interval: Duration,
    tick: Duration,
    clock: SessionClock,
    lifecycle: Lifecycle,
    events: mpsc::Sender<EngineEvent>,
) {
    let mut stop = lifecycle.producer_signal();
    let window_ms = calibration_window.as_millis() as u64;
    let started = clock.now_ms();
    info!(window_ms, "microphone calibration started");

    'calibration: while clock.now_ms().saturating_sub(started) < window_ms {
        match source.sample() {
            Ok(rms) => {
                let sample = AmplitudeSample { rms, t: clock.now_ms() };
                if events
                    .send(EngineEvent::Signal(Signal::CalibrationSample(sample)))
                    .await
                    .is_err()
                {
                    break 'calibration;
                }
            }
            Err(e) => warn!(error = %e, "calibration sample failed"),
        }
        tokio::select! {
            _ = stopped(&mut stop) => {
                source.close();
                return;
            }
            _ = tokio::time::sleep(calibration_interval) => {}
        }
    }

    let done = EngineEvent::Signal(Signal::CalibrationComplete { t: clock.now_ms() });
    if events.send(done).await.is_ok() {
        loop {
            match source.sample() {
                Ok(rms) => {
                    let sample = AmplitudeSample { rms, t: clock.now_ms() };
                    if events
                        .send(EngineEvent::Signal(Signal::Amplitude(sample)))
                        .await
                        .is_err()
                    {
                        break;
                    }
                }
                Err(e) => warn!(error = %e, "amplitude sample failed, dropped"),
            }
            tokio::select! {
                _ = stopped(&mut stop) => break,
                _ = tokio::time::sleep(tick) => {}
            }
        }
    }

    source.close();
    info!("audio loop stopped");
}

/// 1 Hz clock for the exam timer
pub async fn run_timer_clock(lifecycle: Lifecycle, events: mpsc::Sender<EngineEvent>) {
    let mut stop = lifecycle.producer_signal();
    let mut interval = tokio::time::interval(Duration::from_secs(1));
    // The first tick of `interval` completes immediately
    interval.tick().await;

    loop {
        tokio::select! {
            _ = stopped(&mut stop) => break,
            _ = interval.tick() => {
                if events.send(EngineEvent::TimerTick).await.is_err() {
                    break;
                }
            }
        }
    }
    debug!("timer clock stopped");
}

/// Ordered, best-effort delivery of voice telemetry
///
/// The engine `try_send`s into the returned channel; a full queue drops the
/// event rather than stalling detection.
pub fn spawn_telemetry_forwarder(
    sink: Arc<dyn VoiceTelemetry>,
    session_id: String,
    capacity: usize,
) -> (mpsc::Sender<VoiceTelemetryEvent>, JoinHandle<()>) {
    let (tx, mut rx) = mpsc::channel::<VoiceTelemetryEvent>(capacity);
    let handle = tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            if let Err(e) = sink
                .report(&session_id, event.rms, event.kind, event.duration)
                .await
            {
                debug!(error = %e, kind = event.kind.as_str(), "voice telemetry dropped");
            }
        }
    });
    (tx, handle)
}
