//! Submission arbiter: the single exit path of a session
//!
//! Every termination (button, voice ceiling, window ceiling, timer) lands in
//! `finalize`. The remote close is attempted once; an engine-initiated
//! submission that fails degrades to a local terminal state with a marker
//! the surrounding application can reconcile later.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::core::ports::{MarkerStore, SessionService};
use crate::core::Lifecycle;
use crate::error::EngineError;
use crate::types::{Answers, FallbackMarker, SessionHandle, SubmitReason};
use crate::FALLBACK_MARKER_KEY;

/// How a finalize call ended
#[derive(Debug, Clone, PartialEq)]
pub enum FinalizeOutcome {
    /// Server confirmed; results view is available
    Completed {
        session_id: String,
        results_url: String,
    },
    /// Manual submission failed; the control is usable again
    Rejected { message: String },
    /// Engine-initiated submission failed; submitted locally
    LocalFallback { marker: FallbackMarker },
    /// Another finalize is running
    AlreadyInFlight,
    /// The session already ended
    AlreadyFinished,
    /// Engine was cancelled before the close call returned
    Discarded,
}

/// Path of the results view for a session
pub fn results_url(session_id: &str) -> String {
    format!("/report.html?sessionId={}", session_id)
}

pub struct SubmissionArbiter {
    handle: Option<SessionHandle>,
    service: Arc<dyn SessionService>,
    markers: Arc<dyn MarkerStore>,
    lifecycle: Lifecycle,
    in_flight: AtomicBool,
    finished: AtomicBool,
}

impl std::fmt::Debug for SubmissionArbiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubmissionArbiter")
            .field("handle", &self.handle)
            .field("in_flight", &self.in_flight)
            .field("finished", &self.finished)
            .finish()
    }
}

impl SubmissionArbiter {
    pub fn new(
        handle: Option<SessionHandle>,
        service: Arc<dyn SessionService>,
        markers: Arc<dyn MarkerStore>,
        lifecycle: Lifecycle,
    ) -> Self {
        Self {
            handle,
            service,
            markers,
            lifecycle,
            in_flight: AtomicBool::new(false),
            finished: AtomicBool::new(false),
        }
    }

    /// End the session. Safe to call concurrently; only one call does the work.
    pub async fn finalize(
        &self,
        reason: SubmitReason,
        answers: &Answers,
    ) -> Result<FinalizeOutcome, EngineError> {
        let handle = self.handle.as_ref().ok_or(EngineError::SessionMissing)?;

        if self.finished.load(Ordering::SeqCst) {
            return Ok(FinalizeOutcome::AlreadyFinished);
        }
        if self
            .in_flight
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            info!(reason = reason.code(), "finalize already in flight");
            return Ok(FinalizeOutcome::AlreadyInFlight);
        }

        if self.lifecycle.stop_producers() {
            info!("producers stopped for submission");
        }

        info!(
            session_id = %handle.session_id,
            reason = reason.code(),
            answers = answers.len(),
            "closing session"
        );
        let result = self.service.close_session(handle, answers).await;

        if self.lifecycle.is_cancelled() {
            warn!(session_id = %handle.session_id, "close result arrived after cancellation, discarded");
            return Ok(FinalizeOutcome::Discarded);
        }

        let failure = match result {
            Ok(resp) if resp.success => {
                self.finished.store(true, Ordering::SeqCst);
                info!(session_id = %handle.session_id, "session closed");
                return Ok(FinalizeOutcome::Completed {
                    session_id: handle.session_id.clone(),
                    results_url: results_url(&handle.session_id),
                });
            }
            Ok(resp) => resp.message.unwrap_or_else(|| "Unknown error".to_string()),
            Err(e) => e.to_string(),
        };

        if reason.auto_triggered() {
            let marker = FallbackMarker::now(format!("Server submit failed: {}", failure));
            if let Err(e) = self.markers.persist(FALLBACK_MARKER_KEY, &marker) {
                error!(error = %e, "failed to persist fallback marker");
            }
            self.finished.store(true, Ordering::SeqCst);
            warn!(reason = reason.code(), failure = %failure, "auto submission fell back to local state");
            Ok(FinalizeOutcome::LocalFallback { marker })
        } else {
            self.in_flight.store(false, Ordering::SeqCst);
            warn!(failure = %failure, "manual submission rejected");
            Ok(FinalizeOutcome::Rejected { message: failure })
        }
    }

    pub fn handle(&self) -> Option<&SessionHandle> {
        self.handle.as_ref()
    }

    pub fn is_in_flight(&self) -> bool {
        self.in_flight.load(Ordering::SeqCst)
    }

    pub fn is_finished(&self) -> bool {
        self.finished.load(Ordering::SeqCst)
    }
}
