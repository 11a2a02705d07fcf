//! Stop and cancel flags shared by the engine, its producers and the arbiter
//!
//! Two levels: `stop_producers` ends the periodic loops (every submission
//! does this), `cancel` additionally marks in-flight results as stale.

use std::sync::Arc;
use tokio::sync::watch;
use tokio::time::Instant;

use crate::types::Timestamp;

/// Monotonic session clock; every signal is stamped with it
#[derive(Debug, Clone, Copy)]
pub struct SessionClock {
    origin: Instant,
}

impl Default for SessionClock {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }

    /// Milliseconds since the session started
    pub fn now_ms(&self) -> Timestamp {
        self.origin.elapsed().as_millis() as Timestamp
    }
}

#[derive(Debug, Clone)]
pub struct Lifecycle {
    producers: Arc<watch::Sender<bool>>,
    cancelled: Arc<watch::Sender<bool>>,
}

impl Default for Lifecycle {
    fn default() -> Self {
        Self::new()
    }
}

impl Lifecycle {
    pub fn new() -> Self {
        let (producers, _) = watch::channel(false);
        let (cancelled, _) = watch::channel(false);
        Self {
            producers: Arc::new(producers),
            cancelled: Arc::new(cancelled),
        }
    }

    /// End every periodic loop; returns true only for the call that stopped them
    pub fn stop_producers(&self) -> bool {
        !self.producers.send_replace(true)
    }

    pub fn producers_stopped(&self) -> bool {
        *self.producers.borrow()
    }

    /// Receiver that flips to `true` when producers must stop
    pub fn producer_signal(&self) -> watch::Receiver<bool> {
        self.producers.subscribe()
    }

    /// Abort the session: stop producers and discard anything still in flight
    pub fn cancel(&self) {
        self.stop_producers();
        self.cancelled.send_replace(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.cancelled.borrow()
    }
}

/// Resolves once the flag behind `rx` becomes true
pub async fn stopped(rx: &mut watch::Receiver<bool>) {
    loop {
        if *rx.borrow_and_update() {
            return;
        }
        if rx.changed().await.is_err() {
            // Sender dropped, the flag can no longer change
            std::future::pending::<()>().await;
        }
    }
}
