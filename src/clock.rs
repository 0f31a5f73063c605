//! Injectable sleep source
//!
//! The queue and the retry executor never call `tokio::time::sleep`
//! directly, so tests can observe every requested delay without waiting.

use async_trait::async_trait;
use std::sync::Mutex;
use std::time::Duration;

/// Something that can suspend the current task for a duration.
#[async_trait]
pub trait Timer: Send + Sync {
    async fn sleep(&self, duration: Duration);
}

/// Wall-clock timer backed by the Tokio runtime.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioTimer;

#[async_trait]
impl Timer for TokioTimer {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Timer that records requested delays and returns immediately.
///
/// Still yields to the scheduler so other tasks get a chance to run,
/// the same suspension point a real sleep would introduce.
#[derive(Debug, Default)]
pub struct RecordingTimer {
    requested: Mutex<Vec<Duration>>,
}

impl RecordingTimer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Delays requested so far, in call order
    pub fn requested(&self) -> Vec<Duration> {
        self.requested
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Sum of all requested delays
    pub fn total(&self) -> Duration {
        self.requested().into_iter().sum()
    }
}

#[async_trait]
impl Timer for RecordingTimer {
    async fn sleep(&self, duration: Duration) {
        self.requested
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(duration);
        tokio::task::yield_now().await;
    }
}
