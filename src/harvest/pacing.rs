//! Global request pacing
//!
//! Upstream enforces a per-key quota, so every outbound call (envelope and
//! data call alike) goes through [`HarvestContext::pace`] first.

use crate::harvest::config::MIN_REQUEST_GAP;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use tokio::time::Instant;
use tracing::trace;

/// Shared pacing state of one harvest run.
#[derive(Debug)]
pub struct HarvestContext {
    min_gap: Duration,
    last_request: Mutex<Option<Instant>>,
    requests: AtomicU64,
}

impl Default for HarvestContext {
    fn default() -> Self {
        Self::new(MIN_REQUEST_GAP)
    }
}

impl HarvestContext {
    /// Context enforcing `min_gap` between outbound requests
    pub fn new(min_gap: Duration) -> Self {
        Self {
            min_gap,
            last_request: Mutex::new(None),
            requests: AtomicU64::new(0),
        }
    }

    /// Sleep out whatever remains of the minimum gap, then stamp the request.
    pub async fn pace(&self) {
        let wait = {
            let last = self
                .last_request
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            last.map(|at| self.min_gap.saturating_sub(at.elapsed()))
                .unwrap_or(Duration::ZERO)
        };

        if !wait.is_zero() {
            trace!(wait_ms = wait.as_millis() as u64, "Pacing outbound request");
            tokio::time::sleep(wait).await;
        }

        *self
            .last_request
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(Instant::now());
        self.requests.fetch_add(1, Ordering::Relaxed);
    }

    /// Time of the last outbound request
    pub fn last_request(&self) -> Option<Instant> {
        *self
            .last_request
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Outbound requests made through this context
    pub fn requests_sent(&self) -> u64 {
        self.requests.load(Ordering::Relaxed)
    }

    /// Minimum gap enforced
    pub fn min_gap(&self) -> Duration {
        self.min_gap
    }
}
