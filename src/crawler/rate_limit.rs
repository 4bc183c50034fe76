//! Staged incremental delay in front of detail fetches
//!
//! Not a token bucket. Every caller entering [`StagedDelay::stage`] waits the
//! current pending delay, and raises it by one base interval for whoever comes
//! next until its own wait is over. With `k` callers staged together the k-th
//! one is released `k * base` after it entered; a lone caller always waits
//! exactly `base`.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

#[derive(Debug)]
pub struct StagedDelay {
    base_nanos: u64,
    next_delay_nanos: AtomicU64,
}

impl StagedDelay {
    pub fn new(base: Duration) -> Self {
        let base_nanos = u64::try_from(base.as_nanos()).unwrap_or(u64::MAX);
        Self {
            base_nanos,
            next_delay_nanos: AtomicU64::new(base_nanos),
        }
    }

    pub fn base(&self) -> Duration {
        Duration::from_nanos(self.base_nanos)
    }

    /// Delay the next caller would be assigned
    pub fn pending_delay(&self) -> Duration {
        Duration::from_nanos(self.next_delay_nanos.load(Ordering::Acquire))
    }

    /// Wait for this caller's turn
    pub async fn stage(&self) {
        let delay = self
            .next_delay_nanos
            .fetch_add(self.base_nanos, Ordering::AcqRel);
        let _release = Release(self);

        tracing::trace!(delay_ms = delay / 1_000_000, "Staged fetch");
        tokio::time::sleep(Duration::from_nanos(delay)).await;
    }
}

/// Gives the base interval back once a staged wait ends or is cancelled
struct Release<'a>(&'a StagedDelay);

impl Drop for Release<'_> {
    fn drop(&mut self) {
        self.0
            .next_delay_nanos
            .fetch_sub(self.0.base_nanos, Ordering::AcqRel);
    }
}
