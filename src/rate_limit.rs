//! In-memory IP rate limiting.
//!
//! DESIGN
//! ======
//! Sliding-window counters backed by `HashMap<String, Vec<Instant>>`.
//! Keys are caller-chosen strings: plain `ip` for general requests,
//! `ip:login` for login attempts, so the login budget is independent of
//! the general request budget.
//!
//! Entries older than the window are dropped lazily on every `allow`
//! call; a background sweeper drops buckets whose contents have fully
//! expired so memory stays bounded by the set of active keys.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use tokio::task::JoinHandle;

/// Retention horizon used by the sweeper. Buckets with no timestamp
/// newer than this are removed wholesale.
const SWEEP_CUTOFF: Duration = Duration::from_secs(5 * 60);

/// How often the background sweeper runs.
const SWEEP_INTERVAL: Duration = Duration::from_secs(5 * 60);

// =============================================================================
// RATE LIMITER
// =============================================================================

#[derive(Clone)]
pub struct RateLimiter {
    inner: Arc<Mutex<HashMap<String, Vec<Instant>>>>,
}

impl RateLimiter {
    #[must_use]
    pub fn new() -> Self {
        Self { inner: Arc::new(Mutex::new(HashMap::new())) }
    }

    /// Record a request under `key` if fewer than `limit` requests were
    /// recorded within `window`. Returns false when the budget is spent.
    ///
    /// Never errors; the limiter only denies.
    pub fn allow(&self, key: &str, limit: usize, window: Duration) -> bool {
        self.allow_at(key, limit, window, Instant::now())
    }

    /// Internal: check + record with explicit timestamp (for testing).
    fn allow_at(&self, key: &str, limit: usize, window: Duration, now: Instant) -> bool {
        let mut inner = self.inner.lock().unwrap();
        let bucket = inner.entry(key.to_string()).or_default();
        bucket.retain(|&t| now.duration_since(t) < window);

        if bucket.len() >= limit {
            return false;
        }

        bucket.push(now);
        true
    }

    /// Drop buckets whose entire contents have expired past the
    /// retention horizon.
    pub fn sweep(&self) {
        self.sweep_at(Instant::now());
    }

    fn sweep_at(&self, now: Instant) {
        let mut inner = self.inner.lock().unwrap();
        inner.retain(|_, bucket| {
            bucket.retain(|&t| now.duration_since(t) < SWEEP_CUTOFF);
            !bucket.is_empty()
        });
    }

    /// Spawn the periodic sweeper. Returns a handle for shutdown.
    pub fn spawn_sweeper(&self) -> JoinHandle<()> {
        let limiter = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(SWEEP_INTERVAL);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                limiter.sweep();
            }
        })
    }

    #[cfg(test)]
    fn bucket_count(&self) -> usize {
        self.inner.lock().unwrap().len()
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
#[path = "rate_limit_test.rs"]
mod tests;
