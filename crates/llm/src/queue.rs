//! Process-wide rate-limit gate
//!
//! One gate exists per provider and is shared by every concurrent caller.
//! A 429 sets the shared reset time; callers arriving before it elapses
//! park in FIFO order (the admission mutex wakes waiters in arrival order)
//! and the backlog then drains serially with a small pause between
//! requests, so the provider is not hammered the instant the window opens.

use std::time::Duration;

use parking_lot::Mutex;
use tokio::time::Instant;

use mnemon_config::constants::retry as retry_constants;

/// How long after the last gated admit the gate stays in drain mode
const DRAIN_EXPIRY: Duration = Duration::from_secs(2);

pub struct RateLimitGate {
    /// FIFO admission; held while a parked caller waits out the reset
    admission: tokio::sync::Mutex<()>,
    reset_at: Mutex<Option<Instant>>,
    drain_pause: Duration,
}

impl RateLimitGate {
    pub fn new() -> Self {
        Self::with_drain_pause(Duration::from_millis(retry_constants::DRAIN_PAUSE_MS))
    }

    pub fn with_drain_pause(drain_pause: Duration) -> Self {
        Self {
            admission: tokio::sync::Mutex::new(()),
            reset_at: Mutex::new(None),
            drain_pause,
        }
    }

    /// Wait until this call may hit the provider.
    ///
    /// Fast no-op when no rate limit is active. While one is, callers queue
    /// FIFO behind the admission lock, sleep out the reset window, and each
    /// backlog request is spaced by the drain pause.
    pub async fn admit(&self) {
        let _guard = self.admission.lock().await;

        let deadline = *self.reset_at.lock();
        let Some(deadline) = deadline else {
            return;
        };

        let now = Instant::now();
        if deadline > now {
            tracing::debug!(
                wait_ms = (deadline - now).as_millis() as u64,
                "parked behind rate limit"
            );
            tokio::time::sleep_until(deadline).await;
            tokio::time::sleep(self.drain_pause).await;
            // Stay in drain mode for the rest of the backlog
            *self.reset_at.lock() = Some(Instant::now());
        } else if now.duration_since(deadline) < DRAIN_EXPIRY {
            // Recently limited: keep spacing the backlog out
            tokio::time::sleep(self.drain_pause).await;
            *self.reset_at.lock() = Some(Instant::now());
        } else {
            // The episode is over
            *self.reset_at.lock() = None;
        }
    }

    /// Record a 429: every subsequent admit parks until `retry_after` has
    /// elapsed. An already-later reset time wins.
    pub fn report_rate_limited(&self, retry_after: Duration) {
        let candidate = Instant::now() + retry_after;
        let mut reset = self.reset_at.lock();
        match *reset {
            Some(existing) if existing >= candidate => {}
            _ => *reset = Some(candidate),
        }
    }

    pub fn is_limited(&self) -> bool {
        self.reset_at
            .lock()
            .is_some_and(|deadline| deadline > Instant::now())
    }
}

impl Default for RateLimitGate {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test(start_paused = true)]
    async fn test_unlimited_admit_is_immediate() {
        let gate = RateLimitGate::new();
        let start = Instant::now();
        gate.admit().await;
        assert_eq!(start.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_admit_waits_out_reset() {
        let gate = RateLimitGate::with_drain_pause(Duration::from_millis(100));
        gate.report_rate_limited(Duration::from_secs(1));
        assert!(gate.is_limited());

        let start = Instant::now();
        gate.admit().await;
        assert!(start.elapsed() >= Duration::from_secs(1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_fifo_order_under_limit() {
        let gate = Arc::new(RateLimitGate::with_drain_pause(Duration::from_millis(100)));
        gate.report_rate_limited(Duration::from_millis(500));

        let order = Arc::new(Mutex::new(Vec::new()));
        let mut handles = Vec::new();
        for i in 0..3 {
            let gate = gate.clone();
            let order = order.clone();
            handles.push(tokio::spawn(async move {
                gate.admit().await;
                order.lock().push(i);
            }));
            // Let the task reach the admission queue before spawning the next
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(*order.lock(), vec![0, 1, 2]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_later_reset_wins() {
        let gate = RateLimitGate::new();
        gate.report_rate_limited(Duration::from_secs(5));
        gate.report_rate_limited(Duration::from_secs(1));

        // The 5 s deadline must still be in force
        tokio::time::sleep(Duration::from_secs(2)).await;
        assert!(gate.is_limited());
    }
}
