//! Per-endpoint sliding-window rate limiter (§2, used by `GraphQLQuery`).
//!
//! 15 requests per 60-second window per endpoint; a waiter past the limit
//! sleeps until the oldest request in the window expires, plus a 500 ms
//! buffer (§4.7).

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::{Duration, Instant};
use tokio::sync::Mutex as AsyncMutex;

pub const WINDOW: Duration = Duration::from_secs(60);
pub const MAX_REQUESTS: usize = 15;
pub const BUFFER: Duration = Duration::from_millis(500);

/// A single endpoint's sliding window of request timestamps.
#[derive(Default)]
struct Window {
    timestamps: VecDeque<Instant>,
}

impl Window {
    fn prune(&mut self, now: Instant) {
        while let Some(&front) = self.timestamps.front() {
            if now.duration_since(front) >= WINDOW {
                self.timestamps.pop_front();
            } else {
                break;
            }
        }
    }

    /// Returns `Some(wait)` if the caller must sleep `wait` before the
    /// request may proceed; `None` if it may proceed immediately.
    fn check(&mut self, now: Instant) -> Option<Duration> {
        self.prune(now);
        if self.timestamps.len() < MAX_REQUESTS {
            None
        } else {
            let oldest = *self.timestamps.front().unwrap();
            let elapsed = now.duration_since(oldest);
            Some((WINDOW - elapsed) + BUFFER)
        }
    }

    fn record(&mut self, now: Instant) {
        self.timestamps.push_back(now);
    }
}

/// Rate limiter keyed by endpoint URL. Internally serializes the
/// check-then-record step with a lock held only across synchronous code,
/// released before any `await` (§5's mutex discipline).
pub struct RateLimiter {
    windows: Mutex<HashMap<String, Window>>,
    // Serializes the wait-then-record sequence per endpoint so concurrent
    // waiters don't all wake up and overshoot the window together.
    gate: AsyncMutex<()>,
}

impl RateLimiter {
    pub fn new() -> Self {
        Self {
            windows: Mutex::new(HashMap::new()),
            gate: AsyncMutex::new(()),
        }
    }

    /// Block until a request to `endpoint` is permitted, then record it.
    pub async fn acquire(&self, endpoint: &str) {
        loop {
            let _permit = self.gate.lock().await;
            let now = Instant::now();
            let wait = {
                let mut windows = self.windows.lock().unwrap();
                let window = windows.entry(endpoint.to_string()).or_default();
                window.check(now)
            };
            match wait {
                None => {
                    let mut windows = self.windows.lock().unwrap();
                    windows
                        .entry(endpoint.to_string())
                        .or_default()
                        .record(Instant::now());
                    return;
                }
                Some(duration) => {
                    drop(_permit);
                    tokio::time::sleep(duration).await;
                }
            }
        }
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new()
    }
}
