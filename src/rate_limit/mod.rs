// Rate limiting for outbound vendor API calls.
//
// Fixed-window counter per (adapter, resource) key. Quotas are registered
// from adapter config at startup; unregistered keys fall back to a default
// quota. Acquisition is fail-fast: callers receive the remaining window as
// `retry_after` and must back off rather than retry immediately.

use crate::error::AdapterError;
use dashmap::DashMap;
use std::time::{Duration, Instant};

/// Default quota applied to keys without a registered limit.
const DEFAULT_LIMIT: u32 = 100;
const DEFAULT_WINDOW: Duration = Duration::from_secs(60);

/// Quota for a single key: at most `limit` points per `window`.
#[derive(Clone, Copy, Debug)]
struct Quota {
    limit: u32,
    window: Duration,
}

/// Counter state for one window of one key.
struct WindowState {
    window_start: Instant,
    count: u32,
}

impl WindowState {
    fn new() -> Self {
        Self {
            window_start: Instant::now(),
            count: 0,
        }
    }

    /// Try to consume `cost` points. Resets the counter at the window
    /// boundary. Returns the remaining window time on rejection.
    fn try_consume(&mut self, cost: u32, quota: Quota) -> Result<(), Duration> {
        let now = Instant::now();
        let elapsed = now.duration_since(self.window_start);
        if elapsed >= quota.window {
            self.window_start = now;
            self.count = 0;
        }

        if self.count.saturating_add(cost) > quota.limit {
            let remaining = quota.window.saturating_sub(now.duration_since(self.window_start));
            // retry_after must be positive even at the window edge
            return Err(remaining.max(Duration::from_millis(1)));
        }

        self.count += cost;
        Ok(())
    }
}

/// Keyed fixed-window rate limiter.
///
/// Windows are created lazily on first acquisition. State is in-memory
/// only (resets on restart). Safe under concurrent callers: the DashMap
/// entry lock makes each increment-and-check atomic.
pub struct RateLimiter {
    quotas: DashMap<String, Quota>,
    windows: DashMap<String, WindowState>,
}

impl RateLimiter {
    pub fn new() -> Self {
        Self {
            quotas: DashMap::new(),
            windows: DashMap::new(),
        }
    }

    /// Registers the quota for `key`, replacing any existing one.
    pub fn set_limit(&self, key: &str, limit: u32, window: Duration) {
        self.quotas.insert(key.to_string(), Quota { limit, window });
    }

    /// Consumes `cost` points from the window for `key`.
    ///
    /// Fails with `AdapterError::RateLimited` carrying the wait time when
    /// the quota is exhausted. A cost larger than the whole quota can
    /// never succeed and is rejected with the full window as the wait.
    pub fn acquire(&self, key: &str, cost: u32) -> Result<(), AdapterError> {
        let quota = self
            .quotas
            .get(key)
            .map(|q| *q)
            .unwrap_or(Quota {
                limit: DEFAULT_LIMIT,
                window: DEFAULT_WINDOW,
            });

        if cost > quota.limit {
            return Err(AdapterError::RateLimited {
                key: key.to_string(),
                retry_after: quota.window,
            });
        }

        let mut window = self
            .windows
            .entry(key.to_string())
            .or_insert_with(WindowState::new);

        window.try_consume(cost, quota).map_err(|retry_after| {
            AdapterError::RateLimited {
                key: key.to_string(),
                retry_after,
            }
        })
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new()
    }
}
