// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Sliding-window rate limiter.
//!
//! Every client key owns a log of the instants at which its requests were
//! admitted. A new request is admitted while fewer than `limit` entries fall
//! inside the trailing `window`. Rejected requests are never logged.

use crate::error::{Result, ThrottleError};
use crate::key::ClientKey;
use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};
use tracing::{debug, trace};

/// Default number of requests admitted per window.
pub const DEFAULT_LIMIT: u32 = 15;
/// Default window length.
pub const DEFAULT_WINDOW: Duration = Duration::from_secs(60);

/// Immutable limiter parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LimiterConfig {
    limit: u32,
    window: Duration,
}

impl LimiterConfig {
    /// Both `limit` and `window` must be non-zero.
    pub fn new(limit: u32, window: Duration) -> Result<Self> {
        if limit == 0 {
            return Err(ThrottleError::InvalidLimit);
        }
        if window.is_zero() {
            return Err(ThrottleError::InvalidWindow);
        }
        Ok(Self { limit, window })
    }

    pub fn limit(&self) -> u32 {
        self.limit
    }

    pub fn window(&self) -> Duration {
        self.window
    }
}

impl Default for LimiterConfig {
    fn default() -> Self {
        Self {
            limit: DEFAULT_LIMIT,
            window: DEFAULT_WINDOW,
        }
    }
}

/// Outcome of a limiter check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// Request admitted and recorded.
    Admit {
        /// Slots left in the current window after this admission
        remaining: u32,
    },
    /// Request rejected and not recorded.
    Reject {
        /// Time until the oldest logged request leaves the window
        retry_after: Duration,
    },
}

impl Decision {
    pub fn is_admit(&self) -> bool {
        matches!(self, Decision::Admit { .. })
    }
}

/// Admission log for one client, oldest first.
type RequestLog = VecDeque<Instant>;

/// Thread-safe sliding-window limiter.
///
/// A single mutex guards the whole key map, so prune, count and append
/// happen as one critical section per check.
#[derive(Debug)]
pub struct SlidingWindowLimiter {
    config: LimiterConfig,
    logs: Mutex<HashMap<ClientKey, RequestLog>>,
}

impl SlidingWindowLimiter {
    pub fn new(config: LimiterConfig) -> Self {
        Self {
            config,
            logs: Mutex::new(HashMap::new()),
        }
    }

    pub fn config(&self) -> LimiterConfig {
        self.config
    }

    /// Decide whether a request from `key` arriving at `now` is admitted.
    pub fn check(&self, key: &ClientKey, now: Instant) -> Decision {
        let window = self.config.window;
        let limit = self.config.limit as usize;

        let mut logs = self.lock();
        let log = logs.entry(key.clone()).or_default();

        let pruned = prune(log, now, window);
        if pruned > 0 {
            trace!(%key, pruned, "Pruned stale entries");
        }

        if log.len() >= limit {
            // The log is non-empty here since limit > 0.
            let oldest = log.front().copied().unwrap_or(now);
            let retry_after = window.saturating_sub(now.saturating_duration_since(oldest));
            trace!(%key, in_window = log.len(), ?retry_after, "Window full");
            return Decision::Reject { retry_after };
        }

        // Callers sample the clock before taking the lock, so `now` may
        // trail the newest entry slightly.
        let pos = log.partition_point(|t| *t <= now);
        log.insert(pos, now);

        let remaining = (limit - log.len()) as u32;
        trace!(%key, in_window = log.len(), remaining, "Logged admission");
        Decision::Admit { remaining }
    }

    /// Number of admitted requests from `key` still inside the window at `now`.
    pub fn in_window(&self, key: &ClientKey, now: Instant) -> usize {
        let window = self.config.window;
        self.lock()
            .get(key)
            .map(|log| {
                log.iter()
                    .filter(|t| now.saturating_duration_since(**t) < window)
                    .count()
            })
            .unwrap_or(0)
    }

    /// Number of keys currently holding a log.
    pub fn tracked_keys(&self) -> usize {
        self.lock().len()
    }

    /// Prune every log and drop the ones left empty.
    ///
    /// Returns the number of keys evicted.
    pub fn sweep(&self, now: Instant) -> usize {
        let window = self.config.window;
        let mut logs = self.lock();
        let before = logs.len();

        logs.retain(|_, log| {
            prune(log, now, window);
            !log.is_empty()
        });

        let evicted = before - logs.len();
        if evicted > 0 {
            debug!(evicted, remaining_keys = logs.len(), "Swept idle clients");
        }
        evicted
    }

    /// Drop all state.
    pub fn clear(&self) {
        self.lock().clear();
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<ClientKey, RequestLog>> {
        // Every critical section leaves the map consistent, so a poisoned
        // lock still guards valid data.
        self.logs.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for SlidingWindowLimiter {
    fn default() -> Self {
        Self::new(LimiterConfig::default())
    }
}

/// Remove entries at least `window` old. Returns how many were removed.
fn prune(log: &mut RequestLog, now: Instant, window: Duration) -> usize {
    let mut removed = 0;
    while let Some(&oldest) = log.front() {
        if now.saturating_duration_since(oldest) >= window {
            log.pop_front();
            removed += 1;
        } else {
            break;
        }
    }
    removed
}
