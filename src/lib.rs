// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Request Throttle
//!
//! Per-client request throttling for axum services:
//!
//! - Sliding-window rate limiting keyed by client address (15 requests per
//!   60 seconds by default)
//! - 429 responses for rejected requests; admitted responses untouched
//! - Process-wide counters for requests seen, responses sent, handler
//!   failures and rejections, exported in Prometheus format
//! - Optional trust of `X-Forwarded-For` from known reverse proxies
//!
//! State lives in memory for the lifetime of the process. Separate instances
//! do not share limits.

pub mod clock;
pub mod config;
pub mod counters;
pub mod error;
pub mod handlers;
pub mod key;
pub mod limiter;
pub mod middleware;
pub mod user_agent;

pub use clock::{Clock, ManualClock, MonotonicClock};
pub use config::Config;
pub use counters::{CounterSnapshot, RequestCounters};
pub use error::{Result, ThrottleError};
pub use key::{ClientKey, KeyExtractor};
pub use limiter::{Decision, LimiterConfig, SlidingWindowLimiter};
pub use middleware::{Throttle, ThrottleLayer, ThrottleState};
