// SPDX-License-Identifier: PMPL-1.0-or-later
//! Error types for the request throttle

use thiserror::Error;

/// Errors raised while configuring or assembling the throttle.
///
/// Request handling itself never fails: a throttled request is answered with
/// a 429, not reported through this type.
#[derive(Debug, Error)]
pub enum ThrottleError {
    #[error("Invalid limit: must be a positive number of requests")]
    InvalidLimit,

    #[error("Invalid window: must be a positive duration")]
    InvalidWindow,

    #[error("Invalid sweep interval: must be a positive number of seconds")]
    InvalidSweepInterval,

    #[error("Invalid bind address: {0}")]
    InvalidBindAddr(String),

    #[error("Invalid metrics path: {0} (must be a static path not used by another route)")]
    InvalidMetricsPath(String),

    #[error("Invalid trusted proxy address: {0}")]
    InvalidProxy(String),

    #[error("Failed to read config file: {0}")]
    ConfigRead(#[from] std::io::Error),

    #[error("Failed to parse config file: {0}")]
    ConfigParse(#[from] serde_json::Error),

    #[error("Metrics error: {0}")]
    Metrics(#[from] prometheus::Error),
}

/// Result type alias
pub type Result<T> = std::result::Result<T, ThrottleError>;
