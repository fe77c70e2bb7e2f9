// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Configuration for the request throttle service.
//!
//! Values come from, in increasing precedence: built-in defaults, an optional
//! JSON file named by `CONFIG_FILE`, and environment variables.

use crate::error::{Result, ThrottleError};
use crate::handlers::RESERVED_PATHS;
use crate::key::{ClientKey, ForwardedFor, KeyExtractor, PeerAddr};
use crate::limiter::LimiterConfig;
use serde::{Deserialize, Serialize};
use std::net::{IpAddr, SocketAddr};
use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

/// Configuration for the request throttle service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Server bind address (default: 0.0.0.0:8080)
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,

    /// Throttling configuration
    #[serde(default)]
    pub throttle: ThrottleConfig,

    /// Metrics configuration
    #[serde(default)]
    pub metrics: MetricsConfig,
}

/// Per-client throttling configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThrottleConfig {
    /// Maximum admitted requests per client per window (default: 15)
    #[serde(default = "default_limit")]
    pub limit: u32,

    /// Sliding window length in seconds (default: 60)
    #[serde(default = "default_window_secs")]
    pub window_secs: u64,

    /// How often idle clients are evicted, in seconds (default: 60)
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,

    /// Bucket shared by requests with no identifiable client (default: "unknown")
    #[serde(default = "default_unknown_key")]
    pub unknown_key: String,

    /// Reverse proxies whose X-Forwarded-For header is trusted (default: none)
    #[serde(default)]
    pub trusted_proxies: Vec<String>,
}

/// Metrics configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricsConfig {
    /// Enable Prometheus metrics endpoint (default: true)
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Metrics endpoint path (default: /metrics)
    #[serde(default = "default_metrics_path")]
    pub path: String,
}

// Default value functions
fn default_bind_addr() -> String {
    "0.0.0.0:8080".to_string()
}

fn default_limit() -> u32 {
    15
}

fn default_window_secs() -> u64 {
    60
}

fn default_sweep_interval_secs() -> u64 {
    60
}

fn default_unknown_key() -> String {
    crate::key::UNKNOWN_KEY.to_string()
}

fn default_true() -> bool {
    true
}

fn default_metrics_path() -> String {
    "/metrics".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
            throttle: ThrottleConfig::default(),
            metrics: MetricsConfig::default(),
        }
    }
}

impl Default for ThrottleConfig {
    fn default() -> Self {
        Self {
            limit: default_limit(),
            window_secs: default_window_secs(),
            sweep_interval_secs: default_sweep_interval_secs(),
            unknown_key: default_unknown_key(),
            trusted_proxies: Vec::new(),
        }
    }
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: default_true(),
            path: default_metrics_path(),
        }
    }
}

impl Config {
    /// Defaults, then `CONFIG_FILE` if set, then environment overrides.
    pub fn load() -> Result<Self> {
        let mut config = match std::env::var("CONFIG_FILE") {
            Ok(path) => Self::from_file(path)?,
            Err(_) => Self::default(),
        };
        config.apply_overrides(|name| std::env::var(name).ok());
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a JSON file. Missing fields take defaults.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config = serde_json::from_str(&contents)?;
        Ok(config)
    }

    /// Apply `BIND_ADDR`, `THROTTLE_*` and `TRUSTED_PROXIES` overrides read
    /// through `lookup`. Unparseable numbers are ignored.
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(addr) = lookup("BIND_ADDR") {
            self.bind_addr = addr;
        }
        if let Some(limit) = parse_override(&lookup, "THROTTLE_LIMIT") {
            self.throttle.limit = limit;
        }
        if let Some(window) = parse_override(&lookup, "THROTTLE_WINDOW_SECS") {
            self.throttle.window_secs = window;
        }
        if let Some(sweep) = parse_override(&lookup, "THROTTLE_SWEEP_SECS") {
            self.throttle.sweep_interval_secs = sweep;
        }
        if let Some(key) = lookup("THROTTLE_UNKNOWN_KEY") {
            self.throttle.unknown_key = key;
        }
        if let Some(proxies) = lookup("TRUSTED_PROXIES") {
            self.throttle.trusted_proxies = proxies
                .split(',')
                .map(str::trim)
                .filter(|p| !p.is_empty())
                .map(str::to_string)
                .collect();
        }
    }

    pub fn validate(&self) -> Result<()> {
        self.socket_addr()?;
        self.throttle.limiter_config()?;
        self.throttle.sweep_interval()?;
        self.throttle.proxy_addrs()?;
        self.metrics.validate()
    }

    pub fn socket_addr(&self) -> Result<SocketAddr> {
        self.bind_addr
            .parse()
            .map_err(|_| ThrottleError::InvalidBindAddr(self.bind_addr.clone()))
    }
}

impl MetricsConfig {
    /// The path must be a static route of the form `/segment[/segment...]`
    /// that no built-in endpoint already uses.
    pub fn validate(&self) -> Result<()> {
        let path = self.path.as_str();
        let well_formed = path
            .strip_prefix('/')
            .map(|rest| rest.split('/').all(is_static_segment))
            .unwrap_or(false);

        if !well_formed || RESERVED_PATHS.contains(&path) {
            return Err(ThrottleError::InvalidMetricsPath(self.path.clone()));
        }
        Ok(())
    }
}

fn is_static_segment(segment: &str) -> bool {
    !segment.is_empty()
        && segment
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | '~'))
}

impl ThrottleConfig {
    pub fn limiter_config(&self) -> Result<LimiterConfig> {
        LimiterConfig::new(self.limit, Duration::from_secs(self.window_secs))
    }

    pub fn sweep_interval(&self) -> Result<Duration> {
        if self.sweep_interval_secs == 0 {
            return Err(ThrottleError::InvalidSweepInterval);
        }
        Ok(Duration::from_secs(self.sweep_interval_secs))
    }

    pub fn unknown_key(&self) -> ClientKey {
        ClientKey::new(&self.unknown_key)
    }

    pub fn proxy_addrs(&self) -> Result<Vec<IpAddr>> {
        self.trusted_proxies
            .iter()
            .map(|p| p.parse().map_err(|_| ThrottleError::InvalidProxy(p.clone())))
            .collect()
    }

    /// Peer-address keys, or forwarded-header keys when proxies are trusted.
    pub fn key_extractor(&self) -> Result<Arc<dyn KeyExtractor>> {
        let proxies = self.proxy_addrs()?;
        if proxies.is_empty() {
            Ok(Arc::new(PeerAddr))
        } else {
            Ok(Arc::new(ForwardedFor::new(proxies)))
        }
    }
}

fn parse_override<T, F>(lookup: &F, name: &str) -> Option<T>
where
    T: FromStr,
    F: Fn(&str) -> Option<String>,
{
    let raw = lookup(name)?;
    match raw.trim().parse() {
        Ok(value) => Some(value),
        Err(_) => {
            warn!(variable = name, value = %raw, "Ignoring unparseable override");
            None
        }
    }
}
