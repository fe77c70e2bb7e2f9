// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Process-wide request lifecycle counters.
//!
//! Each counter is an independent atomic; no ordering holds between them.
//! A rejected request counts as seen and rejected but never as a response.
//! An admitted request that is abandoned before its handler finishes counts
//! as an exception. So once every request has finished or been dropped:
//!
//! `requests_seen == responses_sent + exceptions_observed + requests_rejected`

use crate::error::Result;
use prometheus::{Encoder, IntCounter, Registry, TextEncoder};
use serde::Serialize;

/// Lifecycle counters, registered in their own Prometheus registry.
#[derive(Clone)]
pub struct RequestCounters {
    registry: Registry,
    requests_seen: IntCounter,
    responses_sent: IntCounter,
    exceptions_observed: IntCounter,
    requests_rejected: IntCounter,
}

/// Point-in-time copy of the counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CounterSnapshot {
    pub requests_seen: u64,
    pub responses_sent: u64,
    pub exceptions_observed: u64,
    pub requests_rejected: u64,
}

impl RequestCounters {
    pub fn new() -> Result<Self> {
        let registry = Registry::new();

        let requests_seen = IntCounter::new(
            "throttle_requests_seen_total",
            "Requests that entered the throttle middleware",
        )?;
        let responses_sent = IntCounter::new(
            "throttle_responses_sent_total",
            "Responses produced by admitted request handlers",
        )?;
        let exceptions_observed = IntCounter::new(
            "throttle_exceptions_observed_total",
            "Admitted requests whose handler failed or panicked",
        )?;
        let requests_rejected = IntCounter::new(
            "throttle_requests_rejected_total",
            "Requests rejected with 429 by the rate limiter",
        )?;

        registry.register(Box::new(requests_seen.clone()))?;
        registry.register(Box::new(responses_sent.clone()))?;
        registry.register(Box::new(exceptions_observed.clone()))?;
        registry.register(Box::new(requests_rejected.clone()))?;

        Ok(Self {
            registry,
            requests_seen,
            responses_sent,
            exceptions_observed,
            requests_rejected,
        })
    }

    pub fn on_request_start(&self) {
        self.requests_seen.inc();
    }

    pub fn on_response(&self) {
        self.responses_sent.inc();
    }

    pub fn on_exception(&self) {
        self.exceptions_observed.inc();
    }

    pub fn on_rejected(&self) {
        self.requests_rejected.inc();
    }

    pub fn snapshot(&self) -> CounterSnapshot {
        CounterSnapshot {
            requests_seen: self.requests_seen.get(),
            responses_sent: self.responses_sent.get(),
            exceptions_observed: self.exceptions_observed.get(),
            requests_rejected: self.requests_rejected.get(),
        }
    }

    /// Render the counters in the Prometheus text exposition format.
    pub fn encode_text(&self) -> Result<String> {
        let mut buf = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buf)?;
        Ok(String::from_utf8_lossy(&buf).into_owned())
    }
}
