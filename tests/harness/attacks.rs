// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: Apache-2.0

//! Flood patterns for throttle security testing.

use super::generators::interval_for;
use std::time::Duration;

/// Flood pattern configuration.
#[derive(Debug, Clone)]
pub struct AttackConfig {
    /// Total number of requests to send
    pub total_requests: usize,
    /// Requests per second across all clients
    pub requests_per_second: f64,
    /// Number of distinct client IPs, used round-robin
    pub unique_ips: usize,
    /// Whether requests carry a peer address at all
    pub identified: bool,
    /// Whether each request forges a fresh X-Forwarded-For value
    pub spoof_forwarded_for: bool,
}

impl Default for AttackConfig {
    fn default() -> Self {
        Self {
            total_requests: 100,
            requests_per_second: 10.0,
            unique_ips: 1,
            identified: true,
            spoof_forwarded_for: false,
        }
    }
}

/// Predefined flood patterns.
impl AttackConfig {
    /// Single IP flood - basic DoS from one client.
    pub fn single_ip_flood() -> Self {
        Self {
            total_requests: 200,
            requests_per_second: 100.0,
            ..Default::default()
        }
    }

    /// Distributed flood - many IPs, each staying under its own limit.
    pub fn distributed_attack() -> Self {
        Self {
            total_requests: 500,
            requests_per_second: 50.0,
            unique_ips: 100,
            ..Default::default()
        }
    }

    /// Burst - very high rate for a short time.
    pub fn burst_attack() -> Self {
        Self {
            total_requests: 50,
            requests_per_second: 500.0,
            ..Default::default()
        }
    }

    /// Slow drip - exactly at the default limit of 15 per 60 seconds.
    pub fn slow_drip() -> Self {
        Self {
            total_requests: 100,
            requests_per_second: 0.25,
            ..Default::default()
        }
    }

    /// Sustained flood over several windows.
    pub fn sustained_flood() -> Self {
        Self {
            total_requests: 600,
            requests_per_second: 2.0,
            ..Default::default()
        }
    }

    /// Requests with no identifiable client.
    pub fn anonymous_flood() -> Self {
        Self {
            total_requests: 60,
            requests_per_second: 10.0,
            unique_ips: 20,
            identified: false,
            ..Default::default()
        }
    }

    /// One client rotating forged X-Forwarded-For values.
    pub fn forwarded_for_spoofing() -> Self {
        Self {
            total_requests: 100,
            requests_per_second: 20.0,
            spoof_forwarded_for: true,
            ..Default::default()
        }
    }

    /// Gap between consecutive requests.
    pub fn interval(&self) -> Duration {
        interval_for(self.requests_per_second)
    }

    /// Simulated duration of the whole flood.
    pub fn expected_duration(&self) -> Duration {
        Duration::from_secs_f64(self.total_requests as f64 / self.requests_per_second)
    }
}

/// Bounds on how many requests a sliding-window limiter may admit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AttackExpectations {
    pub min_admitted: usize,
    pub max_admitted: usize,
}

impl AttackConfig {
    /// Number of limiter buckets the requests land in.
    pub fn buckets(&self) -> usize {
        if self.identified && !self.spoof_forwarded_for {
            self.unique_ips.max(1)
        } else {
            1
        }
    }

    /// Admission bounds for this pattern under `limit` per `window`.
    pub fn expectations(&self, limit: usize, window: Duration) -> AttackExpectations {
        let buckets = self.buckets();
        let mut min_admitted = 0;
        let mut max_admitted = 0;

        for bucket in 0..buckets {
            let requests = (self.total_requests + buckets - 1 - bucket) / buckets;
            if requests == 0 {
                continue;
            }

            let gap = self.interval().as_secs_f64() * buckets as f64;
            if gap * limit as f64 >= window.as_secs_f64() {
                // The client never has more than `limit` requests in flight.
                min_admitted += requests;
                max_admitted += requests;
                continue;
            }

            // Any window-length span admits at most `limit`.
            let span = gap * (requests - 1) as f64;
            let spans = (span / window.as_secs_f64()).floor() as usize + 1;
            min_admitted += requests.min(limit);
            max_admitted += requests.min(limit * spans);
        }

        AttackExpectations {
            min_admitted,
            max_admitted,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slow_drip_fully_admitted() {
        let config = AttackConfig::slow_drip();
        let expected = config.expectations(15, Duration::from_secs(60));
        assert_eq!(expected.min_admitted, 100);
        assert_eq!(expected.max_admitted, 100);
    }

    #[test]
    fn test_single_flood_bounded_by_limit() {
        let config = AttackConfig::single_ip_flood();
        let expected = config.expectations(15, Duration::from_secs(60));
        assert_eq!(expected.min_admitted, 15);
        assert_eq!(expected.max_admitted, 15);
    }

    #[test]
    fn test_anonymous_clients_share_one_bucket() {
        let config = AttackConfig::anonymous_flood();
        assert_eq!(config.buckets(), 1);
        assert_eq!(AttackConfig::distributed_attack().buckets(), 100);
    }

    #[test]
    fn test_expected_duration() {
        let config = AttackConfig::sustained_flood();
        assert_eq!(config.expected_duration(), Duration::from_secs(300));
    }
}
