// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Tower middleware that throttles requests per client and tallies their
//! lifecycle.
//!
//! Per request, in order:
//!
//! 1. count the request as seen
//! 2. derive the client key, falling back to the sentinel key
//! 3. consult the sliding-window limiter
//! 4. on rejection, answer 429 without touching the inner service
//! 5. on admission, run the inner service and count its response, or count
//!    the failure and hand it back unchanged
//!
//! An admitted request whose future is dropped before the handler finishes
//! (client disconnect, timeout) is counted as an exception.
//!
//! The middleware observes failures but never recovers from them: an inner
//! `Err` is returned as-is and a panic is resumed with its original payload.

use crate::clock::{Clock, MonotonicClock};
use crate::config::ThrottleConfig;
use crate::counters::RequestCounters;
use crate::error::Result;
use crate::key::{ClientKey, KeyExtractor, PeerAddr};
use crate::limiter::{Decision, LimiterConfig, SlidingWindowLimiter};
use axum::{
    http::{header, HeaderValue, Request, StatusCode},
    response::{IntoResponse, Response},
};
use futures::future::BoxFuture;
use futures::FutureExt;
use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;
use tower::{Layer, Service};
use tracing::{debug, error, info, warn};

/// Everything the throttle shares across requests.
///
/// Constructed once at startup and owned by the [`ThrottleLayer`]; the
/// process holds it for its whole lifetime.
pub struct ThrottleState {
    limiter: SlidingWindowLimiter,
    counters: RequestCounters,
    clock: Arc<dyn Clock>,
    extractor: Arc<dyn KeyExtractor>,
    unknown_key: ClientKey,
}

impl ThrottleState {
    /// State with the monotonic clock, peer-address keys and the default
    /// sentinel key.
    pub fn new(config: LimiterConfig) -> Result<Self> {
        Ok(Self {
            limiter: SlidingWindowLimiter::new(config),
            counters: RequestCounters::new()?,
            clock: Arc::new(MonotonicClock),
            extractor: Arc::new(PeerAddr),
            unknown_key: ClientKey::unknown(),
        })
    }

    /// State built from service configuration, using the monotonic clock.
    pub fn from_config(config: &ThrottleConfig) -> Result<Self> {
        Ok(Self::new(config.limiter_config()?)?
            .with_extractor(config.key_extractor()?)
            .with_unknown_key(config.unknown_key()))
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_extractor(mut self, extractor: Arc<dyn KeyExtractor>) -> Self {
        self.extractor = extractor;
        self
    }

    pub fn with_unknown_key(mut self, key: ClientKey) -> Self {
        self.unknown_key = key;
        self
    }

    pub fn limiter(&self) -> &SlidingWindowLimiter {
        &self.limiter
    }

    pub fn counters(&self) -> &RequestCounters {
        &self.counters
    }

    pub fn clock(&self) -> &dyn Clock {
        self.clock.as_ref()
    }

    /// Evict clients with nothing left in their window.
    pub fn sweep(&self) -> usize {
        self.limiter.sweep(self.clock.now())
    }

    /// The 429 answer for a rejected request.
    pub fn rejection_response(&self, retry_after: Duration) -> Response {
        let config = self.limiter.config();
        let body = rejection_message(config.limit(), config.window());
        let retry_secs = retry_after_secs(retry_after);

        (
            StatusCode::TOO_MANY_REQUESTS,
            [
                (
                    header::CONTENT_TYPE,
                    HeaderValue::from_static("text/plain; charset=utf-8"),
                ),
                (header::RETRY_AFTER, HeaderValue::from(retry_secs)),
            ],
            body,
        )
            .into_response()
    }
}

impl fmt::Debug for ThrottleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ThrottleState")
            .field("limiter", &self.limiter.config())
            .field("counters", &self.counters.snapshot())
            .field("unknown_key", &self.unknown_key)
            .finish_non_exhaustive()
    }
}

/// Body text of a rejection.
pub fn rejection_message(limit: u32, window: Duration) -> String {
    format!(
        "Too many requests! Maximum {} requests per {} seconds",
        limit,
        window.as_secs_f64()
    )
}

/// Whole seconds for a `Retry-After` header, rounded up.
fn retry_after_secs(retry_after: Duration) -> u64 {
    let secs = retry_after.as_secs();
    if retry_after.subsec_nanos() > 0 {
        secs + 1
    } else {
        secs
    }
}

/// Layer that wraps services in [`Throttle`].
#[derive(Debug, Clone)]
pub struct ThrottleLayer {
    state: Arc<ThrottleState>,
}

impl ThrottleLayer {
    pub fn new(state: Arc<ThrottleState>) -> Self {
        Self { state }
    }
}

impl<S> Layer<S> for ThrottleLayer {
    type Service = Throttle<S>;

    fn layer(&self, inner: S) -> Self::Service {
        Throttle {
            inner,
            state: self.state.clone(),
        }
    }
}

/// Throttling middleware service.
#[derive(Debug, Clone)]
pub struct Throttle<S> {
    inner: S,
    state: Arc<ThrottleState>,
}

impl<S, B> Service<Request<B>> for Throttle<S>
where
    S: Service<Request<B>, Response = Response> + Clone + Send + 'static,
    S::Future: Send + 'static,
    S::Error: fmt::Display + Send + 'static,
    B: Send + 'static,
{
    type Response = Response;
    type Error = S::Error;
    type Future = BoxFuture<'static, std::result::Result<Response, S::Error>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<std::result::Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, request: Request<B>) -> Self::Future {
        let state = self.state.clone();
        state.counters.on_request_start();

        let key = match state.extractor.extract(request.headers(), request.extensions()) {
            Some(key) => key,
            None => {
                debug!(path = %request.uri().path(), "No client identity, using sentinel key");
                state.unknown_key.clone()
            }
        };

        let now = state.clock.now();
        match state.limiter.check(&key, now) {
            Decision::Reject { retry_after } => {
                state.counters.on_rejected();
                info!(
                    %key,
                    path = %request.uri().path(),
                    limit = state.limiter.config().limit(),
                    retry_after_secs = retry_after_secs(retry_after),
                    "Request throttled"
                );
                let response = state.rejection_response(retry_after);
                return async move { Ok::<_, S::Error>(response) }.boxed();
            }
            Decision::Admit { remaining } => {
                debug!(%key, remaining, "Request admitted");
            }
        }

        // Take the service that was driven to readiness and leave a fresh
        // clone in its place.
        let clone = self.inner.clone();
        let mut inner = std::mem::replace(&mut self.inner, clone);

        let handled = AssertUnwindSafe(async move { inner.call(request).await }).catch_unwind();
        let outcome = Outcome::pending(state, key.clone());

        async move {
            match handled.await {
                Ok(Ok(response)) => {
                    outcome.responded();
                    Ok(response)
                }
                Ok(Err(err)) => {
                    outcome.failed();
                    warn!(%key, error = %err, "Handler failed");
                    Err(err)
                }
                Err(panic) => {
                    outcome.failed();
                    error!(%key, "Handler panicked");
                    std::panic::resume_unwind(panic)
                }
            }
        }
        .boxed()
    }
}

/// Settles the counters for one admitted request exactly once.
///
/// Dropped without being settled, the request was abandoned by its caller
/// before the handler finished and is counted as an exception.
struct Outcome {
    state: Arc<ThrottleState>,
    key: ClientKey,
    settled: bool,
}

impl Outcome {
    fn pending(state: Arc<ThrottleState>, key: ClientKey) -> Self {
        Self {
            state,
            key,
            settled: false,
        }
    }

    fn responded(mut self) {
        self.settled = true;
        self.state.counters.on_response();
    }

    fn failed(mut self) {
        self.settled = true;
        self.state.counters.on_exception();
    }
}

impl Drop for Outcome {
    fn drop(&mut self) {
        if !self.settled {
            self.state.counters.on_exception();
            debug!(key = %self.key, "Request abandoned before the handler finished");
        }
    }
}
