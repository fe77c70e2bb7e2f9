// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! HTTP handlers and router assembly.
//!
//! Every route, operational ones included, sits behind the throttle so the
//! lifecycle counters cover all traffic the process serves.

use crate::config::Config;
use crate::counters::CounterSnapshot;
use crate::middleware::{ThrottleLayer, ThrottleState};
use crate::user_agent::{record_user_agent, UserAgent};
use axum::{
    extract::{Query, State},
    http::{header, Method, StatusCode, Uri},
    middleware::from_fn,
    response::{IntoResponse, Response},
    routing::get,
    Extension, Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::{catch_panic::CatchPanicLayer, trace::TraceLayer};
use tracing::error;

pub const HEALTH_PATH: &str = "/health";
pub const HEALTHZ_PATH: &str = "/healthz";
pub const STATS_PATH: &str = "/stats";
pub const HELLO_PATH: &str = "/api/hello";
pub const CONCAT_PATH: &str = "/request/get";
pub const WHOAMI_PATH: &str = "/request/whoami";

/// Paths the router always serves. The metrics endpoint cannot reuse them.
pub const RESERVED_PATHS: &[&str] = &[
    HEALTH_PATH,
    HEALTHZ_PATH,
    STATS_PATH,
    HELLO_PATH,
    CONCAT_PATH,
    WHOAMI_PATH,
];

/// Shared application state.
pub struct AppState {
    pub throttle: Arc<ThrottleState>,
    pub config: Config,
}

/// Health check response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub service: &'static str,
    pub version: &'static str,
}

/// Throttle statistics.
#[derive(Debug, Serialize)]
pub struct StatsResponse {
    #[serde(flatten)]
    pub counters: CounterSnapshot,
    pub tracked_keys: usize,
    pub limit: u32,
    pub window_secs: f64,
}

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message: &'static str,
}

/// Query parameters for [`concat`].
#[derive(Debug, Default, Deserialize)]
pub struct ConcatParams {
    #[serde(default)]
    pub a: String,
    #[serde(default)]
    pub b: String,
}

#[derive(Debug, Serialize)]
pub struct ConcatResponse {
    pub a: String,
    pub b: String,
    pub result: String,
}

#[derive(Debug, Serialize)]
pub struct WhoAmIResponse {
    pub method: String,
    pub path: String,
    pub user_agent: Option<String>,
}

/// Build the application router with the full middleware stack.
///
/// Outermost first: request tracing, panic-to-500 conversion, the throttle,
/// user-agent recording.
///
/// `state.config` must have passed [`Config::validate`].
pub fn router(state: Arc<AppState>) -> Router {
    let mut router = Router::new()
        .route(HEALTH_PATH, get(health))
        .route(HEALTHZ_PATH, get(health))
        .route(STATS_PATH, get(stats))
        .route(HELLO_PATH, get(hello))
        .route(CONCAT_PATH, get(concat))
        .route(WHOAMI_PATH, get(whoami))
        .fallback(not_found);

    if state.config.metrics.enabled {
        router = router.route(&state.config.metrics.path, get(metrics));
    }

    router
        .layer(from_fn(record_user_agent))
        .layer(ThrottleLayer::new(state.throttle.clone()))
        .layer(CatchPanicLayer::new())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Health check endpoint.
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        service: "request-throttle",
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// Current lifecycle counters and limiter occupancy.
pub async fn stats(State(state): State<Arc<AppState>>) -> Json<StatsResponse> {
    let limiter = state.throttle.limiter();
    let config = limiter.config();

    Json(StatsResponse {
        counters: state.throttle.counters().snapshot(),
        tracked_keys: limiter.tracked_keys(),
        limit: config.limit(),
        window_secs: config.window().as_secs_f64(),
    })
}

/// Prometheus scrape endpoint.
pub async fn metrics(State(state): State<Arc<AppState>>) -> Response {
    match state.throttle.counters().encode_text() {
        Ok(body) => (
            [(header::CONTENT_TYPE, prometheus::TEXT_FORMAT)],
            body,
        )
            .into_response(),
        Err(err) => {
            error!(error = %err, "Failed to encode metrics");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

pub async fn hello() -> Json<MessageResponse> {
    Json(MessageResponse {
        message: "Hello, World!",
    })
}

/// Concatenate the `a` and `b` query parameters.
pub async fn concat(Query(params): Query<ConcatParams>) -> Json<ConcatResponse> {
    let result = format!("{}{}", params.a, params.b);
    Json(ConcatResponse {
        a: params.a,
        b: params.b,
        result,
    })
}

pub async fn not_found() -> (StatusCode, &'static str) {
    (StatusCode::NOT_FOUND, "Not Found")
}

/// Echo what the server knows about the caller's request.
pub async fn whoami(
    method: Method,
    uri: Uri,
    Extension(user_agent): Extension<UserAgent>,
) -> Json<WhoAmIResponse> {
    Json(WhoAmIResponse {
        method: method.to_string(),
        path: uri.path().to_string(),
        user_agent: user_agent.0,
    })
}
