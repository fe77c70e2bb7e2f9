// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Records the caller's `User-Agent` on the request so handlers can read it
//! as an extension instead of re-parsing headers.

use axum::{
    extract::Request,
    http::header,
    middleware::Next,
    response::Response,
};
use tracing::trace;

/// The `User-Agent` header of the current request, if it had a valid one.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UserAgent(pub Option<String>);

impl UserAgent {
    pub fn as_deref(&self) -> Option<&str> {
        self.0.as_deref()
    }
}

/// `axum::middleware::from_fn` middleware inserting [`UserAgent`].
pub async fn record_user_agent(mut request: Request, next: Next) -> Response {
    let user_agent = request
        .headers()
        .get(header::USER_AGENT)
        .and_then(|v| v.to_str().ok())
        .map(str::to_owned);

    trace!(user_agent = ?user_agent, "Recorded user agent");
    request.extensions_mut().insert(UserAgent(user_agent));

    next.run(request).await
}
