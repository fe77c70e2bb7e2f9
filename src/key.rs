// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Client identity for rate-limit bucketing.
//!
//! A [`ClientKey`] is whatever a [`KeyExtractor`] derives from an inbound
//! request, normally the remote IP address. Requests that carry no usable
//! identity fall back to a shared sentinel key, so every unidentifiable
//! client draws from the same bucket.

use axum::extract::ConnectInfo;
use axum::http::{Extensions, HeaderMap};
use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use tracing::{debug, warn};

/// Key used when no identity can be extracted.
pub const UNKNOWN_KEY: &str = "unknown";

const X_FORWARDED_FOR: &str = "x-forwarded-for";
const X_REAL_IP: &str = "x-real-ip";

/// Opaque requester identity. Cloning is a reference-count bump.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ClientKey(Arc<str>);

impl ClientKey {
    pub fn new(key: impl AsRef<str>) -> Self {
        Self(Arc::from(key.as_ref()))
    }

    /// The shared sentinel key.
    pub fn unknown() -> Self {
        Self::new(UNKNOWN_KEY)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ClientKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<IpAddr> for ClientKey {
    fn from(ip: IpAddr) -> Self {
        Self::new(ip.to_string())
    }
}

impl From<&str> for ClientKey {
    fn from(key: &str) -> Self {
        Self::new(key)
    }
}

/// Derives a [`ClientKey`] from the parts of a request.
///
/// Returning `None` means the request is unidentifiable; the caller decides
/// what to substitute.
pub trait KeyExtractor: Send + Sync {
    fn extract(&self, headers: &HeaderMap, extensions: &Extensions) -> Option<ClientKey>;
}

/// Keys requests by the IP of the connected peer.
///
/// Requires the server to be started with
/// `into_make_service_with_connect_info::<SocketAddr>()`.
#[derive(Debug, Clone, Copy, Default)]
pub struct PeerAddr;

impl KeyExtractor for PeerAddr {
    fn extract(&self, _headers: &HeaderMap, extensions: &Extensions) -> Option<ClientKey> {
        peer_ip(extensions).map(ClientKey::from)
    }
}

/// Keys requests by the forwarded client address when the peer is a
/// trusted reverse proxy, and by the peer IP otherwise.
///
/// Each proxy appends the address it received the request from, so
/// `X-Forwarded-For` is read right to left: trusted hops are skipped and the
/// first untrusted one is the client. Entries further left are whatever the
/// client chose to send and are never used. A hop that is not an IP address
/// keys the request by the peer instead.
#[derive(Debug, Clone, Default)]
pub struct ForwardedFor {
    trusted_proxies: Vec<IpAddr>,
}

impl ForwardedFor {
    pub fn new(trusted_proxies: Vec<IpAddr>) -> Self {
        Self { trusted_proxies }
    }

    fn is_trusted(&self, ip: &IpAddr) -> bool {
        self.trusted_proxies.contains(ip)
    }

    /// Nearest untrusted hop in `X-Forwarded-For`, across repeated headers.
    fn forwarded_client(&self, headers: &HeaderMap, peer: IpAddr) -> Option<IpAddr> {
        let hops: Vec<&str> = headers
            .get_all(X_FORWARDED_FOR)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .flat_map(|v| v.split(','))
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .collect();

        for hop in hops.into_iter().rev() {
            match hop.parse::<IpAddr>() {
                Ok(ip) if self.is_trusted(&ip) => continue,
                Ok(ip) => return Some(ip),
                Err(_) => {
                    warn!(hop, peer_ip = %peer, "Malformed X-Forwarded-For hop, using peer address");
                    return None;
                }
            }
        }
        None
    }
}

impl KeyExtractor for ForwardedFor {
    fn extract(&self, headers: &HeaderMap, extensions: &Extensions) -> Option<ClientKey> {
        let peer = peer_ip(extensions)?;

        if !self.is_trusted(&peer) {
            if headers.contains_key(X_FORWARDED_FOR) {
                warn!(peer_ip = %peer, "Untrusted peer sent X-Forwarded-For, ignoring");
            }
            return Some(ClientKey::from(peer));
        }

        if headers.contains_key(X_FORWARDED_FOR) {
            let client = match self.forwarded_client(headers, peer) {
                Some(client) => {
                    debug!(client_ip = %client, peer_ip = %peer, "Using X-Forwarded-For");
                    client
                }
                None => peer,
            };
            return Some(ClientKey::from(client));
        }

        let real_ip = headers
            .get(X_REAL_IP)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse::<IpAddr>().ok());

        match real_ip {
            Some(client) => {
                debug!(client_ip = %client, peer_ip = %peer, "Using X-Real-IP");
                Some(ClientKey::from(client))
            }
            None => Some(ClientKey::from(peer)),
        }
    }
}

fn peer_ip(extensions: &Extensions) -> Option<IpAddr> {
    extensions
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip())
}
