// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Rate-limit identity resolution.
//!
//! Signed-in users are limited per account so the limit follows them across
//! networks; anonymous traffic is limited per client IP.

use axum::http::HeaderMap;
use std::fmt;
use std::net::SocketAddr;

/// Header set by the reverse proxy in front of the service.
pub const FORWARDED_FOR: &str = "x-forwarded-for";

/// Identity used when neither a user nor any address is known.
const UNKNOWN_ADDR: &str = "unknown";

/// User id attached to the request by the authentication layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthenticatedUser(pub String);

/// Key partitioning rate-limit state.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum IdentityKey {
    User(String),
    Ip(String),
}

impl IdentityKey {
    pub fn user(id: impl Into<String>) -> Self {
        Self::User(id.into())
    }

    pub fn ip(addr: impl Into<String>) -> Self {
        Self::Ip(addr.into())
    }

    pub fn is_user(&self) -> bool {
        matches!(self, Self::User(_))
    }
}

impl fmt::Display for IdentityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::User(id) => write!(f, "user:{id}"),
            Self::Ip(addr) => write!(f, "ip:{addr}"),
        }
    }
}

/// Resolve the identity for a request. Never fails.
pub fn resolve(
    user: Option<&AuthenticatedUser>,
    headers: &HeaderMap,
    peer: Option<SocketAddr>,
) -> IdentityKey {
    if let Some(AuthenticatedUser(id)) = user {
        return IdentityKey::user(id.clone());
    }
    IdentityKey::ip(client_ip(headers, peer))
}

/// Client address: first `X-Forwarded-For` hop, else the socket peer.
///
/// The value is not parsed as an IP; a garbage header becomes its own
/// identity rather than failing the request.
pub fn client_ip(headers: &HeaderMap, peer: Option<SocketAddr>) -> String {
    let forwarded = headers
        .get(FORWARDED_FOR)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|v| !v.is_empty());

    match (forwarded, peer) {
        (Some(addr), _) => addr.to_string(),
        (None, Some(peer)) => peer.ip().to_string(),
        (None, None) => UNKNOWN_ADDR.to_string(),
    }
}
