// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Bearer-token authentication for the signed-in create endpoint.
//!
//! Session issuance lives elsewhere; this layer only maps a presented token
//! to a user id and attaches [`AuthenticatedUser`] for admission control.

use crate::error::AppError;
use crate::identity::AuthenticatedUser;
use async_trait::async_trait;
use axum::{
    extract::{Request, State},
    http::{header, HeaderMap},
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

#[async_trait]
pub trait Authenticator: Send + Sync {
    /// User id for `token`, or `None` when the token is not recognised.
    async fn authenticate(&self, token: &str) -> Option<String>;
}

/// Fixed token -> user id table, loaded from configuration.
pub struct StaticTokenAuthenticator {
    tokens: HashMap<String, String>,
}

impl StaticTokenAuthenticator {
    pub fn new(tokens: HashMap<String, String>) -> Self {
        Self { tokens }
    }
}

#[async_trait]
impl Authenticator for StaticTokenAuthenticator {
    async fn authenticate(&self, token: &str) -> Option<String> {
        self.tokens.get(token).cloned()
    }
}

fn bearer_token(headers: &HeaderMap) -> Option<String> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string)
}

/// Reject unauthenticated requests; otherwise attach the user id.
pub async fn require_auth(
    State(authenticator): State<Arc<dyn Authenticator>>,
    mut request: Request,
    next: Next,
) -> Response {
    let token = bearer_token(request.headers());
    let user_id = match token {
        Some(token) => authenticator.authenticate(&token).await,
        None => None,
    };

    match user_id {
        Some(id) => {
            request.extensions_mut().insert(AuthenticatedUser(id));
            next.run(request).await
        }
        None => {
            debug!(path = %request.uri().path(), "Rejected unauthenticated request");
            AppError::Unauthorized.into_response()
        }
    }
}
