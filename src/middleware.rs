// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Admission middleware for the create-email endpoints.
//!
//! Attach with `axum::middleware::from_fn_with_state(control, admission_layer)`.
//! The request body is buffered so the optional `captchaResponse` field can be
//! read here and still reach the handler unchanged.

use crate::admission::AdmissionControl;
use crate::error::ErrorResponse;
use crate::identity::{self, AuthenticatedUser};
use crate::policy::{AdmissionDecision, RejectReason};
use axum::{
    body::{self, Body},
    extract::{ConnectInfo, Request, State},
    http::{header, HeaderMap, HeaderValue, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use serde::Deserialize;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Largest create-email body accepted.
pub const MAX_BODY_BYTES: usize = 64 * 1024;

/// Short-circuit responses produced by the admission layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdmissionRejection {
    CaptchaRequired { site_key: String },
    InvalidCaptcha,
    RateLimited { retry_after: Duration },
    PayloadTooLarge,
    InvalidBody,
}

impl AdmissionRejection {
    /// `None` when the decision admits the request.
    pub fn from_decision(decision: AdmissionDecision) -> Option<Self> {
        match decision {
            AdmissionDecision::Allow | AdmissionDecision::AllowWithCaptchaCleared => None,
            AdmissionDecision::RequireCaptcha { site_key } => {
                Some(Self::CaptchaRequired { site_key })
            }
            AdmissionDecision::Reject {
                reason: RejectReason::InvalidCaptcha,
            } => Some(Self::InvalidCaptcha),
            AdmissionDecision::Reject {
                reason: RejectReason::RateLimitExceeded { retry_after },
            } => Some(Self::RateLimited { retry_after }),
        }
    }
}

impl IntoResponse for AdmissionRejection {
    fn into_response(self) -> Response {
        match self {
            Self::CaptchaRequired { site_key } => {
                let mut body = ErrorResponse::new(
                    "CAPTCHA_REQUIRED",
                    "You have exceeded the rate limit. Please complete the CAPTCHA.",
                );
                body.captcha_required = Some(true);
                body.captcha_site_key = Some(site_key);
                (StatusCode::BAD_REQUEST, Json(body)).into_response()
            }
            Self::InvalidCaptcha => (
                StatusCode::BAD_REQUEST,
                Json(ErrorResponse::new(
                    "INVALID_CAPTCHA",
                    "CAPTCHA verification failed. Please try again.",
                )),
            )
                .into_response(),
            Self::RateLimited { retry_after } => {
                // Round up so clients never retry a moment too early.
                let retry_secs = retry_after.as_secs() + u64::from(retry_after.subsec_nanos() > 0);
                let mut body = ErrorResponse::new(
                    "RATE_LIMITED",
                    "Too many temporary emails created. Try again later.",
                );
                body.retry_after_secs = Some(retry_secs);
                let mut response = (StatusCode::TOO_MANY_REQUESTS, Json(body)).into_response();
                response
                    .headers_mut()
                    .insert(header::RETRY_AFTER, HeaderValue::from(retry_secs));
                response
            }
            Self::PayloadTooLarge => (
                StatusCode::PAYLOAD_TOO_LARGE,
                Json(ErrorResponse::new("INVALID_BODY", "Request body too large")),
            )
                .into_response(),
            Self::InvalidBody => (
                StatusCode::BAD_REQUEST,
                Json(ErrorResponse::new("INVALID_BODY", "Request body could not be read")),
            )
                .into_response(),
        }
    }
}

#[derive(Deserialize)]
struct CaptchaField {
    #[serde(default, rename = "captchaResponse")]
    captcha_response: Option<String>,
}

/// Pull `captchaResponse` out of a JSON body; anything unparsable means none.
pub fn captcha_token(body: &[u8]) -> Option<String> {
    serde_json::from_slice::<CaptchaField>(body)
        .ok()
        .and_then(|f| f.captcha_response)
        .filter(|t| !t.is_empty())
}

fn declared_length(headers: &HeaderMap) -> Option<usize> {
    headers
        .get(header::CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse().ok())
}

/// Gate a request through admission control.
pub async fn admission_layer(
    State(control): State<Arc<AdmissionControl>>,
    request: Request,
    next: Next,
) -> Response {
    let peer = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| *addr);
    let user = request.extensions().get::<AuthenticatedUser>().cloned();
    let identity = identity::resolve(user.as_ref(), request.headers(), peer);
    let remote_ip = identity::client_ip(request.headers(), peer);

    if declared_length(request.headers()).is_some_and(|len| len > MAX_BODY_BYTES) {
        return AdmissionRejection::PayloadTooLarge.into_response();
    }

    let (parts, body) = request.into_parts();
    let bytes = match body::to_bytes(body, MAX_BODY_BYTES).await {
        Ok(bytes) => bytes,
        Err(err) => {
            debug!(identity = %identity, error = %err, "Failed to buffer request body");
            return AdmissionRejection::InvalidBody.into_response();
        }
    };

    let token = captcha_token(&bytes);
    let decision = control
        .admit(&identity, token.as_deref(), Some(remote_ip.as_str()))
        .await;

    match AdmissionRejection::from_decision(decision) {
        None => {
            let request = Request::from_parts(parts, Body::from(bytes));
            next.run(request).await
        }
        Some(rejection) => rejection.into_response(),
    }
}
