// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! CAPTCHA verification gateway.
//!
//! The provider speaks the reCAPTCHA `siteverify` protocol: a form POST of
//! `secret`, `response` and optionally `remoteip`, answered with
//! `{"success": bool, "error-codes": [...]}`. Anything other than an explicit
//! success is treated as a failure.

use crate::config::CaptchaConfig;
use crate::metrics::AdmissionMetrics;
use crate::policy::CaptchaCheck;
use async_trait::async_trait;
use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Provider verdict for one token.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct Verification {
    #[serde(default)]
    pub success: bool,
    #[serde(default, rename = "error-codes")]
    pub error_codes: Vec<String>,
}

/// Infrastructure failures talking to the provider.
#[derive(Debug, Error)]
pub enum CaptchaError {
    #[error("CAPTCHA provider timed out")]
    Timeout,

    #[error("CAPTCHA provider request failed: {0}")]
    Transport(#[source] reqwest::Error),

    #[error("CAPTCHA provider returned HTTP {0}")]
    Status(u16),

    #[error("Malformed CAPTCHA provider response: {0}")]
    Malformed(String),

    #[error("CAPTCHA verification is not configured")]
    NotConfigured,
}

impl From<reqwest::Error> for CaptchaError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout
        } else if err.is_decode() {
            Self::Malformed(err.to_string())
        } else {
            Self::Transport(err)
        }
    }
}

/// Something that can check a client-submitted CAPTCHA token.
#[async_trait]
pub trait CaptchaVerifier: Send + Sync {
    async fn verify(
        &self,
        token: &str,
        remote_ip: Option<&str>,
    ) -> Result<Verification, CaptchaError>;
}

/// HTTP client for a `siteverify`-compatible provider.
pub struct HttpCaptchaVerifier {
    client: reqwest::Client,
    verify_url: String,
    secret: String,
}

impl HttpCaptchaVerifier {
    pub fn new(
        verify_url: String,
        secret: String,
        timeout: std::time::Duration,
    ) -> Result<Self, CaptchaError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(CaptchaError::Transport)?;
        Ok(Self {
            client,
            verify_url,
            secret,
        })
    }

    /// Build from config; fails when no secret is configured.
    pub fn from_config(config: &CaptchaConfig) -> Result<Self, CaptchaError> {
        let secret = config
            .secret
            .clone()
            .filter(|s| !s.is_empty())
            .ok_or(CaptchaError::NotConfigured)?;
        Self::new(config.verify_url.clone(), secret, config.timeout())
    }
}

#[async_trait]
impl CaptchaVerifier for HttpCaptchaVerifier {
    async fn verify(
        &self,
        token: &str,
        remote_ip: Option<&str>,
    ) -> Result<Verification, CaptchaError> {
        let mut form = vec![("secret", self.secret.as_str()), ("response", token)];
        if let Some(ip) = remote_ip {
            form.push(("remoteip", ip));
        }

        let response = self.client.post(&self.verify_url).form(&form).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(CaptchaError::Status(status.as_u16()));
        }

        let body = response.bytes().await?;
        parse_verification(&body)
    }
}

/// Decode a provider response body.
pub fn parse_verification(body: &[u8]) -> Result<Verification, CaptchaError> {
    let value: serde_json::Value =
        serde_json::from_slice(body).map_err(|e| CaptchaError::Malformed(e.to_string()))?;
    if !value.get("success").is_some_and(serde_json::Value::is_boolean) {
        return Err(CaptchaError::Malformed("missing boolean `success`".to_string()));
    }
    serde_json::from_value(value).map_err(|e| CaptchaError::Malformed(e.to_string()))
}

/// Fail-closed interpretation of a verification attempt.
pub async fn check_token(
    verifier: &dyn CaptchaVerifier,
    token: &str,
    remote_ip: Option<&str>,
    metrics: &AdmissionMetrics,
) -> CaptchaCheck {
    let token = token.trim();
    if token.is_empty() {
        debug!("Empty CAPTCHA token");
        metrics.record_verification("rejected");
        return CaptchaCheck::Failed;
    }

    match verifier.verify(token, remote_ip).await {
        Ok(v) if v.success => {
            metrics.record_verification("verified");
            CaptchaCheck::Verified
        }
        Ok(v) => {
            info!(error_codes = ?v.error_codes, "CAPTCHA rejected by provider");
            metrics.record_verification("rejected");
            CaptchaCheck::Failed
        }
        Err(err) => {
            warn!(error = %err, "CAPTCHA provider unavailable, failing closed");
            metrics.record_verification("error");
            CaptchaCheck::Failed
        }
    }
}
