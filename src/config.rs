// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Configuration for the temp-mail admission service.
//!
//! Defaults match the production deployment: five free creations per hour
//! per identity, then a CAPTCHA challenge.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;
use thiserror::Error;

/// Configuration for the admission service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Server bind address (default: 0.0.0.0:8080)
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,

    /// Rate limiting and escalation thresholds
    #[serde(default)]
    pub admission: AdmissionConfig,

    /// CAPTCHA provider settings
    #[serde(default)]
    pub captcha: CaptchaConfig,

    /// Bearer tokens accepted on authenticated routes
    #[serde(default)]
    pub auth: AuthConfig,

    /// Lifetime of created addresses
    #[serde(default)]
    pub emails: EmailConfig,

    /// Metrics configuration
    #[serde(default)]
    pub metrics: MetricsConfig,
}

/// Per-identity admission thresholds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdmissionConfig {
    /// Admitted requests per window before a CAPTCHA is demanded (default: 5)
    #[serde(default = "default_captcha_threshold")]
    pub captcha_threshold: u32,

    /// Ceiling that rejects outright when no CAPTCHA path exists (default: 5)
    #[serde(default = "default_hard_limit")]
    pub hard_limit: u32,

    /// Counting window in seconds (default: 3600)
    #[serde(default = "default_window_secs")]
    pub window_secs: u64,

    /// Tracked identities before eviction kicks in (default: 100000)
    #[serde(default = "default_max_identities")]
    pub max_identities: usize,

    /// Interval between stale-record sweeps in seconds (default: 60)
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,
}

/// CAPTCHA provider configuration.
///
/// Escalation is only enabled when both the secret and the site key are set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaptchaConfig {
    #[serde(default)]
    pub secret: Option<String>,

    #[serde(default)]
    pub site_key: Option<String>,

    /// Verification endpoint (default: reCAPTCHA siteverify)
    #[serde(default = "default_verify_url")]
    pub verify_url: String,

    /// Upper bound on a single verification call (default: 5000)
    #[serde(default = "default_captcha_timeout_ms")]
    pub timeout_ms: u64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AuthConfig {
    /// Bearer token -> user id
    #[serde(default)]
    pub tokens: HashMap<String, String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmailConfig {
    /// Lifetime of addresses created by signed-in users (default: 1440)
    #[serde(default = "default_authenticated_ttl_hours")]
    pub authenticated_ttl_hours: i64,

    /// Lifetime of anonymous addresses (default: 48)
    #[serde(default = "default_public_ttl_hours")]
    pub public_ttl_hours: i64,
}

/// Metrics configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    /// Enable Prometheus metrics endpoint (default: true)
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Metrics endpoint path (default: /metrics)
    #[serde(default = "default_metrics_path")]
    pub path: String,
}

/// Invalid configuration values.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("captcha_threshold must be at least 1")]
    ZeroThreshold,

    #[error("captcha_threshold ({threshold}) must not exceed hard_limit ({hard_limit})")]
    ThresholdAboveHardLimit { threshold: u32, hard_limit: u32 },

    #[error("window_secs must be at least 1")]
    ZeroWindow,

    #[error("CAPTCHA secret and site key must be configured together")]
    IncompleteCaptcha,

    #[error("Invalid CAPTCHA verify URL: {0}")]
    InvalidVerifyUrl(String),

    #[error("{field} must be between 1 and {max} hours, got {value}")]
    InvalidTtl {
        field: &'static str,
        value: i64,
        max: i64,
    },
}

/// Longest lifetime any temporary address may be given (one year).
pub const MAX_TTL_HOURS: i64 = 24 * 365;

// Default value functions
fn default_bind_addr() -> String {
    "0.0.0.0:8080".to_string()
}

fn default_captcha_threshold() -> u32 {
    5
}

fn default_hard_limit() -> u32 {
    5
}

fn default_window_secs() -> u64 {
    3600
}

fn default_max_identities() -> usize {
    100_000
}

fn default_sweep_interval_secs() -> u64 {
    60
}

fn default_verify_url() -> String {
    "https://www.google.com/recaptcha/api/siteverify".to_string()
}

fn default_captcha_timeout_ms() -> u64 {
    5000
}

fn default_authenticated_ttl_hours() -> i64 {
    24 * 60
}

fn default_public_ttl_hours() -> i64 {
    48
}

fn default_true() -> bool {
    true
}

fn default_metrics_path() -> String {
    "/metrics".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
            admission: AdmissionConfig::default(),
            captcha: CaptchaConfig::default(),
            auth: AuthConfig::default(),
            emails: EmailConfig::default(),
            metrics: MetricsConfig::default(),
        }
    }
}

impl Default for AdmissionConfig {
    fn default() -> Self {
        Self {
            captcha_threshold: default_captcha_threshold(),
            hard_limit: default_hard_limit(),
            window_secs: default_window_secs(),
            max_identities: default_max_identities(),
            sweep_interval_secs: default_sweep_interval_secs(),
        }
    }
}

impl Default for CaptchaConfig {
    fn default() -> Self {
        Self {
            secret: None,
            site_key: None,
            verify_url: default_verify_url(),
            timeout_ms: default_captcha_timeout_ms(),
        }
    }
}

impl Default for EmailConfig {
    fn default() -> Self {
        Self {
            authenticated_ttl_hours: default_authenticated_ttl_hours(),
            public_ttl_hours: default_public_ttl_hours(),
        }
    }
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: default_true(),
            path: default_metrics_path(),
        }
    }
}

impl AdmissionConfig {
    /// Get the counting window duration
    pub fn window_duration(&self) -> Duration {
        Duration::from_secs(self.window_secs)
    }

    /// Get the sweep interval
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs.max(1))
    }
}

impl EmailConfig {
    /// Lifetime of signed-in addresses; `None` if the hours are out of range.
    pub fn authenticated_ttl(&self) -> Option<chrono::Duration> {
        chrono::Duration::try_hours(self.authenticated_ttl_hours)
    }

    /// Lifetime of anonymous addresses; `None` if the hours are out of range.
    pub fn public_ttl(&self) -> Option<chrono::Duration> {
        chrono::Duration::try_hours(self.public_ttl_hours)
    }
}

impl CaptchaConfig {
    /// Site key, present only when escalation is fully configured.
    pub fn enabled_site_key(&self) -> Option<&str> {
        match (&self.secret, &self.site_key) {
            (Some(secret), Some(key)) if !secret.is_empty() && !key.is_empty() => Some(key),
            _ => None,
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl Config {
    /// Check cross-field constraints that serde defaults cannot express.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let admission = &self.admission;
        if admission.captcha_threshold == 0 {
            return Err(ConfigError::ZeroThreshold);
        }
        if admission.captcha_threshold > admission.hard_limit {
            return Err(ConfigError::ThresholdAboveHardLimit {
                threshold: admission.captcha_threshold,
                hard_limit: admission.hard_limit,
            });
        }
        if admission.window_secs == 0 {
            return Err(ConfigError::ZeroWindow);
        }

        let has_secret = self.captcha.secret.as_deref().is_some_and(|s| !s.is_empty());
        let has_key = self.captcha.site_key.as_deref().is_some_and(|s| !s.is_empty());
        if has_secret != has_key {
            return Err(ConfigError::IncompleteCaptcha);
        }

        url::Url::parse(&self.captcha.verify_url)
            .map_err(|e| ConfigError::InvalidVerifyUrl(e.to_string()))?;

        for (field, value) in [
            ("authenticated_ttl_hours", self.emails.authenticated_ttl_hours),
            ("public_ttl_hours", self.emails.public_ttl_hours),
        ] {
            if !(1..=MAX_TTL_HOURS).contains(&value) {
                return Err(ConfigError::InvalidTtl {
                    field,
                    value,
                    max: MAX_TTL_HOURS,
                });
            }
        }

        Ok(())
    }
}

/// Load configuration from `.env` and environment variables.
pub fn load_config() -> Config {
    dotenvy::dotenv().ok();
    from_lookup(|key| std::env::var(key).ok())
}

/// Build a config from any key lookup; unparsable values fall back to defaults.
pub fn from_lookup<F>(lookup: F) -> Config
where
    F: Fn(&str) -> Option<String>,
{
    let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

    let admission_defaults = AdmissionConfig::default();
    let email_defaults = EmailConfig::default();

    Config {
        bind_addr: non_empty("BIND_ADDR").unwrap_or_else(default_bind_addr),
        admission: AdmissionConfig {
            captcha_threshold: parse_var(&lookup, "CAPTCHA_THRESHOLD")
                .unwrap_or(admission_defaults.captcha_threshold),
            hard_limit: parse_var(&lookup, "HARD_LIMIT").unwrap_or(admission_defaults.hard_limit),
            window_secs: parse_var(&lookup, "WINDOW_SECS")
                .unwrap_or(admission_defaults.window_secs),
            max_identities: parse_var(&lookup, "MAX_IDENTITIES")
                .unwrap_or(admission_defaults.max_identities),
            sweep_interval_secs: parse_var(&lookup, "SWEEP_INTERVAL_SECS")
                .unwrap_or(admission_defaults.sweep_interval_secs),
        },
        captcha: CaptchaConfig {
            secret: non_empty("CAPTCHA_SECRET"),
            site_key: non_empty("CAPTCHA_SITE_KEY"),
            verify_url: non_empty("CAPTCHA_VERIFY_URL").unwrap_or_else(default_verify_url),
            timeout_ms: parse_var(&lookup, "CAPTCHA_TIMEOUT_MS")
                .unwrap_or_else(default_captcha_timeout_ms),
        },
        auth: AuthConfig {
            tokens: lookup("AUTH_TOKENS")
                .map(|v| parse_token_map(&v))
                .unwrap_or_default(),
        },
        emails: EmailConfig {
            authenticated_ttl_hours: parse_var(&lookup, "AUTH_TTL_HOURS")
                .unwrap_or(email_defaults.authenticated_ttl_hours),
            public_ttl_hours: parse_var(&lookup, "PUBLIC_TTL_HOURS")
                .unwrap_or(email_defaults.public_ttl_hours),
        },
        metrics: MetricsConfig {
            enabled: parse_var(&lookup, "METRICS_ENABLED").unwrap_or_else(default_true),
            ..Default::default()
        },
    }
}

fn parse_var<T, F>(lookup: &F, key: &str) -> Option<T>
where
    T: std::str::FromStr,
    F: Fn(&str) -> Option<String>,
{
    lookup(key).and_then(|v| v.trim().parse().ok())
}

/// Parse `token:user,token2:user2`. Malformed pairs are skipped.
fn parse_token_map(raw: &str) -> HashMap<String, String> {
    raw.split(',')
        .filter_map(|pair| {
            let (token, user) = pair.split_once(':')?;
            let (token, user) = (token.trim(), user.trim());
            if token.is_empty() || user.is_empty() {
                None
            } else {
                Some((token.to_string(), user.to_string()))
            }
        })
        .collect()
}
