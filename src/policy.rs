// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Admission policy: threshold ordering and CAPTCHA escalation.
//!
//! `evaluate` decides, `apply` performs the matching state transition. Both
//! are pure so the caller can run them together under the record lock.
//!
//! Per identity the record moves `Normal -> Flagged -> Normal`: the request
//! that reaches the CAPTCHA threshold is still admitted and flags the
//! record; later requests are challenged until a CAPTCHA is solved or the
//! window rolls over.

use crate::config::AdmissionConfig;
use crate::store::RateLimitRecord;
use std::time::Duration;

/// Thresholds the policy evaluates against.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PolicyConfig {
    pub captcha_threshold: u32,
    pub hard_limit: u32,
    pub window: Duration,
    /// `None` disables escalation; `hard_limit` is then the only gate.
    pub site_key: Option<String>,
}

impl PolicyConfig {
    pub fn new(admission: &AdmissionConfig, site_key: Option<String>) -> Self {
        Self {
            captcha_threshold: admission.captcha_threshold,
            hard_limit: admission.hard_limit,
            window: admission.window_duration(),
            site_key,
        }
    }

    pub fn captcha_enabled(&self) -> bool {
        self.site_key.is_some()
    }
}

/// Outcome of CAPTCHA verification for the current request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptchaCheck {
    NotProvided,
    Verified,
    Failed,
}

/// Why a request was turned away.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RejectReason {
    RateLimitExceeded { retry_after: Duration },
    InvalidCaptcha,
}

impl std::fmt::Display for RejectReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::RateLimitExceeded { .. } => write!(f, "rate limit exceeded"),
            Self::InvalidCaptcha => write!(f, "invalid captcha"),
        }
    }
}

/// Per-request admission verdict.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdmissionDecision {
    /// Admit and count the request
    Allow,
    /// Admit; a solved CAPTCHA resets the record instead of counting
    AllowWithCaptchaCleared,
    /// Challenge the client before admitting anything else
    RequireCaptcha { site_key: String },
    Reject { reason: RejectReason },
}

impl AdmissionDecision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Self::Allow | Self::AllowWithCaptchaCleared)
    }

    /// Stable label for logs and metrics.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Allow => "allow",
            Self::AllowWithCaptchaCleared => "allow_captcha_cleared",
            Self::RequireCaptcha { .. } => "require_captcha",
            Self::Reject {
                reason: RejectReason::InvalidCaptcha,
            } => "reject_invalid_captcha",
            Self::Reject {
                reason: RejectReason::RateLimitExceeded { .. },
            } => "reject_rate_limited",
        }
    }
}

/// Decide what to do with a request given the identity's current record.
///
/// `elapsed` is the time since the record's window started; it only feeds
/// the retry hint of a rate-limit rejection.
pub fn evaluate(
    record: &RateLimitRecord,
    config: &PolicyConfig,
    captcha: CaptchaCheck,
    elapsed: Duration,
) -> AdmissionDecision {
    match captcha {
        CaptchaCheck::Failed => {
            return AdmissionDecision::Reject {
                reason: RejectReason::InvalidCaptcha,
            }
        }
        CaptchaCheck::Verified => return AdmissionDecision::AllowWithCaptchaCleared,
        CaptchaCheck::NotProvided => {}
    }

    if record.captcha_required {
        if let Some(site_key) = &config.site_key {
            return AdmissionDecision::RequireCaptcha {
                site_key: site_key.clone(),
            };
        }
    }

    if record.count >= config.hard_limit {
        return AdmissionDecision::Reject {
            reason: RejectReason::RateLimitExceeded {
                retry_after: config.window.saturating_sub(elapsed),
            },
        };
    }

    AdmissionDecision::Allow
}

/// Apply the state transition that goes with `decision`.
pub fn apply(record: &mut RateLimitRecord, decision: &AdmissionDecision, config: &PolicyConfig) {
    match decision {
        AdmissionDecision::Allow => {
            record.count = record.count.saturating_add(1);
            if config.captcha_enabled() && record.count >= config.captcha_threshold {
                record.captcha_required = true;
            }
        }
        AdmissionDecision::AllowWithCaptchaCleared => record.reset(),
        AdmissionDecision::RequireCaptcha { .. } | AdmissionDecision::Reject { .. } => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::IdentityKey;
    use std::time::Instant;

    const HOUR: Duration = Duration::from_secs(3600);

    fn config(threshold: u32, hard_limit: u32, captcha: bool) -> PolicyConfig {
        PolicyConfig {
            captcha_threshold: threshold,
            hard_limit,
            window: HOUR,
            site_key: captcha.then(|| "site-key".to_string()),
        }
    }

    fn record(count: u32, flagged: bool) -> RateLimitRecord {
        RateLimitRecord {
            identity: IdentityKey::ip("1.2.3.4"),
            count,
            window_start: Instant::now(),
            captcha_required: flagged,
        }
    }

    fn run(
        record: &mut RateLimitRecord,
        config: &PolicyConfig,
        captcha: CaptchaCheck,
    ) -> AdmissionDecision {
        let decision = evaluate(record, config, captcha, Duration::ZERO);
        apply(record, &decision, config);
        decision
    }

    #[test]
    fn test_below_threshold_allows_and_counts() {
        let config = config(5, 10, true);
        let mut rec = record(0, false);
        for expected in 1..=4 {
            assert_eq!(run(&mut rec, &config, CaptchaCheck::NotProvided), AdmissionDecision::Allow);
            assert_eq!(rec.count, expected);
            assert!(!rec.captcha_required);
        }
    }

    #[test]
    fn test_request_reaching_threshold_is_allowed_then_flagged() {
        let config = config(5, 10, true);
        let mut rec = record(4, false);

        assert_eq!(run(&mut rec, &config, CaptchaCheck::NotProvided), AdmissionDecision::Allow);
        assert_eq!(rec.count, 5);
        assert!(rec.captcha_required);

        let next = run(&mut rec, &config, CaptchaCheck::NotProvided);
        assert_eq!(
            next,
            AdmissionDecision::RequireCaptcha {
                site_key: "site-key".to_string()
            }
        );
        assert_eq!(rec.count, 5);
    }

    #[test]
    fn test_unflagged_record_over_threshold_gets_grace() {
        // Thresholds lowered while the record was live.
        let config = config(3, 10, true);
        let mut rec = record(6, false);
        assert_eq!(run(&mut rec, &config, CaptchaCheck::NotProvided), AdmissionDecision::Allow);
        assert!(rec.captcha_required);
    }

    #[test]
    fn test_verified_captcha_clears_without_counting() {
        let config = config(5, 5, true);
        let mut rec = record(5, true);
        assert_eq!(
            run(&mut rec, &config, CaptchaCheck::Verified),
            AdmissionDecision::AllowWithCaptchaCleared
        );
        assert_eq!(rec.count, 0);
        assert!(!rec.captcha_required);
    }

    #[test]
    fn test_failed_captcha_changes_nothing() {
        let config = config(5, 5, true);
        let mut rec = record(5, true);
        let decision = run(&mut rec, &config, CaptchaCheck::Failed);
        assert_eq!(
            decision,
            AdmissionDecision::Reject {
                reason: RejectReason::InvalidCaptcha
            }
        );
        assert_eq!(rec.count, 5);
        assert!(rec.captcha_required);
    }

    #[test]
    fn test_hard_limit_without_captcha() {
        let config = config(3, 3, false);
        let mut rec = record(0, false);
        for _ in 0..3 {
            assert!(run(&mut rec, &config, CaptchaCheck::NotProvided).is_allowed());
        }
        assert!(!rec.captcha_required, "flag is never set without a CAPTCHA path");

        let decision = evaluate(&rec, &config, CaptchaCheck::NotProvided, Duration::from_secs(600));
        assert_eq!(
            decision,
            AdmissionDecision::Reject {
                reason: RejectReason::RateLimitExceeded {
                    retry_after: Duration::from_secs(3000)
                }
            }
        );
    }

    #[test]
    fn test_hard_limit_ceiling_with_captcha_enabled() {
        let config = config(5, 8, true);
        let rec = record(8, false);
        assert!(matches!(
            evaluate(&rec, &config, CaptchaCheck::NotProvided, Duration::ZERO),
            AdmissionDecision::Reject {
                reason: RejectReason::RateLimitExceeded { .. }
            }
        ));
    }

    #[test]
    fn test_labels() {
        assert_eq!(AdmissionDecision::Allow.label(), "allow");
        assert_eq!(
            AdmissionDecision::Reject {
                reason: RejectReason::InvalidCaptcha
            }
            .label(),
            "reject_invalid_captcha"
        );
    }
}
