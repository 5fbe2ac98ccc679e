// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Admission control: ties identity, counters, policy and CAPTCHA together.
//!
//! A CAPTCHA token is verified before the record lock is taken; the policy
//! evaluation and its state transition then run inside one store update so
//! concurrent requests from one identity cannot lose counts.

use crate::captcha::{check_token, CaptchaVerifier};
use crate::identity::IdentityKey;
use crate::metrics::AdmissionMetrics;
use crate::policy::{self, AdmissionDecision, CaptchaCheck, PolicyConfig};
use crate::store::CounterStore;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info};

pub struct AdmissionControl {
    store: CounterStore,
    policy: PolicyConfig,
    verifier: Option<Arc<dyn CaptchaVerifier>>,
    metrics: AdmissionMetrics,
}

impl AdmissionControl {
    /// `verifier` is only consulted when `policy` has a site key.
    pub fn new(
        store: CounterStore,
        policy: PolicyConfig,
        verifier: Option<Arc<dyn CaptchaVerifier>>,
        metrics: AdmissionMetrics,
    ) -> Self {
        Self {
            store,
            policy,
            verifier,
            metrics,
        }
    }

    pub fn store(&self) -> &CounterStore {
        &self.store
    }

    pub fn policy(&self) -> &PolicyConfig {
        &self.policy
    }

    pub fn metrics(&self) -> &AdmissionMetrics {
        &self.metrics
    }

    /// Decide admission for one request and update the identity's record.
    pub async fn admit(
        &self,
        identity: &IdentityKey,
        captcha_token: Option<&str>,
        remote_ip: Option<&str>,
    ) -> AdmissionDecision {
        let captcha = self.verify_token(captcha_token, remote_ip).await;
        self.decide_at(identity, captcha, Instant::now())
    }

    /// Verify the submitted token, if escalation is on and one was sent.
    ///
    /// No store lock is held here; the provider call may take seconds.
    pub async fn verify_token(
        &self,
        captcha_token: Option<&str>,
        remote_ip: Option<&str>,
    ) -> CaptchaCheck {
        let (Some(token), Some(verifier)) = (captcha_token, self.active_verifier()) else {
            return CaptchaCheck::NotProvided;
        };
        check_token(&**verifier, token, remote_ip, &self.metrics).await
    }

    /// Evaluate and apply the policy atomically for `identity` at `now`.
    pub fn decide_at(
        &self,
        identity: &IdentityKey,
        captcha: CaptchaCheck,
        now: Instant,
    ) -> AdmissionDecision {
        let (decision, count, flagged) = self.store.update_at(identity, now, |record| {
            let elapsed = now.saturating_duration_since(record.window_start);
            let decision = policy::evaluate(record, &self.policy, captcha, elapsed);
            policy::apply(record, &decision, &self.policy);
            (decision, record.count, record.captcha_required)
        });

        self.metrics.record_decision(decision.label());
        self.metrics.set_tracked_identities(self.store.len());

        match &decision {
            AdmissionDecision::Allow | AdmissionDecision::AllowWithCaptchaCleared => {
                debug!(
                    identity = %identity,
                    decision = decision.label(),
                    count,
                    flagged,
                    "Request admitted"
                );
            }
            AdmissionDecision::RequireCaptcha { .. } => {
                info!(identity = %identity, count, "CAPTCHA required");
            }
            AdmissionDecision::Reject { reason } => {
                info!(identity = %identity, count, reason = %reason, "Request rejected");
            }
        }

        decision
    }

    /// Drop stale records. Called periodically by the server.
    pub fn sweep(&self) -> usize {
        let removed = self.store.sweep(Instant::now());
        self.metrics.set_tracked_identities(self.store.len());
        removed
    }

    fn active_verifier(&self) -> Option<&Arc<dyn CaptchaVerifier>> {
        if self.policy.captcha_enabled() {
            self.verifier.as_ref()
        } else {
            None
        }
    }
}
