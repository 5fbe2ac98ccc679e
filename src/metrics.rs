// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Prometheus metrics for admission decisions.
//!
//! Metrics register into a caller-supplied registry so tests and multiple
//! service instances in one process never collide.

use prometheus::{Encoder, IntCounterVec, IntGauge, Opts, Registry, TextEncoder};

#[derive(Clone)]
pub struct AdmissionMetrics {
    decisions: IntCounterVec,
    verifications: IntCounterVec,
    tracked_identities: IntGauge,
}

impl AdmissionMetrics {
    pub fn new(registry: &Registry) -> prometheus::Result<Self> {
        let decisions = IntCounterVec::new(
            Opts::new("admission_decisions_total", "Admission decisions by outcome"),
            &["decision"],
        )?;
        let verifications = IntCounterVec::new(
            Opts::new(
                "captcha_verifications_total",
                "CAPTCHA verification attempts by outcome",
            ),
            &["outcome"],
        )?;
        let tracked_identities = IntGauge::new(
            "admission_tracked_identities",
            "Identities currently held in the counter store",
        )?;

        registry.register(Box::new(decisions.clone()))?;
        registry.register(Box::new(verifications.clone()))?;
        registry.register(Box::new(tracked_identities.clone()))?;

        Ok(Self {
            decisions,
            verifications,
            tracked_identities,
        })
    }

    pub fn record_decision(&self, label: &str) {
        self.decisions.with_label_values(&[label]).inc();
    }

    /// `outcome` is one of `verified`, `rejected`, `error`.
    pub fn record_verification(&self, outcome: &str) {
        self.verifications.with_label_values(&[outcome]).inc();
    }

    pub fn set_tracked_identities(&self, count: usize) {
        self.tracked_identities.set(count as i64);
    }

    pub fn decisions(&self, label: &str) -> u64 {
        self.decisions.with_label_values(&[label]).get()
    }

    pub fn verifications(&self, outcome: &str) -> u64 {
        self.verifications.with_label_values(&[outcome]).get()
    }
}

/// Render a registry in the Prometheus text exposition format.
pub fn render(registry: &Registry) -> Result<String, prometheus::Error> {
    let mut buffer = Vec::new();
    TextEncoder::new().encode(&registry.gather(), &mut buffer)?;
    String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
}
