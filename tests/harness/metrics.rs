// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Outcome tallies for abuse simulation.

use std::collections::HashMap;
use std::time::{Duration, Instant};
use tempmail_admission::{AdmissionDecision, RejectReason};

/// Collects decisions during a simulation run.
#[derive(Debug, Default)]
pub struct AttackMetrics {
    start_time: Option<Instant>,
    end_time: Option<Instant>,
    outcomes: HashMap<Outcome, usize>,
    /// Admitted requests per identity
    admitted_per_identity: HashMap<String, usize>,
    /// Latency samples (microseconds)
    latencies: Vec<u64>,
}

/// Observable result of one request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Outcome {
    Allowed,
    AllowedAfterCaptcha,
    CaptchaRequired,
    InvalidCaptcha,
    RateLimited,
}

impl From<&AdmissionDecision> for Outcome {
    fn from(decision: &AdmissionDecision) -> Self {
        match decision {
            AdmissionDecision::Allow => Outcome::Allowed,
            AdmissionDecision::AllowWithCaptchaCleared => Outcome::AllowedAfterCaptcha,
            AdmissionDecision::RequireCaptcha { .. } => Outcome::CaptchaRequired,
            AdmissionDecision::Reject {
                reason: RejectReason::InvalidCaptcha,
            } => Outcome::InvalidCaptcha,
            AdmissionDecision::Reject {
                reason: RejectReason::RateLimitExceeded { .. },
            } => Outcome::RateLimited,
        }
    }
}

impl AttackMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn start(&mut self) {
        self.start_time = Some(Instant::now());
    }

    pub fn finish(&mut self) {
        self.end_time = Some(Instant::now());
    }

    /// Record one decision for `identity`.
    pub fn record(&mut self, decision: &AdmissionDecision, identity: &str, latency: Duration) {
        *self.outcomes.entry(Outcome::from(decision)).or_insert(0) += 1;
        if decision.is_allowed() {
            *self
                .admitted_per_identity
                .entry(identity.to_string())
                .or_insert(0) += 1;
        }
        self.latencies.push(latency.as_micros() as u64);
    }

    pub fn total_requests(&self) -> usize {
        self.outcomes.values().sum()
    }

    pub fn count(&self, outcome: Outcome) -> usize {
        self.outcomes.get(&outcome).copied().unwrap_or(0)
    }

    pub fn admitted(&self) -> usize {
        self.count(Outcome::Allowed) + self.count(Outcome::AllowedAfterCaptcha)
    }

    /// Most requests any single identity got through.
    pub fn max_admitted_per_identity(&self) -> usize {
        self.admitted_per_identity.values().copied().max().unwrap_or(0)
    }

    pub fn unique_admitted_identities(&self) -> usize {
        self.admitted_per_identity.len()
    }

    pub fn duration(&self) -> Duration {
        match (self.start_time, self.end_time) {
            (Some(start), Some(end)) => end.duration_since(start),
            (Some(start), None) => start.elapsed(),
            _ => Duration::ZERO,
        }
    }

    /// Ratio of non-admitted to total.
    pub fn block_rate(&self) -> f64 {
        let total = self.total_requests();
        if total == 0 {
            return 0.0;
        }
        (total - self.admitted()) as f64 / total as f64
    }

    pub fn median_latency_us(&self) -> u64 {
        if self.latencies.is_empty() {
            return 0;
        }
        let mut sorted = self.latencies.clone();
        sorted.sort_unstable();
        sorted[sorted.len() / 2]
    }

    pub fn report(&self) -> MetricsReport {
        MetricsReport {
            total_requests: self.total_requests(),
            allowed: self.count(Outcome::Allowed),
            allowed_after_captcha: self.count(Outcome::AllowedAfterCaptcha),
            captcha_required: self.count(Outcome::CaptchaRequired),
            invalid_captcha: self.count(Outcome::InvalidCaptcha),
            rate_limited: self.count(Outcome::RateLimited),
            duration_ms: self.duration().as_millis() as u64,
            block_rate: self.block_rate(),
            median_latency_us: self.median_latency_us(),
            max_admitted_per_identity: self.max_admitted_per_identity(),
            unique_admitted_identities: self.unique_admitted_identities(),
        }
    }
}

/// Summary of a simulation run.
#[derive(Debug, Clone)]
pub struct MetricsReport {
    pub total_requests: usize,
    pub allowed: usize,
    pub allowed_after_captcha: usize,
    pub captcha_required: usize,
    pub invalid_captcha: usize,
    pub rate_limited: usize,
    pub duration_ms: u64,
    pub block_rate: f64,
    pub median_latency_us: u64,
    pub max_admitted_per_identity: usize,
    pub unique_admitted_identities: usize,
}

impl std::fmt::Display for MetricsReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "=== Admission Simulation Report ===")?;
        writeln!(f, "Duration:            {} ms", self.duration_ms)?;
        writeln!(f, "Total Requests:      {}", self.total_requests)?;
        writeln!(f)?;
        writeln!(f, "--- Outcomes ---")?;
        writeln!(f, "Allowed:             {}", self.allowed)?;
        writeln!(f, "Allowed (CAPTCHA):   {}", self.allowed_after_captcha)?;
        writeln!(f, "CAPTCHA Required:    {}", self.captcha_required)?;
        writeln!(f, "Invalid CAPTCHA:     {}", self.invalid_captcha)?;
        writeln!(f, "Rate Limited:        {}", self.rate_limited)?;
        writeln!(f, "Block Rate:          {:.1}%", self.block_rate * 100.0)?;
        writeln!(f)?;
        writeln!(f, "--- Distribution ---")?;
        writeln!(f, "Admitted Identities: {}", self.unique_admitted_identities)?;
        writeln!(f, "Max Per Identity:    {}", self.max_admitted_per_identity)?;
        writeln!(f, "Median Latency:      {} us", self.median_latency_us)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_collection() {
        let mut metrics = AttackMetrics::new();
        metrics.start();
        metrics.record(&AdmissionDecision::Allow, "ip:10.0.0.1", Duration::from_micros(10));
        metrics.record(&AdmissionDecision::Allow, "ip:10.0.0.1", Duration::from_micros(20));
        metrics.record(
            &AdmissionDecision::RequireCaptcha {
                site_key: "k".into(),
            },
            "ip:10.0.0.1",
            Duration::from_micros(5),
        );
        metrics.record(&AdmissionDecision::Allow, "ip:10.0.0.2", Duration::from_micros(5));
        metrics.finish();

        assert_eq!(metrics.total_requests(), 4);
        assert_eq!(metrics.admitted(), 3);
        assert_eq!(metrics.count(Outcome::CaptchaRequired), 1);
        assert_eq!(metrics.max_admitted_per_identity(), 2);
        assert_eq!(metrics.unique_admitted_identities(), 2);
        assert!((metrics.block_rate() - 0.25).abs() < 0.01);
    }
}
