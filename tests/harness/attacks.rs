// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Abuse patterns for admission-control testing.

/// What a simulated client puts in `captchaResponse`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenBehaviour {
    /// Never sends a token
    Omit,
    /// Sends a forged token on every request
    Forge,
    /// Solves the challenge whenever one is demanded
    SolveWhenChallenged,
}

/// Attack pattern configuration.
#[derive(Debug, Clone)]
pub struct AttackConfig {
    /// Total number of create requests
    pub total_requests: usize,
    /// Distinct anonymous clients
    pub unique_ips: usize,
    /// Distinct signed-in clients; takes precedence over IPs when non-zero
    pub unique_users: usize,
    pub tokens: TokenBehaviour,
    /// Fire every request at once instead of sequentially
    pub concurrent: bool,
}

impl Default for AttackConfig {
    fn default() -> Self {
        Self {
            total_requests: 100,
            unique_ips: 1,
            unique_users: 0,
            tokens: TokenBehaviour::Omit,
            concurrent: false,
        }
    }
}

/// Predefined attack patterns.
impl AttackConfig {
    /// One script creating addresses as fast as it can.
    pub fn single_ip_flood() -> Self {
        Self {
            total_requests: 200,
            ..Default::default()
        }
    }

    /// Same flood, but every request carries a made-up token.
    pub fn token_spam() -> Self {
        Self {
            total_requests: 200,
            tokens: TokenBehaviour::Forge,
            ..Default::default()
        }
    }

    /// Botnet spreading load below the per-identity threshold.
    pub fn distributed_attack() -> Self {
        Self {
            total_requests: 400,
            unique_ips: 100,
            ..Default::default()
        }
    }

    /// Signed-in accounts sharing one NAT, each within its own budget.
    pub fn shared_nat_users() -> Self {
        Self {
            total_requests: 50,
            unique_users: 10,
            ..Default::default()
        }
    }

    /// A heavy but honest user who solves every challenge.
    pub fn power_user() -> Self {
        Self {
            total_requests: 30,
            tokens: TokenBehaviour::SolveWhenChallenged,
            ..Default::default()
        }
    }

    /// Parallel burst racing for the last free slots.
    pub fn concurrent_burst() -> Self {
        Self {
            total_requests: 64,
            concurrent: true,
            ..Default::default()
        }
    }
}
