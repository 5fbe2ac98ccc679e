// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Identity and token generators for abuse simulation.

use std::net::{IpAddr, Ipv4Addr};
use tempmail_admission::IdentityKey;

/// Token the simulation verifier accepts.
pub const VALID_TOKEN: &str = "human-solved-token";

/// Generate a pool of client IPs.
pub fn generate_ips(count: usize) -> Vec<IpAddr> {
    (0..count)
        .map(|i| {
            // 10.x.x.x private range
            let a = ((i >> 16) & 0xFF) as u8;
            let b = ((i >> 8) & 0xFF) as u8;
            let c = (i & 0xFF) as u8;
            IpAddr::V4(Ipv4Addr::new(10, a, b, c))
        })
        .collect()
}

/// Anonymous identities, one per generated IP.
pub fn generate_ip_identities(count: usize) -> Vec<IdentityKey> {
    generate_ips(count)
        .into_iter()
        .map(|ip| IdentityKey::ip(ip.to_string()))
        .collect()
}

/// Signed-in identities.
pub fn generate_user_identities(count: usize) -> Vec<IdentityKey> {
    (0..count)
        .map(|i| IdentityKey::user(format!("user-{i}")))
        .collect()
}

/// Tokens a bot might submit without solving anything.
pub fn generate_forged_tokens() -> Vec<&'static str> {
    vec![
        "forged",
        "null",
        "true",
        "03AGdBq24-replayed",
        " ",
        "human-solved-token-v0",
        "HUMAN-SOLVED-TOKEN",
        "' OR 1=1 --",
    ]
}

/// Spoofed `X-Forwarded-For` values paired with the client IP they resolve to.
pub fn generate_forwarded_chains() -> Vec<(&'static str, &'static str)> {
    vec![
        ("203.0.113.7", "203.0.113.7"),
        ("203.0.113.7, 10.0.0.1", "203.0.113.7"),
        ("  198.51.100.2  ,10.0.0.1,10.0.0.2", "198.51.100.2"),
        ("2001:db8::1", "2001:db8::1"),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_ips_unique() {
        let ips = generate_ips(300);
        let unique: std::collections::HashSet<_> = ips.iter().collect();
        assert_eq!(unique.len(), 300);
    }

    #[test]
    fn test_forged_tokens_never_match_valid() {
        assert!(generate_forged_tokens()
            .iter()
            .all(|t| t.trim() != VALID_TOKEN));
    }
}
