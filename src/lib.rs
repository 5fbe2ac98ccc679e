// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Temp-mail Admission Control
//!
//! This crate gates temporary-email creation behind a per-identity admission
//! policy:
//!
//! - Identity keyed on the signed-in user, else the client IP
//! - Windowed creation counters (5 per hour by default)
//! - CAPTCHA escalation once the threshold is reached
//! - Hard rejection with `Retry-After` when escalation is unavailable
//! - Server-side reCAPTCHA verification that fails closed

pub mod admission;
pub mod auth;
pub mod captcha;
pub mod config;
pub mod emails;
pub mod error;
pub mod handlers;
pub mod identity;
pub mod metrics;
pub mod middleware;
pub mod policy;
pub mod store;

pub use admission::AdmissionControl;
pub use captcha::{CaptchaVerifier, HttpCaptchaVerifier};
pub use config::Config;
pub use identity::IdentityKey;
pub use policy::{AdmissionDecision, RejectReason};
pub use store::{CounterStore, RateLimitRecord};
