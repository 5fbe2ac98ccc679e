// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Test harness for admission-control abuse simulation.
//!
//! Drives [`tempmail_admission::AdmissionControl`] with scripted request
//! streams and tallies the decisions it hands back.

pub mod attacks;
pub mod generators;
pub mod metrics;
