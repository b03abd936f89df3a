// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Decides whether a certificate change may skip the rate limiter.
//!
//! cert-manager re-issues a certificate whenever a spec field that affects
//! the issued certificate changes. `secretTemplate` only touches the stored
//! secret's metadata, so changes confined to it are applied immediately.

use crate::crd::{Certificate, CertificateSpec};

/// How a certificate mutation is applied.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GateDecision {
    /// Metadata-only change, applied without consuming a rate token
    Direct,
    /// Creation or a change that triggers re-issuance
    Queue,
}

/// Compare the desired certificate against the stored one.
#[must_use]
pub fn decide(current: Option<&Certificate>, desired: &Certificate) -> GateDecision {
    match current {
        Some(current) if masked(&current.spec) == masked(&desired.spec) => GateDecision::Direct,
        _ => GateDecision::Queue,
    }
}

fn masked(spec: &CertificateSpec) -> CertificateSpec {
    CertificateSpec {
        secret_template: None,
        ..spec.clone()
    }
}

#[cfg(test)]
#[path = "gate_tests.rs"]
mod gate_tests;
