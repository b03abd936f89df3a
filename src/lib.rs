// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! # contour-plus - companion controller for Contour `HTTPProxy`
//!
//! contour-plus watches Contour `HTTPProxy` resources and derives the objects
//! other controllers need to serve them:
//!
//! - an external-dns `DNSEndpoint` pointing the virtual host at the
//!   load-balancer addresses of Contour's Service
//! - an optional delegation `DNSEndpoint` (`CNAME` of `_acme-challenge`) for
//!   DNS-01 challenges answered in a delegated zone
//! - a cert-manager `Certificate` for the virtual host
//! - a Contour `TLSCertificateDelegation` when the certificate is issued in
//!   another namespace
//!
//! Certificate applies that would trigger a new issuance can be rate limited;
//! they are queued and drained by a background worker.
//!
//! ## Modules
//!
//! - [`crd`] - Resource types for `HTTPProxy` and the generated children
//! - [`config`] - Command line flags and the reconciler policy
//! - [`desired`] - Pure construction of desired child objects
//! - [`reconcilers`] - Reconciliation logic and cross-namespace cleanup
//! - [`certificates`] - Direct and rate-limited certificate apply
//! - [`controller`] - Watches, event filters and controller wiring
//! - [`leader`] - Leader election over a Lease
//! - [`metrics`] - Prometheus metrics and the metrics HTTP server
//!
//! ## Example
//!
//! ```rust,no_run
//! use contour_plus::config::ReconcilerOptions;
//! use contour_plus::desired::DesiredStateBuilder;
//! use contour_plus::crd::HTTPProxy;
//!
//! fn desired_certificate(options: &ReconcilerOptions, proxy: &HTTPProxy) {
//!     if let Ok(builder) = DesiredStateBuilder::new(options, proxy) {
//!         let _certificate = builder.certificate();
//!     }
//! }
//! ```

pub mod api;
pub mod certificates;
pub mod config;
pub mod constants;
pub mod context;
pub mod controller;
pub mod crd;
pub mod desired;
pub mod errors;
pub mod filters;
pub mod key;
pub mod labels;
pub mod leader;
pub mod metrics;
pub mod ownership;
pub mod reconcilers;

#[cfg(test)]
pub(crate) mod testing;
