// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Shared context for the `HTTPProxy` controller.
//!
//! Every reconcile receives an `Arc<Context>` holding:
//! - the [`ClusterApi`] used for all reads and writes
//! - the validated [`ReconcilerOptions`] policy
//! - the [`CertificateApplier`] selected at startup
//! - the child kinds registered against API discovery

use crate::api::{ClusterApi, KnownKinds};
use crate::certificates::CertificateApplier;
use crate::config::ReconcilerOptions;
use std::sync::Arc;

/// Shared context passed to every reconcile.
#[derive(Clone)]
pub struct Context {
    /// Cluster access
    pub api: Arc<dyn ClusterApi>,

    /// Reconciler policy
    pub options: ReconcilerOptions,

    /// Direct or rate-limited certificate applies
    pub certificates: Arc<dyn CertificateApplier>,

    /// Child kinds confirmed at startup
    pub kinds: KnownKinds,
}

impl Context {
    #[must_use]
    pub fn new(
        api: Arc<dyn ClusterApi>,
        options: ReconcilerOptions,
        certificates: Arc<dyn CertificateApplier>,
        kinds: KnownKinds,
    ) -> Self {
        Self {
            api,
            options,
            certificates,
            kinds,
        }
    }
}
