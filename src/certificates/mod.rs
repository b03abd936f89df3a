// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Certificate apply strategies.
//!
//! Issuing a certificate is expensive and quota-limited on the issuer side,
//! so the controller can pace certificate writes:
//!
//! - [`DirectApplier`] applies every certificate synchronously. Selected when
//!   `--certificate-apply-limit` is zero or negative.
//! - [`RateLimitedApplier`] applies metadata-only changes synchronously and
//!   hands creations and re-issuing changes to an [`ApplyQueue`] drained by a
//!   single [`ApplyWorker`]. Failed queued applies are reported on the retry
//!   channel instead of being retried by the worker.
//!
//! [`build`] picks the strategy from [`ReconcilerOptions`].

pub mod gate;
pub mod queue;
pub mod worker;

use crate::api::ClusterApi;
use crate::config::ReconcilerOptions;
use crate::crd::{Certificate, HTTPProxy};
use crate::errors::Error;
use crate::key::ObjectKey;
use crate::metrics::record_certificate_applied;
use gate::{decide, GateDecision};
use kube::runtime::reflector::ObjectRef;
use queue::ApplyQueue;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info};
pub use worker::ApplyWorker;

/// What happened to a certificate handed to an applier.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ApplyOutcome {
    /// Written to the API server before returning
    AppliedDirect,
    /// Handed to the apply worker; the write happens later
    Queued,
}

/// Applies desired `Certificate`s.
#[async_trait::async_trait]
pub trait CertificateApplier: Send + Sync {
    /// # Errors
    ///
    /// Returns an error if a synchronous apply or the lookup of the stored
    /// certificate fails. Failures of queued applies are never returned.
    async fn apply(&self, desired: Certificate) -> Result<ApplyOutcome, Error>;
}

/// Applies every certificate immediately.
pub struct DirectApplier {
    api: Arc<dyn ClusterApi>,
}

impl DirectApplier {
    #[must_use]
    pub fn new(api: Arc<dyn ClusterApi>) -> Self {
        Self { api }
    }
}

#[async_trait::async_trait]
impl CertificateApplier for DirectApplier {
    async fn apply(&self, desired: Certificate) -> Result<ApplyOutcome, Error> {
        let result = self.api.apply_certificate(&desired).await;
        record_certificate_applied(false, result.is_ok());
        result?;
        Ok(ApplyOutcome::AppliedDirect)
    }
}

/// Paces certificate writes that would trigger issuance.
pub struct RateLimitedApplier {
    api: Arc<dyn ClusterApi>,
    queue: Arc<ApplyQueue>,
}

impl RateLimitedApplier {
    #[must_use]
    pub fn new(api: Arc<dyn ClusterApi>, queue: Arc<ApplyQueue>) -> Self {
        Self { api, queue }
    }
}

#[async_trait::async_trait]
impl CertificateApplier for RateLimitedApplier {
    async fn apply(&self, desired: Certificate) -> Result<ApplyOutcome, Error> {
        let key = ObjectKey::of(&desired)?;
        let current = self.api.get_certificate(&key).await?;

        match decide(current.as_ref(), &desired) {
            GateDecision::Direct => {
                if self.queue.cancel(&key).await {
                    debug!(key = %key, "dropped pending certificate apply superseded by direct apply");
                }
                let result = self.api.apply_certificate(&desired).await;
                record_certificate_applied(false, result.is_ok());
                result?;
                debug!(key = %key, "applied certificate without rate limit");
                Ok(ApplyOutcome::AppliedDirect)
            }
            GateDecision::Queue => {
                if self.queue.push(key.clone(), desired).await {
                    info!(key = %key, "queued certificate apply");
                } else {
                    debug!(key = %key, "replaced pending certificate apply");
                }
                Ok(ApplyOutcome::Queued)
            }
        }
    }
}

/// The applier selected for a run, with its worker and retry channel when rate
/// limited.
pub struct CertificateApplySetup {
    pub applier: Arc<dyn CertificateApplier>,
    pub worker: Option<ApplyWorker>,
    /// Parents whose queued certificate apply failed
    pub retries: Option<mpsc::Receiver<ObjectRef<HTTPProxy>>>,
}

/// Select the certificate apply strategy.
#[must_use]
pub fn build(api: Arc<dyn ClusterApi>, options: &ReconcilerOptions) -> CertificateApplySetup {
    if options.certificate_apply_limit <= 0.0 {
        return CertificateApplySetup {
            applier: Arc::new(DirectApplier::new(api)),
            worker: None,
            retries: None,
        };
    }

    let queue = Arc::new(ApplyQueue::new(options.certificate_apply_limit));
    let (tx, rx) = mpsc::channel(options.retry_channel_capacity.max(1));
    CertificateApplySetup {
        applier: Arc::new(RateLimitedApplier::new(api.clone(), queue.clone())),
        worker: Some(ApplyWorker::new(api, queue, tx)),
        retries: Some(rx),
    }
}
