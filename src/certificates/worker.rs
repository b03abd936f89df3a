// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Background consumer of the certificate [`ApplyQueue`].
//!
//! The worker never requeues a failed apply. It resolves the parent from the
//! certificate's owner annotation and sends it on a bounded feedback channel
//! that the controller consumes as extra reconcile requests. When the channel
//! is full or closed the signal is dropped and logged; the send never blocks.

use super::queue::{ApplyQueue, PendingApply};
use crate::api::ClusterApi;
use crate::crd::HTTPProxy;
use crate::metrics::{record_certificate_applied, record_retry_signal};
use crate::ownership::parse_owner;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::runtime::reflector::ObjectRef;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Outcome of one worker iteration.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WorkerStep {
    Applied,
    Failed,
    /// Manifest missing for the popped key
    Skipped,
    Cancelled,
}

pub struct ApplyWorker {
    api: Arc<dyn ClusterApi>,
    queue: Arc<ApplyQueue>,
    retries: mpsc::Sender<ObjectRef<HTTPProxy>>,
}

impl ApplyWorker {
    #[must_use]
    pub fn new(
        api: Arc<dyn ClusterApi>,
        queue: Arc<ApplyQueue>,
        retries: mpsc::Sender<ObjectRef<HTTPProxy>>,
    ) -> Self {
        Self {
            api,
            queue,
            retries,
        }
    }

    /// Drain the queue until `cancel` fires.
    pub async fn run(self, cancel: CancellationToken) {
        info!("certificate apply worker started");
        while self.step(&cancel).await != WorkerStep::Cancelled {}
        info!("certificate apply worker stopped");
    }

    /// Pop one key and apply its manifest.
    pub async fn step(&self, cancel: &CancellationToken) -> WorkerStep {
        if cancel.is_cancelled() {
            return WorkerStep::Cancelled;
        }

        let PendingApply { key, manifest } = tokio::select! {
            () = cancel.cancelled() => return WorkerStep::Cancelled,
            pending = self.queue.pop() => pending,
        };

        let Some(manifest) = manifest else {
            warn!(key = %key, "no queued certificate manifest for key, skipping");
            return WorkerStep::Skipped;
        };

        if cancel.is_cancelled() {
            debug!(key = %key, "shutting down, queued certificate not applied");
            return WorkerStep::Cancelled;
        }

        match self.api.apply_certificate(&manifest).await {
            Ok(()) => {
                record_certificate_applied(true, true);
                info!(key = %key, "applied queued certificate");
                WorkerStep::Applied
            }
            Err(e) => {
                record_certificate_applied(true, false);
                error!(key = %key, error = %e, "failed to apply queued certificate");
                self.signal_retry(&manifest.metadata, &key.to_string());
                WorkerStep::Failed
            }
        }
    }

    fn signal_retry(&self, meta: &ObjectMeta, key: &str) {
        let Some(parent) = parse_owner(meta) else {
            warn!(key, "certificate has no owner annotation, cannot signal retry");
            record_retry_signal(false);
            return;
        };

        let request = ObjectRef::<HTTPProxy>::new(&parent.name).within(&parent.namespace);
        match self.retries.try_send(request) {
            Ok(()) => {
                record_retry_signal(true);
                debug!(key, parent = %parent, "sent retry signal");
            }
            Err(TrySendError::Full(_)) => {
                record_retry_signal(false);
                warn!(key, parent = %parent, "retry channel full, dropping retry signal");
            }
            Err(TrySendError::Closed(_)) => {
                record_retry_signal(false);
                warn!(key, parent = %parent, "retry channel closed, dropping retry signal");
            }
        }
    }
}

#[cfg(test)]
#[path = "worker_tests.rs"]
mod worker_tests;
