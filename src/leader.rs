// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Leader election over a `coordination.k8s.io` Lease.
//!
//! Only the lease holder runs the controller and the certificate apply
//! worker, so a single token bucket paces certificate applies no matter how
//! many replicas are deployed. Standby replicas wait in
//! [`Leadership::acquire`]; losing the lease afterwards stops the process and
//! the pod is restarted as a standby.

use crate::constants::{LEADER_LEASE_DURATION_SECS, LEADER_LEASE_GRACE_SECS};
use crate::errors::Error;
use kube::Client;
use kube_lease_manager::{LeaseManager, LeaseManagerBuilder, LeaseManagerError};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Where the leader Lease lives.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LeaderElectionSettings {
    /// Name of the Lease
    pub lease_name: String,
    /// Namespace of the Lease; the client's default namespace when `None`
    pub namespace: Option<String>,
}

/// A held lease, renewed in the background until released.
pub struct Leadership {
    state: watch::Receiver<bool>,
    task: JoinHandle<Result<LeaseManager, LeaseManagerError>>,
}

impl Leadership {
    /// Wait until this replica holds the lease.
    ///
    /// # Errors
    ///
    /// Returns an error if the lease manager cannot be built or stops before
    /// the lease is acquired.
    pub async fn acquire(client: Client, settings: &LeaderElectionSettings) -> Result<Self, Error> {
        let namespace = settings
            .namespace
            .clone()
            .unwrap_or_else(|| client.default_namespace().to_string());
        info!(
            lease = %settings.lease_name,
            namespace = %namespace,
            "Attempting to acquire leadership"
        );

        let manager = LeaseManagerBuilder::new(client, settings.lease_name.clone())
            .with_namespace(namespace)
            .with_duration(LEADER_LEASE_DURATION_SECS)
            .with_grace(LEADER_LEASE_GRACE_SECS)
            .build()
            .await?;
        let (mut state, task) = manager.watch().await;

        if !wait_for_state(&mut state, true).await {
            drop(state);
            finish(task).await?;
            return Err(Error::LeaderElection(
                "lease manager stopped before the lease was acquired".to_string(),
            ));
        }

        info!(lease = %settings.lease_name, "Leadership acquired");
        Ok(Self { state, task })
    }

    /// Resolves once the lease is no longer held.
    pub async fn lost(&mut self) {
        wait_for_state(&mut self.state, false).await;
        warn!("Leadership lost");
    }

    /// Stop renewing and give the lease up.
    ///
    /// # Errors
    ///
    /// Returns an error if the lease manager failed while releasing.
    pub async fn release(self) -> Result<(), Error> {
        drop(self.state);
        finish(self.task).await?;
        debug!("Lease released");
        Ok(())
    }
}

/// Wait until the lock state equals `held`.
///
/// Returns `false` if the lease manager stopped first.
pub(crate) async fn wait_for_state(state: &mut watch::Receiver<bool>, held: bool) -> bool {
    state.wait_for(|current| *current == held).await.is_ok()
}

async fn finish(task: JoinHandle<Result<LeaseManager, LeaseManagerError>>) -> Result<(), Error> {
    match task.await {
        Ok(result) => result.map(|_| ()).map_err(Error::from),
        Err(e) => Err(Error::LeaderElection(format!("lease manager task failed: {e}"))),
    }
}

#[cfg(test)]
#[path = "leader_tests.rs"]
mod leader_tests;
