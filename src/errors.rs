// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Error types for the contour-plus controller.
//!
//! Missing objects are not errors here: API lookups return `Option` and
//! deletes tolerate absence (see [`is_not_found`]).

use thiserror::Error;

/// Errors surfaced by reconciliation, the certificate applier and startup.
#[derive(Error, Debug)]
pub enum Error {
    /// Kubernetes API call failed
    #[error("Kubernetes API error: {0}")]
    Kube(#[from] kube::Error),

    /// JSON (de)serialization of a resource failed
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A resource lacks metadata the controller depends on
    #[error("{kind} is missing metadata.{field}")]
    MissingMetadata {
        /// Kind of the offending resource
        kind: String,
        /// Missing metadata field
        field: &'static str,
    },

    /// A `namespace/name` string could not be parsed
    #[error("invalid namespaced name '{0}', expected 'namespace/name'")]
    InvalidObjectKey(String),

    /// The leader Lease could not be managed
    #[error("lease error: {0}")]
    Lease(#[from] kube_lease_manager::LeaseManagerError),

    /// Leader election stopped without holding the lease
    #[error("leader election error: {0}")]
    LeaderElection(String),

    /// Startup configuration is invalid
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// A child kind required by the configuration is not served by the cluster
    #[error("resource kind {group}/{kind} is not served by the API server")]
    KindNotServed {
        /// API group
        group: String,
        /// Kind name
        kind: String,
    },
}

/// Whether a kube error is an HTTP 404 from the API server.
#[must_use]
pub fn is_not_found(err: &kube::Error) -> bool {
    matches!(err, kube::Error::Api(ae) if ae.code == 404)
}

#[cfg(test)]
#[path = "errors_tests.rs"]
mod errors_tests;
