// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Command line and environment configuration.
//!
//! Every flag can also be supplied through an environment variable named
//! `CP_<FLAG>` with dashes replaced by underscores, e.g. `CP_NAME_PREFIX`.
//! List-valued flags are comma separated.
//!
//! [`Cli::into_options`] validates the raw flags and produces the
//! [`ReconcilerOptions`] policy consumed by the reconciler.

use crate::constants::{
    DEFAULT_LEADER_ELECTION_ID, DEFAULT_MAX_CONCURRENT_RECONCILES, DEFAULT_METRICS_ADDR,
    DEFAULT_RETRY_CHANNEL_CAPACITY, KIND_CERTIFICATE, KIND_CLUSTER_ISSUER, KIND_DNS_ENDPOINT,
    KIND_ISSUER,
};
use crate::crd::ChildKind;
use crate::errors::Error;
use crate::key::ObjectKey;
use crate::leader::LeaderElectionSettings;
use clap::{ArgAction, Parser};
use std::net::SocketAddr;

/// contour-plus is a custom controller for Contour `HTTPProxy`.
#[derive(Parser, Debug, Clone)]
#[command(name = "contour-plus", version, about)]
pub struct Cli {
    /// Bind address for the metrics endpoint
    #[arg(long, env = "CP_METRICS_ADDR", default_value = DEFAULT_METRICS_ADDR)]
    pub metrics_addr: SocketAddr,

    /// List of CRD kinds to be created (DNSEndpoint, Certificate)
    #[arg(
        long,
        env = "CP_CRDS",
        value_delimiter = ',',
        default_values_t = [KIND_DNS_ENDPOINT.to_string(), KIND_CERTIFICATE.to_string()]
    )]
    pub crds: Vec<String>,

    /// Prefix of the names of generated resources
    #[arg(long, env = "CP_NAME_PREFIX", default_value = "")]
    pub name_prefix: String,

    /// Namespaced name (namespace/name) of the Contour LoadBalancer Service
    #[arg(long, env = "CP_SERVICE_NAME")]
    pub service_name: String,

    /// Issuer name used by default
    #[arg(long, env = "CP_DEFAULT_ISSUER_NAME", default_value = "")]
    pub default_issuer_name: String,

    /// Issuer kind used by default (Issuer or ClusterIssuer)
    #[arg(long, env = "CP_DEFAULT_ISSUER_KIND", default_value = KIND_CLUSTER_ISSUER)]
    pub default_issuer_kind: String,

    /// Delegated domain used by default
    #[arg(long, env = "CP_DEFAULT_DELEGATED_DOMAIN", default_value = "")]
    pub default_delegated_domain: String,

    /// List of delegated domains selectable through the annotation
    #[arg(long, env = "CP_ALLOWED_DELEGATED_DOMAINS", value_delimiter = ',')]
    pub allowed_delegated_domains: Vec<String>,

    /// Allow custom delegated domains via annotations
    #[arg(long, env = "CP_ALLOW_CUSTOM_DELEGATIONS")]
    pub allow_custom_delegations: bool,

    /// Default number of CertificateRequest revisions to keep (0 leaves it unset)
    #[arg(long, env = "CP_CSR_REVISION_LIMIT", default_value_t = 0)]
    pub csr_revision_limit: u32,

    /// Ingress class name watched by the controller; all classes when empty
    #[arg(long, env = "CP_INGRESS_CLASS_NAME", default_value = "")]
    pub ingress_class_name: String,

    /// Annotation keys propagated from HTTPProxy to generated resources
    #[arg(long, env = "CP_PROPAGATED_ANNOTATIONS", value_delimiter = ',')]
    pub propagated_annotations: Vec<String>,

    /// Label keys propagated from HTTPProxy to generated resources
    #[arg(long, env = "CP_PROPAGATED_LABELS", value_delimiter = ',')]
    pub propagated_labels: Vec<String>,

    /// Namespaces where DNSEndpoint resources may be created on behalf of other namespaces
    #[arg(long, env = "CP_ALLOWED_DNS_NAMESPACES", value_delimiter = ',')]
    pub allowed_dns_namespaces: Vec<String>,

    /// Namespaces where Certificate resources may be created on behalf of other namespaces
    #[arg(long, env = "CP_ALLOWED_ISSUER_NAMESPACES", value_delimiter = ',')]
    pub allowed_issuer_namespaces: Vec<String>,

    /// Certificate applies per second that may trigger issuance; 0 or less disables the queue
    #[arg(long, env = "CP_CERTIFICATE_APPLY_LIMIT", default_value_t = 0.0)]
    pub certificate_apply_limit: f64,

    /// Capacity of the channel that requeues HTTPProxies after failed certificate applies
    #[arg(long, env = "CP_RETRY_CHANNEL_CAPACITY", default_value_t = DEFAULT_RETRY_CHANNEL_CAPACITY)]
    pub retry_channel_capacity: usize,

    /// Maximum number of HTTPProxies reconciled concurrently
    #[arg(long, env = "CP_MAX_CONCURRENT_RECONCILES", default_value_t = DEFAULT_MAX_CONCURRENT_RECONCILES)]
    pub max_concurrent_reconciles: u16,

    /// Enable/disable leader election
    #[arg(long, env = "CP_LEADER_ELECTION", default_value_t = true, action = ArgAction::Set)]
    pub leader_election: bool,

    /// Name of the Lease held by the leader
    #[arg(long, env = "CP_LEADER_ELECTION_ID", default_value = DEFAULT_LEADER_ELECTION_ID)]
    pub leader_election_id: String,

    /// Namespace of the leader Lease; the client's default namespace when empty
    #[arg(long, env = "CP_LEADER_ELECTION_NAMESPACE", default_value = "")]
    pub leader_election_namespace: String,
}

/// Policy consumed by the reconciler.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ReconcilerOptions {
    /// Load-balancer Service fronting Contour
    pub service_key: ObjectKey,
    pub prefix: String,
    pub default_issuer_name: String,
    pub default_issuer_kind: String,
    pub default_delegated_domain: String,
    pub allowed_delegated_domains: Vec<String>,
    pub allow_custom_delegations: bool,
    pub csr_revision_limit: u32,
    pub create_dns_endpoint: bool,
    pub create_certificate: bool,
    /// Empty means every class is admitted
    pub ingress_class_name: String,
    pub propagated_annotations: Vec<String>,
    pub propagated_labels: Vec<String>,
    pub allowed_dns_namespaces: Vec<String>,
    pub allowed_issuer_namespaces: Vec<String>,
    /// Applies per second; `<= 0` selects direct apply
    pub certificate_apply_limit: f64,
    pub retry_channel_capacity: usize,
}

impl Cli {
    /// Lease settings, or `None` when leader election is disabled.
    #[must_use]
    pub fn leader_election(&self) -> Option<LeaderElectionSettings> {
        self.leader_election.then(|| LeaderElectionSettings {
            lease_name: self.leader_election_id.clone(),
            namespace: Some(self.leader_election_namespace.trim())
                .filter(|ns| !ns.is_empty())
                .map(str::to_string),
        })
    }

    /// Validate flags and build the reconciler policy.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`] when no kind is enabled, a kind is unknown,
    /// the service name is not `namespace/name`, the default issuer kind is
    /// neither `Issuer` nor `ClusterIssuer`, or the certificate apply limit is
    /// not finite.
    pub fn into_options(self) -> Result<ReconcilerOptions, Error> {
        let crds: Vec<&str> = self
            .crds
            .iter()
            .map(|crd| crd.trim())
            .filter(|crd| !crd.is_empty())
            .collect();
        if crds.is_empty() {
            return Err(Error::InvalidConfig(
                "at least one service need to be enabled".to_string(),
            ));
        }

        let mut create_dns_endpoint = false;
        let mut create_certificate = false;
        for crd in crds {
            match crd {
                KIND_DNS_ENDPOINT => create_dns_endpoint = true,
                KIND_CERTIFICATE => create_certificate = true,
                other => {
                    return Err(Error::InvalidConfig(format!("unsupported CRD: {other}")));
                }
            }
        }

        let service_key: ObjectKey = self.service_name.parse().map_err(|_| {
            Error::InvalidConfig(
                "service-name should be valid string as namespaced-name".to_string(),
            )
        })?;

        match self.default_issuer_kind.as_str() {
            KIND_ISSUER | KIND_CLUSTER_ISSUER => {}
            other => {
                return Err(Error::InvalidConfig(format!(
                    "unsupported Issuer kind: {other}"
                )));
            }
        }

        if !self.certificate_apply_limit.is_finite() {
            return Err(Error::InvalidConfig(format!(
                "certificate-apply-limit must be a finite number, got {}",
                self.certificate_apply_limit
            )));
        }

        if self.retry_channel_capacity == 0 {
            return Err(Error::InvalidConfig(
                "retry-channel-capacity must be at least 1".to_string(),
            ));
        }

        Ok(ReconcilerOptions {
            service_key,
            prefix: self.name_prefix,
            default_issuer_name: self.default_issuer_name,
            default_issuer_kind: self.default_issuer_kind,
            default_delegated_domain: self.default_delegated_domain,
            allowed_delegated_domains: non_empty(self.allowed_delegated_domains),
            allow_custom_delegations: self.allow_custom_delegations,
            csr_revision_limit: self.csr_revision_limit,
            create_dns_endpoint,
            create_certificate,
            ingress_class_name: self.ingress_class_name,
            propagated_annotations: non_empty(self.propagated_annotations),
            propagated_labels: non_empty(self.propagated_labels),
            allowed_dns_namespaces: non_empty(self.allowed_dns_namespaces),
            allowed_issuer_namespaces: non_empty(self.allowed_issuer_namespaces),
            certificate_apply_limit: self.certificate_apply_limit,
            retry_channel_capacity: self.retry_channel_capacity,
        })
    }
}

impl ReconcilerOptions {
    /// Child kinds this policy creates. Certificates come with their
    /// delegations.
    #[must_use]
    pub fn child_kinds(&self) -> Vec<ChildKind> {
        ChildKind::ALL
            .into_iter()
            .filter(|kind| match kind {
                ChildKind::DnsEndpoint => self.create_dns_endpoint,
                ChildKind::Certificate | ChildKind::TlsCertificateDelegation => {
                    self.create_certificate
                }
            })
            .collect()
    }
}

/// Drop blank entries produced by trailing commas or empty env vars.
fn non_empty(values: Vec<String>) -> Vec<String> {
    values
        .into_iter()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .collect()
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod config_tests;
