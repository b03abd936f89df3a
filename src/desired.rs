// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Desired child resources for an `HTTPProxy`.
//!
//! [`DesiredStateBuilder`] turns a parent's spec, annotations and labels plus
//! the controller policy into the children that should exist. It performs no
//! I/O: the load-balancer addresses are passed in by the caller, and
//! ownership metadata is stamped afterwards by [`crate::ownership`].
//!
//! # Placement
//!
//! Children live in the parent's namespace unless a placement annotation
//! names another namespace that appears in the matching allow-list. Children
//! placed elsewhere get a `<parentNamespace>-` infix in their name so that
//! parents with the same name in different namespaces do not collide.

use crate::config::ReconcilerOptions;
use crate::constants::{
    ACME_CHALLENGE_LABEL, CERTIFICATE_USAGES, DELEGATION_NAME_SUFFIX, DNS_RECORD_TTL_SECS,
    KIND_CLUSTER_ISSUER, KIND_ISSUER, RECORD_TYPE_A, RECORD_TYPE_AAAA, RECORD_TYPE_CNAME,
};
use crate::crd::{
    Certificate, CertificateDelegation, CertificatePrivateKey, CertificateSecretTemplate,
    CertificateSpec, DNSEndpoint, DNSEndpointSpec, Endpoint, HTTPProxy, IssuerReference,
    TLSCertificateDelegation, TLSCertificateDelegationSpec, Targets,
};
use crate::errors::Error;
use crate::key::ObjectKey;
use crate::labels::{
    CLUSTER_ISSUER_NAME_ANNOTATION, DELEGATED_DOMAIN_ANNOTATION, DNS_NAMESPACE_ANNOTATION,
    ISSUER_NAMESPACE_ANNOTATION, ISSUER_NAME_ANNOTATION, PRIVATE_KEY_ALGORITHM_ANNOTATION,
    PRIVATE_KEY_SIZE_ANNOTATION, REVISION_HISTORY_LIMIT_ANNOTATION, TLS_ACME_ANNOTATION,
};
use k8s_openapi::api::core::v1::Service;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use std::collections::BTreeMap;
use std::fmt;
use std::net::IpAddr;
use tracing::error;

/// Where a child is placed relative to its parent.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Placement {
    pub namespace: String,
    /// `true` when `namespace` differs from the parent's
    pub cross_namespace: bool,
}

/// Resolve a child's namespace from an override annotation and its allow-list.
///
/// The override is ignored unless it is listed in `allowed`.
#[must_use]
pub fn resolve_placement(
    parent_namespace: &str,
    requested: Option<&str>,
    allowed: &[String],
) -> Placement {
    match requested {
        Some(ns) if !ns.is_empty() && allowed.iter().any(|a| a == ns) => Placement {
            namespace: ns.to_string(),
            cross_namespace: ns != parent_namespace,
        },
        _ => Placement {
            namespace: parent_namespace.to_string(),
            cross_namespace: false,
        },
    }
}

/// Deterministic child name for a parent under a given placement.
#[must_use]
pub fn child_name(prefix: &str, parent: &ObjectKey, placement: &Placement) -> String {
    if placement.cross_namespace {
        format!("{prefix}{}-{}", parent.namespace, parent.name)
    } else {
        format!("{prefix}{}", parent.name)
    }
}

/// Addresses published on a Service's load-balancer status.
///
/// Entries without an IP (hostname-only) or with an unparsable IP are skipped.
#[must_use]
pub fn load_balancer_addresses(service: &Service) -> Vec<IpAddr> {
    service
        .status
        .as_ref()
        .and_then(|status| status.load_balancer.as_ref())
        .and_then(|lb| lb.ingress.as_ref())
        .map(|ingress| {
            ingress
                .iter()
                .filter_map(|entry| entry.ip.as_deref())
                .filter(|ip| !ip.is_empty())
                .filter_map(|ip| ip.parse::<IpAddr>().ok())
                .collect()
        })
        .unwrap_or_default()
}

/// Split addresses into `A` and `AAAA` targets.
///
/// IPv4-mapped IPv6 addresses are published as IPv4.
#[must_use]
pub fn split_address_families(addresses: &[IpAddr]) -> (Vec<String>, Vec<String>) {
    let mut v4 = Vec::new();
    let mut v6 = Vec::new();
    for address in addresses {
        match address {
            IpAddr::V4(ip) => v4.push(ip.to_string()),
            IpAddr::V6(ip) => match ip.to_ipv4_mapped() {
                Some(mapped) => v4.push(mapped.to_string()),
                None => v6.push(ip.to_string()),
            },
        }
    }
    (v4, v6)
}

/// Records pointing `hostname` at the load balancer, one per address family.
#[must_use]
pub fn address_endpoints(hostname: &str, addresses: &[IpAddr]) -> Vec<Endpoint> {
    let (v4, v6) = split_address_families(addresses);
    [(RECORD_TYPE_A, v4), (RECORD_TYPE_AAAA, v6)]
        .into_iter()
        .filter(|(_, targets)| !targets.is_empty())
        .map(|(record_type, targets)| Endpoint {
            dns_name: hostname.to_string(),
            targets: Targets(targets),
            record_type: record_type.to_string(),
            record_ttl: DNS_RECORD_TTL_SECS,
            ..Default::default()
        })
        .collect()
}

/// ACME challenge CNAME delegating validation of `hostname` to `delegated_domain`.
#[must_use]
pub fn delegation_endpoint(hostname: &str, delegated_domain: &str) -> Endpoint {
    let fqdn = hostname.trim_matches('.');
    Endpoint {
        dns_name: format!("{ACME_CHALLENGE_LABEL}.{fqdn}"),
        targets: Targets(vec![format!(
            "{ACME_CHALLENGE_LABEL}.{fqdn}.{delegated_domain}"
        )]),
        record_type: RECORD_TYPE_CNAME.to_string(),
        record_ttl: DNS_RECORD_TTL_SECS,
        ..Default::default()
    }
}

/// Why no certificate is desired for a parent.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CertificateSkip {
    /// `kubernetes.io/tls-acme` is not `"true"`
    NotRequested,
    /// No virtual host or an empty FQDN
    NoVirtualHost,
    /// Same-namespace certificate without `tls.secretName`
    NoSecretName,
    /// Neither annotations nor policy name an issuer
    NoIssuer,
    /// The revision-history-limit annotation is not an unsigned integer
    InvalidRevisionHistoryLimit(String),
}

impl fmt::Display for CertificateSkip {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotRequested => f.write_str("certificate not requested"),
            Self::NoVirtualHost => f.write_str("no virtual host fqdn"),
            Self::NoSecretName => f.write_str("no tls secret name"),
            Self::NoIssuer => f.write_str("no issuer name"),
            Self::InvalidRevisionHistoryLimit(value) => {
                write!(f, "invalid revisionHistoryLimit {value:?}")
            }
        }
    }
}

/// Computes the desired children of one `HTTPProxy`.
pub struct DesiredStateBuilder<'a> {
    options: &'a ReconcilerOptions,
    proxy: &'a HTTPProxy,
    parent: ObjectKey,
}

impl<'a> DesiredStateBuilder<'a> {
    /// # Errors
    ///
    /// Returns [`Error::MissingMetadata`] if the proxy has no namespace or name.
    pub fn new(options: &'a ReconcilerOptions, proxy: &'a HTTPProxy) -> Result<Self, Error> {
        Ok(Self {
            options,
            proxy,
            parent: ObjectKey::of(proxy)?,
        })
    }

    #[must_use]
    pub fn parent(&self) -> &ObjectKey {
        &self.parent
    }

    #[must_use]
    pub fn dns_placement(&self) -> Placement {
        resolve_placement(
            &self.parent.namespace,
            self.proxy.annotation(DNS_NAMESPACE_ANNOTATION),
            &self.options.allowed_dns_namespaces,
        )
    }

    #[must_use]
    pub fn issuer_placement(&self) -> Placement {
        resolve_placement(
            &self.parent.namespace,
            self.proxy.annotation(ISSUER_NAMESPACE_ANNOTATION),
            &self.options.allowed_issuer_namespaces,
        )
    }

    /// Key of the address `DNSEndpoint`.
    #[must_use]
    pub fn dns_endpoint_key(&self) -> ObjectKey {
        let placement = self.dns_placement();
        let name = child_name(&self.options.prefix, &self.parent, &placement);
        ObjectKey::new(placement.namespace, name)
    }

    /// Key of the delegation `DNSEndpoint`.
    #[must_use]
    pub fn delegation_dns_endpoint_key(&self) -> ObjectKey {
        let key = self.dns_endpoint_key();
        ObjectKey::new(key.namespace, format!("{}{DELEGATION_NAME_SUFFIX}", key.name))
    }

    /// Key of the `Certificate`; the `TLSCertificateDelegation` shares it.
    #[must_use]
    pub fn certificate_key(&self) -> ObjectKey {
        let placement = self.issuer_placement();
        let name = child_name(&self.options.prefix, &self.parent, &placement);
        ObjectKey::new(placement.namespace, name)
    }

    /// Parent annotations whose keys are in the propagation list; `None` when empty.
    #[must_use]
    pub fn propagated_annotations(&self) -> Option<BTreeMap<String, String>> {
        pick(
            self.proxy.metadata.annotations.as_ref(),
            &self.options.propagated_annotations,
        )
    }

    /// Parent labels whose keys are in the propagation list; `None` when empty.
    #[must_use]
    pub fn propagated_labels(&self) -> Option<BTreeMap<String, String>> {
        pick(
            self.proxy.metadata.labels.as_ref(),
            &self.options.propagated_labels,
        )
    }

    fn child_meta(&self, key: ObjectKey) -> ObjectMeta {
        ObjectMeta {
            name: Some(key.name),
            namespace: Some(key.namespace),
            annotations: self.propagated_annotations(),
            labels: self.propagated_labels(),
            ..Default::default()
        }
    }

    /// Address records for the virtual host.
    ///
    /// `None` when there is no FQDN or no usable load-balancer address.
    #[must_use]
    pub fn dns_endpoint(&self, addresses: &[IpAddr]) -> Option<DNSEndpoint> {
        let fqdn = self.proxy.fqdn()?;
        let endpoints = address_endpoints(fqdn, addresses);
        if endpoints.is_empty() {
            return None;
        }
        Some(DNSEndpoint {
            metadata: self.child_meta(self.dns_endpoint_key()),
            spec: DNSEndpointSpec { endpoints },
        })
    }

    /// Delegated domain in effect: an allowed annotation override, else the default.
    #[must_use]
    pub fn delegated_domain(&self) -> Option<String> {
        let requested = self
            .proxy
            .annotation(DELEGATED_DOMAIN_ANNOTATION)
            .filter(|domain| !domain.is_empty());
        let domain = match requested {
            Some(domain)
                if self.options.allow_custom_delegations
                    && self
                        .options
                        .allowed_delegated_domains
                        .iter()
                        .any(|d| d == domain) =>
            {
                domain
            }
            _ => self.options.default_delegated_domain.as_str(),
        };
        (!domain.is_empty()).then(|| domain.to_string())
    }

    /// ACME challenge delegation record, when a delegated domain is in effect.
    #[must_use]
    pub fn delegation_dns_endpoint(&self) -> Option<DNSEndpoint> {
        let domain = self.delegated_domain()?;
        let fqdn = self.proxy.fqdn()?;
        Some(DNSEndpoint {
            metadata: self.child_meta(self.delegation_dns_endpoint_key()),
            spec: DNSEndpointSpec {
                endpoints: vec![delegation_endpoint(fqdn, &domain)],
            },
        })
    }

    /// Issuer resolved as cluster-issuer annotation, then issuer annotation, then policy.
    fn issuer(&self) -> IssuerReference {
        let (name, kind) = if let Some(name) = self.proxy.annotation(CLUSTER_ISSUER_NAME_ANNOTATION)
        {
            (name, KIND_CLUSTER_ISSUER)
        } else if let Some(name) = self.proxy.annotation(ISSUER_NAME_ANNOTATION) {
            (name, KIND_ISSUER)
        } else {
            (
                self.options.default_issuer_name.as_str(),
                self.options.default_issuer_kind.as_str(),
            )
        };
        IssuerReference {
            name: name.to_string(),
            kind: kind.to_string(),
            group: None,
        }
    }

    fn revision_history_limit(&self) -> Result<Option<i32>, CertificateSkip> {
        if let Some(value) = self.proxy.annotation(REVISION_HISTORY_LIMIT_ANNOTATION) {
            return value
                .parse::<u32>()
                .ok()
                .and_then(|limit| i32::try_from(limit).ok())
                .map(Some)
                .ok_or_else(|| CertificateSkip::InvalidRevisionHistoryLimit(value.to_string()));
        }
        Ok(i32::try_from(self.options.csr_revision_limit)
            .ok()
            .filter(|limit| *limit > 0))
    }

    fn private_key(&self) -> Option<CertificatePrivateKey> {
        let algorithm = self.proxy.annotation(PRIVATE_KEY_ALGORITHM_ANNOTATION)?;
        let size = self
            .proxy
            .annotation(PRIVATE_KEY_SIZE_ANNOTATION)
            .and_then(|value| match value.parse::<u32>() {
                Ok(size) => Some(size),
                Err(e) => {
                    error!(
                        parent = %self.parent,
                        value,
                        error = %e,
                        "invalid privateKey size, using issuer default"
                    );
                    None
                }
            });
        Some(CertificatePrivateKey {
            algorithm: algorithm.to_string(),
            size,
        })
    }

    /// Desired `Certificate`, or the reason none should be applied.
    ///
    /// # Errors
    ///
    /// Returns a [`CertificateSkip`] when the parent does not request a
    /// certificate or cannot produce a valid one. None of these are reconcile
    /// failures.
    pub fn certificate(&self) -> Result<Certificate, CertificateSkip> {
        if self.proxy.annotation(TLS_ACME_ANNOTATION) != Some("true") {
            return Err(CertificateSkip::NotRequested);
        }
        let fqdn = self.proxy.fqdn().ok_or(CertificateSkip::NoVirtualHost)?;

        let key = self.certificate_key();
        let secret_name = if self.issuer_placement().cross_namespace {
            key.name.clone()
        } else {
            self.proxy
                .tls_secret_name()
                .ok_or(CertificateSkip::NoSecretName)?
                .to_string()
        };

        let issuer_ref = self.issuer();
        if issuer_ref.name.is_empty() {
            return Err(CertificateSkip::NoIssuer);
        }

        let revision_history_limit = self.revision_history_limit()?;

        let annotations = self.propagated_annotations();
        let labels = self.propagated_labels();
        let secret_template = (annotations.is_some() || labels.is_some()).then(|| {
            CertificateSecretTemplate {
                annotations: annotations.clone(),
                labels: labels.clone(),
            }
        });

        Ok(Certificate {
            metadata: ObjectMeta {
                name: Some(key.name),
                namespace: Some(key.namespace),
                annotations,
                labels,
                ..Default::default()
            },
            spec: CertificateSpec {
                dns_names: vec![fqdn.to_string()],
                secret_name,
                common_name: fqdn.to_string(),
                issuer_ref,
                usages: CERTIFICATE_USAGES.iter().map(ToString::to_string).collect(),
                revision_history_limit,
                secret_template,
                private_key: self.private_key(),
            },
        })
    }

    /// `TLSCertificateDelegation` granting the parent's namespace access to a
    /// certificate secret issued in another namespace.
    #[must_use]
    pub fn tls_delegation(&self) -> Option<TLSCertificateDelegation> {
        if !self.issuer_placement().cross_namespace {
            return None;
        }
        let key = self.certificate_key();
        let secret_name = key.name.clone();
        Some(TLSCertificateDelegation {
            metadata: self.child_meta(key),
            spec: TLSCertificateDelegationSpec {
                delegations: vec![CertificateDelegation {
                    secret_name,
                    target_namespaces: vec![self.parent.namespace.clone()],
                }],
            },
        })
    }

    /// `<certNamespace>/<certName>` the parent must reference when its
    /// certificate lives in another namespace.
    #[must_use]
    pub fn delegated_secret_reference(&self) -> Option<String> {
        self.issuer_placement()
            .cross_namespace
            .then(|| self.certificate_key().to_string())
    }
}

fn pick(
    source: Option<&BTreeMap<String, String>>,
    keys: &[String],
) -> Option<BTreeMap<String, String>> {
    let source = source?;
    let picked: BTreeMap<String, String> = keys
        .iter()
        .filter_map(|key| source.get(key).map(|value| (key.clone(), value.clone())))
        .collect();
    (!picked.is_empty()).then_some(picked)
}

#[cfg(test)]
#[path = "desired_tests.rs"]
mod desired_tests;
