// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Typed views of the resources the controller reads and writes.
//!
//! None of these CRDs are owned by this crate. They are installed by Contour,
//! external-dns and cert-manager; the types below model only the fields the
//! controller consumes or emits. Fields that are not modelled are dropped on
//! deserialization, which is safe because parents are only ever mutated with
//! merge patches and children only with field-scoped server-side apply.
//!
//! # Resource Types
//!
//! - [`HTTPProxy`] - the watched parent (`projectcontour.io/v1`)
//! - [`DNSEndpoint`] - DNS records published by external-dns (`externaldns.k8s.io/v1alpha1`)
//! - [`Certificate`] - certificate requests handled by cert-manager (`cert-manager.io/v1`)
//! - [`TLSCertificateDelegation`] - cross-namespace secret delegation (`projectcontour.io/v1`)
//!
//! # Example
//!
//! ```rust,no_run
//! use contour_plus::crd::{Endpoint, Targets};
//!
//! let endpoint = Endpoint {
//!     dns_name: "www.example.com".to_string(),
//!     targets: Targets(vec!["192.0.2.1".to_string()]),
//!     record_type: "A".to_string(),
//!     record_ttl: 3600,
//!     ..Default::default()
//! };
//! ```

use crate::constants::{KIND_CERTIFICATE, KIND_DNS_ENDPOINT, KIND_TLS_CERTIFICATE_DELEGATION};
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;

// ============================================================================
// HTTPProxy
// ============================================================================

/// Subset of the Contour `HTTPProxy` spec read by the controller.
#[derive(CustomResource, Clone, Debug, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[kube(
    group = "projectcontour.io",
    version = "v1",
    kind = "HTTPProxy",
    plural = "httpproxies",
    namespaced,
    derive = "Default",
    derive = "PartialEq",
    doc = "HTTPProxy is Contour's ingress route. The controller derives DNS records and certificates from its virtual host."
)]
#[serde(rename_all = "camelCase")]
pub struct HTTPProxySpec {
    /// Root proxies define a virtual host; included proxies do not.
    #[serde(
        default,
        rename = "virtualhost",
        skip_serializing_if = "Option::is_none"
    )]
    pub virtual_host: Option<VirtualHost>,

    /// Spec-level ingress class.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ingress_class_name: Option<String>,
}

/// Virtual host served by a root `HTTPProxy`.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct VirtualHost {
    /// Fully qualified domain name of the virtual host.
    #[serde(default)]
    pub fqdn: String,

    /// TLS termination settings.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tls: Option<Tls>,
}

/// TLS settings of a virtual host.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Tls {
    /// Secret holding the serving certificate, either `name` or `namespace/name`.
    #[serde(default)]
    pub secret_name: String,
}

impl HTTPProxy {
    /// The virtual host FQDN, if this is a root proxy with a non-empty host.
    #[must_use]
    pub fn fqdn(&self) -> Option<&str> {
        self.spec
            .virtual_host
            .as_ref()
            .map(|vh| vh.fqdn.as_str())
            .filter(|fqdn| !fqdn.is_empty())
    }

    /// The TLS secret reference of the virtual host, if set and non-empty.
    #[must_use]
    pub fn tls_secret_name(&self) -> Option<&str> {
        self.spec
            .virtual_host
            .as_ref()
            .and_then(|vh| vh.tls.as_ref())
            .map(|tls| tls.secret_name.as_str())
            .filter(|name| !name.is_empty())
    }

    /// Look up an annotation value.
    #[must_use]
    pub fn annotation(&self, key: &str) -> Option<&str> {
        self.metadata
            .annotations
            .as_ref()
            .and_then(|annotations| annotations.get(key))
            .map(String::as_str)
    }

    /// Whether the proxy carries the given finalizer.
    #[must_use]
    pub fn has_finalizer(&self, finalizer: &str) -> bool {
        self.metadata
            .finalizers
            .as_ref()
            .is_some_and(|f| f.iter().any(|x| x == finalizer))
    }
}

// ============================================================================
// DNSEndpoint
// ============================================================================

/// external-dns `DNSEndpoint` spec.
#[derive(CustomResource, Clone, Debug, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[kube(
    group = "externaldns.k8s.io",
    version = "v1alpha1",
    kind = "DNSEndpoint",
    plural = "dnsendpoints",
    namespaced,
    derive = "Default",
    derive = "PartialEq",
    doc = "DNSEndpoint is a set of DNS records published by external-dns."
)]
#[serde(rename_all = "camelCase")]
pub struct DNSEndpointSpec {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub endpoints: Vec<Endpoint>,
}

/// A single DNS record.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Endpoint {
    /// Hostname of the record.
    #[serde(default)]
    pub dns_name: String,

    /// Addresses or names the record points to.
    #[serde(default)]
    pub targets: Targets,

    /// `A`, `AAAA`, `CNAME`, ...
    #[serde(default)]
    pub record_type: String,

    #[serde(default, rename = "recordTTL")]
    pub record_ttl: i64,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub provider_specific: Vec<ProviderSpecificProperty>,
}

/// Provider-specific key/value configuration of an endpoint.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ProviderSpecificProperty {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub value: String,
}

/// Targets of a DNS record.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(transparent)]
pub struct Targets(pub Vec<String>);

impl Targets {
    fn sorted(&self) -> Vec<&str> {
        let mut sorted: Vec<&str> = self.0.iter().map(String::as_str).collect();
        sorted.sort_unstable();
        sorted
    }

    /// Order-insensitive equality.
    #[must_use]
    pub fn same(&self, other: &Targets) -> bool {
        self.0.len() == other.0.len() && self.sorted() == other.sorted()
    }

    /// Whether `self` is the "lesser" target list.
    ///
    /// A shorter list is lesser; lists of equal length are compared element-wise
    /// after sorting. Lists of different lengths are never compared by content.
    #[must_use]
    pub fn is_less(&self, other: &Targets) -> bool {
        match self.0.len().cmp(&other.0.len()) {
            Ordering::Less => true,
            Ordering::Greater => false,
            Ordering::Equal => self
                .sorted()
                .iter()
                .zip(other.sorted().iter())
                .find(|(a, b)| a != b)
                .is_some_and(|(a, b)| a < b),
        }
    }
}

impl fmt::Display for Targets {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0.join(";"))
    }
}

// ============================================================================
// Certificate
// ============================================================================

/// cert-manager `Certificate` spec.
#[derive(CustomResource, Clone, Debug, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[kube(
    group = "cert-manager.io",
    version = "v1",
    kind = "Certificate",
    plural = "certificates",
    namespaced,
    derive = "Default",
    derive = "PartialEq",
    doc = "Certificate requests a signed X.509 certificate from a cert-manager issuer."
)]
#[serde(rename_all = "camelCase")]
pub struct CertificateSpec {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub dns_names: Vec<String>,

    #[serde(default)]
    pub secret_name: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub common_name: String,

    #[serde(default)]
    pub issuer_ref: IssuerReference,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub usages: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub revision_history_limit: Option<i32>,

    /// Annotations and labels copied onto the issued secret.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secret_template: Option<CertificateSecretTemplate>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub private_key: Option<CertificatePrivateKey>,
}

/// Reference to an `Issuer` or `ClusterIssuer`.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct IssuerReference {
    #[serde(default)]
    pub name: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub kind: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group: Option<String>,
}

/// Metadata applied to the secret cert-manager creates.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct CertificateSecretTemplate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub annotations: Option<BTreeMap<String, String>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub labels: Option<BTreeMap<String, String>>,
}

/// Private key settings overriding the issuer defaults.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct CertificatePrivateKey {
    #[serde(default)]
    pub algorithm: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<u32>,
}

// ============================================================================
// TLSCertificateDelegation
// ============================================================================

/// Contour `TLSCertificateDelegation` spec.
#[derive(CustomResource, Clone, Debug, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[kube(
    group = "projectcontour.io",
    version = "v1",
    kind = "TLSCertificateDelegation",
    plural = "tlscertificatedelegations",
    namespaced,
    derive = "Default",
    derive = "PartialEq",
    doc = "TLSCertificateDelegation allows HTTPProxies in other namespaces to reference a TLS secret."
)]
#[serde(rename_all = "camelCase")]
pub struct TLSCertificateDelegationSpec {
    #[serde(default)]
    pub delegations: Vec<CertificateDelegation>,
}

/// A secret and the namespaces allowed to reference it.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct CertificateDelegation {
    pub secret_name: String,
    #[serde(default)]
    pub target_namespaces: Vec<String>,
}

// ============================================================================
// Child kinds
// ============================================================================

/// Kinds of resources generated for an `HTTPProxy`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ChildKind {
    /// `DNSEndpoint`, covering both the address record and the delegation record
    DnsEndpoint,
    /// `Certificate`
    Certificate,
    /// `TLSCertificateDelegation`
    TlsCertificateDelegation,
}

impl ChildKind {
    /// All child kinds, in cleanup order.
    pub const ALL: [ChildKind; 3] = [
        ChildKind::DnsEndpoint,
        ChildKind::Certificate,
        ChildKind::TlsCertificateDelegation,
    ];

    /// Kubernetes kind name.
    #[must_use]
    pub fn kind(self) -> &'static str {
        match self {
            ChildKind::DnsEndpoint => KIND_DNS_ENDPOINT,
            ChildKind::Certificate => KIND_CERTIFICATE,
            ChildKind::TlsCertificateDelegation => KIND_TLS_CERTIFICATE_DELEGATION,
        }
    }
}

impl fmt::Display for ChildKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.kind())
    }
}

#[cfg(test)]
#[path = "crd_tests.rs"]
mod crd_tests;
