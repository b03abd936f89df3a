// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Annotation keys and finalizers recognised or written by the controller.
//!
//! User-facing annotations are read from `HTTPProxy` objects. The bookkeeping
//! annotation and the finalizer are written by the controller itself and are
//! not meant to be set by users.

// ============================================================================
// Controller Behaviour Annotations
// ============================================================================

/// Set to `"true"` to make the controller ignore an `HTTPProxy`
pub const EXCLUDE_ANNOTATION: &str = "contour-plus.cybozu.com/exclude";

/// Set to `"true"` to request a certificate for the virtual host
pub const TLS_ACME_ANNOTATION: &str = "kubernetes.io/tls-acme";

/// ACME delegated domain override (subject to policy)
pub const DELEGATED_DOMAIN_ANNOTATION: &str = "contour-plus.cybozu.com/delegated-domain";

/// Namespace in which DNS endpoints should be created (subject to allow-list)
pub const DNS_NAMESPACE_ANNOTATION: &str = "contour-plus.cybozu.com/dns-namespace";

/// Namespace in which the certificate should be created (subject to allow-list)
pub const ISSUER_NAMESPACE_ANNOTATION: &str = "contour-plus.cybozu.com/issuer-namespace";

// ============================================================================
// cert-manager Annotations
// ============================================================================

/// Name of a namespaced `Issuer`
pub const ISSUER_NAME_ANNOTATION: &str = "cert-manager.io/issuer";

/// Name of a `ClusterIssuer`; takes precedence over [`ISSUER_NAME_ANNOTATION`]
pub const CLUSTER_ISSUER_NAME_ANNOTATION: &str = "cert-manager.io/cluster-issuer";

/// Per-object `revisionHistoryLimit` override
pub const REVISION_HISTORY_LIMIT_ANNOTATION: &str = "cert-manager.io/revision-history-limit";

/// Private key algorithm override
pub const PRIVATE_KEY_ALGORITHM_ANNOTATION: &str = "cert-manager.io/private-key-algorithm";

/// Private key size override, only honoured together with the algorithm
pub const PRIVATE_KEY_SIZE_ANNOTATION: &str = "cert-manager.io/private-key-size";

// ============================================================================
// Ingress Class Annotations
// ============================================================================

/// Generic ingress class annotation
pub const INGRESS_CLASS_ANNOTATION: &str = "kubernetes.io/ingress.class";

/// Contour-specific ingress class annotation
pub const CONTOUR_INGRESS_CLASS_ANNOTATION: &str = "projectcontour.io/ingress.class";

// ============================================================================
// Bookkeeping
// ============================================================================

/// `namespace/name` of the `HTTPProxy` owning a generated resource
pub const OWNER_ANNOTATION: &str = "contour-plus.cybozu.com/owned-by";

/// Finalizer held by an `HTTPProxy` while it owns cross-namespace resources
pub const FINALIZER_HTTP_PROXY: &str = "contour-plus.cybozu.com/finalizer";
