// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Global constants for the contour-plus controller.
//!
//! This module contains all numeric and string constants used throughout the codebase.
//! Constants are organized by category for easy maintenance.

// ============================================================================
// API Constants
// ============================================================================

/// Kind name for `DNSEndpoint` resource
pub const KIND_DNS_ENDPOINT: &str = "DNSEndpoint";

/// Kind name for `Certificate` resource
pub const KIND_CERTIFICATE: &str = "Certificate";

/// Kind name for `TLSCertificateDelegation` resource
pub const KIND_TLS_CERTIFICATE_DELEGATION: &str = "TLSCertificateDelegation";

/// Issuer kind scoped to a namespace
pub const KIND_ISSUER: &str = "Issuer";

/// Issuer kind scoped to the cluster
pub const KIND_CLUSTER_ISSUER: &str = "ClusterIssuer";

// ============================================================================
// Server-Side Apply Constants
// ============================================================================

/// Field manager identity used for every server-side apply
pub const FIELD_MANAGER: &str = "contour-plus";

// ============================================================================
// DNS Record Constants
// ============================================================================

/// TTL stamped on every generated DNS endpoint (1 hour)
pub const DNS_RECORD_TTL_SECS: i64 = 3600;

/// Record type for IPv4 targets
pub const RECORD_TYPE_A: &str = "A";

/// Record type for IPv6 targets
pub const RECORD_TYPE_AAAA: &str = "AAAA";

/// Record type for the ACME delegation record
pub const RECORD_TYPE_CNAME: &str = "CNAME";

/// Label prepended to hostnames for ACME DNS-01 challenges
pub const ACME_CHALLENGE_LABEL: &str = "_acme-challenge";

/// Suffix appended to the DNS endpoint name for the delegation record
pub const DELEGATION_NAME_SUFFIX: &str = "-delegation";

// ============================================================================
// Certificate Constants
// ============================================================================

/// Key usage: digital signature
pub const USAGE_DIGITAL_SIGNATURE: &str = "digital signature";

/// Key usage: key encipherment
pub const USAGE_KEY_ENCIPHERMENT: &str = "key encipherment";

/// Key usage: server auth
pub const USAGE_SERVER_AUTH: &str = "server auth";

/// Fixed key usages requested on every certificate
pub const CERTIFICATE_USAGES: [&str; 3] = [
    USAGE_DIGITAL_SIGNATURE,
    USAGE_KEY_ENCIPHERMENT,
    USAGE_SERVER_AUTH,
];

// ============================================================================
// Controller Error Handling Constants
// ============================================================================

/// Requeue duration for controller errors (30 seconds)
pub const ERROR_REQUEUE_DURATION_SECS: u64 = 30;

// ============================================================================
// Certificate Apply Queue Constants
// ============================================================================

/// Default capacity of the certificate retry feedback channel
pub const DEFAULT_RETRY_CHANNEL_CAPACITY: usize = 100;

/// Default number of concurrent reconciliations
pub const DEFAULT_MAX_CONCURRENT_RECONCILES: u16 = 4;

// ============================================================================
// Leader Election Constants
// ============================================================================

/// Default name of the Lease held by the leader
pub const DEFAULT_LEADER_ELECTION_ID: &str = "contour-plus-leader";

/// Lease duration in seconds; a standby takes over after this long
pub const LEADER_LEASE_DURATION_SECS: u64 = 15;

/// Grace period in seconds before the lease expires during which the
/// holder renews it
pub const LEADER_LEASE_GRACE_SECS: u64 = 5;

// ============================================================================
// Runtime Constants
// ============================================================================

/// Number of worker threads for Tokio runtime
pub const TOKIO_WORKER_THREADS: usize = 4;

// ============================================================================
// Metrics Server Constants
// ============================================================================

/// Path for Prometheus metrics endpoint
pub const METRICS_SERVER_PATH: &str = "/metrics";

/// Default bind address for metrics HTTP server
pub const DEFAULT_METRICS_ADDR: &str = "0.0.0.0:8180";

/// Path for the liveness probe served next to the metrics endpoint
pub const HEALTH_SERVER_PATH: &str = "/healthz";
