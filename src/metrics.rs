// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Prometheus metrics for the contour-plus controller.
//!
//! All metrics carry the `contour_plus` prefix and are registered in
//! [`METRICS_REGISTRY`], which is served as text on `/metrics`.
//!
//! # Metrics Categories
//!
//! - **Reconciliation Metrics** - outcome and duration of `HTTPProxy` reconciles
//! - **Certificate Apply Metrics** - direct and queued certificate applies, retry signals
//! - **Cleanup Metrics** - cross-namespace children deleted on parent removal
//!
//! # Example
//!
//! ```rust,no_run
//! use contour_plus::metrics::{record_reconciliation_success, gather_metrics};
//!
//! record_reconciliation_success(std::time::Duration::from_millis(20));
//! let text = gather_metrics().unwrap();
//! assert!(text.contains("contour_plus_reconciliations_total"));
//! ```

use crate::constants::{HEALTH_SERVER_PATH, METRICS_SERVER_PATH};
use axum::http::StatusCode;
use axum::routing::get;
use axum::Router;
use prometheus::{
    CounterVec, Encoder, Histogram, HistogramOpts, IntGauge, Opts, Registry, TextEncoder,
};
use std::net::SocketAddr;
use std::sync::LazyLock;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Namespace prefix for all metrics
const METRICS_NAMESPACE: &str = "contour_plus";

// ============================================================================
// Global Metrics Registry
// ============================================================================

/// Global Prometheus metrics registry
pub static METRICS_REGISTRY: LazyLock<Registry> = LazyLock::new(Registry::new);

// ============================================================================
// Reconciliation Metrics
// ============================================================================

/// Total number of `HTTPProxy` reconciliations
///
/// Labels:
/// - `result`: `success` or `error`
pub static RECONCILIATION_TOTAL: LazyLock<CounterVec> = LazyLock::new(|| {
    let opts = Opts::new(
        format!("{METRICS_NAMESPACE}_reconciliations_total"),
        "Total number of HTTPProxy reconciliations by result",
    );
    let counter = CounterVec::new(opts, &["result"]).unwrap();
    METRICS_REGISTRY
        .register(Box::new(counter.clone()))
        .unwrap();
    counter
});

/// Duration of reconciliations in seconds
pub static RECONCILIATION_DURATION_SECONDS: LazyLock<Histogram> = LazyLock::new(|| {
    let opts = HistogramOpts::new(
        format!("{METRICS_NAMESPACE}_reconciliation_duration_seconds"),
        "Duration of HTTPProxy reconciliations in seconds",
    )
    .buckets(vec![0.001, 0.01, 0.1, 0.5, 1.0, 2.0, 5.0, 10.0, 30.0]);
    let histogram = Histogram::with_opts(opts).unwrap();
    METRICS_REGISTRY
        .register(Box::new(histogram.clone()))
        .unwrap();
    histogram
});

// ============================================================================
// Certificate Apply Metrics
// ============================================================================

/// Certificate applies sent to the API server
///
/// Labels:
/// - `via_queue`: `true` when drained by the rate-limited worker
/// - `result`: `success` or `error`
pub static CERTIFICATES_APPLIED_TOTAL: LazyLock<CounterVec> = LazyLock::new(|| {
    let opts = Opts::new(
        format!("{METRICS_NAMESPACE}_certificates_applied_total"),
        "Certificate applies by path and result",
    );
    let counter = CounterVec::new(opts, &["via_queue", "result"]).unwrap();
    METRICS_REGISTRY
        .register(Box::new(counter.clone()))
        .unwrap();
    counter
});

/// Retry signals published after failed queued applies
///
/// Labels:
/// - `outcome`: `sent` or `dropped`
pub static CERTIFICATE_RETRY_SIGNALS_TOTAL: LazyLock<CounterVec> = LazyLock::new(|| {
    let opts = Opts::new(
        format!("{METRICS_NAMESPACE}_certificate_retry_signals_total"),
        "Retry signals for HTTPProxies whose queued certificate apply failed",
    );
    let counter = CounterVec::new(opts, &["outcome"]).unwrap();
    METRICS_REGISTRY
        .register(Box::new(counter.clone()))
        .unwrap();
    counter
});

/// Keys waiting in the rate-limited certificate queue
pub static CERTIFICATE_APPLY_QUEUE_DEPTH: LazyLock<IntGauge> = LazyLock::new(|| {
    let gauge = IntGauge::new(
        format!("{METRICS_NAMESPACE}_certificate_apply_queue_depth"),
        "Certificates waiting for the apply rate limiter",
    )
    .unwrap();
    METRICS_REGISTRY.register(Box::new(gauge.clone())).unwrap();
    gauge
});

// ============================================================================
// Cleanup Metrics
// ============================================================================

/// Cross-namespace children deleted during parent cleanup
///
/// Labels:
/// - `kind`: child kind
pub static CHILDREN_DELETED_TOTAL: LazyLock<CounterVec> = LazyLock::new(|| {
    let opts = Opts::new(
        format!("{METRICS_NAMESPACE}_children_deleted_total"),
        "Cross-namespace children deleted by kind",
    );
    let counter = CounterVec::new(opts, &["kind"]).unwrap();
    METRICS_REGISTRY
        .register(Box::new(counter.clone()))
        .unwrap();
    counter
});

// ============================================================================
// Helper Functions
// ============================================================================

/// Record a successful reconciliation
pub fn record_reconciliation_success(duration: Duration) {
    RECONCILIATION_TOTAL.with_label_values(&["success"]).inc();
    RECONCILIATION_DURATION_SECONDS.observe(duration.as_secs_f64());
}

/// Record a failed reconciliation
pub fn record_reconciliation_error(duration: Duration) {
    RECONCILIATION_TOTAL.with_label_values(&["error"]).inc();
    RECONCILIATION_DURATION_SECONDS.observe(duration.as_secs_f64());
}

/// Record a certificate apply
///
/// # Arguments
/// * `via_queue` - Whether the apply was drained from the rate-limited queue
/// * `success` - Whether the API server accepted it
pub fn record_certificate_applied(via_queue: bool, success: bool) {
    let via_queue = if via_queue { "true" } else { "false" };
    let result = if success { "success" } else { "error" };
    CERTIFICATES_APPLIED_TOTAL
        .with_label_values(&[via_queue, result])
        .inc();
}

/// Record a retry signal
///
/// # Arguments
/// * `sent` - `false` when the feedback channel was full or closed
pub fn record_retry_signal(sent: bool) {
    let outcome = if sent { "sent" } else { "dropped" };
    CERTIFICATE_RETRY_SIGNALS_TOTAL
        .with_label_values(&[outcome])
        .inc();
}

/// Set the number of keys waiting in the certificate queue
pub fn set_certificate_queue_depth(depth: usize) {
    CERTIFICATE_APPLY_QUEUE_DEPTH.set(i64::try_from(depth).unwrap_or(i64::MAX));
}

/// Record deletion of a cross-namespace child
pub fn record_child_deleted(kind: &str) {
    CHILDREN_DELETED_TOTAL.with_label_values(&[kind]).inc();
}

/// Gather and encode all metrics in Prometheus text format
///
/// # Errors
/// Returns error if encoding fails
pub fn gather_metrics() -> Result<String, prometheus::Error> {
    let encoder = TextEncoder::new();
    let metric_families = METRICS_REGISTRY.gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer)?;
    String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(format!("UTF-8 error: {e}")))
}

// ============================================================================
// HTTP Server
// ============================================================================

async fn metrics_handler() -> (StatusCode, String) {
    match gather_metrics() {
        Ok(text) => (StatusCode::OK, text),
        Err(e) => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
    }
}

/// Routes for the metrics endpoint and the liveness probe
pub fn router() -> Router {
    Router::new()
        .route(METRICS_SERVER_PATH, get(metrics_handler))
        .route(HEALTH_SERVER_PATH, get(|| async { "ok" }))
}

/// Serve [`router`] on `addr` until `shutdown` is cancelled
///
/// # Errors
/// Returns error if the address cannot be bound or the server fails
pub async fn serve(addr: SocketAddr, shutdown: CancellationToken) -> std::io::Result<()> {
    let listener = TcpListener::bind(addr).await?;
    info!("Metrics server listening on {}", addr);
    axum::serve(listener, router())
        .with_graceful_shutdown(shutdown.cancelled_owned())
        .await
}
