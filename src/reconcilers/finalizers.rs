// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Finalizer management for `HTTPProxy` parents.
//!
//! The controller only adds its finalizer when a parent gains a child in
//! another namespace, and removes it once cleanup of those children is done.
//! Both operations are merge patches of `metadata.finalizers`.
//!
//! # Example
//!
//! ```rust,ignore
//! use contour_plus::reconcilers::finalizers::{ensure_finalizer, remove_finalizer};
//!
//! async fn example(api: &dyn ClusterApi, proxy: &mut HTTPProxy) -> Result<(), Error> {
//!     ensure_finalizer(api, proxy, FINALIZER_HTTP_PROXY).await?;
//!     // ... create cross-namespace children ...
//!     remove_finalizer(api, proxy, FINALIZER_HTTP_PROXY).await
//! }
//! ```

use crate::api::ClusterApi;
use crate::crd::HTTPProxy;
use crate::errors::Error;
use crate::key::ObjectKey;
use serde_json::json;
use tracing::info;

/// Add a finalizer to a proxy if not already present.
///
/// On success `proxy` is replaced by the patched object, so later steps of the
/// same reconcile observe the finalizer.
///
/// # Errors
///
/// Returns an error if the proxy has no namespace or name, or the patch fails.
pub async fn ensure_finalizer(
    api: &dyn ClusterApi,
    proxy: &mut HTTPProxy,
    finalizer: &str,
) -> Result<(), Error> {
    if proxy.has_finalizer(finalizer) {
        return Ok(());
    }
    let key = ObjectKey::of(&*proxy)?;

    info!(key = %key, finalizer, "Adding finalizer to HTTPProxy");

    let mut finalizers = proxy.metadata.finalizers.clone().unwrap_or_default();
    finalizers.push(finalizer.to_string());

    let patch = json!({ "metadata": { "finalizers": finalizers } });
    *proxy = api.patch_proxy(&key, &patch).await?;

    Ok(())
}

/// Remove a finalizer from a proxy if present.
///
/// # Errors
///
/// Returns an error if the proxy has no namespace or name, or the patch fails.
pub async fn remove_finalizer(
    api: &dyn ClusterApi,
    proxy: &HTTPProxy,
    finalizer: &str,
) -> Result<(), Error> {
    if !proxy.has_finalizer(finalizer) {
        return Ok(());
    }
    let key = ObjectKey::of(proxy)?;

    info!(key = %key, finalizer, "Removing finalizer from HTTPProxy");

    let mut finalizers = proxy.metadata.finalizers.clone().unwrap_or_default();
    finalizers.retain(|f| f != finalizer);

    let patch = json!({ "metadata": { "finalizers": finalizers } });
    api.patch_proxy(&key, &patch).await?;

    Ok(())
}

#[cfg(test)]
#[path = "finalizers_tests.rs"]
mod finalizers_tests;
