// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Deletion of cross-namespace children.
//!
//! Children in the parent's namespace carry an owner reference and are
//! garbage-collected by the cluster. Children placed in an allow-listed
//! namespace are found through the owner annotation and deleted here, before
//! the parent's finalizer is released.

use crate::api::meta_key;
use crate::context::Context;
use crate::crd::{ChildKind, HTTPProxy};
use crate::errors::Error;
use crate::key::ObjectKey;
use crate::metrics::record_child_deleted;
use crate::ownership::is_owned_by;
use std::collections::BTreeSet;
use tracing::{debug, info};

/// Namespaces that may hold cross-namespace children of `kind`.
fn candidate_namespaces<'a>(
    ctx: &'a Context,
    kind: ChildKind,
    parent: &ObjectKey,
) -> BTreeSet<&'a str> {
    let allowed = match kind {
        ChildKind::DnsEndpoint => &ctx.options.allowed_dns_namespaces,
        ChildKind::Certificate | ChildKind::TlsCertificateDelegation => {
            &ctx.options.allowed_issuer_namespaces
        }
    };
    allowed
        .iter()
        .map(String::as_str)
        .filter(|ns| *ns != parent.namespace)
        .collect()
}

/// Delete every cross-namespace child owned by `proxy`.
///
/// Returns the number of children deleted. Children already gone are not
/// errors.
///
/// # Errors
///
/// Returns an error if listing or deleting fails; the finalizer must then be
/// kept so cleanup is retried.
pub async fn cleanup_cross_namespace_children(
    ctx: &Context,
    proxy: &HTTPProxy,
) -> Result<usize, Error> {
    let parent = ObjectKey::of(proxy)?;
    let mut deleted = 0;

    for kind in ctx.kinds.iter() {
        for namespace in candidate_namespaces(ctx, kind, &parent) {
            let children = ctx.api.list_children(kind, namespace).await?;
            for key in children
                .iter()
                .filter(|meta| is_owned_by(meta, &parent))
                .filter_map(meta_key)
            {
                ctx.api.delete_child(kind, &key).await?;
                record_child_deleted(kind.kind());
                info!(parent = %parent, kind = %kind, key = %key, "deleted cross-namespace child");
                deleted += 1;
            }
        }
    }

    debug!(parent = %parent, deleted, "cross-namespace cleanup finished");
    Ok(deleted)
}
