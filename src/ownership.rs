// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Parent/child linkage.
//!
//! Every child carries the owner annotation (`namespace/name` of its parent).
//! Children in the parent's namespace also get a controller owner reference
//! so the cluster garbage-collects them. Children in other namespaces cannot
//! have one; the parent instead holds [`FINALIZER_HTTP_PROXY`] until the
//! controller has deleted them.

use crate::api::ClusterApi;
use crate::crd::HTTPProxy;
use crate::errors::Error;
use crate::key::ObjectKey;
use crate::labels::{FINALIZER_HTTP_PROXY, OWNER_ANNOTATION};
use crate::reconcilers::finalizers::ensure_finalizer;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::Resource;
use std::collections::BTreeMap;

/// Lifecycle of a parent with respect to cross-namespace cleanup.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ParentLifecycle {
    /// Not being deleted
    Active,
    /// Being deleted and holding the finalizer, so cross-namespace children may exist
    TerminatingWithChildren,
    /// Being deleted without the finalizer; nothing left to clean up
    TerminatingClean,
}

impl ParentLifecycle {
    #[must_use]
    pub fn of(proxy: &HTTPProxy) -> Self {
        match (
            proxy.metadata.deletion_timestamp.is_some(),
            proxy.has_finalizer(FINALIZER_HTTP_PROXY),
        ) {
            (false, _) => Self::Active,
            (true, true) => Self::TerminatingWithChildren,
            (true, false) => Self::TerminatingClean,
        }
    }
}

/// Owner annotation value for a parent.
#[must_use]
pub fn owner_value(parent: &ObjectKey) -> String {
    parent.to_string()
}

/// Parent recorded in a child's owner annotation.
#[must_use]
pub fn parse_owner(meta: &ObjectMeta) -> Option<ObjectKey> {
    meta.annotations
        .as_ref()?
        .get(OWNER_ANNOTATION)?
        .parse()
        .ok()
}

/// Whether a child's owner annotation names `parent`.
#[must_use]
pub fn is_owned_by(meta: &ObjectMeta, parent: &ObjectKey) -> bool {
    meta.annotations
        .as_ref()
        .and_then(|a| a.get(OWNER_ANNOTATION))
        .is_some_and(|owner| *owner == owner_value(parent))
}

/// Links a child to its parent before the child is applied.
///
/// # Errors
///
/// Returns an error if the parent lacks metadata, or if adding the finalizer
/// to the parent fails. In the latter case the child must not be applied.
pub async fn track_ownership(
    api: &dyn ClusterApi,
    proxy: &mut HTTPProxy,
    child: &mut ObjectMeta,
) -> Result<(), Error> {
    let parent = ObjectKey::of(&*proxy)?;

    child
        .annotations
        .get_or_insert_with(BTreeMap::new)
        .insert(OWNER_ANNOTATION.to_string(), owner_value(&parent));

    if child.namespace.as_deref() == Some(parent.namespace.as_str()) {
        let owner = proxy
            .controller_owner_ref(&())
            .ok_or_else(|| Error::MissingMetadata {
                kind: HTTPProxy::kind(&()).to_string(),
                field: "uid",
            })?;
        child.owner_references = Some(vec![owner]);
        return Ok(());
    }

    ensure_finalizer(api, proxy, FINALIZER_HTTP_PROXY).await
}

#[cfg(test)]
#[path = "ownership_tests.rs"]
mod ownership_tests;
