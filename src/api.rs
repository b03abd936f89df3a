// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Kubernetes API access used by the reconciler and the certificate applier.
//!
//! [`ClusterApi`] is the narrow set of calls the controller makes. The
//! production implementation, [`KubeClusterApi`], talks to the API server
//! through a `kube::Client`; unit tests substitute an in-memory fake.
//!
//! Every child write is a forced server-side apply under
//! [`FIELD_MANAGER`], so the controller always wins conflicts on the fields it
//! sets and leaves fields owned by other managers alone.

use crate::constants::FIELD_MANAGER;
use crate::crd::{Certificate, ChildKind, DNSEndpoint, HTTPProxy, TLSCertificateDelegation};
use crate::errors::{is_not_found, Error};
use crate::key::ObjectKey;
use k8s_openapi::api::core::v1::Service;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::api::{DeleteParams, ListParams, Patch, PatchParams};
use kube::core::NamespaceResourceScope;
use kube::{Api, Client, Resource};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fmt::Debug;
use tracing::debug;

/// Cluster operations performed by the controller.
///
/// Lookups return `Ok(None)` for objects that do not exist. Deletes succeed
/// when the object is already gone.
#[async_trait::async_trait]
pub trait ClusterApi: Send + Sync {
    /// Fetch an `HTTPProxy`.
    async fn get_proxy(&self, key: &ObjectKey) -> Result<Option<HTTPProxy>, Error>;

    /// Fetch the load-balancer `Service` fronting Contour.
    async fn get_service(&self, key: &ObjectKey) -> Result<Option<Service>, Error>;

    /// Fetch the stored `Certificate` for the apply gate.
    async fn get_certificate(&self, key: &ObjectKey) -> Result<Option<Certificate>, Error>;

    async fn apply_dns_endpoint(&self, endpoint: &DNSEndpoint) -> Result<(), Error>;

    async fn apply_certificate(&self, certificate: &Certificate) -> Result<(), Error>;

    async fn apply_delegation(&self, delegation: &TLSCertificateDelegation)
        -> Result<(), Error>;

    /// Metadata of every child of `kind` in `namespace`.
    async fn list_children(&self, kind: ChildKind, namespace: &str)
        -> Result<Vec<ObjectMeta>, Error>;

    /// Delete a child, tolerating absence.
    async fn delete_child(&self, kind: ChildKind, key: &ObjectKey) -> Result<(), Error>;

    /// Merge-patch an `HTTPProxy` and return the updated object.
    async fn patch_proxy(
        &self,
        key: &ObjectKey,
        patch: &serde_json::Value,
    ) -> Result<HTTPProxy, Error>;
}

/// [`ClusterApi`] backed by a live API server.
#[derive(Clone)]
pub struct KubeClusterApi {
    client: Client,
}

impl KubeClusterApi {
    #[must_use]
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    fn namespaced<K>(&self, namespace: &str) -> Api<K>
    where
        K: Resource<DynamicType = (), Scope = NamespaceResourceScope>,
    {
        Api::namespaced(self.client.clone(), namespace)
    }
}

/// Get a namespaced object, mapping 404 to `None`.
async fn get_opt<K>(api: &Api<K>, name: &str) -> Result<Option<K>, Error>
where
    K: Resource + Clone + DeserializeOwned + Debug,
{
    match api.get(name).await {
        Ok(obj) => Ok(Some(obj)),
        Err(e) if is_not_found(&e) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// Forced server-side apply of a namespaced object.
async fn apply<K>(client: &Client, resource: &K) -> Result<(), Error>
where
    K: Resource<DynamicType = (), Scope = NamespaceResourceScope>
        + Clone
        + DeserializeOwned
        + Serialize
        + Debug,
{
    let key = ObjectKey::of(resource)?;
    let api: Api<K> = Api::namespaced(client.clone(), &key.namespace);
    api.patch(
        &key.name,
        &PatchParams::apply(FIELD_MANAGER).force(),
        &Patch::Apply(resource),
    )
    .await?;
    debug!(kind = %K::kind(&()), key = %key, "applied");
    Ok(())
}

async fn list_meta<K>(api: &Api<K>) -> Result<Vec<ObjectMeta>, Error>
where
    K: Resource + Clone + DeserializeOwned + Debug,
{
    let list = api.list_metadata(&ListParams::default()).await?;
    Ok(list.items.into_iter().map(|item| item.metadata).collect())
}

async fn delete_opt<K>(api: &Api<K>, name: &str) -> Result<(), Error>
where
    K: Resource + Clone + DeserializeOwned + Debug,
{
    match api.delete(name, &DeleteParams::default()).await {
        Ok(_) => Ok(()),
        Err(e) if is_not_found(&e) => Ok(()),
        Err(e) => Err(e.into()),
    }
}

#[async_trait::async_trait]
impl ClusterApi for KubeClusterApi {
    async fn get_proxy(&self, key: &ObjectKey) -> Result<Option<HTTPProxy>, Error> {
        get_opt(&self.namespaced::<HTTPProxy>(&key.namespace), &key.name).await
    }

    async fn get_service(&self, key: &ObjectKey) -> Result<Option<Service>, Error> {
        get_opt(&self.namespaced::<Service>(&key.namespace), &key.name).await
    }

    async fn get_certificate(&self, key: &ObjectKey) -> Result<Option<Certificate>, Error> {
        get_opt(&self.namespaced::<Certificate>(&key.namespace), &key.name).await
    }

    async fn apply_dns_endpoint(&self, endpoint: &DNSEndpoint) -> Result<(), Error> {
        apply(&self.client, endpoint).await
    }

    async fn apply_certificate(&self, certificate: &Certificate) -> Result<(), Error> {
        apply(&self.client, certificate).await
    }

    async fn apply_delegation(
        &self,
        delegation: &TLSCertificateDelegation,
    ) -> Result<(), Error> {
        apply(&self.client, delegation).await
    }

    async fn list_children(
        &self,
        kind: ChildKind,
        namespace: &str,
    ) -> Result<Vec<ObjectMeta>, Error> {
        match kind {
            ChildKind::DnsEndpoint => list_meta(&self.namespaced::<DNSEndpoint>(namespace)).await,
            ChildKind::Certificate => list_meta(&self.namespaced::<Certificate>(namespace)).await,
            ChildKind::TlsCertificateDelegation => {
                list_meta(&self.namespaced::<TLSCertificateDelegation>(namespace)).await
            }
        }
    }

    async fn delete_child(&self, kind: ChildKind, key: &ObjectKey) -> Result<(), Error> {
        match kind {
            ChildKind::DnsEndpoint => {
                delete_opt(&self.namespaced::<DNSEndpoint>(&key.namespace), &key.name).await
            }
            ChildKind::Certificate => {
                delete_opt(&self.namespaced::<Certificate>(&key.namespace), &key.name).await
            }
            ChildKind::TlsCertificateDelegation => {
                delete_opt(
                    &self.namespaced::<TLSCertificateDelegation>(&key.namespace),
                    &key.name,
                )
                .await
            }
        }
    }

    async fn patch_proxy(
        &self,
        key: &ObjectKey,
        patch: &serde_json::Value,
    ) -> Result<HTTPProxy, Error> {
        let api = self.namespaced::<HTTPProxy>(&key.namespace);
        let proxy = api
            .patch(&key.name, &PatchParams::default(), &Patch::Merge(patch))
            .await?;
        debug!(key = %key, "patched HTTPProxy");
        Ok(proxy)
    }
}

/// Child kinds confirmed to be served by the API server.
///
/// Built once at startup by [`KnownKinds::register`] and carried in the
/// controller context.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct KnownKinds {
    kinds: Vec<ChildKind>,
}

impl KnownKinds {
    /// Construct from an explicit list, bypassing discovery.
    #[must_use]
    pub fn from_kinds(kinds: impl IntoIterator<Item = ChildKind>) -> Self {
        Self {
            kinds: kinds.into_iter().collect(),
        }
    }

    /// Check each requested kind against API discovery.
    ///
    /// # Errors
    ///
    /// Returns [`Error::KindNotServed`] for the first kind the server does not
    /// serve, or [`Error::Kube`] if discovery fails for another reason.
    pub async fn register(client: &Client, kinds: &[ChildKind]) -> Result<Self, Error> {
        let mut registered = Vec::with_capacity(kinds.len());
        for kind in kinds {
            let gvk = kind_gvk(*kind);
            match kube::discovery::pinned_kind(client, &gvk).await {
                Ok(_) => {
                    debug!(kind = %kind, "child kind is served");
                    registered.push(*kind);
                }
                Err(kube::Error::Discovery(_)) => {
                    return Err(Error::KindNotServed {
                        group: gvk.group,
                        kind: gvk.kind,
                    });
                }
                Err(e) if is_not_found(&e) => {
                    return Err(Error::KindNotServed {
                        group: gvk.group,
                        kind: gvk.kind,
                    });
                }
                Err(e) => return Err(e.into()),
            }
        }
        Ok(Self { kinds: registered })
    }

    pub fn iter(&self) -> impl Iterator<Item = ChildKind> + '_ {
        self.kinds.iter().copied()
    }
}

fn kind_gvk(kind: ChildKind) -> kube::core::GroupVersionKind {
    match kind {
        ChildKind::DnsEndpoint => gvk_of::<DNSEndpoint>(),
        ChildKind::Certificate => gvk_of::<Certificate>(),
        ChildKind::TlsCertificateDelegation => gvk_of::<TLSCertificateDelegation>(),
    }
}

fn gvk_of<K: Resource<DynamicType = ()>>() -> kube::core::GroupVersionKind {
    kube::core::GroupVersionKind::gvk(&K::group(&()), &K::version(&()), &K::kind(&()))
}

/// `namespace/name` of a child from its metadata.
pub(crate) fn meta_key(meta: &ObjectMeta) -> Option<ObjectKey> {
    Some(ObjectKey::new(meta.namespace.clone()?, meta.name.clone()?))
}
