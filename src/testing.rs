// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Test fixtures and an in-memory [`ClusterApi`].

use crate::api::{ClusterApi, KnownKinds};
use crate::certificates::DirectApplier;
use crate::config::ReconcilerOptions;
use crate::context::Context;
use crate::crd::{
    Certificate, ChildKind, DNSEndpoint, HTTPProxy, HTTPProxySpec, TLSCertificateDelegation,
    Tls, VirtualHost,
};
use crate::errors::Error;
use crate::key::ObjectKey;
use k8s_openapi::api::core::v1::{
    LoadBalancerIngress, LoadBalancerStatus, Service, ServiceStatus,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};

pub const SERVICE_NAMESPACE: &str = "projectcontour";
pub const SERVICE_NAME: &str = "envoy";

/// Policy with both child kinds enabled and no cross-namespace allow-lists.
pub fn options() -> ReconcilerOptions {
    ReconcilerOptions {
        service_key: ObjectKey::new(SERVICE_NAMESPACE, SERVICE_NAME),
        default_issuer_kind: "ClusterIssuer".to_string(),
        create_dns_endpoint: true,
        create_certificate: true,
        retry_channel_capacity: 100,
        ..Default::default()
    }
}

/// Context over a fake API with direct certificate applies.
pub fn context(api: &Arc<FakeClusterApi>, options: ReconcilerOptions) -> Context {
    let kinds = KnownKinds::from_kinds(options.child_kinds());
    Context::new(
        api.clone(),
        options,
        Arc::new(DirectApplier::new(api.clone())),
        kinds,
    )
}

/// Root proxy with a virtual host and a TLS secret named `<name>-tls`.
pub fn proxy(namespace: &str, name: &str, fqdn: &str) -> HTTPProxy {
    let mut proxy = HTTPProxy::new(
        name,
        HTTPProxySpec {
            virtual_host: Some(VirtualHost {
                fqdn: fqdn.to_string(),
                tls: Some(Tls {
                    secret_name: format!("{name}-tls"),
                }),
            }),
            ingress_class_name: None,
        },
    );
    proxy.metadata.namespace = Some(namespace.to_string());
    proxy.metadata.uid = Some(format!("uid-{namespace}-{name}"));
    proxy.metadata.generation = Some(1);
    proxy
}

/// Set an annotation on a proxy.
pub fn annotate(mut proxy: HTTPProxy, key: &str, value: &str) -> HTTPProxy {
    proxy
        .metadata
        .annotations
        .get_or_insert_with(BTreeMap::new)
        .insert(key.to_string(), value.to_string());
    proxy
}

/// Set a label on a proxy.
pub fn label(mut proxy: HTTPProxy, key: &str, value: &str) -> HTTPProxy {
    proxy
        .metadata
        .labels
        .get_or_insert_with(BTreeMap::new)
        .insert(key.to_string(), value.to_string());
    proxy
}

/// Mark a proxy as being deleted.
pub fn terminating(proxy: HTTPProxy) -> HTTPProxy {
    let mut value = serde_json::to_value(&proxy).unwrap();
    value["metadata"]["deletionTimestamp"] = serde_json::json!("2025-01-01T00:00:00Z");
    serde_json::from_value(value).unwrap()
}

/// Load-balancer Service publishing the given IPs.
pub fn lb_service(ips: &[&str]) -> Service {
    Service {
        metadata: ObjectMeta {
            name: Some(SERVICE_NAME.to_string()),
            namespace: Some(SERVICE_NAMESPACE.to_string()),
            ..Default::default()
        },
        status: Some(ServiceStatus {
            load_balancer: Some(LoadBalancerStatus {
                ingress: Some(
                    ips.iter()
                        .map(|ip| LoadBalancerIngress {
                            ip: Some((*ip).to_string()),
                            ..Default::default()
                        })
                        .collect(),
                ),
            }),
            ..Default::default()
        }),
        ..Default::default()
    }
}

/// An API error with the given HTTP status code.
pub fn api_error(code: u16) -> Error {
    Error::Kube(kube::Error::Api(
        kube::core::Status::failure("injected", "Injected")
            .with_code(code)
            .boxed(),
    ))
}

/// State held by [`FakeClusterApi`].
#[derive(Default)]
pub struct FakeState {
    pub proxies: BTreeMap<ObjectKey, HTTPProxy>,
    pub services: BTreeMap<ObjectKey, Service>,
    pub dns_endpoints: BTreeMap<ObjectKey, DNSEndpoint>,
    pub certificates: BTreeMap<ObjectKey, Certificate>,
    pub delegations: BTreeMap<ObjectKey, TLSCertificateDelegation>,
    /// Writes that changed stored state
    pub mutations: usize,
    /// Every successful certificate apply, in order
    pub certificate_applies: Vec<Certificate>,
    /// Every delete request, including ones for absent objects
    pub deletes: Vec<(ChildKind, ObjectKey)>,
    /// Every proxy patch body
    pub proxy_patches: Vec<serde_json::Value>,
    pub fail_certificate_applies: bool,
}

/// In-memory stand-in for the API server.
///
/// Applies replace the stored object; only applies that change it count as
/// mutations.
#[derive(Default)]
pub struct FakeClusterApi {
    state: Mutex<FakeState>,
}

impl FakeClusterApi {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> MutexGuard<'_, FakeState> {
        self.state.lock().unwrap()
    }

    pub fn with_proxy(self, proxy: HTTPProxy) -> Self {
        let key = ObjectKey::of(&proxy).unwrap();
        self.state().proxies.insert(key, proxy);
        self
    }

    pub fn with_service(self, service: Service) -> Self {
        self.state()
            .services
            .insert(ObjectKey::new(SERVICE_NAMESPACE, SERVICE_NAME), service);
        self
    }

    pub fn with_certificate(self, certificate: Certificate) -> Self {
        let key = ObjectKey::of(&certificate).unwrap();
        self.state().certificates.insert(key, certificate);
        self
    }

    pub fn with_dns_endpoint(self, endpoint: DNSEndpoint) -> Self {
        let key = ObjectKey::of(&endpoint).unwrap();
        self.state().dns_endpoints.insert(key, endpoint);
        self
    }

    pub fn with_delegation(self, delegation: TLSCertificateDelegation) -> Self {
        let key = ObjectKey::of(&delegation).unwrap();
        self.state().delegations.insert(key, delegation);
        self
    }

    pub fn fail_certificate_applies(&self, fail: bool) {
        self.state().fail_certificate_applies = fail;
    }

    pub fn mutations(&self) -> usize {
        self.state().mutations
    }

    pub fn proxy(&self, key: &ObjectKey) -> Option<HTTPProxy> {
        self.state().proxies.get(key).cloned()
    }
}

fn store<K: Clone + PartialEq>(
    map: &mut BTreeMap<ObjectKey, K>,
    mutations: &mut usize,
    key: ObjectKey,
    obj: &K,
) {
    if map.get(&key) != Some(obj) {
        *mutations += 1;
        map.insert(key, obj.clone());
    }
}

/// RFC 7386 JSON merge patch.
fn merge(target: &mut serde_json::Value, patch: &serde_json::Value) {
    match (target, patch) {
        (serde_json::Value::Object(target), serde_json::Value::Object(patch)) => {
            for (k, v) in patch {
                if v.is_null() {
                    target.remove(k);
                } else {
                    merge(target.entry(k.clone()).or_insert(serde_json::Value::Null), v);
                }
            }
        }
        (target, patch) => *target = patch.clone(),
    }
}

#[async_trait::async_trait]
impl ClusterApi for FakeClusterApi {
    async fn get_proxy(&self, key: &ObjectKey) -> Result<Option<HTTPProxy>, Error> {
        Ok(self.state().proxies.get(key).cloned())
    }

    async fn get_service(&self, key: &ObjectKey) -> Result<Option<Service>, Error> {
        Ok(self.state().services.get(key).cloned())
    }

    async fn get_certificate(&self, key: &ObjectKey) -> Result<Option<Certificate>, Error> {
        Ok(self.state().certificates.get(key).cloned())
    }

    async fn apply_dns_endpoint(&self, endpoint: &DNSEndpoint) -> Result<(), Error> {
        let key = ObjectKey::of(endpoint)?;
        let mut guard = self.state();
        let state = &mut *guard;
        store(&mut state.dns_endpoints, &mut state.mutations, key, endpoint);
        Ok(())
    }

    async fn apply_certificate(&self, certificate: &Certificate) -> Result<(), Error> {
        let key = ObjectKey::of(certificate)?;
        let mut guard = self.state();
        let state = &mut *guard;
        if state.fail_certificate_applies {
            return Err(api_error(500));
        }
        state.certificate_applies.push(certificate.clone());
        store(&mut state.certificates, &mut state.mutations, key, certificate);
        Ok(())
    }

    async fn apply_delegation(
        &self,
        delegation: &TLSCertificateDelegation,
    ) -> Result<(), Error> {
        let key = ObjectKey::of(delegation)?;
        let mut guard = self.state();
        let state = &mut *guard;
        store(&mut state.delegations, &mut state.mutations, key, delegation);
        Ok(())
    }

    async fn list_children(
        &self,
        kind: ChildKind,
        namespace: &str,
    ) -> Result<Vec<ObjectMeta>, Error> {
        let state = self.state();
        let metas: Vec<ObjectMeta> = match kind {
            ChildKind::DnsEndpoint => state
                .dns_endpoints
                .values()
                .map(|o| o.metadata.clone())
                .collect(),
            ChildKind::Certificate => state
                .certificates
                .values()
                .map(|o| o.metadata.clone())
                .collect(),
            ChildKind::TlsCertificateDelegation => state
                .delegations
                .values()
                .map(|o| o.metadata.clone())
                .collect(),
        };
        Ok(metas
            .into_iter()
            .filter(|meta| meta.namespace.as_deref() == Some(namespace))
            .collect())
    }

    async fn delete_child(&self, kind: ChildKind, key: &ObjectKey) -> Result<(), Error> {
        let mut guard = self.state();
        let state = &mut *guard;
        state.deletes.push((kind, key.clone()));
        let removed = match kind {
            ChildKind::DnsEndpoint => state.dns_endpoints.remove(key).is_some(),
            ChildKind::Certificate => state.certificates.remove(key).is_some(),
            ChildKind::TlsCertificateDelegation => state.delegations.remove(key).is_some(),
        };
        if removed {
            state.mutations += 1;
        }
        Ok(())
    }

    async fn patch_proxy(
        &self,
        key: &ObjectKey,
        patch: &serde_json::Value,
    ) -> Result<HTTPProxy, Error> {
        let mut guard = self.state();
        let state = &mut *guard;
        state.proxy_patches.push(patch.clone());
        let current = state.proxies.get(key).ok_or_else(|| api_error(404))?;
        let mut value = serde_json::to_value(current)?;
        merge(&mut value, patch);
        let patched: HTTPProxy = serde_json::from_value(value)?;
        store(&mut state.proxies, &mut state.mutations, key.clone(), &patched);
        Ok(patched)
    }
}
