// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Unit tests for `cleanup.rs` and deletion handling in `httpproxy.rs`

#[cfg(test)]
mod tests {
    use crate::config::ReconcilerOptions;
    use crate::crd::{
        Certificate, CertificateSpec, ChildKind, DNSEndpoint, DNSEndpointSpec,
        TLSCertificateDelegation, TLSCertificateDelegationSpec,
    };
    use crate::key::ObjectKey;
    use crate::labels::{FINALIZER_HTTP_PROXY, OWNER_ANNOTATION};
    use crate::reconcilers::cleanup::cleanup_cross_namespace_children;
    use crate::reconcilers::reconcile_httpproxy;
    use crate::testing::{context, options, proxy, terminating, FakeClusterApi};
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
    use std::collections::BTreeMap;
    use std::sync::Arc;

    fn owned_meta(namespace: &str, name: &str, owner: &str) -> ObjectMeta {
        ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some(namespace.to_string()),
            annotations: Some(BTreeMap::from([(
                OWNER_ANNOTATION.to_string(),
                owner.to_string(),
            )])),
            ..Default::default()
        }
    }

    fn endpoint(namespace: &str, name: &str, owner: &str) -> DNSEndpoint {
        DNSEndpoint {
            metadata: owned_meta(namespace, name, owner),
            spec: DNSEndpointSpec::default(),
        }
    }

    fn cross_namespace_options() -> ReconcilerOptions {
        ReconcilerOptions {
            allowed_dns_namespaces: vec!["dns".to_string(), "default".to_string()],
            allowed_issuer_namespaces: vec!["certs".to_string()],
            ..options()
        }
    }

    fn finalized_parent() -> crate::crd::HTTPProxy {
        let mut parent = proxy("default", "foo", "foo.example.com");
        parent.metadata.finalizers = Some(vec![FINALIZER_HTTP_PROXY.to_string()]);
        parent
    }

    #[tokio::test]
    async fn test_cleanup_deletes_only_owned_children() {
        let api = Arc::new(
            FakeClusterApi::new()
                .with_dns_endpoint(endpoint("dns", "default-foo", "default/foo"))
                .with_dns_endpoint(endpoint("dns", "default-foo-delegation", "default/foo"))
                .with_dns_endpoint(endpoint("dns", "default-bar", "default/bar"))
                .with_certificate(Certificate {
                    metadata: owned_meta("certs", "default-foo", "default/foo"),
                    spec: CertificateSpec::default(),
                })
                .with_delegation(TLSCertificateDelegation {
                    metadata: owned_meta("certs", "default-foo", "default/foo"),
                    spec: TLSCertificateDelegationSpec::default(),
                }),
        );
        let ctx = context(&api, cross_namespace_options());

        let deleted = cleanup_cross_namespace_children(&ctx, &finalized_parent())
            .await
            .unwrap();

        assert_eq!(deleted, 4);
        let state = api.state();
        assert_eq!(
            state.dns_endpoints.keys().cloned().collect::<Vec<_>>(),
            vec![ObjectKey::new("dns", "default-bar")]
        );
        assert!(state.certificates.is_empty());
        assert!(state.delegations.is_empty());
    }

    #[tokio::test]
    async fn test_cleanup_skips_parent_namespace() {
        let api = Arc::new(
            FakeClusterApi::new().with_dns_endpoint(endpoint("default", "foo", "default/foo")),
        );
        let ctx = context(&api, cross_namespace_options());

        let deleted = cleanup_cross_namespace_children(&ctx, &finalized_parent())
            .await
            .unwrap();

        assert_eq!(deleted, 0);
        assert!(api.state().deletes.is_empty());
    }

    #[tokio::test]
    async fn test_cleanup_only_covers_enabled_kinds() {
        let api = Arc::new(
            FakeClusterApi::new().with_dns_endpoint(endpoint("dns", "default-foo", "default/foo")),
        );
        let ctx = context(
            &api,
            ReconcilerOptions {
                create_dns_endpoint: false,
                ..cross_namespace_options()
            },
        );

        cleanup_cross_namespace_children(&ctx, &finalized_parent())
            .await
            .unwrap();

        let state = api.state();
        assert!(state.deletes.iter().all(|(kind, _)| *kind != ChildKind::DnsEndpoint));
        assert_eq!(state.dns_endpoints.len(), 1);
    }

    #[tokio::test]
    async fn test_terminating_parent_releases_finalizer_after_cleanup() {
        let parent = terminating(finalized_parent());
        let api = Arc::new(
            FakeClusterApi::new()
                .with_proxy(parent)
                .with_dns_endpoint(endpoint("dns", "default-foo", "default/foo"))
                .with_dns_endpoint(endpoint("dns", "default-foo-delegation", "default/foo")),
        );
        let ctx = context(&api, cross_namespace_options());

        reconcile_httpproxy(&ctx, &ObjectKey::new("default", "foo"))
            .await
            .unwrap();

        assert!(api.state().dns_endpoints.is_empty());
        let stored = api.proxy(&ObjectKey::new("default", "foo")).unwrap();
        assert!(!stored.has_finalizer(FINALIZER_HTTP_PROXY));
    }

    #[tokio::test]
    async fn test_terminating_parent_without_finalizer_is_untouched() {
        let parent = terminating(proxy("default", "foo", "foo.example.com"));
        let api = Arc::new(
            FakeClusterApi::new()
                .with_proxy(parent)
                .with_dns_endpoint(endpoint("dns", "default-foo", "default/foo")),
        );
        let ctx = context(&api, cross_namespace_options());

        reconcile_httpproxy(&ctx, &ObjectKey::new("default", "foo"))
            .await
            .unwrap();

        let state = api.state();
        assert!(state.deletes.is_empty());
        assert!(state.proxy_patches.is_empty());
        assert_eq!(state.dns_endpoints.len(), 1);
    }
}
