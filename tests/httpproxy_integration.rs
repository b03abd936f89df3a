// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Integration tests for the contour-plus controller
//!
//! These tests need a cluster with the Contour, external-dns and cert-manager
//! CRDs installed. They reconcile directly against the API server without
//! running the controller loop.
//!
//! Run with: cargo test --test httpproxy_integration -- --ignored

mod common;

use common::{cleanup_test_namespace, create_test_namespace, get_kube_client_or_skip};
use contour_plus::api::{ClusterApi, KnownKinds, KubeClusterApi};
use contour_plus::certificates::DirectApplier;
use contour_plus::config::ReconcilerOptions;
use contour_plus::context::Context;
use contour_plus::crd::{Certificate, HTTPProxy, HTTPProxySpec, Tls, VirtualHost};
use contour_plus::key::ObjectKey;
use contour_plus::labels::{OWNER_ANNOTATION, TLS_ACME_ANNOTATION};
use contour_plus::reconcilers::reconcile_httpproxy;
use kube::api::{Api, PostParams};
use std::collections::BTreeMap;
use std::sync::Arc;

const TEST_NAMESPACE: &str = "contour-plus-integration-test";

fn test_proxy() -> HTTPProxy {
    let mut proxy = HTTPProxy::new(
        "web",
        HTTPProxySpec {
            virtual_host: Some(VirtualHost {
                fqdn: "web.integration.example.com".to_string(),
                tls: Some(Tls {
                    secret_name: "web-tls".to_string(),
                }),
            }),
            ingress_class_name: None,
        },
    );
    proxy.metadata.namespace = Some(TEST_NAMESPACE.to_string());
    proxy.metadata.annotations = Some(BTreeMap::from([(
        TLS_ACME_ANNOTATION.to_string(),
        "true".to_string(),
    )]));
    proxy
}

fn certificate_options() -> ReconcilerOptions {
    ReconcilerOptions {
        service_key: ObjectKey::new("projectcontour", "envoy"),
        default_issuer_name: "integration-issuer".to_string(),
        default_issuer_kind: "ClusterIssuer".to_string(),
        create_certificate: true,
        retry_channel_capacity: 1,
        ..Default::default()
    }
}

#[tokio::test]
#[ignore] // Run with: cargo test --test httpproxy_integration -- --ignored
async fn test_child_kinds_are_served() {
    let Some(client) = get_kube_client_or_skip().await else {
        return;
    };

    let options = ReconcilerOptions {
        create_dns_endpoint: true,
        ..certificate_options()
    };
    let kinds = KnownKinds::register(&client, &options.child_kinds())
        .await
        .unwrap_or_else(|e| panic!("child kinds are not served: {e}"));

    assert_eq!(kinds.iter().count(), 3);
}

#[tokio::test]
#[ignore]
async fn test_reconcile_creates_certificate() {
    let Some(client) = get_kube_client_or_skip().await else {
        return;
    };

    if let Err(e) = create_test_namespace(&client, TEST_NAMESPACE).await {
        panic!("Failed to create test namespace: {e}");
    }

    let proxies: Api<HTTPProxy> = Api::namespaced(client.clone(), TEST_NAMESPACE);
    if let Err(e) = proxies.create(&PostParams::default(), &test_proxy()).await {
        let _ = cleanup_test_namespace(&client, TEST_NAMESPACE).await;
        panic!("Failed to create HTTPProxy: {e}");
    }

    let options = certificate_options();
    let kinds = KnownKinds::from_kinds(options.child_kinds());
    let api: Arc<dyn ClusterApi> = Arc::new(KubeClusterApi::new(client.clone()));
    let ctx = Context::new(
        api.clone(),
        options,
        Arc::new(DirectApplier::new(api)),
        kinds,
    );

    let result = reconcile_httpproxy(&ctx, &ObjectKey::new(TEST_NAMESPACE, "web")).await;

    let certificates: Api<Certificate> = Api::namespaced(client.clone(), TEST_NAMESPACE);
    let certificate = certificates.get_opt("web").await;

    let _ = cleanup_test_namespace(&client, TEST_NAMESPACE).await;

    result.unwrap_or_else(|e| panic!("reconcile failed: {e}"));
    let certificate = certificate
        .unwrap_or_else(|e| panic!("failed to read Certificate: {e}"))
        .unwrap_or_else(|| panic!("Certificate was not created"));

    assert_eq!(certificate.spec.dns_names, vec!["web.integration.example.com"]);
    assert_eq!(certificate.spec.secret_name, "web-tls");
    assert_eq!(certificate.spec.issuer_ref.name, "integration-issuer");
    assert_eq!(
        certificate.metadata.annotations.unwrap_or_default()[OWNER_ANNOTATION],
        format!("{TEST_NAMESPACE}/web")
    );
}
