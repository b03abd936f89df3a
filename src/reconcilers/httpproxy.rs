// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! `HTTPProxy` reconciliation.
//!
//! One pass of [`reconcile_httpproxy`] for a parent key:
//!
//! 1. Fetch the parent; a missing parent needs nothing.
//! 2. A terminating parent holding the finalizer has its cross-namespace
//!    children deleted and the finalizer released.
//! 3. Excluded parents and parents of another ingress class are ignored.
//! 4. The address `DNSEndpoint`, the delegation `DNSEndpoint`, the
//!    `Certificate` and the `TLSCertificateDelegation` are applied in turn.
//! 5. A parent whose certificate lives in another namespace is pointed at it
//!    through `spec.virtualhost.tls.secretName`.
//!
//! Missing preconditions (no virtual host, no load-balancer address, TLS not
//! requested) end a step quietly; a later watch event retriggers it.

use super::cleanup::cleanup_cross_namespace_children;
use super::finalizers::remove_finalizer;
use crate::certificates::ApplyOutcome;
use crate::context::Context;
use crate::crd::HTTPProxy;
use crate::desired::{load_balancer_addresses, CertificateSkip, DesiredStateBuilder};
use crate::errors::Error;
use crate::filters::ingress_class_matches;
use crate::key::ObjectKey;
use crate::labels::{EXCLUDE_ANNOTATION, FINALIZER_HTTP_PROXY};
use crate::ownership::{track_ownership, ParentLifecycle};
use serde_json::json;
use std::net::IpAddr;
use tracing::{debug, error, info};

/// Reconcile the `HTTPProxy` named by `key`.
///
/// # Errors
///
/// Returns an error when a read or a synchronous write fails. Queued
/// certificate failures are reported through the retry channel instead.
pub async fn reconcile_httpproxy(ctx: &Context, key: &ObjectKey) -> Result<(), Error> {
    let Some(mut proxy) = ctx.api.get_proxy(key).await? else {
        debug!(key = %key, "HTTPProxy not found, nothing to do");
        return Ok(());
    };

    match ParentLifecycle::of(&proxy) {
        ParentLifecycle::Active => {}
        ParentLifecycle::TerminatingClean => {
            debug!(key = %key, "HTTPProxy is being deleted without cross-namespace children");
            return Ok(());
        }
        ParentLifecycle::TerminatingWithChildren => {
            let deleted = cleanup_cross_namespace_children(ctx, &proxy).await?;
            remove_finalizer(ctx.api.as_ref(), &proxy, FINALIZER_HTTP_PROXY).await?;
            info!(key = %key, deleted, "cleaned up HTTPProxy children");
            return Ok(());
        }
    }

    if proxy.annotation(EXCLUDE_ANNOTATION) == Some("true") {
        debug!(key = %key, "HTTPProxy is excluded");
        return Ok(());
    }

    if !ingress_class_matches(&proxy, &ctx.options.ingress_class_name) {
        debug!(key = %key, class = %ctx.options.ingress_class_name, "HTTPProxy ingress class does not match");
        return Ok(());
    }

    if ctx.options.create_dns_endpoint {
        reconcile_dns_endpoint(ctx, &mut proxy).await?;
        reconcile_delegation_dns_endpoint(ctx, &mut proxy).await?;
    }

    if ctx.options.create_certificate && reconcile_certificate(ctx, &mut proxy).await? {
        reconcile_tls_delegation(ctx, &mut proxy).await?;
        reconcile_secret_name(ctx, &proxy).await?;
    }

    Ok(())
}

/// Addresses published by the load-balancer Service; empty when it is absent.
async fn service_addresses(ctx: &Context) -> Result<Vec<IpAddr>, Error> {
    let service_key = &ctx.options.service_key;
    match ctx.api.get_service(service_key).await? {
        Some(service) => Ok(load_balancer_addresses(&service)),
        None => {
            info!(service = %service_key, "load-balancer Service not found");
            Ok(Vec::new())
        }
    }
}

async fn reconcile_dns_endpoint(ctx: &Context, proxy: &mut HTTPProxy) -> Result<(), Error> {
    if proxy.fqdn().is_none() {
        return Ok(());
    }

    let addresses = service_addresses(ctx).await?;
    let desired = DesiredStateBuilder::new(&ctx.options, proxy)?.dns_endpoint(&addresses);
    let Some(mut endpoint) = desired else {
        info!(service = %ctx.options.service_key, "no IP address for service");
        return Ok(());
    };

    track_ownership(ctx.api.as_ref(), proxy, &mut endpoint.metadata).await?;
    ctx.api.apply_dns_endpoint(&endpoint).await?;
    info!(key = %ObjectKey::of(&endpoint)?, "DNSEndpoint successfully reconciled");
    Ok(())
}

async fn reconcile_delegation_dns_endpoint(
    ctx: &Context,
    proxy: &mut HTTPProxy,
) -> Result<(), Error> {
    let desired = DesiredStateBuilder::new(&ctx.options, proxy)?.delegation_dns_endpoint();
    let Some(mut endpoint) = desired else {
        return Ok(());
    };

    track_ownership(ctx.api.as_ref(), proxy, &mut endpoint.metadata).await?;
    ctx.api.apply_dns_endpoint(&endpoint).await?;
    info!(key = %ObjectKey::of(&endpoint)?, "delegation DNSEndpoint successfully reconciled");
    Ok(())
}

/// Returns `true` when a certificate was applied or queued.
async fn reconcile_certificate(ctx: &Context, proxy: &mut HTTPProxy) -> Result<bool, Error> {
    let builder = DesiredStateBuilder::new(&ctx.options, proxy)?;
    let parent = builder.parent().clone();
    let mut certificate = match builder.certificate() {
        Ok(certificate) => certificate,
        Err(skip @ CertificateSkip::InvalidRevisionHistoryLimit(_)) => {
            error!(parent = %parent, reason = %skip, "skipping Certificate");
            return Ok(false);
        }
        Err(CertificateSkip::NotRequested) => return Ok(false),
        Err(skip) => {
            info!(parent = %parent, reason = %skip, "skipping Certificate");
            return Ok(false);
        }
    };

    track_ownership(ctx.api.as_ref(), proxy, &mut certificate.metadata).await?;
    let key = ObjectKey::of(&certificate)?;
    match ctx.certificates.apply(certificate).await? {
        ApplyOutcome::AppliedDirect => info!(key = %key, "Certificate successfully reconciled"),
        ApplyOutcome::Queued => info!(key = %key, "Certificate queued for rate-limited apply"),
    }
    Ok(true)
}

async fn reconcile_tls_delegation(ctx: &Context, proxy: &mut HTTPProxy) -> Result<(), Error> {
    let desired = DesiredStateBuilder::new(&ctx.options, proxy)?.tls_delegation();
    let Some(mut delegation) = desired else {
        return Ok(());
    };

    track_ownership(ctx.api.as_ref(), proxy, &mut delegation.metadata).await?;
    ctx.api.apply_delegation(&delegation).await?;
    info!(key = %ObjectKey::of(&delegation)?, "TLSCertificateDelegation successfully reconciled");
    Ok(())
}

/// Point the parent at a certificate secret in another namespace.
async fn reconcile_secret_name(ctx: &Context, proxy: &HTTPProxy) -> Result<(), Error> {
    let Some(reference) = DesiredStateBuilder::new(&ctx.options, proxy)?.delegated_secret_reference()
    else {
        return Ok(());
    };
    if proxy.tls_secret_name() == Some(reference.as_str()) {
        return Ok(());
    }

    let key = ObjectKey::of(proxy)?;
    let patch = json!({
        "spec": { "virtualhost": { "tls": { "secretName": reference } } }
    });
    ctx.api.patch_proxy(&key, &patch).await?;
    info!(key = %key, secret = %reference, "HTTPProxy SecretName successfully reconciled");
    Ok(())
}
