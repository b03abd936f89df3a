// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Controller wiring for `HTTPProxy`.
//!
//! The controller is fed by four kinds of triggers:
//!
//! - `HTTPProxy` changes to generation, labels or annotations
//! - updates of the load-balancer Service, which fan out to every parent
//! - generation changes and deletions of owned children, routed to the
//!   parent named by the owner annotation
//! - retry signals from the rate-limited certificate worker

use crate::constants::ERROR_REQUEUE_DURATION_SECS;
use crate::context::Context;
use crate::crd::{Certificate, ChildKind, DNSEndpoint, HTTPProxy, TLSCertificateDelegation};
use crate::errors::Error;
use crate::filters::{admit_service_event, proxy_change_hash, ChildEventFilter};
use crate::key::ObjectKey;
use crate::metrics::{record_reconciliation_error, record_reconciliation_success};
use crate::ownership::parse_owner;
use crate::reconcilers::reconcile_httpproxy;
use futures::{future, Stream, StreamExt};
use k8s_openapi::api::core::v1::Service;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::core::PartialObjectMeta;
use kube::runtime::controller::{self, Action};
use kube::runtime::reflector::{self, ObjectRef, Store};
use kube::runtime::{metadata_watcher, watcher, Controller, PredicateConfig, WatchStreamExt};
use kube::{Api, Client, Resource};
use serde::de::DeserializeOwned;
use std::fmt::Debug;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

/// Error returned to the controller runtime.
#[derive(Debug, thiserror::Error)]
#[error(transparent)]
pub struct ReconcileError(#[from] Error);

/// Controller tuning.
#[derive(Clone, Debug)]
pub struct ControllerSettings {
    /// Parents reconciled in parallel
    pub concurrency: u16,
}

/// Run the `HTTPProxy` controller until `shutdown` is cancelled.
///
/// `retries` carries parents whose queued certificate apply failed.
pub async fn run(
    client: Client,
    ctx: Arc<Context>,
    retries: Option<mpsc::Receiver<ObjectRef<HTTPProxy>>>,
    settings: ControllerSettings,
    shutdown: CancellationToken,
) {
    info!(
        concurrency = settings.concurrency,
        kinds = ?ctx.kinds.iter().collect::<Vec<_>>(),
        "Starting HTTPProxy controller"
    );

    let (reader, writer) = reflector::store();
    let proxies = watcher(Api::<HTTPProxy>::all(client.clone()), watcher::Config::default())
        .default_backoff()
        .reflect(writer)
        .applied_objects()
        .predicate_filter(proxy_change_hash, PredicateConfig::default());

    let mut controller = Controller::for_stream(proxies, reader.clone())
        .with_config(controller::Config::default().concurrency(settings.concurrency))
        .watches_stream(
            service_events(&client, &ctx.options.service_key),
            move |_service: Service| all_parents(&reader),
        );

    for kind in ctx.kinds.iter() {
        controller = match kind {
            ChildKind::DnsEndpoint => watch_children::<DNSEndpoint>(controller, &client),
            ChildKind::Certificate => watch_children::<Certificate>(controller, &client),
            ChildKind::TlsCertificateDelegation => {
                watch_children::<TLSCertificateDelegation>(controller, &client)
            }
        };
    }

    if let Some(retries) = retries {
        controller = controller.reconcile_on(ReceiverStream::new(retries));
    }

    controller
        .graceful_shutdown_on(async move { shutdown.cancelled().await })
        .run(reconcile, error_policy, ctx)
        .for_each(|_| future::ready(()))
        .await;

    info!("HTTPProxy controller stopped");
}

/// Apply and delete events of the load-balancer Service only.
fn service_events(
    client: &Client,
    service_key: &ObjectKey,
) -> impl Stream<Item = Result<Service, watcher::Error>> + Send + 'static {
    let api = Api::<Service>::namespaced(client.clone(), &service_key.namespace);
    let config = watcher::Config::default().fields(&format!("metadata.name={}", service_key.name));
    watcher(api, config)
        .default_backoff()
        .filter_map(|event| {
            future::ready(match event {
                Ok(event) => admit_service_event(event).map(Ok),
                Err(err) => Some(Err(err)),
            })
        })
}

fn all_parents(store: &Store<HTTPProxy>) -> Vec<ObjectRef<HTTPProxy>> {
    store
        .state()
        .iter()
        .map(|proxy| ObjectRef::from_obj(proxy.as_ref()))
        .collect()
}

/// Route admitted child events of kind `K` to their parents.
fn watch_children<K>(controller: Controller<HTTPProxy>, client: &Client) -> Controller<HTTPProxy>
where
    K: Resource<DynamicType = ()> + Clone + DeserializeOwned + Debug + Send + Sync + 'static,
{
    let mut filter = ChildEventFilter::default();
    let events = metadata_watcher(Api::<K>::all(client.clone()), watcher::Config::default())
        .default_backoff()
        .filter_map(move |event| {
            future::ready(match event {
                Ok(event) => filter.admit(event).map(Ok),
                Err(err) => Some(Err(err)),
            })
        });

    controller.watches_stream(events, |child: PartialObjectMeta<K>| {
        parent_ref(&child.metadata)
    })
}

/// Parent named by a child's owner annotation.
pub(crate) fn parent_ref(meta: &ObjectMeta) -> Option<ObjectRef<HTTPProxy>> {
    parse_owner(meta).map(|parent| ObjectRef::new(&parent.name).within(&parent.namespace))
}

/// Reconcile wrapper for `HTTPProxy`
pub(crate) async fn reconcile(
    proxy: Arc<HTTPProxy>,
    ctx: Arc<Context>,
) -> Result<Action, ReconcileError> {
    let start = Instant::now();
    let key = ObjectKey::of(proxy.as_ref())?;
    debug!(key = %key, "Reconcile wrapper called for HTTPProxy");

    match reconcile_httpproxy(&ctx, &key).await {
        Ok(()) => {
            record_reconciliation_success(start.elapsed());
            Ok(Action::await_change())
        }
        Err(e) => {
            record_reconciliation_error(start.elapsed());
            error!(key = %key, "Failed to reconcile HTTPProxy: {}", e);
            Err(e.into())
        }
    }
}

/// Error policy for the `HTTPProxy` controller
pub(crate) fn error_policy(
    _proxy: Arc<HTTPProxy>,
    _err: &ReconcileError,
    _ctx: Arc<Context>,
) -> Action {
    Action::requeue(Duration::from_secs(ERROR_REQUEUE_DURATION_SECS))
}

#[cfg(test)]
#[path = "controller_tests.rs"]
mod controller_tests;
