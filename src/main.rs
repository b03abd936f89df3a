// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

use anyhow::Result;
use clap::Parser;
use contour_plus::{
    api::{ClusterApi, KnownKinds, KubeClusterApi},
    certificates,
    config::Cli,
    constants::TOKIO_WORKER_THREADS,
    context::Context,
    controller::{self, ControllerSettings},
    leader::Leadership,
    metrics,
};
use kube::Client;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

fn main() -> Result<()> {
    // Build Tokio runtime with custom thread names
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(TOKIO_WORKER_THREADS)
        .thread_name("contour-plus")
        .enable_all()
        .build()?;

    runtime.block_on(async_main())
}

fn init_logging() {
    // Respects RUST_LOG environment variable if set, otherwise defaults to INFO level
    // Respects RUST_LOG_FORMAT environment variable for output format (text or json)
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    let log_format = std::env::var("RUST_LOG_FORMAT").unwrap_or_else(|_| "text".to_string());

    match log_format.to_lowercase().as_str() {
        "json" => {
            tracing_subscriber::fmt()
                .with_env_filter(env_filter)
                .with_file(true)
                .with_line_number(true)
                .with_thread_names(true)
                .with_target(false)
                .json()
                .init();
        }
        _ => {
            tracing_subscriber::fmt()
                .with_env_filter(env_filter)
                .with_file(true)
                .with_line_number(true)
                .with_thread_names(true)
                .with_target(false)
                .with_ansi(true)
                .compact()
                .init();
        }
    }
}

/// Resolves on SIGINT, or SIGTERM on unix.
async fn shutdown_signal() -> Result<()> {
    #[cfg(unix)]
    {
        let mut terminate =
            tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())?;
        tokio::select! {
            result = tokio::signal::ctrl_c() => result?,
            _ = terminate.recv() => {}
        }
    }

    #[cfg(not(unix))]
    tokio::signal::ctrl_c().await?;

    Ok(())
}

/// Resolves when the held lease is lost; never resolves without leader election.
async fn leadership_lost(leadership: Option<&mut Leadership>) {
    match leadership {
        Some(leadership) => leadership.lost().await,
        None => std::future::pending().await,
    }
}

async fn async_main() -> Result<()> {
    init_logging();

    let cli = Cli::parse();
    let metrics_addr = cli.metrics_addr;
    let leader_election = cli.leader_election();
    let settings = ControllerSettings {
        concurrency: cli.max_concurrent_reconciles,
    };
    let options = cli.into_options()?;

    info!("Starting contour-plus controller");
    debug!(options = ?options, "Configuration loaded");

    debug!("Initializing Kubernetes client");
    let client = Client::try_default().await?;
    let kinds = KnownKinds::register(&client, &options.child_kinds()).await?;
    debug!("Kubernetes client initialized successfully");

    let api: Arc<dyn ClusterApi> = Arc::new(KubeClusterApi::new(client.clone()));
    let setup = certificates::build(api.clone(), &options);
    let ctx = Arc::new(Context::new(api, options, setup.applier, kinds));

    let shutdown = CancellationToken::new();

    let mut metrics_task = tokio::spawn(metrics::serve(metrics_addr, shutdown.clone()));

    // Standby replicas keep serving metrics while they wait for the lease
    let mut leadership = match leader_election {
        Some(election) => tokio::select! {
            result = Leadership::acquire(client.clone(), &election) => Some(result?),
            result = shutdown_signal() => {
                result?;
                info!("Shutdown signal received before acquiring leadership, stopping");
                shutdown.cancel();
                metrics_task.await??;
                return Ok(());
            }
        },
        None => {
            info!("Leader election disabled");
            None
        }
    };

    let mut controller_task = tokio::spawn(controller::run(
        client,
        ctx,
        setup.retries,
        settings,
        shutdown.clone(),
    ));

    let worker = setup.worker;
    let worker_shutdown = shutdown.clone();
    let mut worker_task = tokio::spawn(async move {
        match worker {
            Some(worker) => worker.run(worker_shutdown).await,
            None => worker_shutdown.cancelled().await,
        }
    });

    // The controller, the certificate worker and the metrics server run until
    // a shutdown signal; if one of them exits or the lease is lost, the process exits
    tokio::select! {
        result = shutdown_signal() => {
            result?;
            info!("Shutdown signal received, stopping");
        }
        result = &mut controller_task => {
            error!("CRITICAL: HTTPProxy controller exited unexpectedly: {:?}", result);
            result?;
            anyhow::bail!("HTTPProxy controller exited unexpectedly without error")
        }
        result = &mut worker_task => {
            error!("CRITICAL: certificate apply worker exited unexpectedly: {:?}", result);
            result?;
            anyhow::bail!("certificate apply worker exited unexpectedly without error")
        }
        result = &mut metrics_task => {
            error!("CRITICAL: metrics server exited unexpectedly: {:?}", result);
            result??;
            anyhow::bail!("metrics server exited unexpectedly without error")
        }
        () = leadership_lost(leadership.as_mut()) => {
            error!("CRITICAL: leadership lost, stopping");
            shutdown.cancel();
            anyhow::bail!("leadership lost")
        }
    }

    shutdown.cancel();
    controller_task.await?;
    worker_task.await?;
    metrics_task.await??;

    if let Some(leadership) = leadership {
        leadership.release().await?;
    }

    info!("contour-plus stopped");
    Ok(())
}
