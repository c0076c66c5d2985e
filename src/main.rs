// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

use anyhow::{bail, Context as _, Result};
use ceph_csi_operator::{
    constants::{
        DEFAULT_LEASE_NAME, HEALTH_PROBE_BIND_ADDRESS, METRICS_SERVER_BIND_ADDRESS,
        OPERATOR_LEASE_DURATION_SECS, OPERATOR_LEASE_GRACE_SECS, TOKIO_WORKER_THREADS,
    },
    context::Context,
    controller::{
        run_client_profile_controller, run_client_profile_mapping_controller,
        run_driver_controller,
    },
    metrics::{record_leader_elected, record_leader_lost},
    server::{serve_metrics, serve_probes, Readiness},
    settings::OperatorSettings,
};
use clap::Parser;
use futures::future::{BoxFuture, FutureExt};
use kube::Client;
use kube_lease_manager::LeaseManagerBuilder;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, error, info};

/// Kubernetes operator managing Ceph CSI driver deployments.
#[derive(Debug, Parser)]
#[command(name = "ceph-csi-operator", version, about)]
struct Cli {
    /// Address the Prometheus metrics endpoint binds to.
    #[arg(long, env = "METRICS_BIND_ADDRESS", default_value = METRICS_SERVER_BIND_ADDRESS)]
    metrics_bind_address: SocketAddr,

    /// Address the health and readiness probe endpoints bind to.
    #[arg(
        long,
        env = "HEALTH_PROBE_BIND_ADDRESS",
        default_value = HEALTH_PROBE_BIND_ADDRESS
    )]
    health_probe_bind_address: SocketAddr,

    /// Acquire a Lease in the operator namespace before starting controllers.
    #[arg(long, env = "LEADER_ELECT")]
    leader_elect: bool,

    /// Name of the leader election Lease.
    #[arg(long, env = "LEASE_NAME", default_value = DEFAULT_LEASE_NAME)]
    lease_name: String,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Build Tokio runtime with custom thread names
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(TOKIO_WORKER_THREADS)
        .thread_name("ceph-csi-operator")
        .enable_all()
        .build()?;

    runtime.block_on(async_main(cli))
}

fn init_logging() {
    // Respects RUST_LOG (default: info) and RUST_LOG_FORMAT (json or text)
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

async fn async_main(cli: Cli) -> Result<()> {
    init_logging();

    info!("Starting Ceph CSI operator");
    debug!(?cli, "Parsed command line");

    let settings = OperatorSettings::from_env()?;
    info!(
        operator_namespace = %settings.operator_namespace,
        operator_config = %settings.operator_config_name,
        watch_namespaces = ?settings.watch_namespaces,
        "Loaded operator settings"
    );

    debug!("Initializing Kubernetes client");
    let client = Client::try_default().await?;
    debug!("Kubernetes client initialized successfully");

    let ctx = Arc::new(Context::new(client, settings));
    let readiness = Readiness::default();
    readiness.set_ready(true);

    // None of these should ever exit; if one does, the process exits with it
    tokio::select! {
        result = serve_metrics(cli.metrics_bind_address) => {
            error!("CRITICAL: metrics server exited unexpectedly: {:?}", result);
            result?;
            bail!("metrics server exited unexpectedly without error")
        }
        result = serve_probes(cli.health_probe_bind_address, readiness.clone()) => {
            error!("CRITICAL: health probe server exited unexpectedly: {:?}", result);
            result?;
            bail!("health probe server exited unexpectedly without error")
        }
        result = run_operator(&cli, ctx) => {
            error!("CRITICAL: operator exited unexpectedly: {:?}", result);
            result?;
            bail!("operator exited unexpectedly without error")
        }
        result = shutdown_signal() => {
            result?;
            readiness.set_ready(false);
            info!("Graceful shutdown completed successfully");
            Ok(())
        }
    }
}

/// Run the controllers, behind leader election when enabled.
async fn run_operator(cli: &Cli, ctx: Arc<Context>) -> Result<()> {
    if !cli.leader_elect {
        info!("Leader election disabled, starting controllers");
        return run_controllers(ctx).await;
    }

    let identity = pod_identity();
    let manager = LeaseManagerBuilder::new(ctx.client.clone(), &cli.lease_name)
        .with_namespace(&ctx.settings.operator_namespace)
        .with_identity(&identity)
        .with_duration(OPERATOR_LEASE_DURATION_SECS)
        .with_grace(OPERATOR_LEASE_GRACE_SECS)
        .build()
        .await
        .context("failed to create lease manager")?;
    let (mut leadership, _lease_task) = manager.watch().await;

    info!(lease = %cli.lease_name, identity = %identity, "Waiting for leadership");
    wait_for_leadership(&mut leadership).await?;
    info!(lease = %cli.lease_name, identity = %identity, "Acquired leadership");
    record_leader_elected(&identity);

    tokio::select! {
        result = run_controllers(ctx) => result,
        () = leadership_lost(&mut leadership) => {
            record_leader_lost(&identity);
            error!(lease = %cli.lease_name, identity = %identity, "Lost leadership, exiting");
            bail!("lost leadership of lease {}", cli.lease_name)
        }
    }
}

fn pod_identity() -> String {
    std::env::var("POD_NAME")
        .or_else(|_| std::env::var("HOSTNAME"))
        .unwrap_or_else(|_| "ceph-csi-operator".to_string())
}

/// Resolve once the lease manager reports this replica as leader.
async fn wait_for_leadership(leadership: &mut watch::Receiver<bool>) -> Result<()> {
    while !*leadership.borrow_and_update() {
        leadership
            .changed()
            .await
            .context("lease manager stopped before leadership was acquired")?;
    }
    Ok(())
}

/// Resolve when leadership is lost or the lease manager stops.
async fn leadership_lost(leadership: &mut watch::Receiver<bool>) {
    loop {
        if leadership.changed().await.is_err() || !*leadership.borrow_and_update() {
            return;
        }
    }
}

fn labelled(
    label: String,
    controller: impl Future<Output = Result<()>> + Send + 'static,
) -> BoxFuture<'static, (String, Result<()>)> {
    async move { (label, controller.await) }.boxed()
}

/// Run one set of controllers per watched namespace until one of them exits.
async fn run_controllers(ctx: Arc<Context>) -> Result<()> {
    let mut controllers = Vec::new();
    for namespace in &ctx.settings.watch_namespaces {
        controllers.push(labelled(
            format!("Driver ({namespace})"),
            run_driver_controller(ctx.clone(), namespace.clone()),
        ));
        controllers.push(labelled(
            format!("ClientProfile ({namespace})"),
            run_client_profile_controller(ctx.clone(), namespace.clone()),
        ));
        controllers.push(labelled(
            format!("ClientProfileMapping ({namespace})"),
            run_client_profile_mapping_controller(ctx.clone(), namespace.clone()),
        ));
    }
    if controllers.is_empty() {
        bail!("no namespaces to watch");
    }

    info!(controllers = controllers.len(), "Starting all controllers");
    let ((label, result), _, _) = futures::future::select_all(controllers).await;
    error!("CRITICAL: {label} controller exited unexpectedly: {:?}", result);
    result?;
    bail!("{label} controller exited unexpectedly without error")
}

/// Wait for SIGTERM (pod termination) or SIGINT (Ctrl+C).
async fn shutdown_signal() -> Result<()> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut sigterm = signal(SignalKind::terminate())?;
        tokio::select! {
            _ = sigterm.recv() => {
                info!("Received SIGTERM (pod termination), initiating graceful shutdown...");
            }
            result = tokio::signal::ctrl_c() => {
                result?;
                info!("Received SIGINT (Ctrl+C), initiating graceful shutdown...");
            }
        }
    }
    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await?;
        info!("Received Ctrl+C, initiating graceful shutdown...");
    }
    Ok(())
}
