/* Copyright (C) 2025 Pedro Henrique / phkaiser13
* Archive: src/main.rs
*
* This file is the main entry point for the ph DR operator. It wires the
* reconciliation engine of the library to the hub cluster and runs the
* controller for `ApplicationVolumeReplication` resources.
*
* Architecture:
* 1.  **Configuration**: `OperatorConfig` is read from the environment first, so
* a bad setting stops the process before anything else starts.
* 2.  **Logging**: `tracing` is set up with an `EnvFilter` (RUST_LOG) and either
* a human-readable or a JSON formatter.
* 3.  **Collaborators**: The Kubernetes client backs the object store, the
* placement resolver and the credential lookup of the backup store. They are
* placed behind their capability traits in the shared `Context`.
* 4.  **Concurrent Execution**: The controller and the Prometheus `/metrics`
* server run side by side. The process exits when the controller stops, which
* happens on SIGTERM/SIGINT.
*
* SPDX-License-Identifier: Apache-2.0 */

use anyhow::Context as _;
use futures::stream::StreamExt;
use kube::{
    runtime::{watcher, Controller},
    Api, Client,
};
use ph_dr_operator::backup::HttpBackupStore;
use ph_dr_operator::config::{LogFormat, OperatorConfig};
use ph_dr_operator::controllers::avr_controller::{self, Context};
use ph_dr_operator::controllers::placement::{KubePlacementResolver, PassThroughFilter};
use ph_dr_operator::crds::ApplicationVolumeReplication;
use ph_dr_operator::metrics;
use ph_dr_operator::store::KubeObjectStore;
use prometheus::{Encoder, Registry, TextEncoder};
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use warp::Filter;

/// Initializes structured logging in the configured format.
fn init_tracing(format: LogFormat) -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(filter);
    match format {
        LogFormat::Json => registry
            .with(tracing_subscriber::fmt::layer().json())
            .try_init()?,
        LogFormat::Text => registry.with(tracing_subscriber::fmt::layer()).try_init()?,
    }
    Ok(())
}

/// Renders the metrics into the Prometheus text format.
async fn metrics_handler(registry: Arc<Registry>) -> Result<impl warp::Reply, warp::Rejection> {
    let encoder = TextEncoder::new();
    let mut buffer = vec![];
    if let Err(e) = encoder.encode(&registry.gather(), &mut buffer) {
        error!("Failed to encode metrics: {}", e);
        return Err(warp::reject::reject());
    }

    let response = String::from_utf8(buffer).map_err(|_| warp::reject::reject())?;
    Ok(warp::reply::with_header(
        response,
        "Content-Type",
        prometheus::TEXT_FORMAT,
    ))
}

/// Runs the HTTP server to expose the /metrics endpoint.
async fn run_metrics_server(registry: Arc<Registry>, port: u16) {
    let metrics_route = warp::path("metrics")
        .and(warp::get())
        .and(warp::any().map(move || Arc::clone(&registry)))
        .and_then(metrics_handler);

    info!("Starting metrics server on 0.0.0.0:{}", port);
    warp::serve(metrics_route).run(([0, 0, 0, 0], port)).await;
}

/// The main entry point of the operator.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 1. Configuration and logging
    let config = OperatorConfig::from_env().context("Invalid operator configuration")?;
    init_tracing(config.log_format)?;
    info!(?config, "Configuration loaded");

    // 2. Kubernetes client and collaborators
    let client = Client::try_default()
        .await
        .context("Failed to create Kubernetes client")?;

    let context = Arc::new(Context {
        store: Arc::new(KubeObjectStore::new(client.clone(), config.field_manager.clone())),
        backup: Arc::new(HttpBackupStore::new(client.clone(), config.backup_timeout)?),
        placement: Arc::new(KubePlacementResolver::new(client.clone())),
        filter: Arc::new(PassThroughFilter),
        config: config.clone(),
    });

    // 3. Metrics registry
    let registry = Arc::new(metrics::create_and_register_metrics()?);
    info!("Custom metrics registered.");

    info!("ph DR operator starting...");
    let avrs = Api::<ApplicationVolumeReplication>::all(client);
    let controller = Controller::new(avrs, watcher::Config::default())
        .shutdown_on_signal()
        .run(avr_controller::reconcile, avr_controller::on_error, context)
        .for_each(|res| async move {
            match res {
                Ok(o) => info!("Reconciled ApplicationVolumeReplication: {:?}", o),
                Err(e) => error!("ApplicationVolumeReplication reconcile error: {}", e),
            }
        });

    // 4. Run until the controller shuts down
    tokio::select! {
        _ = controller => info!("Controller stopped."),
        _ = run_metrics_server(registry, config.metrics_port) => info!("Metrics server stopped."),
    }

    info!("ph DR operator shutting down.");
    Ok(())
}
