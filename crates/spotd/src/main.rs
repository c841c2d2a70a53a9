//! spotd: the spot priority daemon.
//!
//! Periodically ranks the cluster's node pools by spot market signals
//! and publishes the ranking to the cluster-autoscaler priority expander
//! ConfigMap.
//!
//! # Usage
//!
//! ```text
//! spotd run --config /etc/spotprio/spotprio.toml
//! spotd score --input pools.json
//! ```

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tokio::sync::watch;
use tracing::{error, info};

use spotd::collectors::{ArmPoolInventory, AzureMarket};
use spotd::{Cycle, server, telemetry};
use spotprio_core::{PriorityScorer, SignalSet, SpotprioConfig, check_spot_is_safe};
use spotprio_metrics::SpotGauges;
use spotprio_placement::{ArmPlacementClient, ManagedIdentityToken, PlacementCache, PlacementFetcher};
use spotprio_reconcile::{KubeConfigMapStore, Reconciler, serialize_ranking};

const HTTP_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Parser)]
#[command(name = "spotd", about = "Spot node-pool priority daemon")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the reconciliation loop.
    Run {
        /// Config file. Defaults to the first spotprio.toml on the search path.
        #[arg(long)]
        config: Option<PathBuf>,
    },
    /// Score a JSON file of signal records and print the ranking.
    Score {
        /// JSON object of pool name → signal record.
        #[arg(long)]
        input: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Command::Run { config } => {
            let path = SpotprioConfig::locate(config.as_deref());
            let config = SpotprioConfig::load(path.as_deref())?;
            telemetry::init_tracing(&config.logging.level);
            match &path {
                Some(p) => info!(path = %p.display(), "loaded config"),
                None => info!("no config file found, using defaults and environment"),
            }
            run(config).await
        }
        Command::Score { input } => score(input),
    }
}

fn score(input: PathBuf) -> anyhow::Result<()> {
    let content = std::fs::read_to_string(&input)
        .with_context(|| format!("failed to read {}", input.display()))?;
    let records: SignalSet = serde_json::from_str(&content)
        .with_context(|| format!("failed to parse {}", input.display()))?;

    let ranking = PriorityScorer::default().rank(&records);
    print!("{}", serialize_ranking(&ranking)?);
    println!("# spot is safe: {}", check_spot_is_safe(&records, &ranking));
    Ok(())
}

async fn run(config: SpotprioConfig) -> anyhow::Result<()> {
    info!("spotd starting");

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    // ── Collaborators ──────────────────────────────────────────

    let tokens = Arc::new(
        ManagedIdentityToken::new(Some(config.azure.client_id.clone()))
            .context("failed to set up managed identity")?,
    );

    let inventory = Arc::new(ArmPoolInventory::new(
        tokens.clone(),
        &config.azure.subscription_id,
        &config.azure.resource_group,
        &config.azure.cluster_name,
        HTTP_TIMEOUT,
    )?);

    let market = Arc::new(AzureMarket::new(
        tokens.clone(),
        &config.api.url,
        &config.azure.subscription_id,
        HTTP_TIMEOUT,
    )?);

    let fetcher = PlacementFetcher::new(
        Arc::new(ArmPlacementClient::new(HTTP_TIMEOUT)?),
        tokens,
        Arc::new(PlacementCache::default()),
    )
    .with_shutdown(shutdown_rx.clone());

    let store = KubeConfigMapStore::infer()
        .await
        .context("failed to create kubernetes client")?;
    let reconciler = Reconciler::new(
        Arc::new(store),
        &config.configmap.name,
        &config.configmap.namespace,
    );
    info!(
        name = %config.configmap.name,
        namespace = %config.configmap.namespace,
        "reconciling autoscaler ConfigMap"
    );

    let gauges = SpotGauges::new();

    // ── Metrics endpoint ───────────────────────────────────────

    let listener = tokio::net::TcpListener::bind(&config.metrics.addr)
        .await
        .with_context(|| format!("failed to bind metrics listener on {}", config.metrics.addr))?;
    info!(addr = %config.metrics.addr, "metrics listener started");

    let mut server_shutdown = shutdown_rx.clone();
    let router = server::build_router(gauges.clone());
    let server_handle = tokio::spawn(async move {
        let result = axum::serve(listener, router)
            .with_graceful_shutdown(async move {
                let _ = server_shutdown.wait_for(|stop| *stop).await;
            })
            .await;
        if let Err(e) = result {
            error!(error = %e, "metrics listener failed");
        }
    });

    // ── Shutdown signal ────────────────────────────────────────

    tokio::spawn(async move {
        wait_for_signal().await;
        info!("shutdown signal received");
        let _ = shutdown_tx.send(true);
    });

    // ── Reconciliation loop ────────────────────────────────────

    let cycle = Cycle::new(
        inventory,
        market,
        fetcher,
        reconciler,
        gauges,
        config.azure.subscription_id.clone(),
    );
    let result = cycle.run(config.interval(), shutdown_rx).await;

    server_handle.abort();
    let _ = server_handle.await;

    result?;
    info!("spotd stopped");
    Ok(())
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{SignalKind, signal};

    match signal(SignalKind::terminate()) {
        Ok(mut term) => {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {}
                _ = term.recv() => {}
            }
        }
        Err(e) => {
            error!(error = %e, "failed to install SIGTERM handler");
            let _ = tokio::signal::ctrl_c().await;
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    let _ = tokio::signal::ctrl_c().await;
}
