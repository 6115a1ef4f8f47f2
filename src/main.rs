//! Trade Bridge — Entry Point
//!
//! Initializes configuration, logging, the agent transport and the
//! command engine. Runs until SIGINT.
//!
//! Wiring sequence:
//! 1. Load config.toml (or $TRADE_BRIDGE_CONFIG) + validate
//! 2. Init tracing (JSON structured logging)
//! 3. Create the advisory provider (when an endpoint is configured)
//! 4. Create the transport: ZeroMQ, or loopback in dry-run mode
//! 5. Build DispatchLoop + EngineHandle (+ SignalPoller when enabled)
//! 6. Spawn Prometheus metrics server on :9090
//! 7. Spawn health + trading HTTP server on :8080
//! 8. Spawn the dispatch loop
//! 9. Wait for SIGINT → graceful shutdown (stop engine → close servers → exit)

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: tikv_jemallocator::Jemalloc = tikv_jemallocator::Jemalloc;

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::signal;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use trade_bridge::adapters::api::{self, TradingState};
use trade_bridge::adapters::metrics::{HealthServer, MetricsRegistry};
use trade_bridge::adapters::signals::HttpSignalProvider;
use trade_bridge::adapters::transport::{LoopbackPeer, LoopbackTransport, ZmqTransport};
use trade_bridge::config::{self, AppConfig};
use trade_bridge::ports::{SignalProvider, Transport};
use trade_bridge::usecases::{DispatchLoop, EngineHandle, SignalPoller};

#[tokio::main]
async fn main() -> Result<()> {
    // ── 1. Load configuration ───────────────────────────────
    let config_path = config::loader::config_path();
    let config = config::loader::load_config(&config_path)
        .with_context(|| format!("Failed to load configuration from {config_path}"))?;

    // ── 2. Initialize structured JSON logging ───────────────
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| {
                    tracing_subscriber::EnvFilter::new(&config.bot.log_level)
                }),
        )
        .json()
        .init();

    info!(
        name = %config.bot.name,
        version = env!("CARGO_PKG_VERSION"),
        dry_run = config.bot.dry_run,
        account = %config.transport.account_id,
        signals = config.signals.enabled,
        "Starting Trade Bridge"
    );

    // ── 3. Shutdown signal channel ──────────────────────────
    let (shutdown_tx, _shutdown_rx) = broadcast::channel::<()>(1);

    // ── 4. Advisory provider ────────────────────────────────
    let provider: Option<Arc<dyn SignalProvider>> = if config.signals.endpoint_url.is_empty() {
        warn!("No advisory endpoint configured; signal poller and manual open disabled");
        None
    } else {
        Some(Arc::new(
            HttpSignalProvider::from_config(&config.signals)
                .context("Failed to create advisory provider")?,
        ))
    };

    // ── 5. Transport + command engine ───────────────────────
    let (engine, engine_task) = if config.bot.dry_run {
        warn!("Dry-run mode: frames are logged, NOTHING reaches the agent");
        let (transport, peer) = LoopbackTransport::pair();
        tokio::spawn(log_dry_run_frames(peer));
        spawn_engine(transport, &config, provider.clone(), shutdown_tx.subscribe())
    } else {
        let transport = ZmqTransport::new(&config.transport);
        spawn_engine(transport, &config, provider.clone(), shutdown_tx.subscribe())
    };

    // ── 6. Prometheus metrics server ────────────────────────
    let metrics_handle = if config.metrics.enabled {
        let metrics = Arc::new(MetricsRegistry::new().context("Failed to create metrics registry")?);
        let metrics_shutdown = shutdown_tx.subscribe();
        let bind_address = config.metrics.bind_address.clone();
        let metrics_engine = engine.clone();
        Some(tokio::spawn(async move {
            if let Err(e) = metrics.serve(metrics_engine, bind_address, metrics_shutdown).await {
                error!(error = %e, "Metrics server failed");
            }
        }))
    } else {
        None
    };

    // ── 7. Health + trading HTTP server ─────────────────────
    let trading = api::router(TradingState {
        engine: engine.clone(),
        provider,
        symbol: config.signals.symbol.clone(),
        lot_size: config.signals.lot_size,
    });
    let health = HealthServer::new(engine.clone(), config.server.bind_address.clone()).merge(trading);
    let http_shutdown = shutdown_tx.subscribe();
    let http_handle = tokio::spawn(async move {
        if let Err(e) = health.run(http_shutdown).await {
            error!(error = %e, "HTTP server failed");
        }
    });

    info!("All tasks spawned, bridge is running");

    // ── 8. Wait for SIGINT, or the engine ending on its own ─
    let mut engine_task = engine_task;
    let engine_finished = tokio::select! {
        _ = signal::ctrl_c() => {
            info!("SIGINT received, initiating graceful shutdown");
            false
        }
        result = &mut engine_task => {
            match result {
                Ok(Ok(())) => warn!("Command engine stopped unexpectedly"),
                Ok(Err(e)) => error!(error = %e, "Command engine failed"),
                Err(e) => error!(error = %e, "Command engine task panicked"),
            }
            true
        }
    };

    // ── Graceful shutdown ───────────────────────────────────

    // 1. Signal all tasks to stop
    let _ = shutdown_tx.send(());
    info!("Shutdown signal broadcast to all tasks");

    // 2. Wait for the engine to fail outstanding commands (up to 10s)
    if !engine_finished {
        info!("Waiting for command engine shutdown...");
        match tokio::time::timeout(Duration::from_secs(10), engine_task).await {
            Ok(Ok(Ok(()))) => {}
            Ok(Ok(Err(e))) => error!(error = %e, "Command engine failed during shutdown"),
            Ok(Err(e)) => error!(error = %e, "Command engine task panicked"),
            Err(_) => warn!("Command engine did not stop within 10s"),
        }
    }
    info!(state = %engine.state(), stats = ?engine.stats(), "Final engine state");

    // 3. Wait for HTTP servers to close (up to 5s)
    let _ = tokio::time::timeout(Duration::from_secs(5), http_handle).await;
    if let Some(handle) = metrics_handle {
        let _ = tokio::time::timeout(Duration::from_secs(5), handle).await;
    }

    info!("Shutdown complete");
    Ok(())
}

/// Build the dispatch loop over `transport` and spawn it.
fn spawn_engine<T: Transport>(
    transport: T,
    config: &AppConfig,
    provider: Option<Arc<dyn SignalProvider>>,
    shutdown_rx: broadcast::Receiver<()>,
) -> (
    EngineHandle,
    JoinHandle<Result<(), trade_bridge::domain::EngineError>>,
) {
    let (mut dispatch, engine) =
        DispatchLoop::new(transport, &config.engine, config.transport.account_id.clone());

    match provider {
        Some(provider) if config.signals.enabled => {
            let poller = SignalPoller::from_config(provider, &config.signals);
            info!(
                symbol = %poller.symbol(),
                min_confidence = config.signals.min_confidence,
                "Daily signal poller enabled"
            );
            dispatch = dispatch.with_signal_poller(poller);
        }
        _ => info!("Daily signal poller disabled"),
    }

    (engine, tokio::spawn(dispatch.run(shutdown_rx)))
}

/// Log every frame the engine would have published.
async fn log_dry_run_frames(mut peer: LoopbackPeer) {
    while let Some(frame) = peer.next_sent().await {
        info!(frame = %frame, "Dry-run: frame not sent to agent");
    }
    info!("Dry-run frame logger finished");
}
