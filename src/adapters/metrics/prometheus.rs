//! Prometheus Metrics Registry - Engine Observability
//!
//! Registers and exposes Prometheus metrics on :9090 for Grafana
//! dashboards. Counters mirror `EngineStats` and are brought up to date
//! on every scrape.

use std::sync::Arc;

use axum::http::StatusCode;
use axum::routing::get;
use axum::Router;
use parking_lot::Mutex;
use prometheus::{Encoder, IntCounter, IntCounterVec, IntGauge, Opts, Registry, TextEncoder};
use tokio::sync::broadcast;
use tracing::{error, info, instrument};

use crate::usecases::engine::{EngineHandle, EngineState};
use crate::usecases::stats::StatsSnapshot;

/// Centralized Prometheus metrics for the command engine.
///
/// All metrics follow the naming convention `trade_bridge_*`.
pub struct MetricsRegistry {
    /// Prometheus registry.
    registry: Registry,
    /// Commands accepted by submit.
    pub commands_submitted: IntCounter,
    /// Command frames published.
    pub commands_published: IntCounter,
    /// Inbound reply outcomes by kind.
    pub replies: IntCounterVec,
    /// Commands failed, by reason.
    pub commands_failed: IntCounterVec,
    /// Transport faults.
    pub transport_faults: IntCounter,
    /// Advisory provider calls.
    pub signal_fetches: IntCounter,
    /// Pending reply table size.
    pub pending_replies: IntGauge,
    /// Engine lifecycle (1 = running, 0 = otherwise).
    pub engine_running: IntGauge,
    /// Snapshot applied at the previous scrape.
    last: Mutex<StatsSnapshot>,
}

impl MetricsRegistry {
    /// Create and register all Prometheus metrics.
    pub fn new() -> anyhow::Result<Self> {
        let registry = Registry::new();

        let commands_submitted = IntCounter::new(
            "trade_bridge_commands_submitted_total",
            "Commands accepted by the engine",
        )?;

        let commands_published = IntCounter::new(
            "trade_bridge_commands_published_total",
            "Command frames handed to the transport",
        )?;

        let replies = IntCounterVec::new(
            Opts::new(
                "trade_bridge_replies_total",
                "Inbound reply frames by outcome",
            ),
            &["outcome"],
        )?;

        let commands_failed = IntCounterVec::new(
            Opts::new(
                "trade_bridge_commands_failed_total",
                "Commands completed without a reply",
            ),
            &["reason"],
        )?;

        let transport_faults = IntCounter::new(
            "trade_bridge_transport_faults_total",
            "Transport connect/send/receive faults",
        )?;

        let signal_fetches = IntCounter::new(
            "trade_bridge_signal_fetches_total",
            "Advisory provider calls",
        )?;

        let pending_replies = IntGauge::new(
            "trade_bridge_pending_replies",
            "Published commands awaiting a reply",
        )?;

        let engine_running = IntGauge::new(
            "trade_bridge_engine_running",
            "Whether the command engine is running (1=yes, 0=no)",
        )?;

        // Register all metrics
        registry.register(Box::new(commands_submitted.clone()))?;
        registry.register(Box::new(commands_published.clone()))?;
        registry.register(Box::new(replies.clone()))?;
        registry.register(Box::new(commands_failed.clone()))?;
        registry.register(Box::new(transport_faults.clone()))?;
        registry.register(Box::new(signal_fetches.clone()))?;
        registry.register(Box::new(pending_replies.clone()))?;
        registry.register(Box::new(engine_running.clone()))?;

        Ok(Self {
            registry,
            commands_submitted,
            commands_published,
            replies,
            commands_failed,
            transport_faults,
            signal_fetches,
            pending_replies,
            engine_running,
            last: Mutex::new(StatsSnapshot::default()),
        })
    }

    /// Apply `current` counters, advancing each by its delta since the
    /// previous call.
    pub fn sync(&self, current: StatsSnapshot, state: EngineState) {
        let mut last = self.last.lock();
        let delta = |now: u64, prev: u64| now.saturating_sub(prev);

        self.commands_submitted
            .inc_by(delta(current.submitted, last.submitted));
        self.commands_published
            .inc_by(delta(current.published, last.published));
        self.transport_faults
            .inc_by(delta(current.transport_faults, last.transport_faults));
        self.signal_fetches
            .inc_by(delta(current.signal_fetches, last.signal_fetches));

        for (outcome, now, prev) in [
            ("matched", current.replies_matched, last.replies_matched),
            ("unmatched", current.correlation_misses, last.correlation_misses),
            ("malformed", current.protocol_faults, last.protocol_faults),
            ("abandoned", current.abandoned, last.abandoned),
        ] {
            self.replies.with_label_values(&[outcome]).inc_by(delta(now, prev));
        }

        for (reason, now, prev) in [
            ("timeout", current.timeouts, last.timeouts),
            ("shutdown", current.stopped_at_shutdown, last.stopped_at_shutdown),
        ] {
            self.commands_failed
                .with_label_values(&[reason])
                .inc_by(delta(now, prev));
        }

        self.pending_replies
            .set(i64::try_from(current.pending).unwrap_or(i64::MAX));
        self.engine_running
            .set(i64::from(state == EngineState::Running));

        *last = current;
    }

    /// Encode all metrics in the Prometheus text format.
    pub fn render(&self) -> anyhow::Result<String> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer)?;
        Ok(String::from_utf8(buffer)?)
    }

    /// Serve Prometheus metrics on the configured bind address.
    #[instrument(skip(self, engine, shutdown_rx))]
    pub async fn serve(
        self: Arc<Self>,
        engine: EngineHandle,
        bind_address: String,
        mut shutdown_rx: broadcast::Receiver<()>,
    ) -> anyhow::Result<()> {
        let metrics_self = Arc::clone(&self);

        let app = Router::new().route(
            "/metrics",
            get(move || {
                let metrics = Arc::clone(&metrics_self);
                let engine = engine.clone();
                async move {
                    metrics.sync(engine.stats(), engine.state());
                    match metrics.render() {
                        Ok(body) => (StatusCode::OK, body),
                        Err(e) => {
                            error!(error = %e, "Failed to encode metrics");
                            (StatusCode::INTERNAL_SERVER_ERROR, String::new())
                        }
                    }
                }
            }),
        );

        let listener = tokio::net::TcpListener::bind(&bind_address).await?;
        info!(address = %bind_address, "Prometheus metrics server started");

        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = shutdown_rx.recv().await;
            })
            .await?;

        Ok(())
    }
}
