//! Health Check Server - Liveness, Readiness and Engine Stats
//!
//! Exposes /live, /ready and /stats via axum 0.7 for Docker health
//! checks and monitoring. Readiness follows the engine lifecycle: only
//! a Running engine is ready. Extra routes (the trading API) are merged
//! into the same router.

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use serde::Serialize;
use tokio::sync::broadcast;
use tracing::{info, instrument};

use crate::usecases::engine::{EngineHandle, EngineState};
use crate::usecases::stats::StatsSnapshot;

/// Body of the /stats endpoint.
#[derive(Debug, Serialize)]
pub struct StatsResponse {
    /// Engine lifecycle state.
    pub state: EngineState,
    /// Commands accepted but not yet published.
    pub queued: usize,
    /// Event counters.
    pub stats: StatsSnapshot,
}

/// Axum-based health check HTTP server.
///
/// Serves liveness (/live), readiness (/ready) and a JSON counter
/// snapshot (/stats) for orchestrator probes and operators.
pub struct HealthServer {
    /// Engine whose lifecycle drives readiness.
    engine: EngineHandle,
    /// Bind address (default 0.0.0.0:8080 from config).
    bind_address: String,
    /// Additional routes served on the same listener.
    extra: Router,
}

impl HealthServer {
    /// Create a new health server.
    pub fn new(engine: EngineHandle, bind_address: impl Into<String>) -> Self {
        Self {
            engine,
            bind_address: bind_address.into(),
            extra: Router::new(),
        }
    }

    /// Serve `routes` alongside the probes.
    #[must_use]
    pub fn merge(mut self, routes: Router) -> Self {
        self.extra = self.extra.merge(routes);
        self
    }

    /// Router with probes and merged routes.
    pub fn router(&self) -> Router {
        Router::new()
            .route("/live", get(Self::liveness))
            .route("/ready", get(Self::readiness))
            .route("/stats", get(Self::stats))
            .with_state(self.engine.clone())
            .merge(self.extra.clone())
    }

    /// Start the health check server.
    #[instrument(skip(self, shutdown_rx))]
    pub async fn run(
        self,
        mut shutdown_rx: broadcast::Receiver<()>,
    ) -> anyhow::Result<()> {
        let app = self.router();
        let listener = tokio::net::TcpListener::bind(&self.bind_address).await?;

        info!(address = %self.bind_address, "Health server started");

        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = shutdown_rx.recv().await;
            })
            .await?;

        Ok(())
    }

    /// Liveness probe: always returns 200 if the process is running.
    async fn liveness() -> impl IntoResponse {
        (StatusCode::OK, "OK")
    }

    /// Readiness probe: returns 200 only while the engine is Running.
    async fn readiness(State(engine): State<EngineHandle>) -> impl IntoResponse {
        if engine.is_running() {
            (StatusCode::OK, "READY")
        } else {
            (StatusCode::SERVICE_UNAVAILABLE, "NOT READY")
        }
    }

    /// Engine state and counters.
    async fn stats(State(engine): State<EngineHandle>) -> Json<StatsResponse> {
        Json(StatsResponse {
            state: engine.state(),
            queued: engine.queued_count(),
            stats: engine.stats(),
        })
    }
}
