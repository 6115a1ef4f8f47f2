//! Trading Routes - Manual Open/Close
//!
//! - `POST /api/trading/open`: fetch a signal for the configured symbol
//!   and submit an Open command (no confidence gate)
//! - `POST /api/trading/close` `{"ticket": "..."}`: submit a Close
//!
//! Both answer with a JSON bool as soon as the command is queued; the
//! agent's reply is logged from a detached task, not awaited.

use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::post;
use axum::{Json, Router};
use rust_decimal::Decimal;
use serde::Deserialize;
use tracing::{info, instrument, warn};

use crate::domain::command::CommandType;
use crate::ports::signal_provider::SignalProvider;
use crate::usecases::engine::{EngineHandle, ReplyFuture};

/// Shared state of the trading routes.
#[derive(Clone)]
pub struct TradingState {
  /// Submission handle.
  pub engine: EngineHandle,
  /// Advisory provider for manual opens; `None` disables the open route.
  pub provider: Option<Arc<dyn SignalProvider>>,
  /// Symbol requested from the provider.
  pub symbol: String,
  /// Volume of manual Open commands.
  pub lot_size: Decimal,
}

/// Close request body.
#[derive(Debug, Deserialize)]
pub struct CloseRequest {
  /// Agent ticket of the position to close.
  pub ticket: String,
}

/// Router with both trading routes.
pub fn router(state: TradingState) -> Router {
  Router::new()
    .route("/api/trading/open", post(open_trade))
    .route("/api/trading/close", post(close_trade))
    .with_state(state)
}

/// Fetch a signal and submit an Open command.
#[instrument(skip_all)]
pub async fn open_trade(State(state): State<TradingState>) -> (StatusCode, Json<bool>) {
  let Some(provider) = &state.provider else {
    warn!("Open requested but no advisory provider is configured");
    return (StatusCode::BAD_REQUEST, Json(false));
  };

  let signal = match provider.get_signal(&state.symbol).await {
    Ok(Some(signal)) => signal,
    Ok(None) => {
      info!(symbol = %state.symbol, "Open requested but provider returned no signal");
      return (StatusCode::BAD_REQUEST, Json(false));
    }
    Err(e) => {
      warn!(symbol = %state.symbol, error = %e, "Advisory provider call failed");
      return (StatusCode::BAD_GATEWAY, Json(false));
    }
  };

  let body = signal.open_command_body(state.lot_size);
  submit(&state.engine, CommandType::Open, body)
}

/// Submit a Close command for `ticket`.
#[instrument(skip_all)]
pub async fn close_trade(
  State(state): State<TradingState>,
  Json(request): Json<CloseRequest>,
) -> (StatusCode, Json<bool>) {
  let ticket = request.ticket.trim();
  if ticket.is_empty() {
    return (StatusCode::BAD_REQUEST, Json(false));
  }
  submit(&state.engine, CommandType::Close, ticket.to_string())
}

fn submit(engine: &EngineHandle, command_type: CommandType, body: String) -> (StatusCode, Json<bool>) {
  match engine.submit(command_type, body, None) {
    Ok(reply) => {
      info!(correlation_id = %reply.correlation_id(), command = %command_type, "Manual command queued");
      tokio::spawn(log_reply(command_type, reply));
      (StatusCode::OK, Json(true))
    }
    Err(e) => {
      warn!(command = %command_type, error = %e, "Engine refused manual command");
      (StatusCode::SERVICE_UNAVAILABLE, Json(false))
    }
  }
}

async fn log_reply(command_type: CommandType, reply: ReplyFuture) {
  let correlation_id = reply.correlation_id().clone();
  match reply.await {
    Ok(payload) => info!(correlation_id = %correlation_id, command = %command_type, payload = %payload, "Agent replied"),
    Err(e) => warn!(correlation_id = %correlation_id, command = %command_type, error = %e, "Manual command failed"),
  }
}
