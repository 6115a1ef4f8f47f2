//! HTTP Advisory Provider - Daily Signal over REST
//!
//! POSTs `{"symbol": "<symbol>"}` to the configured endpoint and reads
//! a `DailySignal` back. The provider may wrap its JSON object in
//! free text (chat-style services do), so the body is cut from the
//! first `{` to the last `}` before parsing.
//!
//! Outcomes:
//! - transport error or non-success status: `Err`
//! - body without a parseable signal object: `Ok(None)` with a warning
//! - otherwise: `Ok(Some(signal))`

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use tracing::{debug, instrument, warn};

use crate::config::SignalConfig;
use crate::domain::signal::DailySignal;
use crate::ports::signal_provider::SignalProvider;

/// Request body sent to the advisory endpoint.
#[derive(Debug, Serialize)]
struct SignalRequest<'a> {
  symbol: &'a str,
}

/// REST client for the advisory service.
pub struct HttpSignalProvider {
  /// Underlying HTTP client.
  http: Client,
  /// Full endpoint URL.
  endpoint_url: String,
  /// Bearer token, if the configured env var is set.
  api_key: Option<String>,
}

impl HttpSignalProvider {
  /// Create a provider from explicit parameters.
  pub fn new(endpoint_url: impl Into<String>, api_key: Option<String>, timeout: Duration) -> Result<Self> {
    let http = Client::builder()
      .timeout(timeout)
      .pool_max_idle_per_host(1)
      .build()
      .context("Failed to build HTTP client")?;

    Ok(Self {
      http,
      endpoint_url: endpoint_url.into(),
      api_key,
    })
  }

  /// Create a provider from the `[signals]` config section.
  ///
  /// The bearer token is read from the env var named by `api_key_env`;
  /// a missing or empty variable means unauthenticated requests.
  pub fn from_config(config: &SignalConfig) -> Result<Self> {
    let api_key = std::env::var(&config.api_key_env)
      .ok()
      .filter(|key| !key.is_empty());
    if api_key.is_none() {
      warn!(env = %config.api_key_env, "Advisory API key not set, sending unauthenticated requests");
    }
    Self::new(
      config.endpoint_url.clone(),
      api_key,
      Duration::from_secs(config.request_timeout_seconds),
    )
  }
}

/// Cut the outermost `{ ... }` object out of `text`.
pub fn extract_json_object(text: &str) -> Option<&str> {
  let start = text.find('{')?;
  let end = text.rfind('}')?;
  (end > start).then(|| &text[start..=end])
}

/// Parse a provider response body into a signal.
///
/// Returns `None` when no object can be found or it does not match the
/// signal schema. A missing `symbol` falls back to `requested`.
pub fn parse_signal(text: &str, requested: &str) -> Option<DailySignal> {
  let Some(json) = extract_json_object(text) else {
    warn!(body_len = text.len(), "Advisory response contains no JSON object");
    return None;
  };

  match serde_json::from_str::<DailySignal>(json) {
    Ok(mut signal) => {
      if signal.symbol.is_empty() {
        signal.symbol = requested.to_string();
      }
      Some(signal)
    }
    Err(e) => {
      warn!(error = %e, raw = %json, "Advisory response is not a valid signal");
      None
    }
  }
}

#[async_trait]
impl SignalProvider for HttpSignalProvider {
  #[instrument(skip(self))]
  async fn get_signal(&self, symbol: &str) -> Result<Option<DailySignal>> {
    let mut request = self.http.post(&self.endpoint_url).json(&SignalRequest { symbol });
    if let Some(key) = &self.api_key {
      request = request.bearer_auth(key);
    }

    let response = request
      .send()
      .await
      .context("Advisory request failed")?
      .error_for_status()
      .context("Advisory provider returned an error status")?;

    let body = response
      .text()
      .await
      .context("Failed to read advisory response body")?;
    debug!(body_len = body.len(), "Advisory response received");

    Ok(parse_signal(&body, symbol))
  }
}
