//! Configuration Module - TOML-based Bridge Configuration
//!
//! Loads and validates configuration from `config.toml`.
//! Agent addresses, account id, loop timing and the advisory
//! endpoint are externalized here - nothing is hardcoded in the
//! engine.

pub mod loader;

use std::time::Duration;

use rust_decimal::Decimal;
use serde::Deserialize;

use crate::domain::command::DEFAULT_COMMAND_TIMEOUT;

/// Top-level bridge configuration.
///
/// Loaded from `config.toml` at startup. All fields are validated
/// before the engine starts.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
  /// Bot identity and metadata.
  pub bot: BotConfig,
  /// Execution agent transport.
  pub transport: TransportConfig,
  /// Dispatch loop timing.
  #[serde(default)]
  pub engine: EngineConfig,
  /// Daily advisory signal trigger.
  pub signals: SignalConfig,
  /// HTTP server for health and trading routes.
  #[serde(default)]
  pub server: ServerConfig,
  /// Metrics and monitoring.
  #[serde(default)]
  pub metrics: MetricsConfig,
}

/// Bot identity configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct BotConfig {
  /// Human-readable bot name.
  pub name: String,
  /// Log level (trace, debug, info, warn, error).
  #[serde(default = "default_log_level")]
  pub log_level: String,
  /// Enable dry-run mode (frames logged, never published).
  #[serde(default)]
  pub dry_run: bool,
}

/// ZeroMQ endpoints of the execution agent.
#[derive(Debug, Clone, Deserialize)]
pub struct TransportConfig {
  /// Trading account prefixed to every command frame.
  pub account_id: String,
  /// Agent inbound endpoint (we publish commands here).
  #[serde(default = "default_publish_address")]
  pub publish_address: String,
  /// Agent outbound endpoint (we subscribe to replies here).
  #[serde(default = "default_subscribe_address")]
  pub subscribe_address: String,
  /// Subscription topic filter (empty = all topics).
  #[serde(default)]
  pub subscribe_topic: String,
}

/// Dispatch loop timing.
#[derive(Debug, Clone, Deserialize)]
pub struct EngineConfig {
  /// Delay before connecting the transport (milliseconds).
  #[serde(default = "default_startup_delay")]
  pub startup_delay_ms: u64,
  /// Sleep between loop iterations (milliseconds).
  #[serde(default = "default_loop_interval")]
  pub loop_interval_ms: u64,
  /// Reply poll window per iteration (milliseconds).
  #[serde(default = "default_receive_timeout")]
  pub receive_timeout_ms: u64,
  /// Reply timeout for commands submitted without one (milliseconds).
  #[serde(default = "default_command_timeout")]
  pub default_command_timeout_ms: u64,
}

impl EngineConfig {
  /// Startup delay as a `Duration`.
  pub const fn startup_delay(&self) -> Duration {
    Duration::from_millis(self.startup_delay_ms)
  }

  /// Loop interval as a `Duration`.
  pub const fn loop_interval(&self) -> Duration {
    Duration::from_millis(self.loop_interval_ms)
  }

  /// Receive poll window as a `Duration`.
  pub const fn receive_timeout(&self) -> Duration {
    Duration::from_millis(self.receive_timeout_ms)
  }

  /// Default command timeout as a `Duration`.
  pub const fn default_command_timeout(&self) -> Duration {
    Duration::from_millis(self.default_command_timeout_ms)
  }
}

impl Default for EngineConfig {
  fn default() -> Self {
    Self {
      startup_delay_ms: default_startup_delay(),
      loop_interval_ms: default_loop_interval(),
      receive_timeout_ms: default_receive_timeout(),
      default_command_timeout_ms: default_command_timeout(),
    }
  }
}

/// Daily advisory signal configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct SignalConfig {
  /// Whether the daily poller runs at all.
  #[serde(default = "default_true")]
  pub enabled: bool,
  /// Symbol requested from the provider.
  #[serde(default = "default_symbol")]
  pub symbol: String,
  /// Confidence a signal must strictly exceed to open a trade.
  #[serde(default = "default_min_confidence")]
  pub min_confidence: u8,
  /// Volume (lots) of the Open command.
  #[serde(default = "default_lot_size")]
  pub lot_size: Decimal,
  /// Minimum gap between provider calls after a miss (seconds, 0 = none).
  #[serde(default = "default_retry_after")]
  pub retry_after_seconds: u64,
  /// Advisory provider endpoint.
  #[serde(default)]
  pub endpoint_url: String,
  /// Environment variable holding the provider bearer token.
  #[serde(default = "default_api_key_env")]
  pub api_key_env: String,
  /// Provider request timeout in seconds.
  #[serde(default = "default_request_timeout")]
  pub request_timeout_seconds: u64,
}

/// HTTP server configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
  /// Bind address for health and trading routes.
  #[serde(default = "default_server_addr")]
  pub bind_address: String,
}

impl Default for ServerConfig {
  fn default() -> Self {
    Self {
      bind_address: default_server_addr(),
    }
  }
}

/// Metrics and monitoring configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct MetricsConfig {
  /// Enable Prometheus metrics export.
  #[serde(default = "default_true")]
  pub enabled: bool,
  /// Metrics server bind address.
  #[serde(default = "default_metrics_addr")]
  pub bind_address: String,
}

impl Default for MetricsConfig {
  fn default() -> Self {
    Self {
      enabled: true,
      bind_address: default_metrics_addr(),
    }
  }
}

// Default value functions for serde

fn default_log_level() -> String {
  "info".to_string()
}

fn default_true() -> bool {
  true
}

fn default_publish_address() -> String {
  "tcp://127.0.0.1:1985".to_string()
}

fn default_subscribe_address() -> String {
  "tcp://127.0.0.1:1986".to_string()
}

fn default_startup_delay() -> u64 {
  2000
}

fn default_loop_interval() -> u64 {
  1000
}

fn default_receive_timeout() -> u64 {
  100
}

fn default_command_timeout() -> u64 {
  DEFAULT_COMMAND_TIMEOUT.as_secs() * 1000
}

fn default_symbol() -> String {
  "USDCAD".to_string()
}

fn default_min_confidence() -> u8 {
  60
}

fn default_lot_size() -> Decimal {
  Decimal::new(1, 2) // 0.01 lots
}

fn default_retry_after() -> u64 {
  60
}

fn default_api_key_env() -> String {
  "ADVISORY_API_KEY".to_string()
}

fn default_request_timeout() -> u64 {
  60
}

fn default_server_addr() -> String {
  "0.0.0.0:8080".to_string()
}

fn default_metrics_addr() -> String {
  "0.0.0.0:9090".to_string()
}
