//! Configuration Loader - File Loading and Validation
//!
//! Handles loading `config.toml`, validating all parameters,
//! and providing clear error messages for misconfiguration.

use std::path::Path;

use anyhow::{Context, Result};
use rust_decimal::Decimal;
use tracing::info;

use super::AppConfig;

/// Environment variable that overrides the config file path.
pub const CONFIG_PATH_ENV: &str = "TRADE_BRIDGE_CONFIG";

/// Config path from `TRADE_BRIDGE_CONFIG`, falling back to `config.toml`.
pub fn config_path() -> String {
  std::env::var(CONFIG_PATH_ENV).unwrap_or_else(|_| "config.toml".to_string())
}

/// Load and validate configuration from a TOML file.
///
/// # Arguments
/// * `path` - Path to the config.toml file
///
/// # Errors
/// Returns detailed error if:
/// - File doesn't exist or can't be read
/// - TOML parsing fails
/// - Validation rules are violated
pub fn load_config(path: &str) -> Result<AppConfig> {
  let path = Path::new(path);

  let content = std::fs::read_to_string(path)
    .with_context(|| format!("Failed to read config file: {}", path.display()))?;

  let config = parse_config(&content)?;

  info!(
    account = %config.transport.account_id,
    publish = %config.transport.publish_address,
    subscribe = %config.transport.subscribe_address,
    signals = config.signals.enabled,
    "Configuration loaded successfully"
  );

  Ok(config)
}

/// Parse and validate configuration from TOML text.
pub fn parse_config(content: &str) -> Result<AppConfig> {
  let config: AppConfig = toml::from_str(content)
    .with_context(|| "Failed to parse config.toml")?;

  validate_config(&config)?;

  Ok(config)
}

/// Validate all configuration parameters.
///
/// Checks for:
/// - An account id that cannot break the frame grammar
/// - Non-empty agent endpoints
/// - Loop timing that cannot busy-spin
/// - Sensible signal thresholds
fn validate_config(config: &AppConfig) -> Result<()> {
  // Transport validation
  let account = &config.transport.account_id;
  anyhow::ensure!(!account.is_empty(), "transport.account_id must not be empty");
  anyhow::ensure!(
    !account.contains(char::is_whitespace) && !account.contains('|'),
    "transport.account_id must not contain whitespace or '|', got {account:?}"
  );
  anyhow::ensure!(
    !config.transport.publish_address.is_empty(),
    "transport.publish_address must not be empty"
  );
  anyhow::ensure!(
    !config.transport.subscribe_address.is_empty(),
    "transport.subscribe_address must not be empty"
  );

  // Engine validation
  let engine = &config.engine;
  anyhow::ensure!(
    engine.loop_interval_ms > 0,
    "engine.loop_interval_ms must be positive"
  );
  anyhow::ensure!(
    engine.receive_timeout_ms > 0,
    "engine.receive_timeout_ms must be positive"
  );
  anyhow::ensure!(
    engine.receive_timeout_ms <= engine.loop_interval_ms,
    "engine.receive_timeout_ms ({}) must not exceed loop_interval_ms ({})",
    engine.receive_timeout_ms,
    engine.loop_interval_ms
  );
  anyhow::ensure!(
    engine.default_command_timeout_ms > 0,
    "engine.default_command_timeout_ms must be positive"
  );

  // Signal validation
  let signals = &config.signals;
  anyhow::ensure!(
    signals.min_confidence <= 100,
    "signals.min_confidence must be in [0, 100], got {}",
    signals.min_confidence
  );
  anyhow::ensure!(
    signals.lot_size > Decimal::ZERO,
    "signals.lot_size must be positive, got {}",
    signals.lot_size
  );
  if signals.enabled {
    anyhow::ensure!(!signals.symbol.is_empty(), "signals.symbol must not be empty");
    anyhow::ensure!(
      !signals.endpoint_url.is_empty(),
      "signals.endpoint_url is required when signals are enabled"
    );
  }

  Ok(())
}
