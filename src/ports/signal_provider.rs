//! Signal Provider Port - Advisory Service Interface
//!
//! Defines the trait for the external advisory provider consulted once
//! per trading day. The provider is opaque: the engine only sees a
//! `DailySignal` or nothing.

use async_trait::async_trait;

use crate::domain::signal::DailySignal;

/// Trait for advisory signal providers.
///
/// Implementors perform a single attempt per call. `Ok(None)` means
/// the provider answered without a usable signal; `Err` means the call
/// itself failed. Neither retries internally.
#[async_trait]
pub trait SignalProvider: Send + Sync + 'static {
  /// Fetch today's signal for `symbol`.
  async fn get_signal(&self, symbol: &str) -> anyhow::Result<Option<DailySignal>>;
}
