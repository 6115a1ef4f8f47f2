//! Signal Poller - Once-per-trading-day Advisory Check
//!
//! Called by the dispatch loop on every Running iteration. Most calls
//! return `NotDue` without touching the provider. When due, the
//! provider is asked for the configured symbol and a confident signal
//! becomes an Open command.
//!
//! Due rule (UTC):
//! - never fetched: due on any day
//! - otherwise: due when the last fetch date is not today and today is
//!   not Saturday or Sunday
//! - after a miss (no signal or provider failure) the provider is not
//!   called again before `retry_after` has elapsed
//!
//! State is owned by the caller and threaded through `poll`.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Datelike, NaiveDate, Utc, Weekday};
use rust_decimal::Decimal;
use tracing::{debug, error, info, warn};

use super::engine::EngineHandle;
use crate::config::SignalConfig;
use crate::domain::command::{CommandType, CorrelationId};
use crate::ports::signal_provider::SignalProvider;

/// Poller memory carried between iterations.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PollerState {
  /// UTC date of the last provider call that returned a signal.
  pub last_fetch: Option<NaiveDate>,
  /// Earliest time the provider may be called again after a miss.
  pub retry_not_before: Option<DateTime<Utc>>,
}

impl PollerState {
  /// Whether the provider should be called at `now`.
  pub fn is_due(&self, now: DateTime<Utc>) -> bool {
    if self.retry_not_before.is_some_and(|at| now < at) {
      return false;
    }
    match self.last_fetch {
      None => true,
      Some(date) => date != now.date_naive() && !is_weekend(now.weekday()),
    }
  }
}

const fn is_weekend(day: Weekday) -> bool {
  matches!(day, Weekday::Sat | Weekday::Sun)
}

/// Result of one `poll` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollOutcome {
  /// Not a trading-day trigger, or still inside the retry gap.
  NotDue,
  /// Provider answered without a signal.
  NoSignal,
  /// Signal confidence did not exceed the threshold.
  BelowThreshold { confidence: u8 },
  /// An Open command was queued.
  Submitted { correlation_id: CorrelationId },
  /// Provider call failed.
  ProviderFailed,
  /// Engine refused the Open command.
  SubmitFailed,
}

/// Daily advisory check that submits Open commands.
pub struct SignalPoller {
  provider: Arc<dyn SignalProvider>,
  symbol: String,
  min_confidence: u8,
  lot_size: Decimal,
  retry_after: Duration,
}

impl SignalPoller {
  /// Create a poller with explicit parameters.
  pub fn new(
    provider: Arc<dyn SignalProvider>,
    symbol: impl Into<String>,
    min_confidence: u8,
    lot_size: Decimal,
    retry_after: Duration,
  ) -> Self {
    Self {
      provider,
      symbol: symbol.into(),
      min_confidence,
      lot_size,
      retry_after,
    }
  }

  /// Create a poller from the `[signals]` config section.
  pub fn from_config(provider: Arc<dyn SignalProvider>, config: &SignalConfig) -> Self {
    Self::new(
      provider,
      config.symbol.clone(),
      config.min_confidence,
      config.lot_size,
      Duration::from_secs(config.retry_after_seconds),
    )
  }

  /// Symbol requested from the provider.
  pub fn symbol(&self) -> &str {
    &self.symbol
  }

  /// Run one check at `now`, returning the next state and what happened.
  pub async fn poll(
    &self,
    state: PollerState,
    now: DateTime<Utc>,
    engine: &EngineHandle,
  ) -> (PollerState, PollOutcome) {
    if !state.is_due(now) {
      return (state, PollOutcome::NotDue);
    }

    engine.record_signal_fetch();
    let signal = match self.provider.get_signal(&self.symbol).await {
      Ok(Some(signal)) => signal,
      Ok(None) => {
        info!(symbol = %self.symbol, "No advisory signal available");
        return (self.after_miss(state, now), PollOutcome::NoSignal);
      }
      Err(e) => {
        error!(symbol = %self.symbol, error = %e, "Advisory provider call failed");
        return (self.after_miss(state, now), PollOutcome::ProviderFailed);
      }
    };

    let next = PollerState {
      last_fetch: Some(now.date_naive()),
      retry_not_before: None,
    };

    if !signal.is_actionable(self.min_confidence) {
      info!(
        symbol = %signal.symbol,
        confidence = signal.confidence,
        min_confidence = self.min_confidence,
        "Signal below confidence threshold, skipping"
      );
      return (
        next,
        PollOutcome::BelowThreshold {
          confidence: signal.confidence,
        },
      );
    }

    let body = signal.open_command_body(self.lot_size);
    match engine.submit(CommandType::Open, body.clone(), None) {
      Ok(reply) => {
        let correlation_id = reply.correlation_id().clone();
        info!(
          correlation_id = %correlation_id,
          direction = ?signal.direction,
          confidence = signal.confidence,
          body = %body,
          "Submitted Open command from advisory signal"
        );

        tokio::spawn(async move {
          match reply.await {
            Ok(payload) => info!(payload = %payload, "Open command acknowledged"),
            Err(e) => warn!(error = %e, "Open command from signal failed"),
          }
        });

        (next, PollOutcome::Submitted { correlation_id })
      }
      Err(e) => {
        warn!(error = %e, "Engine refused Open command from signal");
        (next, PollOutcome::SubmitFailed)
      }
    }
  }

  fn after_miss(&self, state: PollerState, now: DateTime<Utc>) -> PollerState {
    let retry_not_before = if self.retry_after.is_zero() {
      None
    } else {
      chrono::Duration::from_std(self.retry_after)
        .ok()
        .map(|gap| now + gap)
    };
    debug!(retry_not_before = ?retry_not_before, "Signal poll missed");
    PollerState {
      last_fetch: state.last_fetch,
      retry_not_before,
    }
  }
}

#[cfg(test)]
mod tests {
  use std::sync::atomic::{AtomicU32, Ordering};

  use chrono::TimeZone;
  use rust_decimal_macros::dec;

  use super::*;
  use crate::domain::signal::{DailySignal, Direction};
  use crate::usecases::engine::EngineShared;

  /// Provider returning a fixed answer and counting calls.
  struct StubProvider {
    answer: anyhow::Result<Option<DailySignal>>,
    calls: AtomicU32,
  }

  impl StubProvider {
    fn new(answer: anyhow::Result<Option<DailySignal>>) -> Arc<Self> {
      Arc::new(Self {
        answer,
        calls: AtomicU32::new(0),
      })
    }

    fn calls(&self) -> u32 {
      self.calls.load(Ordering::SeqCst)
    }
  }

  #[async_trait::async_trait]
  impl SignalProvider for StubProvider {
    async fn get_signal(&self, _symbol: &str) -> anyhow::Result<Option<DailySignal>> {
      self.calls.fetch_add(1, Ordering::SeqCst);
      match &self.answer {
        Ok(signal) => Ok(signal.clone()),
        Err(e) => Err(anyhow::anyhow!("{e}")),
      }
    }
  }

  fn signal(confidence: u8) -> DailySignal {
    DailySignal {
      symbol: "USDCAD".to_string(),
      direction: Direction::Sell,
      entry_price: dec!(1.3600),
      take_profit: dec!(1.3550),
      stop_loss: dec!(1.3650),
      confidence,
      rationale: String::new(),
    }
  }

  fn running_engine() -> (Arc<EngineShared>, EngineHandle) {
    let shared = Arc::new(EngineShared::new(Duration::from_secs(15)));
    shared.queue.open();
    (Arc::clone(&shared), EngineHandle::new(shared))
  }

  fn poller(provider: Arc<StubProvider>) -> SignalPoller {
    SignalPoller::new(provider, "USDCAD", 60, dec!(0.01), Duration::from_secs(60))
  }

  // 2024-06-12 is a Wednesday.
  fn wednesday() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 6, 12, 9, 0, 0).unwrap()
  }

  fn saturday() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 6, 15, 9, 0, 0).unwrap()
  }

  #[test]
  fn test_due_rule() {
    let fresh = PollerState::default();
    assert!(fresh.is_due(wednesday()));
    assert!(fresh.is_due(saturday()));

    let fetched_today = PollerState {
      last_fetch: Some(wednesday().date_naive()),
      retry_not_before: None,
    };
    assert!(!fetched_today.is_due(wednesday()));
    assert!(fetched_today.is_due(wednesday() + chrono::Duration::days(1)));
    assert!(!fetched_today.is_due(saturday()));
  }

  #[test]
  fn test_retry_gap_blocks_until_elapsed() {
    let now = wednesday();
    let state = PollerState {
      last_fetch: None,
      retry_not_before: Some(now + chrono::Duration::seconds(60)),
    };
    assert!(!state.is_due(now + chrono::Duration::seconds(59)));
    assert!(state.is_due(now + chrono::Duration::seconds(60)));
  }

  #[tokio::test]
  async fn test_confident_signal_submits_open() {
    let (shared, engine) = running_engine();
    let provider = StubProvider::new(Ok(Some(signal(75))));
    let poller = poller(Arc::clone(&provider));

    let (state, outcome) = poller.poll(PollerState::default(), wednesday(), &engine).await;

    assert!(matches!(outcome, PollOutcome::Submitted { .. }));
    assert_eq!(state.last_fetch, Some(wednesday().date_naive()));
    let queued = shared.queue.drain();
    assert_eq!(queued.len(), 1);
    assert_eq!(queued[0].command.command_type, CommandType::Open);
    assert_eq!(queued[0].command.body, "1 USDCAD 0.01 1.3550 1.3650");
    assert_eq!(engine.stats().signal_fetches, 1);

    // Same day: no second provider call.
    let (_, again) = poller.poll(state, wednesday(), &engine).await;
    assert_eq!(again, PollOutcome::NotDue);
    assert_eq!(provider.calls(), 1);
  }

  #[tokio::test]
  async fn test_threshold_is_strict() {
    let (shared, engine) = running_engine();
    let poller = poller(StubProvider::new(Ok(Some(signal(60)))));

    let (state, outcome) = poller.poll(PollerState::default(), wednesday(), &engine).await;

    assert_eq!(outcome, PollOutcome::BelowThreshold { confidence: 60 });
    assert_eq!(state.last_fetch, Some(wednesday().date_naive()));
    assert!(shared.queue.is_empty());
  }

  #[tokio::test]
  async fn test_no_signal_keeps_last_fetch_and_sets_gap() {
    let (shared, engine) = running_engine();
    let poller = poller(StubProvider::new(Ok(None)));

    let (state, outcome) = poller.poll(PollerState::default(), wednesday(), &engine).await;

    assert_eq!(outcome, PollOutcome::NoSignal);
    assert_eq!(state.last_fetch, None);
    assert_eq!(
      state.retry_not_before,
      Some(wednesday() + chrono::Duration::seconds(60))
    );
    assert!(shared.queue.is_empty());
  }

  #[tokio::test]
  async fn test_provider_failure_is_contained() {
    let (_shared, engine) = running_engine();
    let poller = poller(StubProvider::new(Err(anyhow::anyhow!("503"))));

    let (state, outcome) = poller.poll(PollerState::default(), wednesday(), &engine).await;

    assert_eq!(outcome, PollOutcome::ProviderFailed);
    assert_eq!(state.last_fetch, None);
    assert!(state.retry_not_before.is_some());
  }

  #[tokio::test]
  async fn test_refused_submit_still_marks_day_fetched() {
    let (shared, engine) = running_engine();
    let _ = shared.queue.close();
    let provider = StubProvider::new(Ok(Some(signal(90))));
    let poller = poller(Arc::clone(&provider));

    let (state, outcome) = poller.poll(PollerState::default(), wednesday(), &engine).await;

    assert_eq!(outcome, PollOutcome::SubmitFailed);
    assert_eq!(state.last_fetch, Some(wednesday().date_naive()));
    assert_eq!(state.retry_not_before, None);
    assert_eq!(engine.stats().submitted, 0);

    let (_, again) = poller.poll(state, wednesday(), &engine).await;
    assert_eq!(again, PollOutcome::NotDue);
    assert_eq!(provider.calls(), 1);
  }

  #[tokio::test]
  async fn test_zero_retry_gap_disables_backoff() {
    let (_shared, engine) = running_engine();
    let poller = SignalPoller::new(
      StubProvider::new(Ok(None)),
      "USDCAD",
      60,
      dec!(0.01),
      Duration::ZERO,
    );
    let (state, _) = poller.poll(PollerState::default(), wednesday(), &engine).await;
    assert_eq!(state.retry_not_before, None);
  }
}
