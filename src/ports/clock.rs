//! Clock Port - Wall-clock Source
//!
//! The signal poller's trading-day rule depends on the UTC date and
//! weekday, so the current time is injected rather than read ambiently.

use chrono::{DateTime, Utc};

/// Source of the current UTC time.
pub trait Clock: Send + Sync + 'static {
  /// Current wall-clock time.
  fn now(&self) -> DateTime<Utc>;
}

/// System clock implementation using real time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
  fn now(&self) -> DateTime<Utc> {
    Utc::now()
  }
}
