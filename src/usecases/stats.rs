//! Engine Statistics - Lock-free Event Counters
//!
//! Counted by the dispatch loop and submitters, read by the health and
//! metrics adapters. All counters are monotonic except `pending`.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

/// Event counters for one engine instance.
#[derive(Debug, Default)]
pub struct EngineStats {
  /// Commands accepted by `submit`.
  pub submitted: AtomicU64,
  /// Command frames handed to the transport.
  pub published: AtomicU64,
  /// Replies that resolved a pending entry.
  pub replies_matched: AtomicU64,
  /// Replies whose id matched nothing pending.
  pub correlation_misses: AtomicU64,
  /// Inbound frames that did not parse.
  pub protocol_faults: AtomicU64,
  /// Pending entries failed after their timeout.
  pub timeouts: AtomicU64,
  /// Transport send/receive/connect faults.
  pub transport_faults: AtomicU64,
  /// Replies that arrived after the submitter dropped its future.
  pub abandoned: AtomicU64,
  /// Futures failed with `EngineStopped` at shutdown.
  pub stopped_at_shutdown: AtomicU64,
  /// Advisory provider calls made by the signal poller.
  pub signal_fetches: AtomicU64,
  /// Entries currently in the pending reply table.
  pub pending: AtomicU64,
}

/// Point-in-time copy of `EngineStats`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
  pub submitted: u64,
  pub published: u64,
  pub replies_matched: u64,
  pub correlation_misses: u64,
  pub protocol_faults: u64,
  pub timeouts: u64,
  pub transport_faults: u64,
  pub abandoned: u64,
  pub stopped_at_shutdown: u64,
  pub signal_fetches: u64,
  pub pending: u64,
}

impl EngineStats {
  /// Increment a counter by one.
  pub fn bump(counter: &AtomicU64) {
    counter.fetch_add(1, Ordering::Relaxed);
  }

  /// Increment a counter by `n`.
  pub fn add(counter: &AtomicU64, n: u64) {
    counter.fetch_add(n, Ordering::Relaxed);
  }

  /// Record the current pending table size.
  pub fn set_pending(&self, len: usize) {
    self.pending.store(len as u64, Ordering::Relaxed);
  }

  /// Copy all counters.
  pub fn snapshot(&self) -> StatsSnapshot {
    let load = |c: &AtomicU64| c.load(Ordering::Relaxed);
    StatsSnapshot {
      submitted: load(&self.submitted),
      published: load(&self.published),
      replies_matched: load(&self.replies_matched),
      correlation_misses: load(&self.correlation_misses),
      protocol_faults: load(&self.protocol_faults),
      timeouts: load(&self.timeouts),
      transport_faults: load(&self.transport_faults),
      abandoned: load(&self.abandoned),
      stopped_at_shutdown: load(&self.stopped_at_shutdown),
      signal_fetches: load(&self.signal_fetches),
      pending: load(&self.pending),
    }
  }
}
