//! Pending Reply Table - Correlation Id to Completion Handle
//!
//! Bridges the agent's asynchronous replies back to the submitters that
//! are awaiting them.
//!
//! Flow:
//! 1. Dispatch loop registers an entry right before publishing a frame
//! 2. A reply frame arrives and `resolve()` completes the entry
//! 3. Otherwise `expire()` fails it with `Timeout` once overdue
//! 4. At shutdown `fail_all()` fails the rest with `EngineStopped`
//!
//! The map tolerates concurrent readers; the dispatch loop is the only
//! task that inserts or removes.

use std::time::Duration;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use tokio::time::Instant;
use tracing::debug;

use super::command_queue::ReplySender;
use crate::domain::command::{CommandType, CorrelationId};
use crate::domain::error::EngineError;

/// A published command awaiting its reply.
#[derive(Debug)]
pub struct PendingReply {
  /// Correlation id the reply must carry.
  pub correlation_id: CorrelationId,
  /// Kind of the published command (for logging).
  pub command_type: CommandType,
  /// Completion handle of the submitter's future.
  pub reply: ReplySender,
  /// When the frame was handed to the transport.
  pub sent_at: Instant,
  /// How long to wait after `sent_at`.
  pub timeout: Duration,
}

impl PendingReply {
  /// Instant after which the entry expires.
  pub fn deadline(&self) -> Instant {
    self.sent_at + self.timeout
  }
}

/// Outcome of routing one reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
  /// The submitter's future received the payload.
  Resolved,
  /// The entry existed but its future had been dropped.
  Abandoned,
  /// No entry with that id.
  Unknown,
}

/// Thread-safe map of in-flight commands.
#[derive(Debug, Default)]
pub struct PendingReplyTable {
  entries: DashMap<CorrelationId, PendingReply>,
}

impl PendingReplyTable {
  /// Create an empty table.
  pub fn new() -> Self {
    Self {
      entries: DashMap::new(),
    }
  }

  /// Register an entry.
  ///
  /// # Errors
  /// Hands the entry back if its correlation id is already live.
  pub fn register(&self, entry: PendingReply) -> Result<(), PendingReply> {
    match self.entries.entry(entry.correlation_id.clone()) {
      Entry::Occupied(_) => Err(entry),
      Entry::Vacant(slot) => {
        slot.insert(entry);
        Ok(())
      }
    }
  }

  /// Complete and remove the entry for `id` with `payload`.
  pub fn resolve(&self, id: &CorrelationId, payload: String) -> Resolution {
    let Some((_, entry)) = self.entries.remove(id) else {
      return Resolution::Unknown;
    };

    let elapsed_ms = entry.sent_at.elapsed().as_millis();
    if entry.reply.send(Ok(payload)).is_ok() {
      debug!(
        correlation_id = %id,
        command = %entry.command_type,
        elapsed_ms,
        "Resolved pending reply"
      );
      Resolution::Resolved
    } else {
      debug!(correlation_id = %id, "Reply arrived after submitter dropped its future");
      Resolution::Abandoned
    }
  }

  /// Fail and remove the entry for `id`. Returns whether it existed.
  pub fn fail(&self, id: &CorrelationId, error: EngineError) -> bool {
    match self.entries.remove(id) {
      Some((_, entry)) => {
        let _ = entry.reply.send(Err(error));
        true
      }
      None => false,
    }
  }

  /// Fail every entry whose deadline is at or before `now` with `Timeout`.
  ///
  /// Returns the expired correlation ids.
  pub fn expire(&self, now: Instant) -> Vec<CorrelationId> {
    let overdue: Vec<CorrelationId> = self
      .entries
      .iter()
      .filter(|entry| entry.value().deadline() <= now)
      .map(|entry| entry.key().clone())
      .collect();

    overdue
      .into_iter()
      .filter(|id| match self.entries.remove(id) {
        Some((_, entry)) => {
          let _ = entry.reply.send(Err(EngineError::Timeout {
            correlation_id: id.clone(),
            timeout: entry.timeout,
          }));
          true
        }
        None => false,
      })
      .collect()
  }

  /// Fail every entry with a clone of `error`. Returns how many.
  pub fn fail_all(&self, error: &EngineError) -> usize {
    let ids: Vec<CorrelationId> = self.entries.iter().map(|e| e.key().clone()).collect();
    ids.iter().filter(|id| self.fail(id, error.clone())).count()
  }

  /// Whether an entry for `id` is live.
  pub fn contains(&self, id: &CorrelationId) -> bool {
    self.entries.contains_key(id)
  }

  /// Number of live entries.
  pub fn len(&self) -> usize {
    self.entries.len()
  }

  /// Whether the table is empty.
  pub fn is_empty(&self) -> bool {
    self.entries.is_empty()
  }
}
