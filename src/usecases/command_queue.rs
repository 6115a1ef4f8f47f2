//! Command Queue - FIFO of Accepted, Unsent Commands
//!
//! Submitters push from any task; the dispatch loop drains the whole
//! queue once per iteration. The queue has an explicit lifecycle so a
//! submit racing with shutdown can never strand a command:
//! - `NotOpened`: engine not started, pushes are refused
//! - `Open`: pushes accepted
//! - `Closed`: pushes refused, remaining items handed back once

use std::collections::VecDeque;

use parking_lot::Mutex;
use tokio::sync::oneshot;

use crate::domain::command::Command;
use crate::domain::error::EngineError;

/// Completion side of a submitter's `ReplyFuture`.
pub type ReplySender = oneshot::Sender<Result<String, EngineError>>;

/// A command waiting to be published, with its completion handle.
#[derive(Debug)]
pub struct QueuedCommand {
  /// The command to publish.
  pub command: Command,
  /// Resolved once with the agent's payload or a fault.
  pub reply: ReplySender,
}

/// Lifecycle of the queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueStatus {
  /// The engine has not started.
  NotOpened,
  /// Accepting commands.
  Open,
  /// The engine is stopping or stopped.
  Closed,
}

#[derive(Debug)]
struct Inner {
  status: QueueStatus,
  items: VecDeque<QueuedCommand>,
}

/// Thread-safe FIFO of not-yet-sent commands.
#[derive(Debug)]
pub struct CommandQueue {
  inner: Mutex<Inner>,
}

impl CommandQueue {
  /// Create a queue in the `NotOpened` state.
  pub fn new() -> Self {
    Self {
      inner: Mutex::new(Inner {
        status: QueueStatus::NotOpened,
        items: VecDeque::new(),
      }),
    }
  }

  /// Append a command.
  ///
  /// # Errors
  /// Hands the command back with the queue status when not `Open`.
  pub fn push(&self, item: QueuedCommand) -> Result<(), (QueueStatus, QueuedCommand)> {
    let mut inner = self.inner.lock();
    match inner.status {
      QueueStatus::Open => {
        inner.items.push_back(item);
        Ok(())
      }
      status => Err((status, item)),
    }
  }

  /// Take every queued command in submission order.
  pub fn drain(&self) -> Vec<QueuedCommand> {
    self.inner.lock().items.drain(..).collect()
  }

  /// Start accepting commands. No effect once closed.
  pub fn open(&self) {
    let mut inner = self.inner.lock();
    if inner.status == QueueStatus::NotOpened {
      inner.status = QueueStatus::Open;
    }
  }

  /// Stop accepting commands and return whatever was still queued.
  pub fn close(&self) -> Vec<QueuedCommand> {
    let mut inner = self.inner.lock();
    inner.status = QueueStatus::Closed;
    inner.items.drain(..).collect()
  }

  /// Current lifecycle state.
  pub fn status(&self) -> QueueStatus {
    self.inner.lock().status
  }

  /// Number of commands waiting.
  pub fn len(&self) -> usize {
    self.inner.lock().items.len()
  }

  /// Whether no commands are waiting.
  pub fn is_empty(&self) -> bool {
    self.inner.lock().items.is_empty()
  }
}

impl Default for CommandQueue {
  fn default() -> Self {
    Self::new()
  }
}
