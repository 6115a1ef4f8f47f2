//! Command Engine Handle - Submission API
//!
//! `EngineHandle` is the only way into the engine. It is cheap to clone
//! and is handed explicitly to every caller (HTTP routes, the signal
//! poller, tests); there is no process-wide instance.
//!
//! `submit` never blocks: it assigns a correlation id, queues the
//! command and returns a `ReplyFuture` that resolves once the dispatch
//! loop routes the agent's reply back, or fails with a timeout,
//! transport fault or shutdown.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use serde::Serialize;
use tokio::sync::{oneshot, watch};
use tracing::debug;

use super::command_queue::{CommandQueue, QueueStatus, QueuedCommand};
use super::pending_replies::PendingReplyTable;
use super::stats::{EngineStats, StatsSnapshot};
use crate::domain::command::{Command, CommandType, CorrelationId};
use crate::domain::error::EngineError;

/// Lifecycle of the dispatch loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EngineState {
  /// Constructed, `run` not called yet.
  Idle,
  /// Waiting out the startup delay or connecting.
  Starting,
  /// Dispatching.
  Running,
  /// Failing outstanding work and closing the transport.
  Stopping,
  /// Done.
  Stopped,
}

impl std::fmt::Display for EngineState {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    let s = match self {
      Self::Idle => "idle",
      Self::Starting => "starting",
      Self::Running => "running",
      Self::Stopping => "stopping",
      Self::Stopped => "stopped",
    };
    f.write_str(s)
  }
}

/// State shared between handles and the dispatch loop.
#[derive(Debug)]
pub(crate) struct EngineShared {
  pub(crate) queue: CommandQueue,
  pub(crate) pending: PendingReplyTable,
  pub(crate) stats: EngineStats,
  pub(crate) state: watch::Sender<EngineState>,
  pub(crate) default_timeout: Duration,
}

impl EngineShared {
  pub(crate) fn new(default_timeout: Duration) -> Self {
    let (state, _) = watch::channel(EngineState::Idle);
    Self {
      queue: CommandQueue::new(),
      pending: PendingReplyTable::new(),
      stats: EngineStats::default(),
      state,
      default_timeout,
    }
  }

  pub(crate) fn set_state(&self, next: EngineState) {
    self.state.send_replace(next);
  }
}

/// Cloneable submission handle.
#[derive(Debug, Clone)]
pub struct EngineHandle {
  shared: Arc<EngineShared>,
}

impl EngineHandle {
  pub(crate) const fn new(shared: Arc<EngineShared>) -> Self {
    Self { shared }
  }

  /// Queue a command for the execution agent.
  ///
  /// A `None` or zero `timeout` uses the engine's default.
  ///
  /// # Errors
  /// - `NotRunning` if the dispatch loop has not started
  /// - `EngineStopped` if it is stopping or stopped
  pub fn submit(
    &self,
    command_type: CommandType,
    body: impl Into<String>,
    timeout: Option<Duration>,
  ) -> Result<ReplyFuture, EngineError> {
    let command = Command::new(command_type, body, timeout, self.shared.default_timeout);
    let correlation_id = command.correlation_id.clone();
    let (reply, rx) = oneshot::channel();

    match self.shared.queue.push(QueuedCommand { command, reply }) {
      Ok(()) => {
        EngineStats::bump(&self.shared.stats.submitted);
        debug!(
          correlation_id = %correlation_id,
          command = %command_type,
          "Command queued"
        );
        Ok(ReplyFuture { correlation_id, rx })
      }
      Err((QueueStatus::NotOpened, _)) => Err(EngineError::NotRunning),
      Err((_, _)) => Err(EngineError::EngineStopped),
    }
  }

  /// Current lifecycle state.
  pub fn state(&self) -> EngineState {
    *self.shared.state.borrow()
  }

  /// Watch lifecycle transitions.
  pub fn subscribe_state(&self) -> watch::Receiver<EngineState> {
    self.shared.state.subscribe()
  }

  /// Wait until the engine reaches `target` or a later state.
  ///
  /// Returns the state actually observed.
  pub async fn wait_for(&self, target: EngineState) -> EngineState {
    let mut rx = self.subscribe_state();
    match rx.wait_for(|state| *state >= target).await {
      Ok(state) => *state,
      Err(_) => self.state(),
    }
  }

  /// Whether the dispatch loop is in `Running`.
  pub fn is_running(&self) -> bool {
    self.state() == EngineState::Running
  }

  /// Whether a reply for `id` is still awaited.
  pub fn is_pending(&self, id: &CorrelationId) -> bool {
    self.shared.pending.contains(id)
  }

  /// Number of published commands awaiting replies.
  pub fn pending_count(&self) -> usize {
    self.shared.pending.len()
  }

  /// Number of accepted commands not yet published.
  pub fn queued_count(&self) -> usize {
    self.shared.queue.len()
  }

  pub(crate) fn record_signal_fetch(&self) {
    EngineStats::bump(&self.shared.stats.signal_fetches);
  }

  /// Snapshot of the engine's event counters.
  pub fn stats(&self) -> StatsSnapshot {
    self.shared.stats.snapshot()
  }
}

/// Future returned by `EngineHandle::submit`.
///
/// Resolves to the agent's reply payload. If the engine goes away
/// without completing it, it fails with `EngineStopped`.
#[derive(Debug)]
#[must_use = "dropping the future abandons the reply"]
pub struct ReplyFuture {
  correlation_id: CorrelationId,
  rx: oneshot::Receiver<Result<String, EngineError>>,
}

impl ReplyFuture {
  /// Correlation id assigned to the command.
  pub const fn correlation_id(&self) -> &CorrelationId {
    &self.correlation_id
  }
}

impl Future for ReplyFuture {
  type Output = Result<String, EngineError>;

  fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
    Pin::new(&mut self.rx)
      .poll(cx)
      .map(|result| result.unwrap_or(Err(EngineError::EngineStopped)))
  }
}
