//! Dispatch Loop - Single Owner of the Transport
//!
//! Drives the engine lifecycle `Idle -> Starting -> Running -> Stopping
//! -> Stopped`. It is the only task that touches the transport and the
//! only one that removes pending entries.
//!
//! Each Running iteration:
//! 1. Signal poller check (when configured)
//! 2. Drain the command queue: register, then publish each frame
//! 3. Wait up to the receive window for one reply and route it
//! 4. Expire overdue pending entries
//! 5. Sleep the loop interval, cut short by shutdown

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::broadcast;
use tokio::time::Instant;
use tracing::{debug, error, info, instrument, warn};

use super::command_queue::QueuedCommand;
use super::engine::{EngineHandle, EngineShared, EngineState};
use super::pending_replies::{PendingReply, Resolution};
use super::signal_poller::{PollerState, SignalPoller};
use super::stats::EngineStats;
use crate::config::EngineConfig;
use crate::domain::error::{EngineError, TransportError};
use crate::domain::frame::{CommandFrame, ReplyFrame};
use crate::ports::clock::{Clock, SystemClock};
use crate::ports::transport::Transport;

/// Engine task owning a transport.
pub struct DispatchLoop<T: Transport> {
  transport: T,
  shared: Arc<EngineShared>,
  account_id: String,
  startup_delay: Duration,
  loop_interval: Duration,
  receive_timeout: Duration,
  poller: Option<SignalPoller>,
  clock: Arc<dyn Clock>,
}

/// What ended a wait that shutdown can interrupt.
enum Interrupted<T> {
  Done(T),
  Shutdown,
}

impl<T: Transport> DispatchLoop<T> {
  /// Build the loop and the handle callers submit through.
  pub fn new(
    transport: T,
    config: &EngineConfig,
    account_id: impl Into<String>,
  ) -> (Self, EngineHandle) {
    let shared = Arc::new(EngineShared::new(config.default_command_timeout()));
    let handle = EngineHandle::new(Arc::clone(&shared));
    let dispatch = Self {
      transport,
      shared,
      account_id: account_id.into(),
      startup_delay: config.startup_delay(),
      loop_interval: config.loop_interval(),
      receive_timeout: config.receive_timeout(),
      poller: None,
      clock: Arc::new(SystemClock),
    };
    (dispatch, handle)
  }

  /// Run the daily signal check on every iteration.
  #[must_use]
  pub fn with_signal_poller(mut self, poller: SignalPoller) -> Self {
    self.poller = Some(poller);
    self
  }

  /// Replace the wall clock used by the signal poller.
  #[must_use]
  pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
    self.clock = clock;
    self
  }

  /// Run until `shutdown_rx` fires.
  ///
  /// # Errors
  /// Returns `EngineError::Transport` if the transport fails to connect.
  /// Shutdown itself is not an error.
  #[instrument(skip_all, fields(transport = self.transport.name(), account = %self.account_id))]
  pub async fn run(mut self, mut shutdown_rx: broadcast::Receiver<()>) -> Result<(), EngineError> {
    // Handles may queue from here on; nothing is sent until connected.
    self.shared.queue.open();
    self.shared.set_state(EngineState::Starting);
    info!(delay_ms = self.startup_delay.as_millis(), "Command engine starting");

    let delay = tokio::select! {
      biased;
      _ = shutdown_rx.recv() => Interrupted::Shutdown,
      () = tokio::time::sleep(self.startup_delay) => Interrupted::Done(()),
    };
    if matches!(delay, Interrupted::Shutdown) {
      self.shut_down(&EngineError::EngineStopped).await;
      return Ok(());
    }

    let connected = tokio::select! {
      biased;
      _ = shutdown_rx.recv() => Interrupted::Shutdown,
      result = self.transport.connect() => Interrupted::Done(result),
    };
    match connected {
      Interrupted::Shutdown => {
        self.shut_down(&EngineError::EngineStopped).await;
        return Ok(());
      }
      Interrupted::Done(Err(e)) => {
        EngineStats::bump(&self.shared.stats.transport_faults);
        error!(error = %e, "Transport connect failed, stopping engine");
        let cause = EngineError::Transport(e);
        self.shut_down(&cause).await;
        return Err(cause);
      }
      Interrupted::Done(Ok(())) => {}
    }

    self.shared.set_state(EngineState::Running);
    info!(
      interval_ms = self.loop_interval.as_millis(),
      receive_ms = self.receive_timeout.as_millis(),
      "Command engine running"
    );

    let handle = EngineHandle::new(Arc::clone(&self.shared));
    let mut poller_state = PollerState::default();

    loop {
      if let Some(poller) = &self.poller {
        let now = self.clock.now();
        let polled = tokio::select! {
          biased;
          _ = shutdown_rx.recv() => Interrupted::Shutdown,
          result = poller.poll(poller_state, now, &handle) => Interrupted::Done(result),
        };
        match polled {
          Interrupted::Shutdown => break,
          Interrupted::Done((next, outcome)) => {
            if next != poller_state {
              debug!(outcome = ?outcome, "Signal poller state advanced");
            }
            poller_state = next;
          }
        }
      }

      self.publish_queued().await;
      self.receive_reply().await;
      self.expire_overdue();

      let slept = tokio::select! {
        biased;
        _ = shutdown_rx.recv() => Interrupted::Shutdown,
        () = tokio::time::sleep(self.loop_interval) => Interrupted::Done(()),
      };
      if matches!(slept, Interrupted::Shutdown) {
        break;
      }
    }

    info!("Shutdown signal in command engine");
    self.shut_down(&EngineError::EngineStopped).await;
    Ok(())
  }

  /// Register and send every queued command in FIFO order.
  async fn publish_queued(&mut self) {
    for QueuedCommand { command, reply } in self.shared.queue.drain() {
      let correlation_id = command.correlation_id.clone();
      let frame = CommandFrame::for_command(&self.account_id, &command).to_string();

      let entry = PendingReply {
        correlation_id: correlation_id.clone(),
        command_type: command.command_type,
        reply,
        sent_at: Instant::now(),
        timeout: command.timeout,
      };
      if let Err(duplicate) = self.shared.pending.register(entry) {
        warn!(correlation_id = %correlation_id, "Correlation id already pending, rejecting command");
        let _ = duplicate
          .reply
          .send(Err(EngineError::DuplicateCorrelation(correlation_id)));
        continue;
      }

      match self.transport.send(&frame).await {
        Ok(()) => {
          EngineStats::bump(&self.shared.stats.published);
          debug!(
            correlation_id = %correlation_id,
            command = %command.command_type,
            queued_ms = (Utc::now() - command.submitted_at).num_milliseconds(),
            "Published command frame"
          );
        }
        Err(e) => {
          EngineStats::bump(&self.shared.stats.transport_faults);
          warn!(correlation_id = %correlation_id, error = %e, "Failed to publish command frame");
          self.shared.pending.fail(&correlation_id, EngineError::Transport(e));
        }
      }
    }
    self.shared.stats.set_pending(self.shared.pending.len());
  }

  /// Wait one receive window for a reply frame.
  async fn receive_reply(&mut self) {
    match self.transport.try_receive(self.receive_timeout).await {
      Ok(Some(raw)) => self.route_reply(&raw),
      Ok(None) => {}
      Err(e) if e.is_cancelled() => debug!("Transport receive cancelled"),
      Err(e) => self.transport_fault(&e),
    }
  }

  /// Resolve the pending entry a reply frame names, if any.
  fn route_reply(&self, raw: &str) {
    let stats = &self.shared.stats;
    let frame = match raw.parse::<ReplyFrame>() {
      Ok(frame) => frame,
      Err(e) => {
        EngineStats::bump(&stats.protocol_faults);
        debug!(error = %e, frame = %raw, "Dropping malformed reply frame");
        return;
      }
    };

    let id = frame.correlation_id;
    match self.shared.pending.resolve(&id, frame.payload) {
      Resolution::Resolved => EngineStats::bump(&stats.replies_matched),
      Resolution::Abandoned => EngineStats::bump(&stats.abandoned),
      Resolution::Unknown => {
        EngineStats::bump(&stats.correlation_misses);
        debug!(correlation_id = %id, "Reply matches no pending command");
      }
    }
    stats.set_pending(self.shared.pending.len());
  }

  fn transport_fault(&self, e: &TransportError) {
    EngineStats::bump(&self.shared.stats.transport_faults);
    warn!(error = %e, "Transport receive fault");
  }

  fn expire_overdue(&self) {
    let expired = self.shared.pending.expire(Instant::now());
    if !expired.is_empty() {
      EngineStats::add(&self.shared.stats.timeouts, expired.len() as u64);
      for id in &expired {
        warn!(correlation_id = %id, "Command timed out waiting for reply");
      }
    }
    self.shared.stats.set_pending(self.shared.pending.len());
  }

  /// Fail all outstanding work with `cause`, close the transport and
  /// publish `Stopped`.
  async fn shut_down(&mut self, cause: &EngineError) {
    self.shared.set_state(EngineState::Stopping);

    let leftovers = self.shared.queue.close();
    let queued = leftovers.len();
    for QueuedCommand { reply, .. } in leftovers {
      let _ = reply.send(Err(cause.clone()));
    }
    let pending = self.shared.pending.fail_all(cause);

    if *cause == EngineError::EngineStopped {
      EngineStats::add(&self.shared.stats.stopped_at_shutdown, (queued + pending) as u64);
    }
    self.shared.stats.set_pending(0);

    self.transport.close().await;
    self.shared.set_state(EngineState::Stopped);
    info!(queued, pending, "Command engine stopped");
  }
}
