//! Transport Port - Execution Agent Messaging Interface
//!
//! Defines the trait for the one-directional publish/subscribe link to
//! the execution agent. Commands go out on the publish side, replies
//! come back on the subscribe side, and nothing at this layer
//! acknowledges delivery.
//!
//! Key design decisions:
//! - Frames are plain text; parsing lives in `domain::frame`
//! - `try_receive` is bounded so the dispatch loop never blocks forever
//! - No reconnect logic: faults are reported, the caller decides

use std::time::Duration;

use async_trait::async_trait;

use crate::domain::error::TransportError;

/// Trait for execution agent transports.
///
/// The dispatch loop owns its transport exclusively, so methods take
/// `&mut self` and implementors need no internal locking.
#[async_trait]
pub trait Transport: Send + 'static {
  /// Establish the publish and subscribe connections.
  ///
  /// The subscribe side receives all topics unless the adapter was
  /// configured with a narrower topic filter.
  async fn connect(&mut self) -> Result<(), TransportError>;

  /// Publish one frame. Fire-and-forget: success means handed to the
  /// socket, not received by the agent.
  async fn send(&mut self, frame: &str) -> Result<(), TransportError>;

  /// Wait at most `poll_timeout` for one inbound frame.
  ///
  /// Returns `Ok(None)` when the window elapses without a frame.
  async fn try_receive(
    &mut self,
    poll_timeout: Duration,
  ) -> Result<Option<String>, TransportError>;

  /// Dispose both connections. Idempotent.
  async fn close(&mut self);

  /// Short adapter name for logs.
  fn name(&self) -> &'static str;
}
