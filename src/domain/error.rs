//! Error types shared by the engine, its ports and its callers.

use std::time::Duration;

use thiserror::Error;

use super::command::CorrelationId;

/// Faults raised by a transport adapter.
///
/// Only cancellation is singled out; everything else is a plain fault
/// that the dispatch loop logs and moves past.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    /// The link was torn down; nothing further will arrive.
    #[error("transport operation cancelled")]
    Cancelled,
    /// Send or receive attempted before `connect`.
    #[error("transport is not connected")]
    NotConnected,
    /// Could not reach an endpoint.
    #[error("failed to connect to {address}: {reason}")]
    Connect {
        /// Endpoint that failed.
        address: String,
        /// Underlying error text.
        reason: String,
    },
    /// Publishing a frame failed.
    #[error("failed to send frame: {0}")]
    Send(String),
    /// Receiving a frame failed.
    #[error("failed to receive frame: {0}")]
    Receive(String),
    /// A frame arrived that is not valid UTF-8 text.
    #[error("received non-text frame: {0}")]
    Decode(String),
}

impl TransportError {
    /// Whether this error is a cooperative cancellation.
    pub const fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

/// Errors surfaced to command submitters.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EngineError {
    /// The dispatch loop has not been started yet.
    #[error("command engine is not running")]
    NotRunning,
    /// The engine shut down before a reply arrived.
    #[error("command engine stopped")]
    EngineStopped,
    /// No reply arrived within the command's timeout.
    #[error("no reply for {correlation_id} within {}s", timeout.as_secs_f64())]
    Timeout {
        /// Correlation id of the expired command.
        correlation_id: CorrelationId,
        /// Timeout that elapsed.
        timeout: Duration,
    },
    /// The command could not be handed to the transport.
    #[error(transparent)]
    Transport(#[from] TransportError),
    /// A live entry already uses this correlation id.
    #[error("correlation id {0} is already pending")]
    DuplicateCorrelation(CorrelationId),
}
