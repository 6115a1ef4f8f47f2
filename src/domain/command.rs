//! Command domain types.
//!
//! A `Command` is one request for the execution agent. It carries the
//! correlation id that the agent echoes back in its reply frame, so the
//! dispatch loop can route the reply to the original submitter.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Timeout applied when a submitter does not provide one.
pub const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(15);

/// Kind of command understood by the execution agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CommandType {
    /// Open a new position.
    Open,
    /// Close an existing position (body carries the ticket).
    Close,
    /// Query account or position information.
    Info,
}

impl CommandType {
    /// Lowercase token used on the wire.
    pub const fn as_wire(self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::Close => "close",
            Self::Info => "info",
        }
    }

    /// Parse the wire token. Matching is exact (lowercase only).
    pub fn from_wire(token: &str) -> Option<Self> {
        match token {
            "open" => Some(Self::Open),
            "close" => Some(Self::Close),
            "info" => Some(Self::Info),
            _ => None,
        }
    }
}

impl std::fmt::Display for CommandType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_wire())
    }
}

/// Token that pairs a command frame with its reply frame.
///
/// Locally generated ids are hyphenated UUIDv4 strings. Ids read off the
/// wire are kept verbatim, whatever their shape, so a reply can only ever
/// match an id that was actually sent.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CorrelationId(String);

impl CorrelationId {
    /// Generate a fresh random id.
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Borrow the id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for CorrelationId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for CorrelationId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl std::fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// A command accepted for delivery but not yet published.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    /// Command kind.
    pub command_type: CommandType,
    /// Free-form body appended after the type token.
    pub body: String,
    /// Correlation id assigned at submission.
    pub correlation_id: CorrelationId,
    /// How long to wait for the agent's reply once sent.
    pub timeout: Duration,
    /// Wall-clock submission time.
    pub submitted_at: DateTime<Utc>,
}

impl Command {
    /// Build a command with a fresh correlation id.
    ///
    /// A missing or zero timeout falls back to `default_timeout`.
    pub fn new(
        command_type: CommandType,
        body: impl Into<String>,
        timeout: Option<Duration>,
        default_timeout: Duration,
    ) -> Self {
        let timeout = timeout
            .filter(|t| !t.is_zero())
            .unwrap_or(default_timeout);

        Self {
            command_type,
            body: body.into(),
            correlation_id: CorrelationId::generate(),
            timeout,
            submitted_at: Utc::now(),
        }
    }
}
