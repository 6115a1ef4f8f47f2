//! Wire Frames - Command/Reply Text Grammar
//!
//! The execution agent speaks plain UTF-8 text frames over ZeroMQ.
//! This module is the single place that formats and parses them.
//!
//! ```text
//! command-frame  = account "|" correlation-id SP command-type SP body
//! reply-frame    = header SP payload
//! header         = [prefix "|"] correlation-id   ; split at the LAST "|"
//! correlation-id = 1*(any char except SP and "|")
//! command-type   = "open" / "close" / "info"
//! account        = 1*(any char except SP and "|")
//! body, payload  = *(any char)                   ; may contain SP
//! ```
//!
//! The reply prefix is opaque: agents typically send
//! `response|<account>|<id> <payload>`, but nothing before the last `|`
//! is validated.

use std::str::FromStr;

use thiserror::Error;

use super::command::{Command, CommandType, CorrelationId};

/// Reasons a frame does not match the grammar.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FrameError {
    /// No space between header and payload.
    #[error("frame has no header/payload separator")]
    MissingSeparator,
    /// Header ends with `|` or is empty.
    #[error("frame header carries an empty correlation id")]
    EmptyCorrelationId,
    /// Command frame header has no `|` or an empty account.
    #[error("command frame header has no account")]
    MissingAccount,
    /// Command type token is not open/close/info.
    #[error("unknown command type: {0}")]
    UnknownCommandType(String),
}

/// Outbound frame: `"<account>|<correlationId> <type> <body>"`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandFrame {
    /// Trading account the agent should act on.
    pub account: String,
    /// Correlation id echoed back in the reply.
    pub correlation_id: CorrelationId,
    /// Command kind.
    pub command_type: CommandType,
    /// Command body (may be empty).
    pub body: String,
}

impl CommandFrame {
    /// Build the frame for a queued command.
    pub fn for_command(account: &str, command: &Command) -> Self {
        Self {
            account: account.to_string(),
            correlation_id: command.correlation_id.clone(),
            command_type: command.command_type,
            body: command.body.clone(),
        }
    }
}

impl std::fmt::Display for CommandFrame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}|{} {} {}",
            self.account, self.correlation_id, self.command_type, self.body
        )
    }
}

impl FromStr for CommandFrame {
    type Err = FrameError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (header, rest) = s.split_once(' ').ok_or(FrameError::MissingSeparator)?;
        let (account, id) = header.rsplit_once('|').ok_or(FrameError::MissingAccount)?;

        if account.is_empty() {
            return Err(FrameError::MissingAccount);
        }
        if id.is_empty() {
            return Err(FrameError::EmptyCorrelationId);
        }

        // A missing trailing space is tolerated as an empty body.
        let (token, body) = rest.split_once(' ').unwrap_or((rest, ""));
        let command_type = CommandType::from_wire(token)
            .ok_or_else(|| FrameError::UnknownCommandType(token.to_string()))?;

        Ok(Self {
            account: account.to_string(),
            correlation_id: CorrelationId::from(id),
            command_type,
            body: body.to_string(),
        })
    }
}

/// Inbound frame: `"<prefix>|<correlationId> <payload>"`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplyFrame {
    /// Everything before the last `|` of the header, if any.
    pub prefix: Option<String>,
    /// Correlation id of the command being answered.
    pub correlation_id: CorrelationId,
    /// Agent payload handed to the submitter verbatim.
    pub payload: String,
}

impl std::fmt::Display for ReplyFrame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if let Some(prefix) = &self.prefix {
            write!(f, "{prefix}|")?;
        }
        write!(f, "{} {}", self.correlation_id, self.payload)
    }
}

impl FromStr for ReplyFrame {
    type Err = FrameError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (header, payload) = s.split_once(' ').ok_or(FrameError::MissingSeparator)?;

        let (prefix, id) = match header.rsplit_once('|') {
            Some((prefix, id)) => (Some(prefix.to_string()), id),
            None => (None, header),
        };

        if id.is_empty() {
            return Err(FrameError::EmptyCorrelationId);
        }

        Ok(Self {
            prefix,
            correlation_id: CorrelationId::from(id),
            payload: payload.to_string(),
        })
    }
}
