//! Domain layer - Core types and wire grammar.
//!
//! Pure types for commands, correlation ids, wire frames and advisory
//! signals. Nothing here touches sockets, clocks or tasks
//! (hexagonal architecture inner ring).

pub mod command;
pub mod error;
pub mod frame;
pub mod signal;

// Re-export core types for convenience
pub use command::{Command, CommandType, CorrelationId, DEFAULT_COMMAND_TIMEOUT};
pub use error::{EngineError, TransportError};
pub use frame::{CommandFrame, FrameError, ReplyFrame};
pub use signal::{DailySignal, Direction};
