//! Use Cases Layer - Command/Response Correlation Engine
//!
//! Orchestrates domain types with the port interfaces to turn the
//! agent's fire-and-forget publish/subscribe link into awaitable
//! request/response calls.
//!
//! Use cases:
//! - `EngineHandle`: Command submission API returning `ReplyFuture`s
//! - `CommandQueue`: FIFO of accepted, unsent commands
//! - `PendingReplyTable`: Correlation id to completion handle map
//! - `DispatchLoop`: Single task owning the transport
//! - `SignalPoller`: Daily advisory check that submits Open commands
//! - `EngineStats`: Event counters for health and metrics

pub mod command_queue;
pub mod dispatch_loop;
pub mod engine;
pub mod pending_replies;
pub mod signal_poller;
pub mod stats;

pub use dispatch_loop::DispatchLoop;
pub use engine::{EngineHandle, EngineState, ReplyFuture};
pub use signal_poller::{PollOutcome, PollerState, SignalPoller};
pub use stats::StatsSnapshot;
