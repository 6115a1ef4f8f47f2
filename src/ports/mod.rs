//! Ports Layer - Hexagonal Architecture Boundaries
//!
//! Defines the interfaces (traits) that the usecases layer requires
//! from the outside world. Adapters implement these traits.
//!
//! Port categories:
//! - `Transport`: Publish/subscribe link to the execution agent
//! - `SignalProvider`: Daily advisory signal source
//! - `Clock`: Wall-clock time for trading-day decisions

pub mod clock;
pub mod signal_provider;
pub mod transport;

pub use clock::{Clock, SystemClock};
pub use signal_provider::SignalProvider;
pub use transport::Transport;
