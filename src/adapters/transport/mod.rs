//! Execution Agent Transport Adapters
//!
//! Implementations of the `Transport` port:
//! - `ZmqTransport`: ZeroMQ PUB/SUB sockets to the live agent
//! - `LoopbackTransport`: in-process channels for dry-run mode and tests

pub mod loopback;
pub mod zmq;

pub use loopback::{LoopbackPeer, LoopbackTransport};
pub use zmq::ZmqTransport;
