//! Trading HTTP Adapter
//!
//! Manual trading routes served next to the health probes. They feed
//! the same `EngineHandle` the signal poller uses.
//!
//! Sub-modules:
//! - `trading`: `POST /api/trading/open` and `POST /api/trading/close`

pub mod trading;

pub use trading::{router, TradingState};
