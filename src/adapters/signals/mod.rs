//! Advisory Signal Adapters
//!
//! Implements the `SignalProvider` port against the external advisory
//! service consulted once per trading day.

pub mod http_provider;

pub use http_provider::HttpSignalProvider;
