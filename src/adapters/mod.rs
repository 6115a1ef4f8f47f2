//! Adapters Layer - Hexagonal Architecture Outer Ring
//!
//! Implements the port traits defined in `crate::ports` with concrete
//! external dependencies (ZeroMQ sockets, HTTP clients, axum servers).
//! Each sub-module groups adapters by infrastructure concern.
//!
//! Adapter categories:
//! - `api`: Manual trading routes
//! - `metrics`: Prometheus metrics export and health checks
//! - `signals`: Advisory provider REST client
//! - `transport`: ZeroMQ and loopback links to the execution agent

pub mod api;
pub mod metrics;
pub mod signals;
pub mod transport;
