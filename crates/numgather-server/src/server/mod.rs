//! Server-side components of the `numgather` HTTP front end.
//!
//! - [`config`] - CLI and environment configuration.
//! - [`handler`] - Axum router and the `/numbers` batch endpoint.
//! - [`telemetry`] - Logging initialization and optional OpenTelemetry export.

pub mod config;
pub mod handler;
pub mod telemetry;
