//! Infrastructure Layer - Adapters and external integrations.
//!
//! This layer contains the venue connectivity and the concrete
//! implementations of the port interfaces defined in the application layer.

/// Environment-driven configuration.
pub mod config;

/// FIX 4.4 codec, transport and session management.
pub mod fix;

/// Health check HTTP endpoint.
pub mod health;

/// Prometheus metrics instrumentation.
pub mod metrics;

/// Price store adapters.
pub mod store;

/// Tracing and OpenTelemetry setup.
pub mod telemetry;
