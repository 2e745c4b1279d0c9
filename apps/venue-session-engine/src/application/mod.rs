//! Application Layer - Use cases and port definitions.
//!
//! This layer contains the application services and port interfaces
//! that define how the engine interacts with external systems.

/// Port interfaces for external systems (price store, subscriber callbacks).
pub mod ports;

/// Application services: request building, correlation, dispatch and fanout.
pub mod services;
