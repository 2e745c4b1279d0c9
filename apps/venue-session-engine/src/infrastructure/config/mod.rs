//! Configuration Module
//!
//! Environment-driven configuration for the session engine.

mod settings;

pub use settings::{ConfigError, EngineConfig, ServerSettings, SessionRole, SessionSettings};
