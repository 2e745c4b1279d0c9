//! Application Ports (Driver and Driven)
//!
//! Ports define interfaces for interacting with external systems.
//! - **Driver Ports** (Primary/Inbound): callbacks registered by the web layer
//!   to receive prices and order events
//! - **Driven Ports** (Secondary/Outbound): the external latest-price store

mod callbacks;
mod price_store_port;

pub use callbacks::{ExecutionCallbacks, ExecutionCallbacksBuilder, OrderCallback, PriceCallback};
pub use price_store_port::{PriceStore, PriceStoreError};

#[cfg(test)]
pub use price_store_port::MockPriceStore;
