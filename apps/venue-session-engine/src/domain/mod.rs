//! Domain Layer - Core trading and pricing types.
//!
//! This layer contains the venue-independent types the engine produces and
//! consumes: price entries, order events and request intents. Nothing here
//! touches the wire format.

/// Order execution types (exec type, order status, order events).
pub mod orders;

/// Price entries, instrument classification and store keys.
pub mod pricing;

/// Request intents, settlement types and outstanding requests.
pub mod requests;
