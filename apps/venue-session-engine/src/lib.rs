#![cfg_attr(
    test,
    allow(
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::float_cmp,
        clippy::significant_drop_tightening,
        clippy::too_many_lines,
        clippy::match_same_arms,
        clippy::needless_pass_by_value,
        clippy::option_if_let_else,
        clippy::items_after_statements,
        clippy::or_fun_call
    )
)]

//! Venue Session Engine - FIX Connectivity for an FX Venue
//!
//! Maintains long-lived FIX 4.4 sessions to an FX pricing and trading venue,
//! turns caller intents into quote, market data and trade requests, and fans
//! inbound prices and execution reports out to a price store and callbacks.
//!
//! # Layers (inside → outside)
//!
//! - **Domain**: Venue-independent types
//!   - `orders`: Execution types, order state and events
//!   - `pricing`: Price entries, instrument classification, store keys
//!   - `requests`: Request intents, settlement types, outstanding requests
//!
//! - **Application**: Use cases and port definitions
//!   - `ports`: Price store and subscriber callback interfaces
//!   - `services`: Request building, correlation, inbound dispatch, gateway
//!
//! - **Infrastructure**: Adapters and external integrations
//!   - `fix`: Codec, transport, session state machine, sequence store
//!   - `store`: In-memory price store
//!   - `config`: Environment configuration
//!   - `health`: Health check HTTP endpoint
//!   - `metrics` / `telemetry`: Prometheus metrics and tracing setup
//!
//! # Data Flow
//!
//! ```text
//! caller ──► VenueGateway ──► RequestBuilder ──► SessionController ──► venue
//!                 │                                      │
//!                 └──► CorrelationRegistry ◄──┐          ▼
//!                                             InboundDispatcher
//!                                    ┌────────────┴────────────┐
//!                                    ▼                         ▼
//!                               PriceFanout          ExecutionReportHandler
//!                          (PriceStore + listener)      (order callbacks)
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::pedantic)]

// =============================================================================
// Module Declarations
// =============================================================================

/// Domain layer - Core types with no wire-format dependencies.
pub mod domain;

/// Application layer - Use cases and port definitions.
pub mod application;

/// Infrastructure layer - Adapters and external integrations.
pub mod infrastructure;

// =============================================================================
// Re-exports
// =============================================================================

// Domain types
pub use domain::orders::{ExecType, OrdStatus, OrderEvent, OrderEventKind, OrderState, SessionType, Side};
pub use domain::pricing::{InstrumentType, PriceEntry, PriceKey, PriceQuote, PriceSide};
pub use domain::requests::{
    EspTradeIntent, NdfTerms, OutstandingRequest, QuoteIntent, RequestKind, RfsSwapTradeIntent,
    RfsTradeIntent, SettlementType, SwapLeg, SwapQuoteIntent, SwapTradeLeg,
};

// Application services
pub use application::ports::{ExecutionCallbacks, PriceCallback, PriceStore};
pub use application::services::{
    CorrelationRegistry, ExecutionReportHandler, GatewayError, InboundDispatcher, PriceFanout,
    RequestBuilder, RequestError, VenueGateway,
};

// Infrastructure config
pub use infrastructure::config::{ConfigError, EngineConfig, ServerSettings, SessionRole, SessionSettings};

// FIX session
pub use infrastructure::fix::{
    Credentials, FileSequenceStore, SessionConfig, SessionController, SessionError, SessionPhase,
    SessionStatus, TlsMode, TransportConfig,
};

// Health server
pub use infrastructure::health::{HealthServer, HealthServerError, HealthServerState, SessionStatusSource};

// Price store
pub use infrastructure::store::InMemoryPriceStore;

// Metrics
pub use infrastructure::metrics::init_metrics;

// Telemetry
pub use infrastructure::telemetry::{TelemetryConfig, TelemetryGuard, init as init_telemetry};
