//! Application Services
//!
//! Services that orchestrate domain logic and coordinate between ports.
//!
//! - `RequestBuilder`: Validates intents and builds outbound requests
//! - `CorrelationRegistry`: Remembers outstanding request parameters
//! - `InboundDispatcher`: Routes inbound messages by type
//! - `ExecutionReportHandler`: Turns execution reports into order events
//! - `PriceFanout`: Normalizes, stores and publishes prices
//! - `VenueGateway`: Caller-facing request and lifecycle API

mod correlation;
mod dispatcher;
mod execution_reports;
mod gateway;
mod price_fanout;
mod request_builder;

pub use correlation::{CorrelationRegistry, DEFAULT_REQUEST_TTL, RegistryError};
pub use dispatcher::InboundDispatcher;
pub use execution_reports::{DEFAULT_EXEC_ID_MEMORY, ExecutionReportHandler};
pub use gateway::{GatewayError, VenueGateway};
pub use price_fanout::PriceFanout;
pub use request_builder::{PreparedRequest, RequestBuilder, RequestError};
