//! Venue Gateway
//!
//! Caller-facing API over a pricing session and a trading session (which
//! may be the same session).
//!
//! Quote and market data requests go out on the pricing session and are
//! registered in the [`CorrelationRegistry`] before sending. Trades go out
//! on the trading session and return their ClOrdID.
//!
//! Errors separate "not connected" (retry after reconnect) from "invalid
//! request" (fix the input) from a failed send.

use std::sync::Arc;

use chrono::Utc;

use crate::application::services::{CorrelationRegistry, PreparedRequest, RegistryError, RequestBuilder, RequestError};
use crate::domain::requests::{
    EspTradeIntent, QuoteIntent, RfsSwapTradeIntent, RfsTradeIntent, SettlementType, SwapQuoteIntent,
};
use crate::infrastructure::fix::{Credentials, SessionController, SessionError, SessionStatus};

/// Gateway failures.
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    /// The session that would carry the request is not logged on.
    #[error("session {session} is not connected")]
    NotConnected {
        /// Session name.
        session: String,
    },

    /// The request failed validation; nothing was sent.
    #[error(transparent)]
    InvalidRequest(#[from] RequestError),

    /// The generated id collided with an outstanding request.
    #[error(transparent)]
    Registry(#[from] RegistryError),

    /// The message could not be sent.
    #[error("send failed: {0}")]
    Send(#[source] SessionError),

    /// Connect, logon or logout failed.
    #[error(transparent)]
    Session(#[from] SessionError),
}

/// Entry point for the web layer.
#[derive(Debug)]
pub struct VenueGateway {
    pricing: Arc<SessionController>,
    trading: Arc<SessionController>,
    builder: RequestBuilder,
    registry: Arc<CorrelationRegistry>,
}

impl VenueGateway {
    /// Create a gateway. Pass the same session twice for a single-session
    /// venue.
    #[must_use]
    pub const fn new(
        pricing: Arc<SessionController>,
        trading: Arc<SessionController>,
        builder: RequestBuilder,
        registry: Arc<CorrelationRegistry>,
    ) -> Self {
        Self {
            pricing,
            trading,
            builder,
            registry,
        }
    }

    /// Distinct sessions, pricing first.
    #[must_use]
    pub fn sessions(&self) -> Vec<Arc<SessionController>> {
        if Arc::ptr_eq(&self.pricing, &self.trading) {
            vec![Arc::clone(&self.pricing)]
        } else {
            vec![Arc::clone(&self.pricing), Arc::clone(&self.trading)]
        }
    }

    /// Status of every session.
    #[must_use]
    pub fn status(&self) -> Vec<SessionStatus> {
        self.sessions().iter().map(|s| s.status()).collect()
    }

    /// Shared correlation registry.
    #[must_use]
    pub const fn registry(&self) -> &Arc<CorrelationRegistry> {
        &self.registry
    }

    // -------------------------------------------------------------------------
    // Lifecycle
    // -------------------------------------------------------------------------

    /// Log every session on with the same credentials.
    ///
    /// # Errors
    ///
    /// Returns the first session failure. Failed sessions keep retrying in
    /// the background.
    pub async fn logon(&self, username: &str, password: &str) -> Result<(), GatewayError> {
        let mut first_error = None;
        for session in self.sessions() {
            if let Err(e) = session.logon(Credentials::new(username, password)).await {
                first_error.get_or_insert(e);
            }
        }
        first_error.map_or(Ok(()), |e| Err(e.into()))
    }

    /// Connect every session with its stored credentials.
    ///
    /// # Errors
    ///
    /// Returns the first session failure.
    pub async fn connect(&self) -> Result<(), GatewayError> {
        let mut first_error = None;
        for session in self.sessions() {
            if let Err(e) = session.connect().await {
                first_error.get_or_insert(e);
            }
        }
        first_error.map_or(Ok(()), |e| Err(e.into()))
    }

    /// Log out of every session.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::NotLoggedOn` if a session was not logged on.
    pub async fn logout(&self) -> Result<(), GatewayError> {
        let mut first_error = None;
        for session in self.sessions() {
            if let Err(e) = session.logout().await {
                first_error.get_or_insert(e);
            }
        }
        first_error.map_or(Ok(()), |e| Err(e.into()))
    }

    /// Disconnect every session without logging out.
    pub async fn disconnect(&self) {
        for session in self.sessions() {
            session.disconnect().await;
        }
    }

    // -------------------------------------------------------------------------
    // Requests
    // -------------------------------------------------------------------------

    /// Outright RFS quote request. Returns the QuoteReqID.
    ///
    /// # Errors
    ///
    /// Returns `InvalidRequest`, `NotConnected` or `Send`.
    pub async fn request_quote(&self, intent: &QuoteIntent) -> Result<String, GatewayError> {
        let prepared = self.builder.quote_request(intent)?;
        self.submit(&self.pricing, prepared).await
    }

    /// Swap RFS quote request. Returns the QuoteReqID.
    ///
    /// # Errors
    ///
    /// Returns `InvalidRequest`, `NotConnected` or `Send`.
    pub async fn request_swap_quote(&self, intent: &SwapQuoteIntent) -> Result<String, GatewayError> {
        let prepared = self.builder.swap_quote_request(intent)?;
        self.submit(&self.pricing, prepared).await
    }

    /// Subscribe ESP prices for one symbol. Returns the MDReqID.
    ///
    /// # Errors
    ///
    /// Returns `InvalidRequest`, `NotConnected` or `Send`.
    pub async fn request_esp_prices(
        &self,
        symbol: &str,
        settlement: SettlementType,
        ndf: bool,
    ) -> Result<String, GatewayError> {
        self.request_esp_prices_batch(&[symbol.to_string()], &[settlement], ndf)
            .await
    }

    /// Subscribe ESP prices for every (symbol, settlement) pair in one
    /// message. Returns the MDReqID.
    ///
    /// # Errors
    ///
    /// Returns `InvalidRequest`, `NotConnected` or `Send`.
    pub async fn request_esp_prices_batch(
        &self,
        symbols: &[String],
        settlement_types: &[SettlementType],
        ndf: bool,
    ) -> Result<String, GatewayError> {
        let today = Utc::now().date_naive();
        let prepared = self
            .builder
            .market_data_request(symbols, settlement_types, ndf, today)?;
        self.submit(&self.pricing, prepared).await
    }

    /// ESP trade. Returns the ClOrdID.
    ///
    /// # Errors
    ///
    /// Returns `InvalidRequest`, `NotConnected` or `Send`.
    pub async fn request_esp_trade(&self, intent: &EspTradeIntent) -> Result<String, GatewayError> {
        let prepared = self.builder.esp_order(intent, Utc::now())?;
        self.submit(&self.trading, prepared).await
    }

    /// RFS outright trade. Returns the ClOrdID.
    ///
    /// # Errors
    ///
    /// Returns `InvalidRequest`, `NotConnected` or `Send`.
    pub async fn request_rfs_trade(&self, intent: &RfsTradeIntent) -> Result<String, GatewayError> {
        let prepared = self.builder.rfs_trade(intent, Utc::now())?;
        self.submit(&self.trading, prepared).await
    }

    /// RFS swap trade. Returns the ClOrdID.
    ///
    /// # Errors
    ///
    /// Returns `InvalidRequest`, `NotConnected` or `Send`.
    pub async fn request_rfs_swap_trade(&self, intent: &RfsSwapTradeIntent) -> Result<String, GatewayError> {
        let prepared = self.builder.rfs_swap_trade(intent, Utc::now())?;
        self.submit(&self.trading, prepared).await
    }

    /// Register (if needed) and send. A failed send unregisters.
    async fn submit(&self, session: &SessionController, prepared: PreparedRequest) -> Result<String, GatewayError> {
        if !session.is_logged_on() {
            return Err(GatewayError::NotConnected {
                session: session.name().to_string(),
            });
        }

        let PreparedRequest {
            id,
            message,
            outstanding,
        } = prepared;
        let registered = outstanding.is_some();
        if let Some(outstanding) = outstanding {
            self.registry.register(outstanding)?;
        }

        match session.send(message).await {
            Ok(seq) => {
                tracing::info!(session = %session.name(), request_id = %id, seq, "Request sent");
                Ok(id)
            }
            Err(e) => {
                if registered {
                    self.registry.remove(&id);
                }
                tracing::warn!(session = %session.name(), request_id = %id, error = %e, "Request send failed");
                Err(match e {
                    SessionError::NotConnected | SessionError::NotLoggedOn => GatewayError::NotConnected {
                        session: session.name().to_string(),
                    },
                    other => GatewayError::Send(other),
                })
            }
        }
    }
}
