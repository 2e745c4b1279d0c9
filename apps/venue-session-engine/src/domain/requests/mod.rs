//! Request Types
//!
//! Caller intents for quote, market data and trade requests, and the
//! outstanding-request record kept until the venue answers.
//!
//! # Settlement
//!
//! SettlType (63) codes used by the venue:
//! - `0` = Spot
//! - `1` = Today
//! - `2` = Tomorrow
//! - `B` = Broken date (explicit SettlDate required)
//! - tenors such as `W1`, `M1`, `M3` sent verbatim

use std::fmt;

use chrono::{DateTime, Datelike, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::orders::Side;

/// Date format for SettlDate / FixingDate fields.
pub const FIX_DATE_FORMAT: &str = "%Y%m%d";

/// Render a date as `YYYYMMDD`.
#[must_use]
pub fn fix_date(date: NaiveDate) -> String {
    date.format(FIX_DATE_FORMAT).to_string()
}

/// Broken-date value date for market data subscriptions: the 15th of the
/// month after `today`.
#[must_use]
pub fn broken_date_after(today: NaiveDate) -> NaiveDate {
    let (year, month) = if today.month() == 12 {
        (today.year() + 1, 1)
    } else {
        (today.year(), today.month() + 1)
    };
    NaiveDate::from_ymd_opt(year, month, 15).unwrap_or(today)
}

// =============================================================================
// Settlement Type
// =============================================================================

/// SettlType (63).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SettlementType {
    /// `0`
    Spot,
    /// `1`
    Today,
    /// `2`
    Tomorrow,
    /// Named tenor, e.g. `W1`, `M3`.
    Tenor(String),
    /// `B`: explicit date.
    BrokenDate,
}

impl SettlementType {
    /// Parse the wire value.
    #[must_use]
    pub fn from_fix(value: &str) -> Self {
        match value {
            "0" | "SP" | "SPOT" => Self::Spot,
            "1" => Self::Today,
            "2" => Self::Tomorrow,
            "B" => Self::BrokenDate,
            tenor => Self::Tenor(tenor.to_string()),
        }
    }

    /// Wire value.
    #[must_use]
    pub fn as_fix(&self) -> &str {
        match self {
            Self::Spot => "0",
            Self::Today => "1",
            Self::Tomorrow => "2",
            Self::BrokenDate => "B",
            Self::Tenor(tenor) => tenor,
        }
    }

    /// Whether SettlDate must accompany this type.
    #[must_use]
    pub const fn requires_date(&self) -> bool {
        matches!(self, Self::BrokenDate)
    }
}

impl fmt::Display for SettlementType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_fix())
    }
}

// =============================================================================
// Outstanding Request
// =============================================================================

/// What an outstanding request asked for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestKind {
    /// Outright RFS quote.
    Quote,
    /// Swap RFS quote.
    Swap,
    /// Single market data subscription.
    MarketData,
    /// Several (symbol, settlement) pairs in one subscription.
    BatchMarketData,
}

/// Parameters needed to interpret the venue's asynchronous answer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OutstandingRequest {
    /// QuoteReqID / MDReqID.
    pub request_id: String,
    /// Request kind.
    pub kind: RequestKind,
    /// Requested symbols, in request order.
    pub symbols: Vec<String>,
    /// Requested settlement types, in request order.
    pub settlement_types: Vec<SettlementType>,
    /// Dealt currency.
    pub currency: Option<String>,
    /// Non-deliverable request.
    pub ndf: bool,
    /// Registration time.
    pub created_at: DateTime<Utc>,
}

impl OutstandingRequest {
    /// New record stamped now.
    #[must_use]
    pub fn new(
        request_id: impl Into<String>,
        kind: RequestKind,
        symbols: Vec<String>,
        settlement_types: Vec<SettlementType>,
    ) -> Self {
        Self {
            request_id: request_id.into(),
            kind,
            symbols,
            settlement_types,
            currency: None,
            ndf: false,
            created_at: Utc::now(),
        }
    }

    /// Set the dealt currency.
    #[must_use]
    pub fn with_currency(mut self, currency: Option<String>) -> Self {
        self.currency = currency;
        self
    }

    /// Mark as non-deliverable.
    #[must_use]
    pub const fn with_ndf(mut self, ndf: bool) -> Self {
        self.ndf = ndf;
        self
    }

    /// First (or only) symbol.
    #[must_use]
    pub fn primary_symbol(&self) -> Option<&str> {
        self.symbols.first().map(String::as_str)
    }

    /// First (or only) settlement type.
    #[must_use]
    pub fn primary_settlement(&self) -> Option<&SettlementType> {
        self.settlement_types.first()
    }
}

// =============================================================================
// Intents
// =============================================================================

/// Non-deliverable flag and fixing dates shared by NDF/NDS intents.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NdfTerms {
    /// Request a non-deliverable instrument.
    pub enabled: bool,
    /// FixingDate (6203); required when `enabled`.
    pub fixing_date: Option<NaiveDate>,
    /// FixingDate2 (6204), far leg of an NDS.
    pub far_fixing_date: Option<NaiveDate>,
}

impl NdfTerms {
    /// Deliverable (no NDF block).
    pub const DELIVERABLE: Self = Self {
        enabled: false,
        fixing_date: None,
        far_fixing_date: None,
    };

    /// Single-leg NDF fixing on `fixing_date`.
    #[must_use]
    pub const fn fixing_on(fixing_date: NaiveDate) -> Self {
        Self {
            enabled: true,
            fixing_date: Some(fixing_date),
            far_fixing_date: None,
        }
    }
}

/// Outright (spot, forward or NDF) RFS quote request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuoteIntent {
    /// Currency pair, e.g. `EUR/USD`.
    pub symbol: String,
    /// Side; `None` requests a two-way quote.
    pub side: Option<Side>,
    /// Quantity in `currency`.
    pub quantity: Decimal,
    /// Dealt currency.
    pub currency: String,
    /// Settlement type.
    pub settlement: SettlementType,
    /// Required for broken dates.
    pub settlement_date: Option<NaiveDate>,
    /// NDF terms; `DELIVERABLE` for normal forwards.
    pub ndf: NdfTerms,
    /// Direct the request to one liquidity provider.
    pub counterparty: Option<String>,
}

/// One leg of a swap.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SwapLeg {
    /// Settlement type.
    pub settlement: SettlementType,
    /// Required for broken dates.
    pub settlement_date: Option<NaiveDate>,
    /// Leg quantity.
    pub quantity: Decimal,
}

/// Swap (or NDS) RFS quote request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SwapQuoteIntent {
    /// Currency pair.
    pub symbol: String,
    /// Side of the far leg; `None` requests a two-way quote.
    pub side: Option<Side>,
    /// Dealt currency.
    pub currency: String,
    /// Near leg.
    pub near: SwapLeg,
    /// Far leg.
    pub far: SwapLeg,
    /// NDS terms; `DELIVERABLE` for normal swaps.
    pub ndf: NdfTerms,
    /// Direct the request to one liquidity provider.
    pub counterparty: Option<String>,
}

/// ESP new order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EspTradeIntent {
    /// Currency pair.
    pub symbol: String,
    /// Side.
    pub side: Side,
    /// Quantity.
    pub quantity: Decimal,
    /// Dealt currency.
    pub currency: String,
    /// Limit / quoted price.
    pub price: Decimal,
    /// Settlement type.
    pub settlement: SettlementType,
    /// Required for broken dates.
    pub settlement_date: Option<NaiveDate>,
    /// Streamed QuoteID being hit, if any.
    pub quote_id: Option<String>,
    /// NDF terms; `DELIVERABLE` for normal orders.
    pub ndf: NdfTerms,
}

/// Trade on an RFS outright quote.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RfsTradeIntent {
    /// QuoteID being accepted.
    pub quote_id: String,
    /// Currency pair.
    pub symbol: String,
    /// Side.
    pub side: Side,
    /// Quantity.
    pub quantity: Decimal,
    /// Dealt currency.
    pub currency: String,
    /// Quoted price.
    pub price: Decimal,
    /// Settlement type.
    pub settlement: SettlementType,
    /// Required for broken dates.
    pub settlement_date: Option<NaiveDate>,
    /// NDF terms; `DELIVERABLE` for normal trades.
    pub ndf: NdfTerms,
}

/// One priced leg of a swap trade.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SwapTradeLeg {
    /// Settlement type.
    pub settlement: SettlementType,
    /// Required for broken dates.
    pub settlement_date: Option<NaiveDate>,
    /// Leg quantity.
    pub quantity: Decimal,
    /// Leg all-in price.
    pub price: Option<Decimal>,
}

/// Trade on an RFS swap quote.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RfsSwapTradeIntent {
    /// QuoteID being accepted.
    pub quote_id: String,
    /// Currency pair.
    pub symbol: String,
    /// Side of the far leg.
    pub side: Side,
    /// Dealt currency.
    pub currency: String,
    /// Near leg.
    pub near: SwapTradeLeg,
    /// Far leg.
    pub far: SwapTradeLeg,
    /// NDS terms; `DELIVERABLE` for normal swaps.
    pub ndf: NdfTerms,
}
