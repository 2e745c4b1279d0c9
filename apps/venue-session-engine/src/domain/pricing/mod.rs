//! Price Types
//!
//! Normalized price entries extracted from Quote and MarketData messages,
//! and the key under which the latest rate is stored.

use std::fmt;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Settlement codes treated as spot.
pub const SPOT_SETTLEMENT_CODES: &[&str] = &["0", "SP", "SPOT"];

/// SecurityType (167) marking a non-deliverable instrument.
pub const NDF_SECURITY_TYPE: &str = "FXNDF";

// =============================================================================
// Instrument Type
// =============================================================================

/// FX instrument an entry prices.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum InstrumentType {
    /// Spot.
    Spot,
    /// Outright forward.
    Forward,
    /// Deliverable swap.
    Swap,
    /// Non-deliverable forward.
    Ndf,
    /// Non-deliverable swap.
    Nds,
}

impl InstrumentType {
    /// Classify from SettlType, SecurityType and whether a far leg is present.
    ///
    /// Non-deliverable security type wins, then the far leg, then the spot
    /// settlement codes; everything else is a forward.
    #[must_use]
    pub fn classify(settl_type: Option<&str>, security_type: Option<&str>, has_second_leg: bool) -> Self {
        let non_deliverable = security_type == Some(NDF_SECURITY_TYPE);
        match (non_deliverable, has_second_leg) {
            (true, false) => Self::Ndf,
            (true, true) => Self::Nds,
            (false, true) => Self::Swap,
            (false, false) => match settl_type {
                Some(code) if SPOT_SETTLEMENT_CODES.contains(&code) => Self::Spot,
                _ => Self::Forward,
            },
        }
    }

    /// Upper-case label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Spot => "SPOT",
            Self::Forward => "FORWARD",
            Self::Swap => "SWAP",
            Self::Ndf => "NDF",
            Self::Nds => "NDS",
        }
    }
}

impl fmt::Display for InstrumentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Price Side
// =============================================================================

/// MDEntryType (269) sides accepted for storage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum PriceSide {
    /// `0`
    Bid,
    /// `1`
    Ask,
    /// `H`
    Mid,
}

impl PriceSide {
    /// Parse MDEntryType; other entry types are not prices.
    #[must_use]
    pub fn from_entry_type(value: &str) -> Option<Self> {
        match value {
            "0" => Some(Self::Bid),
            "1" => Some(Self::Ask),
            "H" => Some(Self::Mid),
            _ => None,
        }
    }

    /// MDEntryType wire value.
    #[must_use]
    pub const fn as_entry_type(self) -> &'static str {
        match self {
            Self::Bid => "0",
            Self::Ask => "1",
            Self::Mid => "H",
        }
    }
}

impl fmt::Display for PriceSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Bid => "BID",
            Self::Ask => "ASK",
            Self::Mid => "MID",
        })
    }
}

// =============================================================================
// Store Key / Value
// =============================================================================

/// Address of one stored rate.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PriceKey {
    /// Currency pair.
    pub symbol: String,
    /// Instrument type.
    pub instrument_type: InstrumentType,
    /// Band quantity.
    pub quantity: Decimal,
    /// Side.
    pub side: PriceSide,
    /// Settlement tag (SettlType or tenor).
    pub settlement: String,
    /// Liquidity provider.
    pub provider: String,
}

impl fmt::Display for PriceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}:{}:{}:{}:{}",
            self.symbol, self.instrument_type, self.quantity, self.side, self.settlement, self.provider
        )
    }
}

/// Stored value: latest rate and its timestamp.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceQuote {
    /// Rate.
    pub rate: Decimal,
    /// When the venue stamped it.
    pub timestamp: DateTime<Utc>,
}

// =============================================================================
// Price Entry
// =============================================================================

/// One normalized price, as delivered to subscribers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PriceEntry {
    /// Currency pair.
    pub symbol: String,
    /// Instrument type.
    pub instrument_type: InstrumentType,
    /// Side.
    pub side: PriceSide,
    /// Settlement tag.
    pub settlement: String,
    /// Liquidity provider (MDEntryOriginator).
    pub provider: String,
    /// Band quantity (MDEntrySize).
    pub quantity: Decimal,
    /// Rate (MDEntryPx).
    pub rate: Decimal,
    /// Forward points, when quoted.
    pub forward_points: Option<Decimal>,
    /// Value date (SettlDate), when quoted.
    pub value_date: Option<String>,
    /// Venue timestamp.
    pub timestamp: DateTime<Utc>,
    /// QuoteID for RFS streams.
    pub quote_id: Option<String>,
    /// Originating QuoteReqID / MDReqID.
    pub request_id: Option<String>,
}

impl PriceEntry {
    /// Store key for this entry.
    #[must_use]
    pub fn key(&self) -> PriceKey {
        PriceKey {
            symbol: self.symbol.clone(),
            instrument_type: self.instrument_type,
            quantity: self.quantity,
            side: self.side,
            settlement: self.settlement.clone(),
            provider: self.provider.clone(),
        }
    }

    /// Stored value for this entry.
    #[must_use]
    pub const fn quote(&self) -> PriceQuote {
        PriceQuote {
            rate: self.rate,
            timestamp: self.timestamp,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case(Some("0"), None, false, InstrumentType::Spot; "spot code 0")]
    #[test_case(Some("SP"), None, false, InstrumentType::Spot; "spot code SP")]
    #[test_case(Some("SPOT"), None, false, InstrumentType::Spot; "spot code SPOT")]
    #[test_case(Some("M1"), None, false, InstrumentType::Forward; "tenor is forward")]
    #[test_case(None, None, false, InstrumentType::Forward; "missing settlement is forward")]
    #[test_case(Some("0"), None, true, InstrumentType::Swap; "second leg is swap")]
    #[test_case(Some("M1"), Some("FXNDF"), false, InstrumentType::Ndf; "ndf")]
    #[test_case(Some("M1"), Some("FXNDF"), true, InstrumentType::Nds; "nds")]
    #[test_case(Some("0"), Some("FXSPOT"), false, InstrumentType::Spot; "other security type")]
    fn classifies_instrument(
        settl_type: Option<&str>,
        security_type: Option<&str>,
        second_leg: bool,
        expected: InstrumentType,
    ) {
        assert_eq!(InstrumentType::classify(settl_type, security_type, second_leg), expected);
    }

    #[test]
    fn entry_types_outside_bid_offer_mid_are_rejected() {
        assert_eq!(PriceSide::from_entry_type("0"), Some(PriceSide::Bid));
        assert_eq!(PriceSide::from_entry_type("1"), Some(PriceSide::Ask));
        assert_eq!(PriceSide::from_entry_type("H"), Some(PriceSide::Mid));
        assert_eq!(PriceSide::from_entry_type("2"), None);
        assert_eq!(PriceSide::from_entry_type("B"), None);
    }

    #[test]
    fn key_display_joins_components() {
        let key = PriceKey {
            symbol: "EUR/USD".into(),
            instrument_type: InstrumentType::Spot,
            quantity: Decimal::new(1_000_000, 0),
            side: PriceSide::Bid,
            settlement: "0".into(),
            provider: "LP1".into(),
        };
        assert_eq!(key.to_string(), "EUR/USD:SPOT:1000000:BID:0:LP1");
    }
}
