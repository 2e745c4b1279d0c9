//! Order Execution Types
//!
//! Normalized view of an ExecutionReport and the event kinds it maps to.
//!
//! FIX ExecType (150) values handled:
//! - `0` = New (acknowledged)
//! - `A` = Pending New
//! - `1` = Partial Fill
//! - `2` = Fill
//! - `F` = Trade (classified by OrdStatus)
//! - `4` = Canceled
//! - `8` = Rejected
//! - `C` = Expired

use std::fmt;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

// =============================================================================
// Wire Enumerations
// =============================================================================

/// ExecType (150).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ExecType {
    /// `0`
    New,
    /// `A`
    PendingNew,
    /// `1`
    PartialFill,
    /// `2`
    Fill,
    /// `F`
    Trade,
    /// `4`
    Canceled,
    /// `8`
    Rejected,
    /// `C`
    Expired,
    /// Anything else, kept verbatim.
    Other(String),
}

impl ExecType {
    /// Parse the wire value.
    #[must_use]
    pub fn from_fix(value: &str) -> Self {
        match value {
            "0" => Self::New,
            "A" => Self::PendingNew,
            "1" => Self::PartialFill,
            "2" => Self::Fill,
            "F" => Self::Trade,
            "4" => Self::Canceled,
            "8" => Self::Rejected,
            "C" => Self::Expired,
            other => Self::Other(other.to_string()),
        }
    }

    /// Wire value.
    #[must_use]
    pub fn as_fix(&self) -> &str {
        match self {
            Self::New => "0",
            Self::PendingNew => "A",
            Self::PartialFill => "1",
            Self::Fill => "2",
            Self::Trade => "F",
            Self::Canceled => "4",
            Self::Rejected => "8",
            Self::Expired => "C",
            Self::Other(v) => v,
        }
    }

    /// Event this report represents, given its OrdStatus.
    ///
    /// `Trade` resolves through OrdStatus; anything unrecognized is `None`.
    #[must_use]
    pub fn event_kind(&self, ord_status: &OrdStatus) -> Option<OrderEventKind> {
        match self {
            Self::New => Some(OrderEventKind::Acknowledged),
            Self::PendingNew => Some(OrderEventKind::PendingNew),
            Self::PartialFill => Some(OrderEventKind::PartialFill),
            Self::Fill => Some(OrderEventKind::Fill),
            Self::Canceled => Some(OrderEventKind::Canceled),
            Self::Rejected => Some(OrderEventKind::Rejected),
            Self::Expired => Some(OrderEventKind::Expired),
            Self::Trade => match ord_status {
                OrdStatus::PartiallyFilled => Some(OrderEventKind::PartialFill),
                OrdStatus::Filled => Some(OrderEventKind::Fill),
                _ => None,
            },
            Self::Other(_) => None,
        }
    }
}

impl fmt::Display for ExecType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_fix())
    }
}

/// OrdStatus (39).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OrdStatus {
    /// `0`
    New,
    /// `1`
    PartiallyFilled,
    /// `2`
    Filled,
    /// `4`
    Canceled,
    /// `6`
    PendingCancel,
    /// `8`
    Rejected,
    /// `A`
    PendingNew,
    /// `C`
    Expired,
    /// Anything else, kept verbatim.
    Other(String),
}

impl OrdStatus {
    /// Parse the wire value.
    #[must_use]
    pub fn from_fix(value: &str) -> Self {
        match value {
            "0" => Self::New,
            "1" => Self::PartiallyFilled,
            "2" => Self::Filled,
            "4" => Self::Canceled,
            "6" => Self::PendingCancel,
            "8" => Self::Rejected,
            "A" => Self::PendingNew,
            "C" => Self::Expired,
            other => Self::Other(other.to_string()),
        }
    }
}

/// Side (54).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Side {
    /// `1`
    Buy,
    /// `2`
    Sell,
}

impl Side {
    /// Parse the wire value.
    #[must_use]
    pub fn from_fix(value: &str) -> Option<Self> {
        match value {
            "1" => Some(Self::Buy),
            "2" => Some(Self::Sell),
            _ => None,
        }
    }

    /// Wire value.
    #[must_use]
    pub const fn as_fix(self) -> &'static str {
        match self {
            Self::Buy => "1",
            Self::Sell => "2",
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Buy => "BUY",
            Self::Sell => "SELL",
        })
    }
}

/// Trading flow an order belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SessionType {
    /// Executable streaming prices.
    Esp,
    /// Request for stream / quote.
    Rfs,
}

impl SessionType {
    /// RFS when the report carries a QuoteID, otherwise ESP.
    #[must_use]
    pub const fn from_quote_id(quote_id: Option<&str>) -> Self {
        if quote_id.is_some() { Self::Rfs } else { Self::Esp }
    }
}

// =============================================================================
// Order State & Events
// =============================================================================

/// Order snapshot reconstructed from one ExecutionReport.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OrderState {
    /// ClOrdID (11).
    pub cl_ord_id: String,
    /// OrderID (37).
    pub order_id: Option<String>,
    /// QuoteID (117).
    pub quote_id: Option<String>,
    /// ExecID (17).
    pub exec_id: Option<String>,
    /// ExecType (150).
    pub exec_type: ExecType,
    /// OrdStatus (39), exactly as received.
    pub ord_status: String,
    /// Symbol (55).
    pub symbol: Option<String>,
    /// Side (54).
    pub side: Option<Side>,
    /// OrderQty (38).
    pub quantity: Option<Decimal>,
    /// Price (44).
    pub price: Option<Decimal>,
    /// LastQty (32).
    pub last_qty: Option<Decimal>,
    /// LastPx (31).
    pub last_px: Option<Decimal>,
    /// CumQty (14).
    pub cum_qty: Option<Decimal>,
    /// LeavesQty (151).
    pub leaves_qty: Option<Decimal>,
    /// AvgPx (6).
    pub avg_px: Option<Decimal>,
    /// Currency (15).
    pub currency: Option<String>,
    /// SettlDate (64).
    pub settl_date: Option<String>,
    /// TransactTime (60).
    pub transact_time: Option<String>,
    /// Text (58).
    pub text: Option<String>,
    /// ESP or RFS.
    pub session_type: SessionType,
}

impl OrderState {
    /// OrdStatus parsed.
    #[must_use]
    pub fn status(&self) -> OrdStatus {
        OrdStatus::from_fix(&self.ord_status)
    }
}

/// Callback-level event kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderEventKind {
    /// New order acknowledged; logged only.
    Acknowledged,
    /// Order pending acceptance.
    PendingNew,
    /// Partial execution.
    PartialFill,
    /// Complete execution.
    Fill,
    /// Order canceled.
    Canceled,
    /// Order rejected.
    Rejected,
    /// Order expired.
    Expired,
}

impl OrderEventKind {
    /// Metric / log label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Acknowledged => "acknowledged",
            Self::PendingNew => "pending_new",
            Self::PartialFill => "partial_fill",
            Self::Fill => "fill",
            Self::Canceled => "canceled",
            Self::Rejected => "rejected",
            Self::Expired => "expired",
        }
    }
}

/// Payload delivered to order callbacks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OrderEvent {
    /// Event kind.
    pub kind: OrderEventKind,
    /// Order snapshot.
    pub order: OrderState,
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case("0", "0", Some(OrderEventKind::Acknowledged); "new is acknowledged")]
    #[test_case("A", "A", Some(OrderEventKind::PendingNew); "pending new")]
    #[test_case("1", "1", Some(OrderEventKind::PartialFill); "partial fill")]
    #[test_case("2", "2", Some(OrderEventKind::Fill); "fill")]
    #[test_case("F", "1", Some(OrderEventKind::PartialFill); "trade partially filled")]
    #[test_case("F", "2", Some(OrderEventKind::Fill); "trade filled")]
    #[test_case("F", "0", None; "trade with new status")]
    #[test_case("4", "4", Some(OrderEventKind::Canceled); "canceled")]
    #[test_case("8", "8", Some(OrderEventKind::Rejected); "rejected")]
    #[test_case("C", "C", Some(OrderEventKind::Expired); "expired")]
    #[test_case("5", "0", None; "replace is unhandled")]
    fn classifies_exec_type(exec_type: &str, ord_status: &str, expected: Option<OrderEventKind>) {
        let kind = ExecType::from_fix(exec_type).event_kind(&OrdStatus::from_fix(ord_status));
        assert_eq!(kind, expected);
    }

    #[test]
    fn unknown_exec_type_round_trips() {
        let exec = ExecType::from_fix("I");
        assert_eq!(exec, ExecType::Other("I".into()));
        assert_eq!(exec.as_fix(), "I");
    }

    #[test]
    fn session_type_from_quote_id() {
        assert_eq!(SessionType::from_quote_id(Some("Q1")), SessionType::Rfs);
        assert_eq!(SessionType::from_quote_id(None), SessionType::Esp);
    }

    #[test]
    fn side_wire_values() {
        assert_eq!(Side::from_fix("1"), Some(Side::Buy));
        assert_eq!(Side::Sell.as_fix(), "2");
        assert_eq!(Side::from_fix("X"), None);
    }
}
