//! FIX Tags and Message Types
//!
//! The fixed tag dictionary used by the venue integration. Only the tags the
//! engine reads or writes are listed; this is not a general FIX dictionary.
//!
//! Tags in the 6000+ range are venue-defined extensions for the far leg of
//! swaps and for NDF fixing dates.

use std::fmt;

/// Protocol version sent in BeginString (8).
pub const BEGIN_STRING: &str = "FIX.4.4";

/// Field delimiter on the wire.
pub const SOH: u8 = 0x01;

/// Field delimiter used when rendering messages for logs.
pub const LOG_DELIMITER: char = '|';

/// PartyRole (452) for the liquidity provider.
pub const PARTY_ROLE_LIQUIDITY_PROVIDER: &str = "35";

/// PartyIDSource (447) for proprietary identifiers.
pub const PARTY_ID_SOURCE_PROPRIETARY: &str = "D";

// =============================================================================
// Header / Trailer
// =============================================================================

/// BeginString.
pub const BEGIN_STRING_TAG: u32 = 8;
/// BodyLength.
pub const BODY_LENGTH: u32 = 9;
/// CheckSum.
pub const CHECKSUM: u32 = 10;
/// MsgSeqNum.
pub const MSG_SEQ_NUM: u32 = 34;
/// MsgType.
pub const MSG_TYPE: u32 = 35;
/// PossDupFlag.
pub const POSS_DUP_FLAG: u32 = 43;
/// SenderCompID.
pub const SENDER_COMP_ID: u32 = 49;
/// SendingTime.
pub const SENDING_TIME: u32 = 52;
/// TargetCompID.
pub const TARGET_COMP_ID: u32 = 56;
/// OrigSendingTime.
pub const ORIG_SENDING_TIME: u32 = 122;

// =============================================================================
// Session
// =============================================================================

/// BeginSeqNo.
pub const BEGIN_SEQ_NO: u32 = 7;
/// EndSeqNo.
pub const END_SEQ_NO: u32 = 16;
/// NewSeqNo.
pub const NEW_SEQ_NO: u32 = 36;
/// RefSeqNum.
pub const REF_SEQ_NUM: u32 = 45;
/// Text.
pub const TEXT: u32 = 58;
/// EncryptMethod.
pub const ENCRYPT_METHOD: u32 = 98;
/// HeartBtInt.
pub const HEART_BT_INT: u32 = 108;
/// TestReqID.
pub const TEST_REQ_ID: u32 = 112;
/// GapFillFlag.
pub const GAP_FILL_FLAG: u32 = 123;
/// ResetSeqNumFlag.
pub const RESET_SEQ_NUM_FLAG: u32 = 141;
/// SessionRejectReason.
pub const SESSION_REJECT_REASON: u32 = 373;
/// Username.
pub const USERNAME: u32 = 553;
/// Password.
pub const PASSWORD: u32 = 554;

// =============================================================================
// Instrument / Order
// =============================================================================

/// AvgPx.
pub const AVG_PX: u32 = 6;
/// ClOrdID.
pub const CL_ORD_ID: u32 = 11;
/// CumQty.
pub const CUM_QTY: u32 = 14;
/// Currency.
pub const CURRENCY: u32 = 15;
/// ExecID.
pub const EXEC_ID: u32 = 17;
/// LastPx.
pub const LAST_PX: u32 = 31;
/// LastQty.
pub const LAST_QTY: u32 = 32;
/// OrderID.
pub const ORDER_ID: u32 = 37;
/// OrderQty.
pub const ORDER_QTY: u32 = 38;
/// OrdStatus.
pub const ORD_STATUS: u32 = 39;
/// OrdType.
pub const ORD_TYPE: u32 = 40;
/// Price.
pub const PRICE: u32 = 44;
/// Side.
pub const SIDE: u32 = 54;
/// Symbol.
pub const SYMBOL: u32 = 55;
/// TimeInForce.
pub const TIME_IN_FORCE: u32 = 59;
/// TransactTime.
pub const TRANSACT_TIME: u32 = 60;
/// SettlType.
pub const SETTL_TYPE: u32 = 63;
/// SettlDate.
pub const SETTL_DATE: u32 = 64;
/// ExecType.
pub const EXEC_TYPE: u32 = 150;
/// LeavesQty.
pub const LEAVES_QTY: u32 = 151;
/// SecurityType.
pub const SECURITY_TYPE: u32 = 167;
/// OrderQty2.
pub const ORDER_QTY_2: u32 = 192;
/// SettlDate2.
pub const SETTL_DATE_2: u32 = 193;
/// LastForwardPoints.
pub const LAST_FORWARD_POINTS: u32 = 195;
/// Price2.
pub const PRICE_2: u32 = 640;

// =============================================================================
// Quotes
// =============================================================================

/// QuoteID.
pub const QUOTE_ID: u32 = 117;
/// QuoteReqID.
pub const QUOTE_REQ_ID: u32 = 131;
/// NoRelatedSym.
pub const NO_RELATED_SYM: u32 = 146;
/// QuoteRequestRejectReason.
pub const QUOTE_REQUEST_REJECT_REASON: u32 = 658;
/// QuoteRespID.
pub const QUOTE_RESP_ID: u32 = 693;
/// QuoteRespType.
pub const QUOTE_RESP_TYPE: u32 = 694;

// =============================================================================
// Market Data
// =============================================================================

/// MDReqID.
pub const MD_REQ_ID: u32 = 262;
/// SubscriptionRequestType.
pub const SUBSCRIPTION_REQUEST_TYPE: u32 = 263;
/// MarketDepth.
pub const MARKET_DEPTH: u32 = 264;
/// MDUpdateType.
pub const MD_UPDATE_TYPE: u32 = 265;
/// NoMDEntryTypes.
pub const NO_MD_ENTRY_TYPES: u32 = 267;
/// NoMDEntries.
pub const NO_MD_ENTRIES: u32 = 268;
/// MDEntryType.
pub const MD_ENTRY_TYPE: u32 = 269;
/// MDEntryPx.
pub const MD_ENTRY_PX: u32 = 270;
/// MDEntrySize.
pub const MD_ENTRY_SIZE: u32 = 271;
/// MDEntryDate.
pub const MD_ENTRY_DATE: u32 = 272;
/// MDEntryTime.
pub const MD_ENTRY_TIME: u32 = 273;
/// MDUpdateAction.
pub const MD_UPDATE_ACTION: u32 = 279;
/// MDReqRejReason.
pub const MD_REQ_REJ_REASON: u32 = 281;
/// MDEntryOriginator.
pub const MD_ENTRY_ORIGINATOR: u32 = 282;
/// MDEntryForwardPoints.
pub const MD_ENTRY_FORWARD_POINTS: u32 = 1027;

// =============================================================================
// Parties
// =============================================================================

/// PartyIDSource.
pub const PARTY_ID_SOURCE: u32 = 447;
/// PartyID.
pub const PARTY_ID: u32 = 448;
/// PartyRole.
pub const PARTY_ROLE: u32 = 452;
/// NoPartyIDs.
pub const NO_PARTY_IDS: u32 = 453;

// =============================================================================
// Venue extensions
// =============================================================================

/// Fixing date of an NDF (near leg of an NDS).
pub const FIXING_DATE: u32 = 6203;
/// Fixing date of the far leg of an NDS.
pub const FIXING_DATE_2: u32 = 6204;
/// Settlement type of the far leg of a swap.
pub const SETTL_TYPE_2: u32 = 6205;

// =============================================================================
// Message Types
// =============================================================================

/// Message types exchanged with the venue.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum MsgType {
    /// `0`
    Heartbeat,
    /// `1`
    TestRequest,
    /// `2`
    ResendRequest,
    /// `3`
    Reject,
    /// `4`
    SequenceReset,
    /// `5`
    Logout,
    /// `8`
    ExecutionReport,
    /// `A`
    Logon,
    /// `D`
    NewOrderSingle,
    /// `R`
    QuoteRequest,
    /// `S`
    Quote,
    /// `V`
    MarketDataRequest,
    /// `W`
    MarketDataSnapshot,
    /// `X`
    MarketDataIncrementalRefresh,
    /// `Y` - acknowledgement of a market data request; carries
    /// MDReqRejReason (281) only when the request was refused.
    MarketDataRequestAck,
    /// `Z`
    QuoteCancel,
    /// `AG`
    QuoteRequestReject,
    /// `AJ`
    QuoteResponse,
    /// Anything outside the venue's fixed message set.
    Other(String),
}

impl MsgType {
    /// Parse the MsgType (35) value.
    #[must_use]
    pub fn parse(value: &str) -> Self {
        match value {
            "0" => Self::Heartbeat,
            "1" => Self::TestRequest,
            "2" => Self::ResendRequest,
            "3" => Self::Reject,
            "4" => Self::SequenceReset,
            "5" => Self::Logout,
            "8" => Self::ExecutionReport,
            "A" => Self::Logon,
            "D" => Self::NewOrderSingle,
            "R" => Self::QuoteRequest,
            "S" => Self::Quote,
            "V" => Self::MarketDataRequest,
            "W" => Self::MarketDataSnapshot,
            "X" => Self::MarketDataIncrementalRefresh,
            "Y" => Self::MarketDataRequestAck,
            "Z" => Self::QuoteCancel,
            "AG" => Self::QuoteRequestReject,
            "AJ" => Self::QuoteResponse,
            other => Self::Other(other.to_string()),
        }
    }

    /// Wire value for tag 35.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Heartbeat => "0",
            Self::TestRequest => "1",
            Self::ResendRequest => "2",
            Self::Reject => "3",
            Self::SequenceReset => "4",
            Self::Logout => "5",
            Self::ExecutionReport => "8",
            Self::Logon => "A",
            Self::NewOrderSingle => "D",
            Self::QuoteRequest => "R",
            Self::Quote => "S",
            Self::MarketDataRequest => "V",
            Self::MarketDataSnapshot => "W",
            Self::MarketDataIncrementalRefresh => "X",
            Self::MarketDataRequestAck => "Y",
            Self::QuoteCancel => "Z",
            Self::QuoteRequestReject => "AG",
            Self::QuoteResponse => "AJ",
            Self::Other(value) => value,
        }
    }

    /// Session-level (administrative) message types.
    #[must_use]
    pub const fn is_session_control(&self) -> bool {
        matches!(
            self,
            Self::Heartbeat
                | Self::TestRequest
                | Self::ResendRequest
                | Self::Reject
                | Self::SequenceReset
                | Self::Logout
                | Self::Logon
        )
    }

    /// Short label for metrics.
    #[must_use]
    pub const fn label(&self) -> &'static str {
        match self {
            Self::Heartbeat => "heartbeat",
            Self::TestRequest => "test_request",
            Self::ResendRequest => "resend_request",
            Self::Reject => "reject",
            Self::SequenceReset => "sequence_reset",
            Self::Logout => "logout",
            Self::ExecutionReport => "execution_report",
            Self::Logon => "logon",
            Self::NewOrderSingle => "new_order_single",
            Self::QuoteRequest => "quote_request",
            Self::Quote => "quote",
            Self::MarketDataRequest => "market_data_request",
            Self::MarketDataSnapshot => "market_data_snapshot",
            Self::MarketDataIncrementalRefresh => "market_data_incremental",
            Self::MarketDataRequestAck => "market_data_request_ack",
            Self::QuoteCancel => "quote_cancel",
            Self::QuoteRequestReject => "quote_request_reject",
            Self::QuoteResponse => "quote_response",
            Self::Other(_) => "other",
        }
    }
}

impl fmt::Display for MsgType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
