//! Request Builder
//!
//! Turns caller intents into outbound wire bodies:
//!
//! | Intent | MsgType |
//! |---|---|
//! | Outright / NDF quote | QuoteRequest (`R`) |
//! | Swap / NDS quote | QuoteRequest (`R`), two legs |
//! | Market data (single or batch) | MarketDataRequest (`V`) |
//! | ESP trade | NewOrderSingle (`D`) |
//! | RFS trade | QuoteResponse (`AJ`) |
//! | RFS swap trade | QuoteResponse (`AJ`), two legs |
//!
//! Every method validates its input first and returns a [`RequestError`]
//! without building anything when the combination is invalid. Quote and
//! market data requests come back with the [`OutstandingRequest`] the caller
//! registers before sending.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use uuid::Uuid;

use crate::domain::pricing::NDF_SECURITY_TYPE;
use crate::domain::requests::{
    EspTradeIntent, NdfTerms, OutstandingRequest, QuoteIntent, RequestKind, RfsSwapTradeIntent,
    RfsTradeIntent, SettlementType, SwapQuoteIntent, broken_date_after, fix_date,
};
use crate::infrastructure::fix::codec::SENDING_TIME_FORMAT;
use crate::infrastructure::fix::tags::{self, MsgType};
use crate::infrastructure::fix::WireMessageBuilder;

/// SubscriptionRequestType: snapshot plus updates.
const SUBSCRIBE_SNAPSHOT_AND_UPDATES: &str = "1";

/// MarketDepth: top of book.
const TOP_OF_BOOK: &str = "1";

/// MDEntryType values requested: bid and offer.
const SUBSCRIBED_ENTRY_TYPES: [&str; 2] = ["0", "1"];

/// OrdType: previously quoted.
const ORD_TYPE_PREVIOUSLY_QUOTED: &str = "D";

/// OrdType: limit.
const ORD_TYPE_LIMIT: &str = "2";

/// TimeInForce: fill or kill.
const TIME_IN_FORCE_FOK: &str = "4";

/// QuoteRespType: hit/lift.
const QUOTE_RESP_HIT_LIFT: &str = "1";

// =============================================================================
// Errors
// =============================================================================

/// Invalid request combinations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RequestError {
    /// No symbol was given.
    #[error("at least one symbol is required")]
    EmptySymbols,

    /// No settlement type was given.
    #[error("at least one settlement type is required")]
    EmptySettlementTypes,

    /// Quantity must be positive.
    #[error("quantity must be positive, got {0}")]
    InvalidQuantity(Decimal),

    /// Price must be positive.
    #[error("price must be positive, got {0}")]
    InvalidPrice(Decimal),

    /// Broken-date settlement needs an explicit date.
    #[error("settlement type {0} requires a settlement date")]
    MissingSettlementDate(SettlementType),

    /// NDF requests need a fixing date.
    #[error("non-deliverable request requires a fixing date")]
    MissingFixingDate,

    /// NDF requests need a liquidity provider for the party block.
    #[error("non-deliverable request requires a liquidity provider")]
    MissingLiquidityProvider,

    /// Near leg settles after the far leg.
    #[error("swap near date {near} is after far date {far}")]
    SwapDatesInverted {
        /// Near settlement date.
        near: NaiveDate,
        /// Far settlement date.
        far: NaiveDate,
    },

    /// Swap trades need a far-leg price.
    #[error("swap trade requires a far leg price")]
    MissingFarPrice,

    /// A trade needs the QuoteID it accepts.
    #[error("quote id is required")]
    MissingQuoteId,
}

// =============================================================================
// Output
// =============================================================================

/// A validated request ready to send.
#[derive(Debug, Clone)]
pub struct PreparedRequest {
    /// QuoteReqID / MDReqID / ClOrdID.
    pub id: String,
    /// Wire body.
    pub message: WireMessageBuilder,
    /// Registry entry for requests answered asynchronously.
    pub outstanding: Option<OutstandingRequest>,
}

// =============================================================================
// Builder
// =============================================================================

/// Builds outbound request bodies.
#[derive(Debug, Clone, Default)]
pub struct RequestBuilder {
    liquidity_provider: Option<String>,
}

impl RequestBuilder {
    /// Create a builder. `liquidity_provider` fills the NDF party block.
    #[must_use]
    pub const fn new(liquidity_provider: Option<String>) -> Self {
        Self { liquidity_provider }
    }

    fn next_id() -> String {
        Uuid::new_v4().to_string()
    }

    /// Outright spot, forward or NDF quote request.
    ///
    /// # Errors
    ///
    /// Returns a `RequestError` for an empty symbol, non-positive quantity,
    /// missing broken date or missing NDF fixing date.
    pub fn quote_request(&self, intent: &QuoteIntent) -> Result<PreparedRequest, RequestError> {
        require_symbol(&intent.symbol)?;
        require_positive_qty(intent.quantity)?;
        let settl_date = settlement_date(&intent.settlement, intent.settlement_date)?;
        let parties = self.parties(intent.ndf, intent.counterparty.as_deref())?;

        let id = Self::next_id();
        let mut entry = vec![(tags::SYMBOL, intent.symbol.clone())];
        if intent.ndf.enabled {
            entry.push((tags::SECURITY_TYPE, NDF_SECURITY_TYPE.to_string()));
        }
        if let Some(side) = intent.side {
            entry.push((tags::SIDE, side.as_fix().to_string()));
        }
        entry.push((tags::ORDER_QTY, intent.quantity.to_string()));
        entry.push((tags::CURRENCY, intent.currency.clone()));
        entry.push((tags::SETTL_TYPE, intent.settlement.as_fix().to_string()));
        push_date(&mut entry, tags::SETTL_DATE, settl_date);
        push_date(&mut entry, tags::FIXING_DATE, intent.ndf.fixing_date.filter(|_| intent.ndf.enabled));

        let mut message = WireMessageBuilder::new(MsgType::QuoteRequest)
            .field(tags::QUOTE_REQ_ID, &id)
            .group(tags::NO_RELATED_SYM, vec![entry]);
        if !parties.is_empty() {
            message = message.group(tags::NO_PARTY_IDS, parties);
        }

        let outstanding = OutstandingRequest::new(
            id.clone(),
            RequestKind::Quote,
            vec![intent.symbol.clone()],
            vec![intent.settlement.clone()],
        )
        .with_currency(Some(intent.currency.clone()))
        .with_ndf(intent.ndf.enabled);

        Ok(PreparedRequest {
            id,
            message,
            outstanding: Some(outstanding),
        })
    }

    /// Swap or NDS quote request.
    ///
    /// # Errors
    ///
    /// Returns a `RequestError` for invalid legs, inverted dates or missing
    /// NDF terms.
    pub fn swap_quote_request(&self, intent: &SwapQuoteIntent) -> Result<PreparedRequest, RequestError> {
        require_symbol(&intent.symbol)?;
        require_positive_qty(intent.near.quantity)?;
        require_positive_qty(intent.far.quantity)?;
        let near_date = settlement_date(&intent.near.settlement, intent.near.settlement_date)?;
        let far_date = settlement_date(&intent.far.settlement, intent.far.settlement_date)?;
        require_ordered(near_date, far_date)?;
        let parties = self.parties(intent.ndf, intent.counterparty.as_deref())?;

        let id = Self::next_id();
        let mut entry = vec![(tags::SYMBOL, intent.symbol.clone())];
        if intent.ndf.enabled {
            entry.push((tags::SECURITY_TYPE, NDF_SECURITY_TYPE.to_string()));
        }
        if let Some(side) = intent.side {
            entry.push((tags::SIDE, side.as_fix().to_string()));
        }
        entry.push((tags::ORDER_QTY, intent.near.quantity.to_string()));
        entry.push((tags::CURRENCY, intent.currency.clone()));
        entry.push((tags::SETTL_TYPE, intent.near.settlement.as_fix().to_string()));
        push_date(&mut entry, tags::SETTL_DATE, near_date);
        if intent.ndf.enabled {
            push_date(&mut entry, tags::FIXING_DATE, intent.ndf.fixing_date);
        }
        entry.push((tags::ORDER_QTY_2, intent.far.quantity.to_string()));
        entry.push((tags::SETTL_TYPE_2, intent.far.settlement.as_fix().to_string()));
        push_date(&mut entry, tags::SETTL_DATE_2, far_date);
        if intent.ndf.enabled {
            push_date(&mut entry, tags::FIXING_DATE_2, intent.ndf.far_fixing_date);
        }

        let mut message = WireMessageBuilder::new(MsgType::QuoteRequest)
            .field(tags::QUOTE_REQ_ID, &id)
            .group(tags::NO_RELATED_SYM, vec![entry]);
        if !parties.is_empty() {
            message = message.group(tags::NO_PARTY_IDS, parties);
        }

        let outstanding = OutstandingRequest::new(
            id.clone(),
            RequestKind::Swap,
            vec![intent.symbol.clone()],
            vec![intent.near.settlement.clone(), intent.far.settlement.clone()],
        )
        .with_currency(Some(intent.currency.clone()))
        .with_ndf(intent.ndf.enabled);

        Ok(PreparedRequest {
            id,
            message,
            outstanding: Some(outstanding),
        })
    }

    /// Market data subscription for every (symbol, settlement) pair.
    ///
    /// One pair is a single request; more pairs are sent as one batch
    /// message whose registry entry keeps the full lists. Broken-date pairs
    /// settle on the 15th of the month after `today`.
    ///
    /// # Errors
    ///
    /// Returns `RequestError::EmptySymbols` or `EmptySettlementTypes`.
    pub fn market_data_request(
        &self,
        symbols: &[String],
        settlement_types: &[SettlementType],
        ndf: bool,
        today: NaiveDate,
    ) -> Result<PreparedRequest, RequestError> {
        if symbols.is_empty() || symbols.iter().any(|s| s.trim().is_empty()) {
            return Err(RequestError::EmptySymbols);
        }
        if settlement_types.is_empty() {
            return Err(RequestError::EmptySettlementTypes);
        }

        let id = Self::next_id();
        let broken_date = broken_date_after(today);
        let mut entries = Vec::with_capacity(symbols.len() * settlement_types.len());
        for symbol in symbols {
            for settlement in settlement_types {
                let mut entry = vec![(tags::SYMBOL, symbol.clone())];
                if ndf {
                    entry.push((tags::SECURITY_TYPE, NDF_SECURITY_TYPE.to_string()));
                }
                entry.push((tags::SETTL_TYPE, settlement.as_fix().to_string()));
                if settlement.requires_date() {
                    entry.push((tags::SETTL_DATE, fix_date(broken_date)));
                }
                entries.push(entry);
            }
        }

        let kind = if entries.len() > 1 {
            RequestKind::BatchMarketData
        } else {
            RequestKind::MarketData
        };
        let entry_types = SUBSCRIBED_ENTRY_TYPES
            .iter()
            .map(|t| vec![(tags::MD_ENTRY_TYPE, (*t).to_string())])
            .collect();

        let message = WireMessageBuilder::new(MsgType::MarketDataRequest)
            .field(tags::MD_REQ_ID, &id)
            .field(tags::SUBSCRIPTION_REQUEST_TYPE, SUBSCRIBE_SNAPSHOT_AND_UPDATES)
            .field(tags::MARKET_DEPTH, TOP_OF_BOOK)
            .group(tags::NO_MD_ENTRY_TYPES, entry_types)
            .group(tags::NO_RELATED_SYM, entries);

        let outstanding = OutstandingRequest::new(id.clone(), kind, symbols.to_vec(), settlement_types.to_vec())
            .with_ndf(ndf);

        Ok(PreparedRequest {
            id,
            message,
            outstanding: Some(outstanding),
        })
    }

    /// ESP NewOrderSingle. The ClOrdID is the returned id.
    ///
    /// Previously-quoted FOK when a streamed QuoteID is hit, limit FOK
    /// otherwise.
    ///
    /// # Errors
    ///
    /// Returns a `RequestError` for invalid quantity, price or dates.
    pub fn esp_order(&self, intent: &EspTradeIntent, now: DateTime<Utc>) -> Result<PreparedRequest, RequestError> {
        require_symbol(&intent.symbol)?;
        require_positive_qty(intent.quantity)?;
        require_positive_px(intent.price)?;
        let settl_date = settlement_date(&intent.settlement, intent.settlement_date)?;
        require_fixing(intent.ndf)?;

        let id = Self::next_id();
        let ord_type = if intent.quote_id.is_some() {
            ORD_TYPE_PREVIOUSLY_QUOTED
        } else {
            ORD_TYPE_LIMIT
        };

        let message = WireMessageBuilder::new(MsgType::NewOrderSingle)
            .field(tags::CL_ORD_ID, &id)
            .field_opt(tags::QUOTE_ID, intent.quote_id.as_deref())
            .field(tags::SYMBOL, &intent.symbol)
            .field(tags::SIDE, intent.side.as_fix())
            .field(tags::ORDER_QTY, intent.quantity)
            .field(tags::CURRENCY, &intent.currency)
            .field(tags::ORD_TYPE, ord_type)
            .field(tags::PRICE, intent.price)
            .field(tags::TIME_IN_FORCE, TIME_IN_FORCE_FOK)
            .field(tags::SETTL_TYPE, intent.settlement.as_fix())
            .field_opt(tags::SETTL_DATE, settl_date.map(fix_date));
        let message = ndf_fields(message, intent.ndf).field(tags::TRANSACT_TIME, now.format(SENDING_TIME_FORMAT));

        Ok(PreparedRequest {
            id,
            message,
            outstanding: None,
        })
    }

    /// QuoteResponse accepting an RFS outright quote.
    ///
    /// # Errors
    ///
    /// Returns a `RequestError` for a missing quote id or invalid terms.
    pub fn rfs_trade(&self, intent: &RfsTradeIntent, now: DateTime<Utc>) -> Result<PreparedRequest, RequestError> {
        require_quote_id(&intent.quote_id)?;
        require_symbol(&intent.symbol)?;
        require_positive_qty(intent.quantity)?;
        require_positive_px(intent.price)?;
        let settl_date = settlement_date(&intent.settlement, intent.settlement_date)?;
        require_fixing(intent.ndf)?;

        let id = Self::next_id();
        let message = WireMessageBuilder::new(MsgType::QuoteResponse)
            .field(tags::QUOTE_RESP_ID, &id)
            .field(tags::CL_ORD_ID, &id)
            .field(tags::QUOTE_ID, &intent.quote_id)
            .field(tags::QUOTE_RESP_TYPE, QUOTE_RESP_HIT_LIFT)
            .field(tags::SYMBOL, &intent.symbol)
            .field(tags::SIDE, intent.side.as_fix())
            .field(tags::ORDER_QTY, intent.quantity)
            .field(tags::CURRENCY, &intent.currency)
            .field(tags::PRICE, intent.price)
            .field(tags::SETTL_TYPE, intent.settlement.as_fix())
            .field_opt(tags::SETTL_DATE, settl_date.map(fix_date));
        let message = ndf_fields(message, intent.ndf).field(tags::TRANSACT_TIME, now.format(SENDING_TIME_FORMAT));

        Ok(PreparedRequest {
            id,
            message,
            outstanding: None,
        })
    }

    /// QuoteResponse accepting an RFS swap quote.
    ///
    /// Forward points are the far price minus the near price, sent when both
    /// prices are known.
    ///
    /// # Errors
    ///
    /// Returns a `RequestError` for a missing far price, inverted dates or
    /// invalid legs.
    pub fn rfs_swap_trade(
        &self,
        intent: &RfsSwapTradeIntent,
        now: DateTime<Utc>,
    ) -> Result<PreparedRequest, RequestError> {
        require_quote_id(&intent.quote_id)?;
        require_symbol(&intent.symbol)?;
        require_positive_qty(intent.near.quantity)?;
        require_positive_qty(intent.far.quantity)?;
        let far_price = intent.far.price.ok_or(RequestError::MissingFarPrice)?;
        require_positive_px(far_price)?;
        if let Some(near_price) = intent.near.price {
            require_positive_px(near_price)?;
        }
        let near_date = settlement_date(&intent.near.settlement, intent.near.settlement_date)?;
        let far_date = settlement_date(&intent.far.settlement, intent.far.settlement_date)?;
        require_ordered(near_date, far_date)?;
        require_fixing(intent.ndf)?;

        let forward_points = intent.near.price.map(|near| far_price - near);

        let id = Self::next_id();
        let message = WireMessageBuilder::new(MsgType::QuoteResponse)
            .field(tags::QUOTE_RESP_ID, &id)
            .field(tags::CL_ORD_ID, &id)
            .field(tags::QUOTE_ID, &intent.quote_id)
            .field(tags::QUOTE_RESP_TYPE, QUOTE_RESP_HIT_LIFT)
            .field(tags::SYMBOL, &intent.symbol)
            .field(tags::SIDE, intent.side.as_fix())
            .field(tags::CURRENCY, &intent.currency)
            .field(tags::ORDER_QTY, intent.near.quantity)
            .field_opt(tags::PRICE, intent.near.price)
            .field(tags::SETTL_TYPE, intent.near.settlement.as_fix())
            .field_opt(tags::SETTL_DATE, near_date.map(fix_date))
            .field(tags::ORDER_QTY_2, intent.far.quantity)
            .field(tags::PRICE_2, far_price)
            .field(tags::SETTL_TYPE_2, intent.far.settlement.as_fix())
            .field_opt(tags::SETTL_DATE_2, far_date.map(fix_date))
            .field_opt(tags::LAST_FORWARD_POINTS, forward_points);
        let message = ndf_fields(message, intent.ndf).field(tags::TRANSACT_TIME, now.format(SENDING_TIME_FORMAT));

        Ok(PreparedRequest {
            id,
            message,
            outstanding: None,
        })
    }

    /// Party block: the directed counterparty, or the configured liquidity
    /// provider for NDF requests.
    fn parties(&self, ndf: NdfTerms, counterparty: Option<&str>) -> Result<Vec<Vec<(u32, String)>>, RequestError> {
        require_fixing(ndf)?;
        let party = match counterparty {
            Some(cp) => Some(cp.to_string()),
            None if ndf.enabled => Some(
                self.liquidity_provider
                    .clone()
                    .ok_or(RequestError::MissingLiquidityProvider)?,
            ),
            None => None,
        };
        Ok(party
            .map(|id| {
                vec![vec![
                    (tags::PARTY_ID, id),
                    (tags::PARTY_ID_SOURCE, tags::PARTY_ID_SOURCE_PROPRIETARY.to_string()),
                    (tags::PARTY_ROLE, tags::PARTY_ROLE_LIQUIDITY_PROVIDER.to_string()),
                ]]
            })
            .unwrap_or_default())
    }
}

// =============================================================================
// Validation helpers
// =============================================================================

fn require_symbol(symbol: &str) -> Result<(), RequestError> {
    if symbol.trim().is_empty() {
        return Err(RequestError::EmptySymbols);
    }
    Ok(())
}

fn require_positive_qty(quantity: Decimal) -> Result<(), RequestError> {
    if quantity <= Decimal::ZERO {
        return Err(RequestError::InvalidQuantity(quantity));
    }
    Ok(())
}

fn require_positive_px(price: Decimal) -> Result<(), RequestError> {
    if price <= Decimal::ZERO {
        return Err(RequestError::InvalidPrice(price));
    }
    Ok(())
}

fn require_quote_id(quote_id: &str) -> Result<(), RequestError> {
    if quote_id.trim().is_empty() {
        return Err(RequestError::MissingQuoteId);
    }
    Ok(())
}

const fn require_fixing(ndf: NdfTerms) -> Result<(), RequestError> {
    if ndf.enabled && ndf.fixing_date.is_none() {
        return Err(RequestError::MissingFixingDate);
    }
    Ok(())
}

fn require_ordered(near: Option<NaiveDate>, far: Option<NaiveDate>) -> Result<(), RequestError> {
    match (near, far) {
        (Some(near), Some(far)) if near > far => Err(RequestError::SwapDatesInverted { near, far }),
        _ => Ok(()),
    }
}

/// Settlement date to send: required for broken dates, ignored otherwise
/// unless supplied.
fn settlement_date(settlement: &SettlementType, date: Option<NaiveDate>) -> Result<Option<NaiveDate>, RequestError> {
    if settlement.requires_date() && date.is_none() {
        return Err(RequestError::MissingSettlementDate(settlement.clone()));
    }
    Ok(date)
}

fn push_date(entry: &mut Vec<(u32, String)>, tag: u32, date: Option<NaiveDate>) {
    if let Some(date) = date {
        entry.push((tag, fix_date(date)));
    }
}

fn ndf_fields(message: WireMessageBuilder, ndf: NdfTerms) -> WireMessageBuilder {
    if !ndf.enabled {
        return message;
    }
    message
        .field(tags::SECURITY_TYPE, NDF_SECURITY_TYPE)
        .field_opt(tags::FIXING_DATE, ndf.fixing_date.map(fix_date))
        .field_opt(tags::FIXING_DATE_2, ndf.far_fixing_date.map(fix_date))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::orders::Side;
    use crate::domain::requests::{SwapLeg, SwapTradeLeg};
    use crate::infrastructure::fix::codec::{PARTIES, RELATED_SYM, decode};
    use crate::infrastructure::fix::{OutboundHeader, WireMessage};

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn wire(prepared: &PreparedRequest) -> WireMessage {
        let header = OutboundHeader {
            sender_comp_id: "CLIENT",
            target_comp_id: "VENUE",
            seq_num: 7,
            sending_time: Utc::now(),
            poss_dup: false,
        };
        decode(&prepared.message.build(&header).encode()).unwrap()
    }

    fn spot_quote() -> QuoteIntent {
        QuoteIntent {
            symbol: "EUR/USD".into(),
            side: Some(Side::Buy),
            quantity: Decimal::new(1_000_000, 0),
            currency: "EUR".into(),
            settlement: SettlementType::Spot,
            settlement_date: None,
            ndf: NdfTerms::DELIVERABLE,
            counterparty: None,
        }
    }

    #[test]
    fn quote_request_registers_parameters() {
        let builder = RequestBuilder::default();
        let prepared = builder.quote_request(&spot_quote()).unwrap();
        let msg = wire(&prepared);

        assert_eq!(msg.msg_type(), MsgType::QuoteRequest);
        assert_eq!(msg.get(tags::QUOTE_REQ_ID), Some(prepared.id.as_str()));
        let legs = msg.group(RELATED_SYM);
        assert_eq!(legs.len(), 1);
        assert_eq!(legs[0].get(tags::SYMBOL), Some("EUR/USD"));
        assert_eq!(legs[0].get(tags::SETTL_TYPE), Some("0"));
        assert_eq!(legs[0].get(tags::SIDE), Some("1"));
        assert!(legs[0].get(tags::SECURITY_TYPE).is_none());
        assert!(msg.group(PARTIES).is_empty());

        let outstanding = prepared.outstanding.unwrap();
        assert_eq!(outstanding.request_id, prepared.id);
        assert_eq!(outstanding.kind, RequestKind::Quote);
        assert_eq!(outstanding.primary_symbol(), Some("EUR/USD"));
    }

    #[test]
    fn broken_date_without_date_is_rejected() {
        let mut intent = spot_quote();
        intent.settlement = SettlementType::BrokenDate;
        let err = RequestBuilder::default().quote_request(&intent).unwrap_err();
        assert_eq!(err, RequestError::MissingSettlementDate(SettlementType::BrokenDate));

        intent.settlement_date = Some(date(2026, 11, 3));
        let msg = wire(&RequestBuilder::default().quote_request(&intent).unwrap());
        assert_eq!(msg.group(RELATED_SYM)[0].get(tags::SETTL_DATE), Some("20261103"));
    }

    #[test]
    fn ndf_quote_adds_security_type_fixing_and_party() {
        let mut intent = spot_quote();
        intent.settlement = SettlementType::Tenor("M1".into());
        intent.ndf = NdfTerms::fixing_on(date(2026, 11, 12));
        let builder = RequestBuilder::new(Some("LP-NDF".into()));
        let msg = wire(&builder.quote_request(&intent).unwrap());

        let leg = &msg.group(RELATED_SYM)[0];
        assert_eq!(leg.get(tags::SECURITY_TYPE), Some("FXNDF"));
        assert_eq!(leg.get(tags::FIXING_DATE), Some("20261112"));
        let parties = msg.group(PARTIES);
        assert_eq!(parties.len(), 1);
        assert_eq!(parties[0].get(tags::PARTY_ID), Some("LP-NDF"));
        assert_eq!(parties[0].get(tags::PARTY_ID_SOURCE), Some("D"));
        assert_eq!(parties[0].get(tags::PARTY_ROLE), Some("35"));
    }

    #[test]
    fn ndf_without_fixing_date_is_rejected() {
        let mut intent = spot_quote();
        intent.ndf = NdfTerms {
            enabled: true,
            ..NdfTerms::DELIVERABLE
        };
        let builder = RequestBuilder::new(Some("LP".into()));
        assert_eq!(builder.quote_request(&intent).unwrap_err(), RequestError::MissingFixingDate);
    }

    #[test]
    fn ndf_without_provider_is_rejected() {
        let mut intent = spot_quote();
        intent.ndf = NdfTerms::fixing_on(date(2026, 11, 12));
        assert_eq!(
            RequestBuilder::default().quote_request(&intent).unwrap_err(),
            RequestError::MissingLiquidityProvider
        );
    }

    #[test]
    fn non_positive_quantity_is_rejected() {
        let mut intent = spot_quote();
        intent.quantity = Decimal::ZERO;
        assert_eq!(
            RequestBuilder::default().quote_request(&intent).unwrap_err(),
            RequestError::InvalidQuantity(Decimal::ZERO)
        );
    }

    fn swap_intent() -> SwapQuoteIntent {
        SwapQuoteIntent {
            symbol: "USD/JPY".into(),
            side: None,
            currency: "USD".into(),
            near: SwapLeg {
                settlement: SettlementType::Spot,
                settlement_date: None,
                quantity: Decimal::new(5_000_000, 0),
            },
            far: SwapLeg {
                settlement: SettlementType::Tenor("M3".into()),
                settlement_date: None,
                quantity: Decimal::new(5_000_000, 0),
            },
            ndf: NdfTerms::DELIVERABLE,
            counterparty: Some("BANK-A".into()),
        }
    }

    #[test]
    fn swap_quote_carries_both_legs_and_counterparty() {
        let prepared = RequestBuilder::default().swap_quote_request(&swap_intent()).unwrap();
        let msg = wire(&prepared);
        let leg = &msg.group(RELATED_SYM)[0];
        assert_eq!(leg.get(tags::SETTL_TYPE), Some("0"));
        assert_eq!(leg.get(tags::SETTL_TYPE_2), Some("M3"));
        assert_eq!(leg.get(tags::ORDER_QTY_2), Some("5000000"));
        assert!(leg.get(tags::SIDE).is_none());
        assert_eq!(msg.group(PARTIES)[0].get(tags::PARTY_ID), Some("BANK-A"));
        assert_eq!(prepared.outstanding.unwrap().kind, RequestKind::Swap);
    }

    #[test]
    fn swap_with_inverted_dates_is_rejected() {
        let mut intent = swap_intent();
        intent.near.settlement = SettlementType::BrokenDate;
        intent.near.settlement_date = Some(date(2027, 2, 1));
        intent.far.settlement = SettlementType::BrokenDate;
        intent.far.settlement_date = Some(date(2027, 1, 1));
        assert_eq!(
            RequestBuilder::default().swap_quote_request(&intent).unwrap_err(),
            RequestError::SwapDatesInverted {
                near: date(2027, 2, 1),
                far: date(2027, 1, 1)
            }
        );
    }

    #[test]
    fn nds_quote_sets_far_fixing_date() {
        let mut intent = swap_intent();
        intent.ndf = NdfTerms {
            enabled: true,
            fixing_date: Some(date(2026, 10, 28)),
            far_fixing_date: Some(date(2027, 1, 27)),
        };
        let msg = wire(&RequestBuilder::default().swap_quote_request(&intent).unwrap());
        let leg = &msg.group(RELATED_SYM)[0];
        assert_eq!(leg.get(tags::FIXING_DATE), Some("20261028"));
        assert_eq!(leg.get(tags::FIXING_DATE_2), Some("20270127"));
    }

    #[test]
    fn batch_market_data_request_holds_full_lists() {
        let symbols = vec!["EUR/USD".to_string(), "GBP/USD".to_string()];
        let settlements = vec![SettlementType::Spot, SettlementType::BrokenDate];
        let prepared = RequestBuilder::default()
            .market_data_request(&symbols, &settlements, false, date(2026, 10, 14))
            .unwrap();
        let msg = wire(&prepared);

        assert_eq!(msg.msg_type(), MsgType::MarketDataRequest);
        assert_eq!(msg.get(tags::SUBSCRIPTION_REQUEST_TYPE), Some("1"));
        assert_eq!(msg.get(tags::MARKET_DEPTH), Some("1"));
        assert_eq!(msg.get(tags::NO_MD_ENTRY_TYPES), Some("2"));
        let entries = msg.group(RELATED_SYM);
        assert_eq!(entries.len(), 4);
        assert_eq!(entries[1].get(tags::SETTL_TYPE), Some("B"));
        assert_eq!(entries[1].get(tags::SETTL_DATE), Some("20261115"));
        assert!(entries[2].get(tags::SETTL_DATE).is_none());

        let outstanding = prepared.outstanding.unwrap();
        assert_eq!(outstanding.kind, RequestKind::BatchMarketData);
        assert_eq!(outstanding.symbols, symbols);
        assert_eq!(outstanding.settlement_types, settlements);
    }

    #[test]
    fn single_pair_is_not_a_batch() {
        let prepared = RequestBuilder::default()
            .market_data_request(&["EUR/USD".to_string()], &[SettlementType::Spot], true, date(2026, 1, 5))
            .unwrap();
        let outstanding = prepared.outstanding.as_ref().unwrap();
        assert_eq!(outstanding.kind, RequestKind::MarketData);
        assert!(outstanding.ndf);
        assert_eq!(wire(&prepared).group(RELATED_SYM)[0].get(tags::SECURITY_TYPE), Some("FXNDF"));
    }

    #[test]
    fn empty_market_data_request_is_rejected() {
        let builder = RequestBuilder::default();
        assert_eq!(
            builder
                .market_data_request(&[], &[SettlementType::Spot], false, date(2026, 1, 5))
                .unwrap_err(),
            RequestError::EmptySymbols
        );
        assert_eq!(
            builder
                .market_data_request(&["EUR/USD".to_string()], &[], false, date(2026, 1, 5))
                .unwrap_err(),
            RequestError::EmptySettlementTypes
        );
    }

    fn esp_intent(quote_id: Option<&str>) -> EspTradeIntent {
        EspTradeIntent {
            symbol: "EUR/USD".into(),
            side: Side::Sell,
            quantity: Decimal::new(2_000_000, 0),
            currency: "EUR".into(),
            price: Decimal::new(108_345, 5),
            settlement: SettlementType::Spot,
            settlement_date: None,
            quote_id: quote_id.map(str::to_string),
            ndf: NdfTerms::DELIVERABLE,
        }
    }

    #[test]
    fn esp_order_type_depends_on_quote_id() {
        let builder = RequestBuilder::default();
        let quoted = builder.esp_order(&esp_intent(Some("Q-9")), Utc::now()).unwrap();
        let msg = wire(&quoted);
        assert_eq!(msg.msg_type(), MsgType::NewOrderSingle);
        assert_eq!(msg.get(tags::CL_ORD_ID), Some(quoted.id.as_str()));
        assert_eq!(msg.get(tags::ORD_TYPE), Some("D"));
        assert_eq!(msg.get(tags::QUOTE_ID), Some("Q-9"));
        assert_eq!(msg.get(tags::TIME_IN_FORCE), Some("4"));
        assert_eq!(msg.get(tags::PRICE), Some("1.08345"));
        assert!(quoted.outstanding.is_none());

        let limit = wire(&builder.esp_order(&esp_intent(None), Utc::now()).unwrap());
        assert_eq!(limit.get(tags::ORD_TYPE), Some("2"));
        assert!(!limit.contains(tags::QUOTE_ID));
    }

    #[test]
    fn rfs_trade_is_quote_response() {
        let intent = RfsTradeIntent {
            quote_id: "Q-1".into(),
            symbol: "EUR/USD".into(),
            side: Side::Buy,
            quantity: Decimal::new(1_000_000, 0),
            currency: "EUR".into(),
            price: Decimal::new(10_850, 4),
            settlement: SettlementType::Tenor("W1".into()),
            settlement_date: None,
            ndf: NdfTerms::DELIVERABLE,
        };
        let prepared = RequestBuilder::default().rfs_trade(&intent, Utc::now()).unwrap();
        let msg = wire(&prepared);
        assert_eq!(msg.msg_type(), MsgType::QuoteResponse);
        assert_eq!(msg.get(tags::QUOTE_RESP_TYPE), Some("1"));
        assert_eq!(msg.get(tags::QUOTE_ID), Some("Q-1"));
        assert_eq!(msg.get(tags::CL_ORD_ID), Some(prepared.id.as_str()));
        assert_eq!(msg.get(tags::SETTL_TYPE), Some("W1"));
    }

    fn swap_trade(far_price: Option<Decimal>) -> RfsSwapTradeIntent {
        RfsSwapTradeIntent {
            quote_id: "Q-2".into(),
            symbol: "USD/JPY".into(),
            side: Side::Sell,
            currency: "USD".into(),
            near: SwapTradeLeg {
                settlement: SettlementType::Spot,
                settlement_date: None,
                quantity: Decimal::new(1_000_000, 0),
                price: Some(Decimal::new(14_950, 2)),
            },
            far: SwapTradeLeg {
                settlement: SettlementType::Tenor("M1".into()),
                settlement_date: None,
                quantity: Decimal::new(1_000_000, 0),
                price: far_price,
            },
            ndf: NdfTerms::DELIVERABLE,
        }
    }

    #[test]
    fn swap_trade_computes_forward_points() {
        let prepared = RequestBuilder::default()
            .rfs_swap_trade(&swap_trade(Some(Decimal::new(14_885, 2))), Utc::now())
            .unwrap();
        let msg = wire(&prepared);
        assert_eq!(msg.get(tags::PRICE), Some("149.50"));
        assert_eq!(msg.get(tags::PRICE_2), Some("148.85"));
        assert_eq!(msg.get_decimal(tags::LAST_FORWARD_POINTS), Some(Decimal::new(-65, 2)));
        assert_eq!(msg.get(tags::SETTL_TYPE_2), Some("M1"));
    }

    #[test]
    fn swap_trade_without_far_price_is_rejected() {
        assert_eq!(
            RequestBuilder::default()
                .rfs_swap_trade(&swap_trade(None), Utc::now())
                .unwrap_err(),
            RequestError::MissingFarPrice
        );
    }

    #[test]
    fn request_ids_are_unique() {
        let builder = RequestBuilder::default();
        let a = builder.quote_request(&spot_quote()).unwrap();
        let b = builder.quote_request(&spot_quote()).unwrap();
        assert_ne!(a.id, b.id);
    }
}
