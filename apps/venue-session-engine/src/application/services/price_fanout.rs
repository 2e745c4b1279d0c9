//! Price Fanout
//!
//! Normalizes Quote (`S`), MarketDataSnapshot (`W`) and
//! MarketDataIncrementalRefresh (`X`) entries into [`PriceEntry`] values,
//! stores the latest rate per key and notifies the price listener.
//!
//! Entries are processed independently: an entry with an MDEntryType
//! outside bid/offer/mid, or without symbol, provider, rate, size or
//! timestamp, is dropped while its siblings still go through.
//!
//! Symbol and settlement often come only from the original request; they
//! are filled from the [`CorrelationRegistry`] via QuoteReqID / MDReqID when
//! the request named a single symbol or settlement.

use std::sync::Arc;

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};

use crate::application::ports::{PriceCallback, PriceStore};
use crate::application::services::CorrelationRegistry;
use crate::domain::pricing::{InstrumentType, NDF_SECURITY_TYPE, PriceEntry, PriceSide};
use crate::domain::requests::{OutstandingRequest, RequestKind};
use crate::infrastructure::fix::codec::{GroupEntry, MD_ENTRIES};
use crate::infrastructure::fix::tags::{self, MsgType};
use crate::infrastructure::fix::WireMessage;
use crate::infrastructure::metrics;

/// MDUpdateAction: delete.
const UPDATE_ACTION_DELETE: &str = "2";

/// Shared fields of the message an entry belongs to.
struct MessageContext<'a> {
    symbol: Option<String>,
    settlement: Option<String>,
    instrument_type: InstrumentType,
    request_id: Option<&'a str>,
    quote_id: Option<&'a str>,
    value_date: Option<&'a str>,
    sending_time: Option<DateTime<Utc>>,
}

/// Entry-level outcome.
enum Normalized {
    Upsert(PriceEntry),
    Delete(PriceEntry),
    Dropped(&'static str),
}

/// Price normalization and distribution.
pub struct PriceFanout {
    store: Arc<dyn PriceStore>,
    registry: Arc<CorrelationRegistry>,
    listener: Option<PriceCallback>,
}

impl std::fmt::Debug for PriceFanout {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PriceFanout")
            .field("registry_len", &self.registry.len())
            .field("listener", &self.listener.is_some())
            .finish_non_exhaustive()
    }
}

impl PriceFanout {
    /// Create a fanout writing to `store` and notifying `listener`.
    #[must_use]
    pub fn new(store: Arc<dyn PriceStore>, registry: Arc<CorrelationRegistry>, listener: Option<PriceCallback>) -> Self {
        Self {
            store,
            registry,
            listener,
        }
    }

    /// Process every entry of a price message. Returns the entries delivered.
    pub async fn handle(&self, msg: &WireMessage) -> Vec<PriceEntry> {
        let msg_type = msg.msg_type();
        let ctx = self.context(msg);
        let mut delivered = Vec::new();

        for (index, entry) in msg.group(MD_ENTRIES).iter().enumerate() {
            match normalize(entry, &ctx) {
                Normalized::Upsert(price) => {
                    if let Err(e) = self.store.set(price.key(), price.quote()).await {
                        tracing::warn!(key = %price.key(), error = %e, "Price store write failed");
                    }
                    metrics::record_price_update(price.instrument_type.as_str());
                    if let Some(listener) = &self.listener {
                        listener(&price);
                    }
                    delivered.push(price);
                }
                Normalized::Delete(price) => {
                    if let Err(e) = self.store.delete(&price.key()).await {
                        tracing::warn!(key = %price.key(), error = %e, "Price store delete failed");
                    }
                }
                Normalized::Dropped(reason) => {
                    tracing::warn!(
                        msg_type = %msg_type,
                        index,
                        reason,
                        request_id = ?ctx.request_id,
                        "Price entry dropped"
                    );
                    metrics::record_price_entry_dropped(reason);
                }
            }
        }

        if delivered.is_empty() && msg_type != MsgType::MarketDataIncrementalRefresh {
            tracing::debug!(msg_type = %msg_type, request_id = ?ctx.request_id, "No valid price entries");
        }
        delivered
    }

    fn context<'a>(&self, msg: &'a WireMessage) -> MessageContext<'a> {
        let request_id = msg.get(tags::MD_REQ_ID).or_else(|| msg.get(tags::QUOTE_REQ_ID));
        let request = request_id.and_then(|id| self.registry.lookup(id));

        let symbol = msg
            .get(tags::SYMBOL)
            .map(str::to_string)
            .or_else(|| request.as_ref().and_then(single_symbol));
        let settlement = msg
            .get(tags::SETTL_TYPE)
            .map(str::to_string)
            .or_else(|| request.as_ref().and_then(single_settlement));

        let security_type = msg
            .get(tags::SECURITY_TYPE)
            .or_else(|| request.as_ref().filter(|r| r.ndf).map(|_| NDF_SECURITY_TYPE));
        let has_second_leg = msg.contains(tags::SETTL_TYPE_2)
            || msg.contains(tags::SETTL_DATE_2)
            || request.as_ref().is_some_and(|r| r.kind == RequestKind::Swap);

        MessageContext {
            instrument_type: InstrumentType::classify(settlement.as_deref(), security_type, has_second_leg),
            symbol,
            settlement,
            request_id,
            quote_id: msg.get(tags::QUOTE_ID),
            value_date: msg.get(tags::SETTL_DATE),
            sending_time: msg.get(tags::SENDING_TIME).and_then(parse_sending_time),
        }
    }
}

fn single_symbol(request: &OutstandingRequest) -> Option<String> {
    match request.symbols.as_slice() {
        [only] => Some(only.clone()),
        _ => None,
    }
}

fn single_settlement(request: &OutstandingRequest) -> Option<String> {
    match request.kind {
        // Swap requests list near then far; entries price the near tag.
        RequestKind::Swap => request.primary_settlement().map(|s| s.as_fix().to_string()),
        _ => match request.settlement_types.as_slice() {
            [only] => Some(only.as_fix().to_string()),
            _ => None,
        },
    }
}

fn normalize(entry: &GroupEntry<'_>, ctx: &MessageContext<'_>) -> Normalized {
    let Some(side) = entry.get(tags::MD_ENTRY_TYPE).and_then(PriceSide::from_entry_type) else {
        return Normalized::Dropped("entry_type");
    };
    let Some(symbol) = entry.get(tags::SYMBOL).map(str::to_string).or_else(|| ctx.symbol.clone()) else {
        return Normalized::Dropped("symbol");
    };
    let Some(provider) = entry.get(tags::MD_ENTRY_ORIGINATOR) else {
        return Normalized::Dropped("provider");
    };
    let Some(quantity) = entry.get_decimal(tags::MD_ENTRY_SIZE) else {
        return Normalized::Dropped("size");
    };
    let Some(timestamp) = entry_timestamp(entry).or(ctx.sending_time) else {
        return Normalized::Dropped("timestamp");
    };

    let settlement_code = entry.get(tags::SETTL_TYPE).map(str::to_string).or_else(|| ctx.settlement.clone());
    let instrument_type = if entry.get(tags::SETTL_TYPE).is_some() {
        reclassify(ctx.instrument_type, settlement_code.as_deref())
    } else {
        ctx.instrument_type
    };

    let deleting = entry.get(tags::MD_UPDATE_ACTION) == Some(UPDATE_ACTION_DELETE);
    let rate = match entry.get_decimal(tags::MD_ENTRY_PX) {
        Some(rate) => rate,
        None if deleting => rust_decimal::Decimal::ZERO,
        None => return Normalized::Dropped("rate"),
    };

    let price = PriceEntry {
        symbol,
        instrument_type,
        side,
        settlement: settlement_code.unwrap_or_default(),
        provider: provider.to_string(),
        quantity,
        rate,
        forward_points: entry.get_decimal(tags::MD_ENTRY_FORWARD_POINTS),
        value_date: entry.get(tags::SETTL_DATE).or(ctx.value_date).map(str::to_string),
        timestamp,
        quote_id: entry.get(tags::QUOTE_ID).or(ctx.quote_id).map(str::to_string),
        request_id: ctx.request_id.map(str::to_string),
    };

    if deleting {
        Normalized::Delete(price)
    } else {
        Normalized::Upsert(price)
    }
}

/// An entry-level SettlType only changes spot vs forward; swap and
/// non-deliverable classification comes from the message.
fn reclassify(message_type: InstrumentType, settl_type: Option<&str>) -> InstrumentType {
    match message_type {
        InstrumentType::Spot | InstrumentType::Forward => InstrumentType::classify(settl_type, None, false),
        other => other,
    }
}

fn entry_timestamp(entry: &GroupEntry<'_>) -> Option<DateTime<Utc>> {
    let date = NaiveDate::parse_from_str(entry.get(tags::MD_ENTRY_DATE)?, "%Y%m%d").ok()?;
    let time = NaiveTime::parse_from_str(entry.get(tags::MD_ENTRY_TIME)?, "%H:%M:%S%.f").ok()?;
    Some(NaiveDateTime::new(date, time).and_utc())
}

fn parse_sending_time(value: &str) -> Option<DateTime<Utc>> {
    NaiveDateTime::parse_from_str(value, "%Y%m%d-%H:%M:%S%.f")
        .ok()
        .map(|t| t.and_utc())
}
