//! Inbound Dispatcher
//!
//! Routes decoded messages by MsgType:
//!
//! - session-level types go back to the session controller as
//!   [`SessionControl`]
//! - ExecutionReport goes to the [`ExecutionReportHandler`]
//! - Quote, QuoteResponse and market data go to the [`PriceFanout`]
//! - MarketDataRequestAck, QuoteRequestReject and QuoteCancel resolve
//!   against the [`CorrelationRegistry`]
//!
//! Unknown types are logged and dropped.

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;

use crate::application::services::{CorrelationRegistry, ExecutionReportHandler, PriceFanout};
use crate::infrastructure::fix::tags::{self, MsgType};
use crate::infrastructure::fix::{InboundHandler, SessionControl, WireMessage};
use crate::infrastructure::metrics;

/// Routes inbound messages to their handlers.
#[derive(Debug)]
pub struct InboundDispatcher {
    registry: Arc<CorrelationRegistry>,
    executions: Arc<ExecutionReportHandler>,
    prices: Arc<PriceFanout>,
}

impl InboundDispatcher {
    /// Create a dispatcher.
    #[must_use]
    pub const fn new(
        registry: Arc<CorrelationRegistry>,
        executions: Arc<ExecutionReportHandler>,
        prices: Arc<PriceFanout>,
    ) -> Self {
        Self {
            registry,
            executions,
            prices,
        }
    }

    /// Route one message.
    pub async fn dispatch(&self, msg: &WireMessage) -> Option<SessionControl> {
        let msg_type = msg.msg_type();
        let started = Instant::now();

        let control = match &msg_type {
            t if t.is_session_control() => {
                let control = SessionControl::from_message(msg);
                if control.is_none() {
                    tracing::warn!(msg_type = %msg_type, seq = ?msg.seq_num(), "Session message missing required field, dropped");
                }
                control
            }
            MsgType::ExecutionReport => {
                self.executions.handle(msg);
                None
            }
            MsgType::Quote
            | MsgType::QuoteResponse
            | MsgType::MarketDataSnapshot
            | MsgType::MarketDataIncrementalRefresh => {
                self.prices.handle(msg).await;
                None
            }
            MsgType::MarketDataRequestAck => {
                self.on_market_data_ack(msg);
                None
            }
            MsgType::QuoteRequestReject => {
                self.on_quote_request_reject(msg);
                None
            }
            MsgType::QuoteCancel => {
                self.on_quote_cancel(msg);
                None
            }
            other => {
                tracing::warn!(msg_type = %other, seq = ?msg.seq_num(), "Unhandled message type");
                metrics::record_unhandled_message(other.as_str());
                None
            }
        };

        metrics::record_dispatch_duration(msg_type.label(), started.elapsed());
        metrics::set_outstanding_requests(self.registry.len());
        control
    }

    /// MarketDataRequestAck (`Y`): refusal when MDReqRejReason is present,
    /// acceptance otherwise.
    fn on_market_data_ack(&self, msg: &WireMessage) {
        let request_id = msg.get(tags::MD_REQ_ID);
        let rejection = msg.get(tags::MD_REQ_REJ_REASON);
        let text = msg.get(tags::TEXT).unwrap_or("");

        match request_id.and_then(|id| self.registry.lookup(id)) {
            Some(request) if rejection.is_some() => {
                self.registry.remove(&request.request_id);
                tracing::warn!(
                    request_id = %request.request_id,
                    symbols = ?request.symbols,
                    settlement_types = ?request.settlement_types,
                    reason = rejection.unwrap_or(""),
                    text,
                    "Market data request rejected"
                );
            }
            Some(request) => tracing::info!(
                request_id = %request.request_id,
                kind = ?request.kind,
                symbols = ?request.symbols,
                "Market data request acknowledged"
            ),
            None => {
                // Venue does not normally echo these; logged for diagnosis only.
                tracing::warn!(
                    request_id = ?request_id,
                    echoed_symbol = ?msg.get(tags::SYMBOL),
                    echoed_settlement = ?msg.get(tags::SETTL_TYPE),
                    reason = ?rejection,
                    text,
                    "Market data ack for unknown request"
                );
            }
        }
    }

    fn on_quote_request_reject(&self, msg: &WireMessage) {
        let request_id = msg.get(tags::QUOTE_REQ_ID);
        let removed = request_id.and_then(|id| self.registry.remove(id));
        tracing::warn!(
            request_id = ?request_id,
            known = removed.is_some(),
            symbols = ?removed.as_ref().map(|r| &r.symbols),
            reason = ?msg.get(tags::QUOTE_REQUEST_REJECT_REASON),
            text = msg.get(tags::TEXT).unwrap_or(""),
            "Quote request rejected"
        );
    }

    fn on_quote_cancel(&self, msg: &WireMessage) {
        let request_id = msg.get(tags::QUOTE_REQ_ID);
        let removed = request_id.and_then(|id| self.registry.remove(id));
        tracing::info!(
            request_id = ?request_id,
            quote_id = ?msg.get(tags::QUOTE_ID),
            known = removed.is_some(),
            "Quote canceled"
        );
    }
}

#[async_trait]
impl InboundHandler for InboundDispatcher {
    async fn on_message(&self, msg: WireMessage) -> Option<SessionControl> {
        self.dispatch(&msg).await
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use parking_lot::Mutex;

    use super::*;
    use crate::application::ports::{ExecutionCallbacks, PriceCallback};
    use crate::domain::orders::OrderEventKind;
    use crate::domain::pricing::PriceEntry;
    use crate::domain::requests::{OutstandingRequest, RequestKind, SettlementType};
    use crate::infrastructure::fix::codec::decode;
    use crate::infrastructure::fix::{OutboundHeader, WireMessageBuilder};
    use crate::infrastructure::store::InMemoryPriceStore;

    struct Fixture {
        dispatcher: InboundDispatcher,
        registry: Arc<CorrelationRegistry>,
        store: Arc<InMemoryPriceStore>,
        prices: Arc<Mutex<Vec<PriceEntry>>>,
        fills: Arc<Mutex<Vec<OrderEventKind>>>,
    }

    fn fixture() -> Fixture {
        let registry = Arc::new(CorrelationRegistry::new());
        let store = Arc::new(InMemoryPriceStore::new());
        let prices = Arc::new(Mutex::new(Vec::new()));
        let fills = Arc::new(Mutex::new(Vec::new()));

        let sink = Arc::clone(&prices);
        let listener: PriceCallback = Arc::new(move |p: &PriceEntry| sink.lock().push(p.clone()));
        let fill_sink = Arc::clone(&fills);
        let callbacks = ExecutionCallbacks::builder()
            .on_fill(move |e| fill_sink.lock().push(e.kind))
            .build();

        let dispatcher = InboundDispatcher::new(
            Arc::clone(&registry),
            Arc::new(ExecutionReportHandler::new(callbacks)),
            Arc::new(PriceFanout::new(store.clone(), Arc::clone(&registry), Some(listener))),
        );
        Fixture {
            dispatcher,
            registry,
            store,
            prices,
            fills,
        }
    }

    fn inbound(body: WireMessageBuilder) -> WireMessage {
        let header = OutboundHeader {
            sender_comp_id: "VENUE",
            target_comp_id: "CLIENT",
            seq_num: 2,
            sending_time: Utc::now(),
            poss_dup: false,
        };
        decode(&body.build(&header).encode()).unwrap()
    }

    fn register_quote(registry: &CorrelationRegistry, id: &str) {
        registry
            .register(OutstandingRequest::new(
                id,
                RequestKind::Quote,
                vec!["EUR/USD".into()],
                vec![SettlementType::Spot],
            ))
            .unwrap();
    }

    #[tokio::test]
    async fn session_messages_return_control() {
        let f = fixture();
        let control = f
            .dispatcher
            .dispatch(&inbound(WireMessageBuilder::new(MsgType::TestRequest).field(tags::TEST_REQ_ID, "T1")))
            .await;
        assert_eq!(
            control,
            Some(SessionControl::TestRequest {
                test_req_id: "T1".into()
            })
        );
    }

    #[tokio::test]
    async fn test_request_without_id_is_dropped() {
        let f = fixture();
        assert!(f.dispatcher.dispatch(&inbound(WireMessageBuilder::new(MsgType::TestRequest))).await.is_none());
    }

    #[tokio::test]
    async fn quote_is_resolved_through_registry() {
        let f = fixture();
        register_quote(&f.registry, "R-1");
        let msg = inbound(
            WireMessageBuilder::new(MsgType::Quote)
                .field(tags::QUOTE_REQ_ID, "R-1")
                .field(tags::QUOTE_ID, "Q-1")
                .group(
                    tags::NO_MD_ENTRIES,
                    vec![vec![
                        (tags::MD_ENTRY_TYPE, "0".into()),
                        (tags::MD_ENTRY_PX, "1.0850".into()),
                        (tags::MD_ENTRY_SIZE, "1000000".into()),
                        (tags::MD_ENTRY_ORIGINATOR, "LP1".into()),
                    ]],
                ),
        );

        assert!(f.dispatcher.dispatch(&msg).await.is_none());
        let prices = f.prices.lock();
        assert_eq!(prices.len(), 1);
        assert_eq!(prices[0].symbol, "EUR/USD");
        assert_eq!(prices[0].settlement, "0");
        assert_eq!(f.store.len(), 1);
    }

    #[tokio::test]
    async fn execution_report_reaches_callbacks() {
        let f = fixture();
        let msg = inbound(
            WireMessageBuilder::new(MsgType::ExecutionReport)
                .field(tags::CL_ORD_ID, "C-1")
                .field(tags::EXEC_ID, "E-1")
                .field(tags::EXEC_TYPE, "2")
                .field(tags::ORD_STATUS, "2"),
        );
        f.dispatcher.dispatch(&msg).await;
        assert_eq!(*f.fills.lock(), vec![OrderEventKind::Fill]);
    }

    #[tokio::test]
    async fn quote_request_reject_removes_entry() {
        let f = fixture();
        register_quote(&f.registry, "R-2");
        let msg = inbound(
            WireMessageBuilder::new(MsgType::QuoteRequestReject)
                .field(tags::QUOTE_REQ_ID, "R-2")
                .field(tags::QUOTE_REQUEST_REJECT_REASON, "1"),
        );
        f.dispatcher.dispatch(&msg).await;
        assert!(f.registry.lookup("R-2").is_none());
    }

    #[tokio::test]
    async fn quote_cancel_removes_entry() {
        let f = fixture();
        register_quote(&f.registry, "R-3");
        f.dispatcher
            .dispatch(&inbound(WireMessageBuilder::new(MsgType::QuoteCancel).field(tags::QUOTE_REQ_ID, "R-3")))
            .await;
        assert!(f.registry.is_empty());
    }

    #[tokio::test]
    async fn market_data_ack_keeps_accepted_and_drops_rejected() {
        let f = fixture();
        for id in ["MD-1", "MD-2"] {
            f.registry
                .register(OutstandingRequest::new(
                    id,
                    RequestKind::BatchMarketData,
                    vec!["EUR/USD".into(), "USD/JPY".into()],
                    vec![SettlementType::Spot],
                ))
                .unwrap();
        }

        f.dispatcher
            .dispatch(&inbound(WireMessageBuilder::new(MsgType::MarketDataRequestAck).field(tags::MD_REQ_ID, "MD-1")))
            .await;
        f.dispatcher
            .dispatch(&inbound(
                WireMessageBuilder::new(MsgType::MarketDataRequestAck)
                    .field(tags::MD_REQ_ID, "MD-2")
                    .field(tags::MD_REQ_REJ_REASON, "0"),
            ))
            .await;

        assert!(f.registry.lookup("MD-1").is_some());
        assert!(f.registry.lookup("MD-2").is_none());
    }

    #[tokio::test]
    async fn unknown_ack_and_unknown_type_are_not_fatal() {
        let f = fixture();
        let ack = inbound(
            WireMessageBuilder::new(MsgType::MarketDataRequestAck)
                .field(tags::MD_REQ_ID, "missing")
                .field(tags::SYMBOL, "EUR/USD"),
        );
        assert!(f.dispatcher.dispatch(&ack).await.is_none());
        let unknown = inbound(WireMessageBuilder::new(MsgType::Other("UZ".into())).field(tags::TEXT, "x"));
        assert!(f.dispatcher.dispatch(&unknown).await.is_none());
    }
}
