//! Venue Gateway Integration Tests
//!
//! Full path from gateway request through the session to the venue stub,
//! and from venue responses through the dispatcher to the price store and
//! order callbacks.

#![allow(clippy::unwrap_used, clippy::expect_used)]

mod common;

use std::sync::Arc;

use parking_lot::Mutex;
use rust_decimal::Decimal;

use common::{VenueConnection, VenueStub, eventually, session};
use venue_session_engine::infrastructure::fix::codec::RELATED_SYM;
use venue_session_engine::infrastructure::fix::{InMemorySequenceStore, MsgType, WireMessageBuilder, tags};
use venue_session_engine::{
    CorrelationRegistry, EspTradeIntent, ExecutionCallbacks, ExecutionReportHandler, GatewayError,
    InMemoryPriceStore, InboundDispatcher, InstrumentType, NdfTerms, OrderEventKind, PriceEntry,
    PriceFanout, PriceSide, RequestBuilder, SettlementType, Side, VenueGateway,
};

struct Harness {
    gateway: VenueGateway,
    conn: VenueConnection,
    registry: Arc<CorrelationRegistry>,
    store: Arc<InMemoryPriceStore>,
    prices: Arc<Mutex<Vec<PriceEntry>>>,
    orders: Arc<Mutex<Vec<(OrderEventKind, String)>>>,
}

async fn harness() -> Harness {
    let registry = Arc::new(CorrelationRegistry::new());
    let store = Arc::new(InMemoryPriceStore::new());
    let prices = Arc::new(Mutex::new(Vec::new()));
    let orders: Arc<Mutex<Vec<(OrderEventKind, String)>>> = Arc::new(Mutex::new(Vec::new()));

    let price_sink = Arc::clone(&prices);
    let record = |orders: &Arc<Mutex<Vec<(OrderEventKind, String)>>>| {
        let orders = Arc::clone(orders);
        move |e: &venue_session_engine::OrderEvent| orders.lock().push((e.kind, e.order.cl_ord_id.clone()))
    };
    let callbacks = ExecutionCallbacks::builder()
        .on_pending(record(&orders))
        .on_partial_fill(record(&orders))
        .on_fill(record(&orders))
        .on_reject(record(&orders))
        .build();

    let dispatcher = Arc::new(InboundDispatcher::new(
        Arc::clone(&registry),
        Arc::new(ExecutionReportHandler::new(callbacks)),
        Arc::new(PriceFanout::new(
            store.clone(),
            Arc::clone(&registry),
            Some(Arc::new(move |p: &PriceEntry| price_sink.lock().push(p.clone()))),
        )),
    ));

    let venue = VenueStub::bind().await;
    let session = session(venue.port(), Arc::new(InMemorySequenceStore::new(1)), dispatcher).await;
    let gateway = VenueGateway::new(
        Arc::clone(&session),
        session,
        RequestBuilder::new(Some("LP1".into())),
        Arc::clone(&registry),
    );

    let (result, conn) = tokio::join!(gateway.logon("trader", "secret"), async {
        let mut conn = venue.accept().await;
        conn.accept_logon().await;
        conn
    });
    result.unwrap();

    Harness {
        gateway,
        conn,
        registry,
        store,
        prices,
        orders,
    }
}

fn md_entry(side: &str, px: &str, provider: &str) -> Vec<(u32, String)> {
    vec![
        (tags::MD_ENTRY_TYPE, side.into()),
        (tags::MD_ENTRY_PX, px.into()),
        (tags::MD_ENTRY_SIZE, "1000000".into()),
        (tags::MD_ENTRY_ORIGINATOR, provider.into()),
    ]
}

#[tokio::test]
async fn market_data_snapshot_is_resolved_and_filtered() {
    let mut h = harness().await;

    let md_req_id = h
        .gateway
        .request_esp_prices("EUR/USD", SettlementType::Spot, false)
        .await
        .unwrap();
    assert!(h.registry.lookup(&md_req_id).is_some());

    let request = h.conn.recv_type(MsgType::MarketDataRequest).await;
    assert_eq!(request.get(tags::MD_REQ_ID), Some(md_req_id.as_str()));
    assert_eq!(request.get(tags::SUBSCRIPTION_REQUEST_TYPE), Some("1"));
    let related = request.group(RELATED_SYM);
    assert_eq!(related.len(), 1);
    assert_eq!(related[0].get(tags::SYMBOL), Some("EUR/USD"));

    // Snapshot without Symbol; second entry has an invalid MDEntryType,
    // third has no MDEntryOriginator.
    h.conn
        .send(
            WireMessageBuilder::new(MsgType::MarketDataSnapshot)
                .field(tags::MD_REQ_ID, &md_req_id)
                .group(
                    tags::NO_MD_ENTRIES,
                    vec![
                        md_entry("0", "1.0850", "LP1"),
                        md_entry("7", "1.0851", "LP1"),
                        vec![
                            (tags::MD_ENTRY_TYPE, "1".into()),
                            (tags::MD_ENTRY_PX, "1.0852".into()),
                            (tags::MD_ENTRY_SIZE, "1000000".into()),
                        ],
                        md_entry("1", "1.0853", "LP2"),
                    ],
                ),
        )
        .await;

    assert!(eventually(|| h.prices.lock().len() == 2).await);
    let prices = h.prices.lock().clone();
    assert_eq!(prices[0].side, PriceSide::Bid);
    assert_eq!(prices[0].provider, "LP1");
    assert_eq!(prices[1].side, PriceSide::Ask);
    assert_eq!(prices[1].rate, Decimal::new(10_853, 4));
    for price in &prices {
        assert_eq!(price.symbol, "EUR/USD");
        assert_eq!(price.settlement, "0");
        assert_eq!(price.instrument_type, InstrumentType::Spot);
        assert_eq!(price.request_id.as_deref(), Some(md_req_id.as_str()));
    }
    assert_eq!(h.store.len(), 2);
}

#[tokio::test]
async fn market_data_reject_clears_correlation() {
    let mut h = harness().await;
    let md_req_id = h
        .gateway
        .request_esp_prices("USD/JPY", SettlementType::Tomorrow, false)
        .await
        .unwrap();
    h.conn.recv_type(MsgType::MarketDataRequest).await;

    h.conn
        .send(
            WireMessageBuilder::new(MsgType::MarketDataRequestAck)
                .field(tags::MD_REQ_ID, &md_req_id)
                .field(tags::MD_REQ_REJ_REASON, "0")
                .field(tags::TEXT, "unknown symbol"),
        )
        .await;

    assert!(eventually(|| h.registry.lookup(&md_req_id).is_none()).await);
}

#[tokio::test]
async fn execution_reports_fire_callbacks_in_order() {
    let mut h = harness().await;
    let intent = EspTradeIntent {
        symbol: "EUR/USD".into(),
        side: Side::Buy,
        quantity: Decimal::new(1_000_000, 0),
        currency: "EUR".into(),
        price: Decimal::new(10_850, 4),
        settlement: SettlementType::Spot,
        settlement_date: None,
        quote_id: None,
        ndf: NdfTerms::DELIVERABLE,
    };
    let cl_ord_id = h.gateway.request_esp_trade(&intent).await.unwrap();
    assert!(h.registry.is_empty());

    let order = h.conn.recv_type(MsgType::NewOrderSingle).await;
    assert_eq!(order.get(tags::CL_ORD_ID), Some(cl_ord_id.as_str()));
    assert_eq!(order.get(tags::ORD_TYPE), Some("2"));

    for (exec_type, ord_status, exec_id, last_qty) in [
        ("A", "A", "E1", "0"),
        ("1", "1", "E2", "400000"),
        ("2", "2", "E3", "600000"),
    ] {
        h.conn
            .send(
                WireMessageBuilder::new(MsgType::ExecutionReport)
                    .field(tags::ORDER_ID, "V-1")
                    .field(tags::CL_ORD_ID, &cl_ord_id)
                    .field(tags::EXEC_ID, exec_id)
                    .field(tags::EXEC_TYPE, exec_type)
                    .field(tags::ORD_STATUS, ord_status)
                    .field(tags::SYMBOL, "EUR/USD")
                    .field(tags::SIDE, "1")
                    .field(tags::LAST_QTY, last_qty)
                    .field(tags::LAST_PX, "1.0850"),
            )
            .await;
    }

    assert!(eventually(|| h.orders.lock().len() == 3).await);
    let kinds: Vec<_> = h.orders.lock().iter().map(|(k, _)| *k).collect();
    assert_eq!(
        kinds,
        vec![OrderEventKind::PendingNew, OrderEventKind::PartialFill, OrderEventKind::Fill]
    );
    assert!(h.orders.lock().iter().all(|(_, id)| *id == cl_ord_id));
}

#[tokio::test]
async fn requests_fail_fast_once_disconnected() {
    let h = harness().await;
    h.gateway.disconnect().await;

    let err = h
        .gateway
        .request_esp_prices("EUR/USD", SettlementType::Spot, false)
        .await
        .unwrap_err();
    assert!(matches!(err, GatewayError::NotConnected { .. }));
    assert!(h.registry.is_empty());
}
