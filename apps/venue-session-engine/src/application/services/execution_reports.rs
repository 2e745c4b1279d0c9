//! Execution Report Handler
//!
//! Decodes ExecutionReport (`8`) messages into [`OrderEvent`]s and invokes
//! the listener registered for the event kind. No retries happen here.
//!
//! Reports flagged PossDupFlag=Y whose ExecID was already processed are
//! dropped. The set of remembered ExecIDs is bounded.

use std::collections::{HashSet, VecDeque};

use parking_lot::Mutex;

use crate::application::ports::ExecutionCallbacks;
use crate::domain::orders::{ExecType, OrderEvent, OrderEventKind, OrderState, SessionType, Side};
use crate::infrastructure::fix::WireMessage;
use crate::infrastructure::fix::tags;
use crate::infrastructure::metrics;

/// ExecIDs remembered for duplicate suppression.
pub const DEFAULT_EXEC_ID_MEMORY: usize = 10_000;

/// Bounded FIFO set of processed ExecIDs.
#[derive(Debug)]
struct SeenExecIds {
    order: VecDeque<String>,
    ids: HashSet<String>,
    capacity: usize,
}

impl SeenExecIds {
    fn new(capacity: usize) -> Self {
        Self {
            order: VecDeque::with_capacity(capacity.min(1024)),
            ids: HashSet::with_capacity(capacity.min(1024)),
            capacity,
        }
    }

    /// Record an id; returns `false` if it was already present.
    fn insert(&mut self, exec_id: &str) -> bool {
        if self.ids.contains(exec_id) {
            return false;
        }
        if self.capacity == 0 {
            return true;
        }
        if self.order.len() == self.capacity {
            if let Some(oldest) = self.order.pop_front() {
                self.ids.remove(&oldest);
            }
        }
        self.order.push_back(exec_id.to_string());
        self.ids.insert(exec_id.to_string());
        true
    }
}

/// Decode-and-dispatch for execution reports.
#[derive(Debug)]
pub struct ExecutionReportHandler {
    callbacks: ExecutionCallbacks,
    seen: Mutex<SeenExecIds>,
}

impl ExecutionReportHandler {
    /// Create a handler with the default ExecID memory.
    #[must_use]
    pub fn new(callbacks: ExecutionCallbacks) -> Self {
        Self::with_memory(callbacks, DEFAULT_EXEC_ID_MEMORY)
    }

    /// Create a handler remembering up to `capacity` ExecIDs.
    #[must_use]
    pub fn with_memory(callbacks: ExecutionCallbacks, capacity: usize) -> Self {
        Self {
            callbacks,
            seen: Mutex::new(SeenExecIds::new(capacity)),
        }
    }

    /// Handle one ExecutionReport.
    ///
    /// Returns the event that was dispatched, or `None` when the report was
    /// incomplete, a duplicate, or of an unhandled type.
    pub fn handle(&self, msg: &WireMessage) -> Option<OrderEvent> {
        let Some(order) = parse_order(msg) else {
            tracing::warn!(seq = ?msg.seq_num(), "ExecutionReport missing ClOrdID or ExecType, dropped");
            return None;
        };

        if let Some(exec_id) = order.exec_id.as_deref() {
            let fresh = self.seen.lock().insert(exec_id);
            if !fresh && msg.get_flag(tags::POSS_DUP_FLAG) {
                tracing::info!(
                    cl_ord_id = %order.cl_ord_id,
                    exec_id,
                    "Duplicate ExecutionReport ignored"
                );
                return None;
            }
        }

        let Some(kind) = order.exec_type.event_kind(&order.status()) else {
            tracing::warn!(
                cl_ord_id = %order.cl_ord_id,
                exec_type = %order.exec_type,
                ord_status = %order.ord_status,
                "Unhandled ExecType"
            );
            metrics::record_execution_event("unhandled");
            return None;
        };

        metrics::record_execution_event(kind.as_str());
        let event = OrderEvent { kind, order };
        self.dispatch(&event);
        Some(event)
    }

    fn dispatch(&self, event: &OrderEvent) {
        let order = &event.order;
        match event.kind {
            OrderEventKind::Acknowledged => {
                tracing::info!(
                    cl_ord_id = %order.cl_ord_id,
                    order_id = ?order.order_id,
                    session_type = ?order.session_type,
                    "Order acknowledged"
                );
                return;
            }
            OrderEventKind::PartialFill | OrderEventKind::Fill => tracing::info!(
                cl_ord_id = %order.cl_ord_id,
                kind = event.kind.as_str(),
                last_qty = ?order.last_qty,
                last_px = ?order.last_px,
                leaves_qty = ?order.leaves_qty,
                "Order execution"
            ),
            OrderEventKind::Rejected => tracing::warn!(
                cl_ord_id = %order.cl_ord_id,
                text = ?order.text,
                "Order rejected"
            ),
            OrderEventKind::PendingNew | OrderEventKind::Canceled | OrderEventKind::Expired => tracing::info!(
                cl_ord_id = %order.cl_ord_id,
                kind = event.kind.as_str(),
                "Order status"
            ),
        }

        match self.callbacks.for_kind(event.kind) {
            Some(callback) => callback(event),
            None => tracing::debug!(kind = event.kind.as_str(), "No listener registered"),
        }
    }
}

fn parse_order(msg: &WireMessage) -> Option<OrderState> {
    let cl_ord_id = msg.get(tags::CL_ORD_ID)?.to_string();
    let exec_type = ExecType::from_fix(msg.get(tags::EXEC_TYPE)?);
    let owned = |tag| msg.get(tag).map(str::to_string);
    let quote_id = owned(tags::QUOTE_ID);

    Some(OrderState {
        session_type: SessionType::from_quote_id(quote_id.as_deref()),
        cl_ord_id,
        order_id: owned(tags::ORDER_ID),
        quote_id,
        exec_id: owned(tags::EXEC_ID),
        exec_type,
        ord_status: owned(tags::ORD_STATUS).unwrap_or_default(),
        symbol: owned(tags::SYMBOL),
        side: msg.get(tags::SIDE).and_then(Side::from_fix),
        quantity: msg.get_decimal(tags::ORDER_QTY),
        price: msg.get_decimal(tags::PRICE),
        last_qty: msg.get_decimal(tags::LAST_QTY),
        last_px: msg.get_decimal(tags::LAST_PX),
        cum_qty: msg.get_decimal(tags::CUM_QTY),
        leaves_qty: msg.get_decimal(tags::LEAVES_QTY),
        avg_px: msg.get_decimal(tags::AVG_PX),
        currency: owned(tags::CURRENCY),
        settl_date: owned(tags::SETTL_DATE),
        transact_time: owned(tags::TRANSACT_TIME),
        text: owned(tags::TEXT),
    })
}
