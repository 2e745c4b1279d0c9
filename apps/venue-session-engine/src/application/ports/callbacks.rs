//! Subscriber Callbacks (Driver Port)
//!
//! Typed listeners registered once at startup. Each order event kind has its
//! own slot; unset slots are skipped.

use std::fmt;
use std::sync::Arc;

use crate::domain::orders::{OrderEvent, OrderEventKind};
use crate::domain::pricing::PriceEntry;

/// Listener for normalized prices.
pub type PriceCallback = Arc<dyn Fn(&PriceEntry) + Send + Sync>;

/// Listener for one kind of order event.
pub type OrderCallback = Arc<dyn Fn(&OrderEvent) + Send + Sync>;

/// Order event listeners, one per event kind.
#[derive(Clone, Default)]
pub struct ExecutionCallbacks {
    on_pending: Option<OrderCallback>,
    on_partial_fill: Option<OrderCallback>,
    on_fill: Option<OrderCallback>,
    on_cancel: Option<OrderCallback>,
    on_reject: Option<OrderCallback>,
    on_expired: Option<OrderCallback>,
}

impl ExecutionCallbacks {
    /// Start registering listeners.
    #[must_use]
    pub fn builder() -> ExecutionCallbacksBuilder {
        ExecutionCallbacksBuilder::default()
    }

    /// Listener for an event kind. Acknowledgements have none.
    #[must_use]
    pub fn for_kind(&self, kind: OrderEventKind) -> Option<&OrderCallback> {
        match kind {
            OrderEventKind::Acknowledged => None,
            OrderEventKind::PendingNew => self.on_pending.as_ref(),
            OrderEventKind::PartialFill => self.on_partial_fill.as_ref(),
            OrderEventKind::Fill => self.on_fill.as_ref(),
            OrderEventKind::Canceled => self.on_cancel.as_ref(),
            OrderEventKind::Rejected => self.on_reject.as_ref(),
            OrderEventKind::Expired => self.on_expired.as_ref(),
        }
    }
}

impl fmt::Debug for ExecutionCallbacks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExecutionCallbacks")
            .field("on_pending", &self.on_pending.is_some())
            .field("on_partial_fill", &self.on_partial_fill.is_some())
            .field("on_fill", &self.on_fill.is_some())
            .field("on_cancel", &self.on_cancel.is_some())
            .field("on_reject", &self.on_reject.is_some())
            .field("on_expired", &self.on_expired.is_some())
            .finish()
    }
}

/// Builder for [`ExecutionCallbacks`].
#[derive(Default)]
pub struct ExecutionCallbacksBuilder {
    callbacks: ExecutionCallbacks,
}

impl ExecutionCallbacksBuilder {
    /// Order pending acceptance.
    #[must_use]
    pub fn on_pending(mut self, f: impl Fn(&OrderEvent) + Send + Sync + 'static) -> Self {
        self.callbacks.on_pending = Some(Arc::new(f));
        self
    }

    /// Partial execution.
    #[must_use]
    pub fn on_partial_fill(mut self, f: impl Fn(&OrderEvent) + Send + Sync + 'static) -> Self {
        self.callbacks.on_partial_fill = Some(Arc::new(f));
        self
    }

    /// Complete execution.
    #[must_use]
    pub fn on_fill(mut self, f: impl Fn(&OrderEvent) + Send + Sync + 'static) -> Self {
        self.callbacks.on_fill = Some(Arc::new(f));
        self
    }

    /// Order canceled.
    #[must_use]
    pub fn on_cancel(mut self, f: impl Fn(&OrderEvent) + Send + Sync + 'static) -> Self {
        self.callbacks.on_cancel = Some(Arc::new(f));
        self
    }

    /// Order rejected.
    #[must_use]
    pub fn on_reject(mut self, f: impl Fn(&OrderEvent) + Send + Sync + 'static) -> Self {
        self.callbacks.on_reject = Some(Arc::new(f));
        self
    }

    /// Order expired.
    #[must_use]
    pub fn on_expired(mut self, f: impl Fn(&OrderEvent) + Send + Sync + 'static) -> Self {
        self.callbacks.on_expired = Some(Arc::new(f));
        self
    }

    /// Finish registration.
    #[must_use]
    pub fn build(self) -> ExecutionCallbacks {
        self.callbacks
    }
}
