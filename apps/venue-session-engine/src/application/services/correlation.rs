//! Correlation Registry
//!
//! Maps generated request ids (QuoteReqID, MDReqID) to the parameters of the
//! request, so venue answers that omit symbol and settlement can still be
//! interpreted.
//!
//! Entries are removed on a terminal answer (quote cancel or reject, market
//! data reject). Market data subscriptions are long-lived and are only
//! dropped by [`CorrelationRegistry::purge_expired`].
//!
//! # Example
//!
//! ```rust
//! use venue_session_engine::application::services::CorrelationRegistry;
//! use venue_session_engine::domain::requests::{OutstandingRequest, RequestKind, SettlementType};
//!
//! let registry = CorrelationRegistry::new();
//! let request = OutstandingRequest::new(
//!     "req-1",
//!     RequestKind::Quote,
//!     vec!["EUR/USD".to_string()],
//!     vec![SettlementType::Spot],
//! );
//! registry.register(request.clone()).unwrap();
//!
//! // A second registration with the same id is refused.
//! assert!(registry.register(request).is_err());
//! assert_eq!(registry.lookup("req-1").unwrap().primary_symbol(), Some("EUR/USD"));
//! ```

use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use tokio_util::sync::CancellationToken;

use crate::domain::requests::OutstandingRequest;

/// Default lifetime of an entry that never received a terminal answer.
pub const DEFAULT_REQUEST_TTL: Duration = Duration::from_secs(24 * 60 * 60);

/// Registry failures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    /// An entry with this id is already registered.
    #[error("duplicate request id: {0}")]
    DuplicateRequestId(String),
}

/// Concurrent request-id map.
#[derive(Debug, Default)]
pub struct CorrelationRegistry {
    entries: RwLock<HashMap<String, OutstandingRequest>>,
}

impl CorrelationRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a request.
    ///
    /// # Errors
    ///
    /// Returns `RegistryError::DuplicateRequestId` if the id is taken; the
    /// existing entry is left untouched.
    pub fn register(&self, request: OutstandingRequest) -> Result<(), RegistryError> {
        match self.entries.write().entry(request.request_id.clone()) {
            Entry::Occupied(_) => Err(RegistryError::DuplicateRequestId(request.request_id)),
            Entry::Vacant(slot) => {
                tracing::debug!(
                    request_id = %request.request_id,
                    kind = ?request.kind,
                    symbols = ?request.symbols,
                    "Request registered"
                );
                slot.insert(request);
                Ok(())
            }
        }
    }

    /// Parameters of a registered request.
    #[must_use]
    pub fn lookup(&self, request_id: &str) -> Option<OutstandingRequest> {
        self.entries.read().get(request_id).cloned()
    }

    /// Remove and return a request.
    pub fn remove(&self, request_id: &str) -> Option<OutstandingRequest> {
        let removed = self.entries.write().remove(request_id);
        if removed.is_some() {
            tracing::debug!(request_id, "Request removed");
        }
        removed
    }

    /// Drop entries older than `ttl`. Returns how many were dropped.
    pub fn purge_expired(&self, ttl: Duration) -> usize {
        match chrono::Duration::from_std(ttl) {
            Ok(ttl) => self.purge_before(Utc::now() - ttl),
            Err(_) => 0,
        }
    }

    /// Purge expired entries every `every` until `shutdown` fires.
    pub async fn run_purge(self: Arc<Self>, ttl: Duration, every: Duration, shutdown: CancellationToken) {
        let mut ticker = tokio::time::interval(every);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                () = shutdown.cancelled() => break,
                _ = ticker.tick() => {
                    self.purge_expired(ttl);
                }
            }
        }
        tracing::debug!("Request purge task stopped");
    }

    /// Drop entries created before `cutoff`.
    pub fn purge_before(&self, cutoff: DateTime<Utc>) -> usize {
        let mut entries = self.entries.write();
        let before = entries.len();
        entries.retain(|_, request| request.created_at >= cutoff);
        let purged = before - entries.len();
        if purged > 0 {
            tracing::info!(purged, remaining = entries.len(), "Expired requests purged");
        }
        purged
    }

    /// Number of registered requests.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// Whether nothing is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::requests::{RequestKind, SettlementType};

    fn request(id: &str, symbol: &str) -> OutstandingRequest {
        OutstandingRequest::new(id, RequestKind::Quote, vec![symbol.to_string()], vec![SettlementType::Spot])
    }

    #[test]
    fn duplicate_id_keeps_original() {
        let registry = CorrelationRegistry::new();
        registry.register(request("r1", "EUR/USD")).unwrap();

        let err = registry.register(request("r1", "USD/JPY")).unwrap_err();
        assert_eq!(err, RegistryError::DuplicateRequestId("r1".into()));
        assert_eq!(registry.lookup("r1").unwrap().primary_symbol(), Some("EUR/USD"));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn remove_returns_entry_once() {
        let registry = CorrelationRegistry::new();
        registry.register(request("r1", "EUR/USD")).unwrap();

        assert!(registry.remove("r1").is_some());
        assert!(registry.remove("r1").is_none());
        assert!(registry.is_empty());
    }

    #[test]
    fn purge_drops_only_old_entries() {
        let registry = CorrelationRegistry::new();
        let mut old = request("old", "EUR/USD");
        old.created_at = Utc::now() - chrono::Duration::hours(25);
        registry.register(old).unwrap();
        registry.register(request("fresh", "USD/JPY")).unwrap();

        assert_eq!(registry.purge_expired(DEFAULT_REQUEST_TTL), 1);
        assert!(registry.lookup("old").is_none());
        assert!(registry.lookup("fresh").is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn purge_task_stops_on_shutdown() {
        let registry = Arc::new(CorrelationRegistry::new());
        let shutdown = CancellationToken::new();
        let task = tokio::spawn(Arc::clone(&registry).run_purge(
            DEFAULT_REQUEST_TTL,
            Duration::from_secs(60),
            shutdown.clone(),
        ));
        tokio::time::sleep(Duration::from_secs(120)).await;
        shutdown.cancel();
        task.await.unwrap();
    }

    #[test]
    fn concurrent_registration_of_distinct_ids() {
        let registry = Arc::new(CorrelationRegistry::new());
        let handles: Vec<_> = (0..8)
            .map(|t| {
                let registry = Arc::clone(&registry);
                std::thread::spawn(move || {
                    for i in 0..100 {
                        registry.register(request(&format!("{t}-{i}"), "EUR/USD")).unwrap();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(registry.len(), 800);
    }
}
