//! In-Memory Price Store
//!
//! Process-local implementation of [`PriceStore`]. Latest value per key.

use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::RwLock;

use crate::application::ports::{PriceStore, PriceStoreError};
use crate::domain::pricing::{PriceKey, PriceQuote};

/// `HashMap`-backed price store.
#[derive(Debug, Default)]
pub struct InMemoryPriceStore {
    prices: RwLock<HashMap<PriceKey, PriceQuote>>,
}

impl InMemoryPriceStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored keys.
    #[must_use]
    pub fn len(&self) -> usize {
        self.prices.read().len()
    }

    /// Whether the store is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.prices.read().is_empty()
    }
}

#[async_trait]
impl PriceStore for InMemoryPriceStore {
    async fn get(&self, key: &PriceKey) -> Result<Option<PriceQuote>, PriceStoreError> {
        Ok(self.prices.read().get(key).copied())
    }

    async fn set(&self, key: PriceKey, quote: PriceQuote) -> Result<(), PriceStoreError> {
        self.prices.write().insert(key, quote);
        Ok(())
    }

    async fn delete(&self, key: &PriceKey) -> Result<bool, PriceStoreError> {
        Ok(self.prices.write().remove(key).is_some())
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use rust_decimal::Decimal;

    use super::*;
    use crate::domain::pricing::{InstrumentType, PriceSide};

    fn key(side: PriceSide) -> PriceKey {
        PriceKey {
            symbol: "EUR/USD".into(),
            instrument_type: InstrumentType::Spot,
            quantity: Decimal::new(1_000_000, 0),
            side,
            settlement: "0".into(),
            provider: "LP1".into(),
        }
    }

    #[tokio::test]
    async fn latest_value_wins() {
        let store = InMemoryPriceStore::new();
        let first = PriceQuote {
            rate: Decimal::new(10_850, 4),
            timestamp: Utc::now(),
        };
        let second = PriceQuote {
            rate: Decimal::new(10_851, 4),
            timestamp: Utc::now(),
        };
        store.set(key(PriceSide::Bid), first).await.unwrap();
        store.set(key(PriceSide::Bid), second).await.unwrap();

        assert_eq!(store.get(&key(PriceSide::Bid)).await.unwrap(), Some(second));
        assert_eq!(store.get(&key(PriceSide::Ask)).await.unwrap(), None);
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn delete_reports_presence() {
        let store = InMemoryPriceStore::new();
        let quote = PriceQuote {
            rate: Decimal::ONE,
            timestamp: Utc::now(),
        };
        store.set(key(PriceSide::Ask), quote).await.unwrap();
        assert!(store.delete(&key(PriceSide::Ask)).await.unwrap());
        assert!(!store.delete(&key(PriceSide::Ask)).await.unwrap());
        assert!(store.is_empty());
    }
}
