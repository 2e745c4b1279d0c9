//! Price Store Port (Driven Port)
//!
//! Keyed latest-value store for normalized prices. Latest write wins; no
//! history is kept.

use async_trait::async_trait;

use crate::domain::pricing::{PriceKey, PriceQuote};

/// Price store error.
#[derive(Debug, Clone, thiserror::Error)]
pub enum PriceStoreError {
    /// Store unreachable.
    #[error("Price store connection error: {message}")]
    ConnectionError {
        /// Error details.
        message: String,
    },

    /// Write rejected.
    #[error("Price store write failed for {key}: {message}")]
    WriteFailed {
        /// Rendered key.
        key: String,
        /// Error details.
        message: String,
    },
}

/// Port for storing the latest rate per price key.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PriceStore: Send + Sync {
    /// Latest stored value for a key.
    async fn get(&self, key: &PriceKey) -> Result<Option<PriceQuote>, PriceStoreError>;

    /// Overwrite the value for a key.
    async fn set(&self, key: PriceKey, quote: PriceQuote) -> Result<(), PriceStoreError>;

    /// Remove a key. Returns whether it was present.
    async fn delete(&self, key: &PriceKey) -> Result<bool, PriceStoreError>;
}
