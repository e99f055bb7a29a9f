//! Cache store contract and implementations.

use std::{future::Future, time::Duration};

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub mod memory;

pub use memory::MemoryStore;

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;

/// Errors reported by a [`Store`].
#[derive(Debug, Error)]
pub enum StoreError {
    /// The backing service failed (connection lost, timeout, protocol error).
    #[error("store backend error: {0}")]
    Backend(String),

    /// An entry could not be encoded or decoded.
    #[error("cache entry serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// A cached response: the status code and body of a successful response.
///
/// Serialized with camelCase field names (`statusCode`, `body`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheEntry {
    pub status_code: u16,
    pub body: String,
}

impl CacheEntry {
    pub fn new(status_code: u16, body: impl Into<String>) -> Self {
        Self {
            status_code,
            body: body.into(),
        }
    }
}

/// Key/value service that holds cached responses.
///
/// All methods take `&self`; implementations use interior mutability or an
/// external service and are responsible for their own concurrency safety.
/// Every returned future is `Send` so stores can be driven from spawned tasks.
pub trait Store: Send + Sync {
    /// Fetches the entry stored under `key`, or `None` on a miss.
    fn get(&self, key: &str) -> impl Future<Output = Result<Option<CacheEntry>>> + Send;

    /// Stores `entry` under `key`.
    ///
    /// With `ttl` of `None` the store's own default expiry policy applies.
    fn set(
        &self,
        key: &str,
        entry: CacheEntry,
        ttl: Option<Duration>,
    ) -> impl Future<Output = Result<()>> + Send;

    /// Whether [`ttl`](Self::ttl) is implemented.
    fn supports_ttl(&self) -> bool {
        false
    }

    /// Remaining time-to-live of `key` in whole seconds.
    ///
    /// `None` when the key is missing, never expires, or the store cannot tell.
    fn ttl(&self, key: &str) -> impl Future<Output = Result<Option<u64>>> + Send {
        let _ = key;
        async { Ok(None) }
    }
}
