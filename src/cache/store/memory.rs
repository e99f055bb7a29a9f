//! In-memory store backed by a sharded concurrent map.
//!
//! Entries are kept JSON-encoded, the way an external key/value service would
//! hold them, and expire lazily on access.

use std::{sync::Arc, time::Duration};

use dashmap::DashMap;
use tokio::time::Instant;
use tracing::debug;

use super::{CacheEntry, Result, Store, StoreError};

struct Slot {
    data: Vec<u8>,
    expires_at: Option<Instant>,
}

impl Slot {
    fn remaining(&self, now: Instant) -> Option<Duration> {
        self.expires_at.map(|exp| exp.saturating_duration_since(now))
    }

    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|exp| now >= exp)
    }
}

/// Thread-safe in-memory [`Store`] with per-entry expiry and TTL lookup.
///
/// Clones share the same underlying map.
///
/// # Example
///
/// ```no_run
/// use std::time::Duration;
/// use rttp_cache::cache::{CacheEntry, MemoryStore, Store};
///
/// # async fn example() -> Result<(), rttp_cache::cache::StoreError> {
/// let store = MemoryStore::new();
/// store.set("GET:/a", CacheEntry::new(200, "ok"), Some(Duration::from_secs(60))).await?;
/// assert_eq!(store.ttl("GET:/a").await?, Some(60));
/// # Ok(())
/// # }
/// ```
#[derive(Clone, Default)]
pub struct MemoryStore {
    slots: Arc<DashMap<String, Slot>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of slots held, including expired ones not yet evicted.
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Removes `key`, returning whether it was present.
    pub fn delete(&self, key: &str) -> bool {
        self.slots.remove(key).is_some()
    }

    fn live_remaining(&self, key: &str) -> Option<Option<Duration>> {
        let now = Instant::now();
        let remaining = self
            .slots
            .get(key)
            .filter(|slot| !slot.is_expired(now))
            .map(|slot| slot.remaining(now));
        if remaining.is_none() {
            self.slots.remove_if(key, |_, slot| slot.is_expired(now));
        }
        remaining
    }
}

impl Store for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<CacheEntry>> {
        let now = Instant::now();
        let data = self
            .slots
            .get(key)
            .filter(|slot| !slot.is_expired(now))
            .map(|slot| slot.data.clone());

        match data {
            Some(data) => {
                debug!(key, "memory store hit");
                Ok(Some(serde_json::from_slice(&data)?))
            }
            None => {
                self.slots.remove_if(key, |_, slot| slot.is_expired(now));
                debug!(key, "memory store miss");
                Ok(None)
            }
        }
    }

    async fn set(&self, key: &str, entry: CacheEntry, ttl: Option<Duration>) -> Result<()> {
        let expires_at = match ttl {
            Some(ttl) => Some(Instant::now().checked_add(ttl).ok_or_else(|| {
                StoreError::Backend(format!("ttl of {}s is out of range", ttl.as_secs()))
            })?),
            None => None,
        };
        let data = serde_json::to_vec(&entry)?;
        self.slots.insert(key.to_string(), Slot { data, expires_at });
        debug!(key, ttl = ?ttl, "memory store set");
        Ok(())
    }

    fn supports_ttl(&self) -> bool {
        true
    }

    /// Remaining lifetime rounded to the nearest second.
    async fn ttl(&self, key: &str) -> Result<Option<u64>> {
        Ok(self
            .live_remaining(key)
            .flatten()
            .map(|remaining| remaining.as_secs() + u64::from(remaining.subsec_millis() >= 500)))
    }
}
