//! Response caching — key derivation, the store contract, and the middleware.
//!
//! - [`build_key`] — deterministic cache key for a request.
//! - [`Store`] — the key/value service entries live in; [`MemoryStore`] is the
//!   in-process implementation.
//! - [`CacheMiddleware`] — replays hits, captures misses through [`WriteBack`].
//! - [`CacheConfig`] — prefix, `Cache-Control` accessibility, query defaults,
//!   and the [`Environment`] that decides whether failures are logged.

pub mod config;
pub mod key;
pub mod middleware;
pub mod store;

pub use config::{CacheConfig, Environment};
pub use key::build_key;
pub use middleware::{CacheMiddleware, WriteBack, max_age};
pub use store::{CacheEntry, MemoryStore, Store, StoreError};
