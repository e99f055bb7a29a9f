//! # rttp-cache
//!
//! Response-caching middleware for the rttp middleware pipeline.
//!
//! Successful responses are written to a pluggable [`Store`](cache::Store)
//! under a key derived from the request's method, path, and query, and are
//! replayed on later matching requests with a `Cache-Control` header carrying
//! the entry's remaining lifetime.
//!
//! ## Quick Start
//!
//! ```rust
//! use rttp_cache::{
//!     Method, Request, Response, StatusCode,
//!     cache::{CacheConfig, CacheMiddleware, MemoryStore},
//!     context::Context,
//!     middleware::Pipeline,
//! };
//!
//! # async fn example() {
//! let pipeline = Pipeline::new(|_ctx: Context| async {
//!     Response::new(StatusCode::Ok)
//!         .header("Cache-Control", "public, max-age=300")
//!         .body(r#"{"items":[]}"#)
//! })
//! .with(CacheMiddleware::new(MemoryStore::new(), CacheConfig::new().prefix("api")));
//!
//! // First call runs the handler and stores the response; later calls replay it.
//! let response = pipeline.call(Request::new(Method::Get, "/items").with_query("page", 1)).await;
//! assert_eq!(response.status(), StatusCode::Ok);
//! # }
//! ```

pub mod cache;
pub mod context;
pub mod http;
pub mod middleware;

// ── Convenience re-exports ────────────────────────────────────────────────────
pub use http::{Headers, Method, Request, Response, StatusCode};
