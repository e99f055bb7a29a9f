//! Response-caching middleware.
//!
//! On each request the middleware derives a key with [`build_key`] and asks the
//! store for it:
//!
//! - **hit** — the stored status and body are replayed and the rest of the
//!   chain is skipped. If the store can report the entry's remaining TTL, a
//!   `Cache-Control: <accessibility>, max-age=<ttl>` header is attached.
//! - **miss** — the chain runs behind a [`WriteBack`] decorator, which stores
//!   a successful response in the background once it has been produced.
//!
//! Store failures never fail the request. They are logged as warnings outside
//! production and the request proceeds as if nothing was cached.

use std::{fmt, future::Future, sync::Arc, time::Duration};

use serde_json::Value;
use tracing::{debug, warn};

use super::{
    config::{CacheConfig, Environment},
    key::build_key,
    store::{CacheEntry, Store},
};
use crate::{
    Response, StatusCode,
    context::Context,
    middleware::{BoxFuture, Middleware, Next, Respond},
};

const CACHE_CONTROL: &str = "Cache-Control";

/// Middleware that serves repeated requests from a [`Store`].
///
/// Constructed once per pipeline. Without a store (see
/// [`from_option`](Self::from_option)) the middleware is a pass-through.
///
/// # Examples
///
/// ```rust
/// use rttp_cache::{
///     Method, Request, Response, StatusCode,
///     cache::{CacheConfig, CacheMiddleware, MemoryStore},
///     context::Context,
///     middleware::Pipeline,
/// };
///
/// # async fn example() {
/// let pipeline = Pipeline::new(|_ctx: Context| async {
///     Response::new(StatusCode::Ok)
///         .header("Cache-Control", "max-age=60")
///         .body(r#"{"hello":"world"}"#)
/// })
/// .with(CacheMiddleware::new(MemoryStore::new(), CacheConfig::new().prefix("api")));
///
/// let response = pipeline.call(Request::new(Method::Get, "/greeting")).await;
/// assert_eq!(response.status(), StatusCode::Ok);
/// # }
/// ```
pub struct CacheMiddleware<S> {
    store: Option<Arc<S>>,
    config: Arc<CacheConfig>,
}

impl<S> CacheMiddleware<S>
where
    S: Store + 'static,
{
    pub fn new(store: S, config: CacheConfig) -> Self {
        Self::from_option(Some(store), config)
    }

    /// Accepts an optional store. With `None` every request passes straight
    /// through to the rest of the chain.
    pub fn from_option(store: Option<S>, config: CacheConfig) -> Self {
        Self {
            store: store.map(Arc::new),
            config: Arc::new(config),
        }
    }

    /// Builds the middleware around a store that is already shared elsewhere.
    pub fn shared(store: Arc<S>, config: CacheConfig) -> Self {
        Self {
            store: Some(store),
            config: Arc::new(config),
        }
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }
}

impl<S> Middleware for CacheMiddleware<S>
where
    S: Store + 'static,
{
    fn handle(&self, ctx: Context, next: Next) -> BoxFuture {
        let Some(store) = self.store.clone() else {
            return Box::pin(next.run(ctx));
        };
        let lookup = Lookup {
            store,
            config: Arc::clone(&self.config),
        };
        Box::pin(lookup.serve(ctx, next))
    }
}

/// Per-request view of the middleware's store and settings.
struct Lookup<S> {
    store: Arc<S>,
    config: Arc<CacheConfig>,
}

impl<S> Lookup<S>
where
    S: Store + 'static,
{
    async fn serve(self, ctx: Context, next: Next) -> Response {
        let key = build_key(
            ctx.request(),
            Some(&self.config.prefix),
            Some(&self.config.defaults),
        );

        if let Some(entry) = self.fetch(&key).await {
            match StatusCode::try_from(entry.status_code) {
                Ok(status) => {
                    debug!(key = %key, "cache hit");
                    return self.replay(&key, status, entry.body).await;
                }
                Err(e) => report(self.config.environment, &key, &e, "error accessing cache"),
            }
        }

        debug!(key = %key, "cache miss");
        let environment = self.config.environment;
        WriteBack::new(next, self.store, key, environment)
            .respond(ctx)
            .await
    }

    async fn fetch(&self, key: &str) -> Option<CacheEntry> {
        match self.store.get(key).await {
            Ok(entry) => entry,
            Err(e) => {
                report(self.config.environment, key, &e, "error retrieving value from cache");
                None
            }
        }
    }

    async fn remaining_ttl(&self, key: &str) -> Option<u64> {
        if !self.store.supports_ttl() {
            return None;
        }
        match self.store.ttl(key).await {
            Ok(ttl) => ttl,
            Err(e) => {
                report(self.config.environment, key, &e, "error retrieving ttl from cache");
                None
            }
        }
    }

    async fn replay(&self, key: &str, status: StatusCode, body: String) -> Response {
        let mut response = Response::new(status);

        if let Some(ttl) = self.remaining_ttl(key).await.filter(|ttl| *ttl > 0) {
            response.set_header(
                CACHE_CONTROL,
                format!("{}, max-age={ttl}", self.config.cache_control_accessibility),
            );
        }

        // Replay JSON as JSON so clients never see a double-encoded string.
        match serde_json::from_str::<Value>(&body) {
            Ok(value) => response.json(&value),
            Err(_) => response.body(body),
        }
    }
}

/// Decorator that stores a successful response after the inner responder
/// produces it.
///
/// The inner response is returned untouched. When its status is `2xx` and its
/// body is UTF-8 text, a background task writes it to the store with a TTL
/// taken from the response's own `Cache-Control: max-age`. Write failures are
/// logged and otherwise ignored.
pub struct WriteBack<R, S> {
    inner: R,
    store: Arc<S>,
    key: String,
    environment: Environment,
}

impl<R, S> WriteBack<R, S>
where
    R: Respond,
    S: Store + 'static,
{
    pub fn new(inner: R, store: Arc<S>, key: impl Into<String>, environment: Environment) -> Self {
        Self {
            inner,
            store,
            key: key.into(),
            environment,
        }
    }
}

impl<R, S> Respond for WriteBack<R, S>
where
    R: Respond,
    S: Store + 'static,
{
    fn respond(self, ctx: Context) -> impl Future<Output = Response> + Send {
        let Self {
            inner,
            store,
            key,
            environment,
        } = self;

        async move {
            let response = inner.respond(ctx).await;
            store_in_background(store, key, environment, &response);
            response
        }
    }
}

fn store_in_background<S>(store: Arc<S>, key: String, environment: Environment, response: &Response)
where
    S: Store + 'static,
{
    let status = response.status();
    if !status.is_success() {
        return;
    }
    let Some(body) = response.body_str() else {
        debug!(key = %key, "response body is not UTF-8, skipping cache write");
        return;
    };

    let entry = CacheEntry::new(status.as_u16(), body);
    let ttl = max_age(response.header_value(CACHE_CONTROL)).map(Duration::from_secs);

    tokio::spawn(async move {
        if let Err(e) = store.set(&key, entry, ttl).await {
            report(environment, &key, &e, "error setting value in cache");
        }
    });
}

/// Extracts the `max-age` directive, in seconds, from a `Cache-Control` value.
///
/// Matches the literal, case-sensitive `max-age=` followed by at least one
/// digit; the last such occurrence wins.
///
/// # Examples
///
/// ```
/// use rttp_cache::cache::max_age;
///
/// assert_eq!(max_age(Some("public, max-age=120")), Some(120));
/// assert_eq!(max_age(Some("no-store")), None);
/// assert_eq!(max_age(None), None);
/// ```
pub fn max_age(cache_control: Option<&str>) -> Option<u64> {
    const DIRECTIVE: &str = "max-age=";

    let header = cache_control?;
    let digits = header.rmatch_indices(DIRECTIVE).find_map(|(at, _)| {
        let rest = &header[at + DIRECTIVE.len()..];
        let end = rest
            .find(|c: char| !c.is_ascii_digit())
            .unwrap_or(rest.len());
        (end > 0).then(|| &rest[..end])
    })?;
    digits.parse().ok()
}

fn report(environment: Environment, key: &str, error: &dyn fmt::Display, message: &str) {
    if !environment.is_production() {
        warn!(key, error = %error, "{message}");
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;
    use crate::{
        Method, Request,
        cache::store::{MemoryStore, Result as StoreResult, StoreError},
        middleware::handler,
    };

    #[test]
    fn max_age_plain() {
        assert_eq!(max_age(Some("max-age=120")), Some(120));
        assert_eq!(max_age(Some("public, max-age=5, must-revalidate")), Some(5));
    }

    #[test]
    fn max_age_absent() {
        assert_eq!(max_age(None), None);
        assert_eq!(max_age(Some("")), None);
        assert_eq!(max_age(Some("no-cache, private")), None);
    }

    #[test]
    fn max_age_is_case_sensitive() {
        assert_eq!(max_age(Some("Max-Age=60")), None);
    }

    #[test]
    fn max_age_needs_digits() {
        assert_eq!(max_age(Some("max-age=")), None);
        assert_eq!(max_age(Some("max-age=abc")), None);
        assert_eq!(max_age(Some("max-age=abc, max-age=7")), Some(7));
        assert_eq!(max_age(Some("max-age=7, max-age=abc")), Some(7));
    }

    #[test]
    fn max_age_last_occurrence_wins() {
        assert_eq!(max_age(Some("max-age=10, max-age=20")), Some(20));
        assert_eq!(max_age(Some("max-age=10, s-max-age=3")), Some(3));
    }

    #[test]
    fn max_age_beyond_instant_range() {
        assert_eq!(max_age(Some("max-age=18446744073709551615")), Some(u64::MAX));
    }

    #[test]
    fn max_age_inside_s_maxage_style_directive() {
        assert_eq!(max_age(Some("s-max-age=30")), Some(30));
        assert_eq!(max_age(Some("s-maxage=30")), None);
    }

    #[test]
    fn max_age_overflow_is_none() {
        assert_eq!(max_age(Some("max-age=99999999999999999999999")), None);
    }

    /// Records every write so tests can assert on keys and TTLs.
    #[derive(Default)]
    struct Recording {
        writes: Mutex<Vec<(String, CacheEntry, Option<Duration>)>>,
    }

    impl Store for Recording {
        async fn get(&self, _key: &str) -> StoreResult<Option<CacheEntry>> {
            Ok(None)
        }

        async fn set(&self, key: &str, entry: CacheEntry, ttl: Option<Duration>) -> StoreResult<()> {
            self.writes.lock().unwrap().push((key.to_string(), entry, ttl));
            Ok(())
        }
    }

    struct Fixed(Response);

    impl Respond for Fixed {
        fn respond(self, _ctx: Context) -> impl Future<Output = Response> + Send {
            async move { self.0 }
        }
    }

    fn ctx() -> Context {
        Context::new(Request::new(Method::Get, "/a"))
    }

    async fn settle() {
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test]
    async fn write_back_stores_success_with_max_age() {
        let store = Arc::new(Recording::default());
        let inner = Fixed(
            Response::new(StatusCode::Ok)
                .header("Cache-Control", "public, max-age=120")
                .body("hello"),
        );

        let response = WriteBack::new(inner, Arc::clone(&store), "GET:/a", Environment::Development)
            .respond(ctx())
            .await;
        settle().await;

        assert_eq!(response.body_str(), Some("hello"));
        let writes = store.writes.lock().unwrap();
        assert_eq!(
            *writes,
            vec![(
                "GET:/a".to_string(),
                CacheEntry::new(200, "hello"),
                Some(Duration::from_secs(120))
            )]
        );
    }

    #[tokio::test]
    async fn write_back_without_cache_control_has_no_ttl() {
        let store = Arc::new(Recording::default());
        let inner = Fixed(Response::new(StatusCode::Created).body("made"));

        WriteBack::new(inner, Arc::clone(&store), "k", Environment::Development)
            .respond(ctx())
            .await;
        settle().await;

        let writes = store.writes.lock().unwrap();
        assert_eq!(writes.len(), 1);
        assert_eq!(writes[0].1.status_code, 201);
        assert_eq!(writes[0].2, None);
    }

    #[tokio::test]
    async fn write_back_ignores_failures_and_redirects() {
        let store = Arc::new(Recording::default());
        for status in [StatusCode::NotFound, StatusCode::InternalServerError, StatusCode::Found] {
            let inner = Fixed(Response::new(status).body("nope"));
            let response = WriteBack::new(inner, Arc::clone(&store), "k", Environment::Development)
                .respond(ctx())
                .await;
            assert_eq!(response.status(), status);
        }
        settle().await;
        assert!(store.writes.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn write_back_skips_binary_bodies() {
        let store = Arc::new(Recording::default());
        let inner = Fixed(Response::new(StatusCode::Ok).body_bytes(vec![0xff, 0x00]));

        let response = WriteBack::new(inner, Arc::clone(&store), "k", Environment::Development)
            .respond(ctx())
            .await;
        settle().await;

        assert_eq!(response.body_ref(), &[0xff, 0x00]);
        assert!(store.writes.lock().unwrap().is_empty());
    }

    struct BrokenWrites;

    impl Store for BrokenWrites {
        async fn get(&self, _key: &str) -> StoreResult<Option<CacheEntry>> {
            Ok(None)
        }

        async fn set(&self, _key: &str, _entry: CacheEntry, _ttl: Option<Duration>) -> StoreResult<()> {
            Err(StoreError::Backend("read-only replica".to_string()))
        }
    }

    #[tokio::test]
    async fn write_failure_leaves_response_alone() {
        let inner = Fixed(Response::new(StatusCode::Ok).body("fine"));
        let response = WriteBack::new(inner, Arc::new(BrokenWrites), "k", Environment::Production)
            .respond(ctx())
            .await;
        settle().await;

        assert_eq!(response.status(), StatusCode::Ok);
        assert_eq!(response.body_str(), Some("fine"));
    }

    #[tokio::test]
    async fn write_back_wraps_next() {
        let store = Arc::new(MemoryStore::new());
        let next = Next::endpoint(handler(|_ctx: Context| async {
            Response::new(StatusCode::Ok).body("from next")
        }));

        WriteBack::new(next, Arc::clone(&store), "GET:/a", Environment::Development)
            .respond(ctx())
            .await;
        settle().await;

        assert_eq!(
            store.get("GET:/a").await.unwrap(),
            Some(CacheEntry::new(200, "from next"))
        );
    }

    #[tokio::test]
    async fn huge_max_age_is_a_logged_write_failure() {
        let store = MemoryStore::new();
        let middleware = CacheMiddleware::new(store.clone(), CacheConfig::new());
        let next = Next::endpoint(handler(|_ctx: Context| async {
            Response::new(StatusCode::Ok)
                .header("Cache-Control", "max-age=18446744073709551615")
                .body("forever")
        }));

        let response = middleware.handle(ctx(), next).await;
        settle().await;

        assert_eq!(response.body_str(), Some("forever"));
        assert!(store.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn zero_ttl_hit_has_no_freshness_header() {
        let store = MemoryStore::new();
        store
            .set("GET:/a", CacheEntry::new(200, "soon gone"), Some(Duration::from_millis(400)))
            .await
            .unwrap();
        store
            .set("GET:/b", CacheEntry::new(200, "fresh"), Some(Duration::from_secs(3)))
            .await
            .unwrap();
        let middleware = CacheMiddleware::new(store, CacheConfig::new());
        let failing = || {
            Next::endpoint(handler(|_ctx: Context| async {
                Response::new(StatusCode::InternalServerError)
            }))
        };

        let expiring = middleware.handle(ctx(), failing()).await;
        assert_eq!(expiring.body_str(), Some("soon gone"));
        assert_eq!(expiring.header_value("Cache-Control"), None);

        let fresh = middleware
            .handle(Context::new(Request::new(Method::Get, "/b")), failing())
            .await;
        assert_eq!(fresh.header_value("Cache-Control"), Some("public, max-age=3"));
    }

    #[tokio::test]
    async fn unrepresentable_stored_status_falls_through() {
        let store = MemoryStore::new();
        store
            .set("GET:/a", CacheEntry::new(299, "odd"), None)
            .await
            .unwrap();

        let middleware = CacheMiddleware::new(store.clone(), CacheConfig::new());
        let next = Next::endpoint(handler(|_ctx: Context| async {
            Response::new(StatusCode::Ok).body("fresh")
        }));

        let response = middleware.handle(ctx(), next).await;
        settle().await;

        assert_eq!(response.body_str(), Some("fresh"));
        assert_eq!(
            store.get("GET:/a").await.unwrap(),
            Some(CacheEntry::new(200, "fresh"))
        );
    }
}
