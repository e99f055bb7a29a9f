//! Middleware pipeline — composable before/after request handler logic.
//!
//! This module defines the core types for building an ordered middleware stack.
//! Each middleware wraps the next layer, enabling request inspection, short-circuit
//! responses, and response decoration without coupling handlers to infrastructure
//! concerns.
//!
//! ## Core types
//!
//! - [`Middleware`] — trait implemented by all middleware.
//! - [`Next`] — cursor into the remaining middleware chain; call [`Next::run`] to
//!   advance to the next layer.
//! - [`Respond`] — the "produce the response" capability. [`Next`] implements it,
//!   and so can decorators that wrap it.
//! - [`Pipeline`] — an ordered middleware stack in front of an endpoint handler.

use std::{future::Future, pin::Pin, sync::Arc};

use crate::{Request, Response, context::Context};

/// A boxed, `Send` future resolving to a [`Response`].
pub type BoxFuture = Pin<Box<dyn Future<Output = Response> + Send>>;

/// Type-erased endpoint handler at the end of a [`Pipeline`].
pub type Handler = Arc<dyn Fn(Context) -> BoxFuture + Send + Sync + 'static>;

/// A type-erased, reference-counted middleware function.
///
/// Every entry in the middleware stack is stored as a `MiddlewareHandler`.
/// The [`Arc`] wrapper makes handlers cheap to clone so that [`Next`] can
/// advance through the chain without copying closures.
pub type MiddlewareHandler = Arc<dyn Fn(Context, Next) -> BoxFuture + Send + Sync + 'static>;

/// Converts a [`Middleware`] implementation into a [`MiddlewareHandler`].
pub fn from_middleware<M>(middleware: Arc<M>) -> MiddlewareHandler
where
    M: Middleware + 'static,
{
    Arc::new(move |ctx: Context, next: Next| middleware.handle(ctx, next))
}

/// Boxes an async function into a [`Handler`].
///
/// # Examples
///
/// ```rust
/// use rttp_cache::{Response, StatusCode, context::Context, middleware::handler};
///
/// let endpoint = handler(|_ctx: Context| async { Response::new(StatusCode::Ok).body("hi") });
/// ```
pub fn handler<F, Fut>(f: F) -> Handler
where
    F: Fn(Context) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Response> + Send + 'static,
{
    Arc::new(move |ctx: Context| -> BoxFuture { Box::pin(f(ctx)) })
}

/// A cursor into the remaining middleware chain for a single request.
///
/// `Next` is passed to each middleware's [`Middleware::handle`] implementation.
/// Calling [`Next::run`] advances the cursor by one position and invokes the next
/// middleware, or the endpoint handler once every middleware has run.
///
/// `Next` is consumed on each call to [`run`](Self::run), so it cannot be called
/// more than once per middleware invocation. Dropping it without calling `run`
/// short-circuits the rest of the chain.
pub struct Next {
    middlewares: Vec<MiddlewareHandler>,
    endpoint: Handler,
    // Tracks which middleware to invoke on the next `run` call.
    index: usize,
}

impl Next {
    /// Creates a new `Next` positioned at the start of the given middleware stack.
    pub fn new(middlewares: Vec<MiddlewareHandler>, endpoint: Handler) -> Self {
        Self {
            middlewares,
            endpoint,
            index: 0,
        }
    }

    /// Creates a `Next` that goes straight to `endpoint`.
    pub fn endpoint(endpoint: Handler) -> Self {
        Self::new(Vec::new(), endpoint)
    }

    /// Invokes the next middleware in the chain and returns its response.
    ///
    /// When no middleware remains, the endpoint handler produces the response.
    pub async fn run(mut self, ctx: Context) -> Response {
        match self.middlewares.get(self.index).cloned() {
            Some(middleware) => {
                self.index += 1;
                middleware(ctx, self).await
            }
            None => (self.endpoint)(ctx).await,
        }
    }
}

/// Produces the response for a request.
///
/// This is the one operation downstream code performs to finish a request.
/// Decorators implement it by delegating to an inner `Respond` and reacting to
/// the response it yields. `respond` takes `self` by value, so any one
/// responder fires at most once.
pub trait Respond: Send + Sized {
    fn respond(self, ctx: Context) -> impl Future<Output = Response> + Send;
}

impl Respond for Next {
    fn respond(self, ctx: Context) -> impl Future<Output = Response> + Send {
        self.run(ctx)
    }
}

/// The core trait for all middleware.
///
/// Implementors receive a [`Context`] and a [`Next`] cursor. They may:
///
/// - **Pass through** — call `next.run(ctx).await` without modification.
/// - **Short-circuit** — return a [`Response`] directly without calling `next`.
/// - **Decorate** — call `next.run(ctx).await`, inspect the response, and return
///   it, possibly modified.
///
/// # Contract
///
/// - Implementations **must** be `Send + Sync` because middleware is shared across
///   Tokio tasks.
/// - `handle` **must** return a pinned, `Send` future so it can be awaited across
///   `.await` points in multi-threaded runtimes.
pub trait Middleware: Send + Sync {
    /// Handle the request and optionally delegate to the next middleware.
    fn handle(&self, ctx: Context, next: Next) -> BoxFuture;
}

/// An ordered middleware stack in front of an endpoint handler.
///
/// Middleware runs in the order it was added; the first one added sees the
/// request first and the response last.
///
/// # Examples
///
/// ```rust
/// use rttp_cache::{Method, Request, Response, StatusCode, context::Context, middleware::Pipeline};
///
/// # async fn example() {
/// let pipeline = Pipeline::new(|_ctx: Context| async {
///     Response::new(StatusCode::Ok).body("hello")
/// });
/// let response = pipeline.call(Request::new(Method::Get, "/")).await;
/// assert_eq!(response.body_str(), Some("hello"));
/// # }
/// ```
#[derive(Clone)]
pub struct Pipeline {
    middlewares: Vec<MiddlewareHandler>,
    endpoint: Handler,
}

impl Pipeline {
    /// Creates a pipeline with no middleware in front of `endpoint`.
    pub fn new<F, Fut>(endpoint: F) -> Self
    where
        F: Fn(Context) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Response> + Send + 'static,
    {
        Self {
            middlewares: Vec::new(),
            endpoint: handler(endpoint),
        }
    }

    /// Appends a middleware to the stack.
    #[must_use]
    pub fn with<M>(mut self, middleware: M) -> Self
    where
        M: Middleware + 'static,
    {
        self.middlewares.push(from_middleware(Arc::new(middleware)));
        self
    }

    /// Runs `request` through the middleware stack and the endpoint.
    pub async fn call(&self, request: Request) -> Response {
        let next = Next::new(self.middlewares.clone(), Arc::clone(&self.endpoint));
        next.run(Context::new(request)).await
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;
    use crate::{Method, StatusCode};

    struct Tag {
        name: &'static str,
        trail: Arc<Mutex<Vec<&'static str>>>,
    }

    impl Middleware for Tag {
        fn handle(&self, ctx: Context, next: Next) -> BoxFuture {
            let name = self.name;
            let trail = Arc::clone(&self.trail);
            Box::pin(async move {
                trail.lock().unwrap().push(name);
                let mut response = next.run(ctx).await;
                response.add_header("X-Seen", name);
                response
            })
        }
    }

    struct Block;

    impl Middleware for Block {
        fn handle(&self, _ctx: Context, _next: Next) -> BoxFuture {
            Box::pin(async { Response::new(StatusCode::Forbidden) })
        }
    }

    fn ok_pipeline() -> Pipeline {
        Pipeline::new(|ctx: Context| async move {
            Response::new(StatusCode::Ok).body(ctx.request().path().to_string())
        })
    }

    #[tokio::test]
    async fn endpoint_runs_without_middleware() {
        let response = ok_pipeline().call(Request::new(Method::Get, "/x")).await;
        assert_eq!(response.status(), StatusCode::Ok);
        assert_eq!(response.body_str(), Some("/x"));
    }

    #[tokio::test]
    async fn middleware_runs_in_order() {
        let trail = Arc::new(Mutex::new(Vec::new()));
        let pipeline = ok_pipeline()
            .with(Tag { name: "outer", trail: Arc::clone(&trail) })
            .with(Tag { name: "inner", trail: Arc::clone(&trail) });

        let response = pipeline.call(Request::new(Method::Get, "/")).await;

        assert_eq!(*trail.lock().unwrap(), vec!["outer", "inner"]);
        let seen: Vec<_> = response
            .headers()
            .iter()
            .filter(|(name, _)| *name == "X-Seen")
            .map(|(_, value)| value)
            .collect();
        assert_eq!(seen, vec!["inner", "outer"]);
    }

    #[tokio::test]
    async fn dropping_next_short_circuits() {
        let trail = Arc::new(Mutex::new(Vec::new()));
        let pipeline = ok_pipeline()
            .with(Block)
            .with(Tag { name: "never", trail: Arc::clone(&trail) });

        let response = pipeline.call(Request::new(Method::Get, "/")).await;

        assert_eq!(response.status(), StatusCode::Forbidden);
        assert!(trail.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn next_responds_via_trait() {
        let next = Next::endpoint(handler(|_ctx: Context| async {
            Response::new(StatusCode::Accepted)
        }));
        let response = next.respond(Context::new(Request::new(Method::Get, "/"))).await;
        assert_eq!(response.status(), StatusCode::Accepted);
    }
}
