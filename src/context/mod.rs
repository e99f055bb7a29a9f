//! Per-request context handed down the middleware chain.

use crate::Request;

/// Per-request state passed from one middleware to the next.
///
/// Owns the [`Request`] for the duration of one request-handling cycle.
#[derive(Debug, Clone)]
pub struct Context {
    request: Request,
}

impl Context {
    /// Create a new context from a request
    pub fn new(request: Request) -> Self {
        Self { request }
    }

    pub fn request(&self) -> &Request {
        &self.request
    }
}
