//! Dispatcher core module - hot path for request dispatch.
//!
//! # JSF Compliance (Rule 206)
//!
//! This module is part of the request hot path. The following clippy lints
//! are denied to enforce "no heap allocations after initialization":
//!
//! - `clippy::inefficient_to_string` - Catches unnecessary allocations
//! - `clippy::format_push_string` - Prevents format! string building
//! - `clippy::unnecessary_to_owned` - Prevents .to_owned() on borrowed data

#![deny(clippy::inefficient_to_string)]
#![deny(clippy::format_push_string)]
#![deny(clippy::unnecessary_to_owned)]

use http::Method;
use serde::Serialize;
use serde_json::Value;
use smallvec::SmallVec;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info};

use crate::middleware::Middleware;

/// Maximum inline headers before heap allocation
/// Most requests have ≤16 headers (JSF: no heap in hot path)
pub const MAX_INLINE_HEADERS: usize = 16;

/// Stack-allocated header storage for the hot path
///
/// Header names use `Arc<str>` because they are repeated on every request
/// (`Origin`, `Vary`, ...) and `Arc::clone()` is an atomic increment rather
/// than a string copy. Values stay `String` as they are per-request data.
pub type HeaderVec = SmallVec<[(Arc<str>, String); MAX_INLINE_HEADERS]>;

/// Request data seen by middleware and route handlers
///
/// Read-only from the point of view of middleware: the CORS engine only
/// looks up headers, the method and the path.
#[derive(Debug, Clone)]
pub struct HandlerRequest {
    /// HTTP method (GET, POST, etc.)
    pub method: Method,
    /// Request path
    pub path: String,
    /// HTTP headers (stack-allocated for ≤16 headers)
    pub headers: HeaderVec,
}

impl HandlerRequest {
    /// Create a request with the given method, path and headers
    #[must_use]
    pub fn new(method: Method, path: impl Into<String>, headers: HeaderVec) -> Self {
        Self {
            method,
            path: path.into(),
            headers,
        }
    }

    /// Get a header by name (case-insensitive per RFC 7230)
    #[inline]
    #[must_use]
    pub fn get_header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Builder-style helper to append a request header
    #[must_use]
    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.push((Arc::from(name), value.into()));
        self
    }
}

/// Response data produced by a route handler or a short-circuiting middleware
#[derive(Debug, Clone, Serialize)]
pub struct HandlerResponse {
    /// HTTP status code (200, 204, 403, etc.)
    pub status: u16,
    /// HTTP response headers (stack-allocated for ≤16 headers)
    #[serde(skip_serializing)]
    pub headers: HeaderVec,
    /// Response body as JSON
    pub body: Value,
}

impl HandlerResponse {
    /// Create a new response with the given status, headers, and body
    #[must_use]
    pub fn new(status: u16, headers: HeaderVec, body: Value) -> Self {
        Self {
            status,
            headers,
            body,
        }
    }

    /// Create an empty response carrying only a status code
    #[must_use]
    pub fn status_only(status: u16) -> Self {
        Self::new(status, HeaderVec::new(), Value::Null)
    }

    /// Create a JSON response with default headers
    #[must_use]
    pub fn json(status: u16, body: Value) -> Self {
        let mut headers = HeaderVec::new();
        headers.push((Arc::from("content-type"), "application/json".to_string()));
        Self {
            status,
            headers,
            body,
        }
    }

    /// Create an error response
    #[must_use]
    pub fn error(status: u16, message: &str) -> Self {
        Self::json(status, serde_json::json!({ "error": message }))
    }

    /// Get a header by name
    ///
    /// Returns the first value when the header was appended several times.
    #[inline]
    #[must_use]
    pub fn get_header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// All values of a (possibly multi-valued) header, in insertion order
    #[must_use]
    pub fn get_all_headers<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.headers
            .iter()
            .filter(move |(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Add or update a header
    pub fn set_header(&mut self, name: &str, value: String) {
        self.headers.retain(|(k, _)| !k.eq_ignore_ascii_case(name));
        self.headers.push((Arc::from(name), value));
    }

    /// Same as [`set_header`](Self::set_header) but reuses an interned name
    pub fn set_shared_header(&mut self, name: &Arc<str>, value: String) {
        self.headers.retain(|(k, _)| !k.eq_ignore_ascii_case(name));
        self.headers.push((Arc::clone(name), value));
    }

    /// Append a header value without removing existing values
    ///
    /// Used for multi-valued headers such as `Vary`.
    pub fn append_header(&mut self, name: &str, value: String) {
        self.headers.push((Arc::from(name), value));
    }
}

/// Route handler signature used by the [`Dispatcher`]
pub type RouteHandler = Arc<dyn Fn(&HandlerRequest) -> HandlerResponse + Send + Sync>;

/// Dispatcher that routes requests to registered handlers
///
/// Runs the middleware chain around each handler: every middleware's
/// `before` may short-circuit with a response, in which case the handler is
/// never invoked; every middleware's `after` then sees the final response.
#[derive(Clone, Default)]
pub struct Dispatcher {
    /// Map of (method, path) to handler
    pub handlers: HashMap<(Method, String), RouteHandler>,
    /// Ordered list of middleware to apply to requests/responses
    pub middlewares: Vec<Arc<dyn Middleware>>,
}

impl Dispatcher {
    /// Create a new empty dispatcher
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler for an exact method and path
    ///
    /// Registering the same (method, path) twice replaces the old handler.
    pub fn add_route<F>(&mut self, method: Method, path: &str, handler: F)
    where
        F: Fn(&HandlerRequest) -> HandlerResponse + Send + Sync + 'static,
    {
        info!(method = %method, path = %path, "Handler registered");
        self.handlers
            .insert((method, path.to_string()), Arc::new(handler));
    }

    /// Add middleware to the processing pipeline
    ///
    /// Middleware is executed in the order it's added.
    pub fn add_middleware(&mut self, mw: Arc<dyn Middleware>) {
        self.middlewares.push(mw);
    }

    /// Dispatch a request through the middleware chain and its handler
    ///
    /// Unknown routes produce a 404 after the `before` phase, so middleware
    /// still gets to answer requests (e.g. CORS preflights) that have no
    /// matching route.
    pub fn dispatch(&self, request: &HandlerRequest) -> HandlerResponse {
        let mut early_resp: Option<HandlerResponse> = None;
        for (idx, mw) in self.middlewares.iter().enumerate() {
            if early_resp.is_none() {
                early_resp = mw.before(request);
                if early_resp.is_some() {
                    debug!(
                        middleware_idx = idx,
                        middleware_name = std::any::type_name_of_val(mw.as_ref()),
                        "Middleware returned early response"
                    );
                }
            }
        }

        let (mut resp, latency) = if let Some(r) = early_resp {
            (r, Duration::from_millis(0))
        } else {
            let start = Instant::now();
            let key = (request.method.clone(), request.path.clone());
            let r = match self.handlers.get(&key) {
                Some(handler) => {
                    debug!(method = %request.method, path = %request.path, "Request dispatched to handler");
                    handler(request)
                }
                None => {
                    debug!(method = %request.method, path = %request.path, "No handler registered");
                    HandlerResponse::error(404, "Not Found")
                }
            };
            (r, start.elapsed())
        };

        for mw in &self.middlewares {
            mw.after(request, &mut resp, latency);
        }

        resp
    }
}
