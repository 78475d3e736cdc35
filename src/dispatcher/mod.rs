//! # Dispatcher Module
//!
//! Request/response types shared by middleware and route handlers, plus a
//! small synchronous dispatcher that runs a middleware chain around them.
//!
//! ## Overview
//!
//! The CORS engine only needs a narrow view of HTTP:
//! - read a request header by case-insensitive name, the method and the path
//! - set (overwrite) or append a response header
//! - short-circuit with a status code so the route handler never runs
//!
//! [`HandlerRequest`] and [`HandlerResponse`] provide exactly that, and
//! [`Dispatcher`] wires middleware `before`/`after` phases around handlers
//! the same way a hosting server would.
//!
//! ## Request Flow
//!
//! 1. Every middleware's `before` runs in order; the first `Some(response)`
//!    short-circuits the request
//! 2. Otherwise the handler registered for (method, path) runs (404 if none)
//! 3. Every middleware's `after` runs on the final response
//!
//! ```rust
//! use brrtrouter_cors::dispatcher::{Dispatcher, HandlerRequest, HandlerResponse, HeaderVec};
//! use http::Method;
//!
//! let mut dispatcher = Dispatcher::new();
//! dispatcher.add_route(Method::GET, "/", |_req| HandlerResponse::status_only(200));
//!
//! let resp = dispatcher.dispatch(&HandlerRequest::new(Method::GET, "/", HeaderVec::new()));
//! assert_eq!(resp.status, 200);
//! ```

mod core;

pub use core::{
    Dispatcher, HandlerRequest, HandlerResponse, HeaderVec, RouteHandler, MAX_INLINE_HEADERS,
};
