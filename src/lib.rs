//! # BRRTRouter CORS
//!
//! **brrtrouter-cors** enforces Cross-Origin Resource Sharing for BRRTRouter
//! services: it decides whether a request's `Origin` is allowed and emits the
//! headers that tell a browser a simple or preflighted cross-origin request is
//! permitted.
//!
//! ## Architecture
//!
//! - **[`middleware::CorsConfig`]** - policy value object, validated once,
//!   loadable from YAML
//! - **[`middleware::cors::OriginMatcher`]** - compiled origin strategy: allow-all,
//!   predicates, or an exact/wildcard/regex/scheme-class list
//! - **[`middleware::cors::HeaderSet`]** - the normal and preflight header sets,
//!   precomputed at construction
//! - **[`middleware::CorsMiddleware`]** - the per-request state machine
//! - **[`dispatcher`]** - request/response types and the middleware chain
//! - **[`logging`]** - `tracing-subscriber` setup
//! - **[`cli`]** - the `brrtrouter-cors` policy tool
//!
//! ### Request Handling Flow
//!
//! ```text
//! request ─► classify ─┬─ NotCors / SameOrigin ──────────────► handler
//!                      ├─ Simple ── origin ok? ─ yes ─────────► handler ─► + normal headers
//!                      │                        └ no ─► 403
//!                      └─ Preflight ─ origin, method and headers ok?
//!                                      ├ yes ─► 204 + preflight headers
//!                                      └ no ──► 403
//! ```
//!
//! The matcher and both header sets are immutable after construction, so a
//! single [`middleware::CorsMiddleware`] serves concurrent requests without
//! locking. Nothing is stored between requests.
//!
//! ## Quick Start
//!
//! ```rust
//! use std::sync::Arc;
//!
//! use brrtrouter_cors::dispatcher::{Dispatcher, HandlerRequest, HandlerResponse, HeaderVec};
//! use brrtrouter_cors::middleware::CorsMiddlewareBuilder;
//! use http::Method;
//!
//! let cors = CorsMiddlewareBuilder::new()
//!     .allowed_origins(&["https://app.example.com"])
//!     .allowed_methods(&[Method::GET, Method::POST])
//!     .build()
//!     .expect("Invalid CORS configuration");
//!
//! let mut dispatcher = Dispatcher::new();
//! dispatcher.add_middleware(Arc::new(cors));
//! dispatcher.add_route(Method::GET, "/pets", |_req| HandlerResponse::status_only(200));
//!
//! let req = HandlerRequest::new(Method::GET, "/pets", HeaderVec::new())
//!     .with_header("Origin", "https://app.example.com");
//! let resp = dispatcher.dispatch(&req);
//! assert_eq!(resp.status, 200);
//! assert_eq!(
//!     resp.get_header("Access-Control-Allow-Origin"),
//!     Some("https://app.example.com")
//! );
//! ```
//!
//! ## Configuration
//!
//! ```yaml
//! cors:
//!   allowed_origins:
//!     - https://app.example.com
//!     - https://*.example.com
//!   allow_wildcard: true
//!   allowed_methods: [GET, POST, PUT, DELETE]
//!   allowed_headers: [Content-Type, Authorization]
//!   allow_credentials: true
//!   max_age_secs: 3600
//! ```
//!
//! ```rust,no_run
//! use brrtrouter_cors::middleware::{cors::load_cors_config, CorsMiddleware};
//!
//! let config = load_cors_config("config/config.yaml")?;
//! let cors = CorsMiddleware::try_new(config)?;
//! # Ok::<(), brrtrouter_cors::middleware::CorsConfigError>(())
//! ```
//!
//! ## Error Handling
//!
//! Invalid policies fail at construction with a
//! [`middleware::CorsConfigError`]; a service must not start with one.
//! Per-request authorization failures are not errors: they become a `403`
//! without CORS headers and the route handler is never called.

pub mod cli;
pub mod dispatcher;
pub mod logging;
pub mod middleware;

pub use middleware::{
    CorsConfig, CorsConfigError, CorsFlow, CorsMiddleware, CorsMiddlewareBuilder,
    CorsRequestKind, Middleware,
};

/// Build a [`CorsMiddleware`], panicking on an invalid configuration
///
/// Shorthand for [`CorsMiddleware::new`], for service startup code.
///
/// # Panics
///
/// Panics if `config` fails validation.
#[must_use]
pub fn cors(config: CorsConfig) -> CorsMiddleware {
    CorsMiddleware::new(config)
}
