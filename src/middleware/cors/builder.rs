use std::sync::Arc;
use std::time::Duration;

use http::Method;

use super::{CorsConfig, CorsConfigError, CorsMiddleware};
use crate::dispatcher::HandlerRequest;

/// Builder for creating `CorsMiddleware` with a fluent API
///
/// Starts from [`CorsConfig::default`]: no origin strategy, the default
/// method and header lists, a 12 hour preflight cache and a 204 preflight
/// status. Validation happens once, in [`build`](Self::build).
///
/// # Example
///
/// ```rust
/// use brrtrouter_cors::middleware::CorsMiddlewareBuilder;
/// use http::Method;
///
/// let cors = CorsMiddlewareBuilder::new()
///     .allowed_origins(&["https://example.com", "https://*.example.com"])
///     .allow_wildcard(true)
///     .allowed_methods(&[Method::GET, Method::POST, Method::PUT])
///     .allowed_headers(&["Content-Type", "Authorization", "X-Custom-Header"])
///     .allow_credentials(true)
///     .expose_headers(&["X-Total-Count", "X-Page-Number"])
///     .max_age(3600) // Cache preflight for 1 hour
///     .build()
///     .expect("Invalid CORS configuration");
/// assert_eq!(
///     cors.preflight_headers().get("Access-Control-Max-Age"),
///     Some("3600")
/// );
/// ```
#[derive(Debug, Clone, Default)]
pub struct CorsMiddlewareBuilder {
    config: CorsConfig,
}

impl CorsMiddlewareBuilder {
    /// Create a new builder with secure defaults
    ///
    /// No origin is allowed until one of [`allowed_origins`](Self::allowed_origins),
    /// [`allow_all_origins`](Self::allow_all_origins) or a predicate is set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from an existing configuration, e.g. one loaded from YAML
    #[must_use]
    pub fn from_config(config: CorsConfig) -> Self {
        Self { config }
    }

    /// Set allowed origins
    ///
    /// Entries may be exact (`https://example.com`), single-wildcard
    /// (`https://*.example.com`, needs [`allow_wildcard`](Self::allow_wildcard))
    /// or `/regex/flags`. `&["*"]` alone is shorthand for
    /// [`allow_all_origins`](Self::allow_all_origins).
    #[must_use]
    pub fn allowed_origins(mut self, origins: &[&str]) -> Self {
        self.config.allowed_origins = origins.iter().map(|s| s.to_string()).collect();
        self
    }

    /// Allow every origin; `Access-Control-Allow-Origin: *` is emitted
    #[must_use]
    pub fn allow_all_origins(mut self, allow: bool) -> Self {
        self.config.allow_all_origins = allow;
        self
    }

    /// Decide origins with a closure instead of a list
    ///
    /// ```rust
    /// use brrtrouter_cors::middleware::CorsMiddlewareBuilder;
    ///
    /// let cors = CorsMiddlewareBuilder::new()
    ///     .origin_predicate(|origin| origin.ends_with(".internal.example"))
    ///     .build()
    ///     .unwrap();
    /// assert_eq!(cors.matcher().strategy_name(), "predicate");
    /// ```
    #[must_use]
    pub fn origin_predicate<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&str) -> bool + Send + Sync + 'static,
    {
        self.config.origin_predicate = Some(Arc::new(predicate));
        self
    }

    /// Decide origins with a closure that also sees the request
    ///
    /// Takes precedence over [`origin_predicate`](Self::origin_predicate).
    #[must_use]
    pub fn context_origin_predicate<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&HandlerRequest, &str) -> bool + Send + Sync + 'static,
    {
        self.config.context_origin_predicate = Some(Arc::new(predicate));
        self
    }

    /// Set allowed HTTP methods
    #[must_use]
    pub fn allowed_methods(mut self, methods: &[Method]) -> Self {
        self.config.allowed_methods = methods.iter().map(|m| m.as_str().to_string()).collect();
        self
    }

    /// Set allowed request headers; `&["*"]` allows any header
    #[must_use]
    pub fn allowed_headers(mut self, headers: &[&str]) -> Self {
        self.config.allowed_headers = headers.iter().map(|s| s.to_string()).collect();
        self
    }

    /// Set headers exposed to the browser
    #[must_use]
    pub fn expose_headers(mut self, headers: &[&str]) -> Self {
        self.config.exposed_headers = headers.iter().map(|s| s.to_string()).collect();
        self
    }

    /// Enable or disable `Access-Control-Allow-Credentials: true`
    #[must_use]
    pub fn allow_credentials(mut self, allow: bool) -> Self {
        self.config.allow_credentials = allow;
        self
    }

    /// Enable or disable `Access-Control-Allow-Private-Network: true` on preflights
    #[must_use]
    pub fn allow_private_network(mut self, allow: bool) -> Self {
        self.config.allow_private_network = allow;
        self
    }

    /// Preflight cache duration in seconds; `0` omits `Access-Control-Max-Age`
    #[must_use]
    pub fn max_age(mut self, seconds: u32) -> Self {
        self.config.max_age = Duration::from_secs(u64::from(seconds));
        self
    }

    /// Accept origin entries containing a single `*`
    #[must_use]
    pub fn allow_wildcard(mut self, allow: bool) -> Self {
        self.config.allow_wildcard = allow;
        self
    }

    /// Accept browser extension origins
    #[must_use]
    pub fn allow_browser_extensions(mut self, allow: bool) -> Self {
        self.config.allow_browser_extensions = allow;
        self
    }

    /// Accept `ws://` and `wss://` origins
    #[must_use]
    pub fn allow_web_sockets(mut self, allow: bool) -> Self {
        self.config.allow_web_sockets = allow;
        self
    }

    /// Accept `file://` origins
    #[must_use]
    pub fn allow_files(mut self, allow: bool) -> Self {
        self.config.allow_files = allow;
        self
    }

    /// Accept origins of extra schemes such as `tauri`
    #[must_use]
    pub fn custom_schemes(mut self, schemes: &[&str]) -> Self {
        self.config.custom_schemes = schemes.iter().map(|s| s.to_string()).collect();
        self
    }

    /// Status of a successful preflight response (2xx, default 204)
    #[must_use]
    pub fn options_response_status(mut self, status: u16) -> Self {
        self.config.options_response_status = status;
        self
    }

    /// The configuration assembled so far, unvalidated
    #[must_use]
    pub fn into_config(self) -> CorsConfig {
        self.config
    }

    /// Validate the configuration and build the middleware
    ///
    /// # Errors
    ///
    /// Any [`CorsConfigError`], e.g. no origin strategy, conflicting
    /// strategies, an origin without a scheme or a non-2xx preflight status.
    pub fn build(self) -> Result<CorsMiddleware, CorsConfigError> {
        CorsMiddleware::try_new(self.config)
    }
}
