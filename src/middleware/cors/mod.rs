mod builder;
mod config;
mod error;
mod headers;
mod origin;

pub use builder::CorsMiddlewareBuilder;
pub use config::{
    load_cors_config, ContextOriginPredicate, CorsConfig, OriginPredicate, EXTENSION_SCHEMES,
    FILE_SCHEMES, WEBSOCKET_SCHEMES, WEB_SCHEMES,
};
pub use error::CorsConfigError;
pub use headers::{
    canonical_header_name, generate_normal_headers, generate_preflight_headers, normalize,
    Casing, HeaderSet, ACCESS_CONTROL_ALLOW_PRIVATE_NETWORK, CORS_RESPONSE_HEADERS,
};
pub use origin::{OriginMatcher, SchemeClass, WildcardRule};

use std::time::Duration;

use http::{header, Method};
use tracing::{debug, info, warn};

use crate::dispatcher::{HandlerRequest, HandlerResponse};
use crate::middleware::Middleware;

/// CORS (Cross-Origin Resource Sharing) middleware
///
/// Built once from a [`CorsConfig`]; the origin matcher and both header sets
/// are computed at construction and only read afterwards, so one instance can
/// serve any number of concurrent requests.
///
/// # Request handling
///
/// | Request                                  | Outcome                                        |
/// |------------------------------------------|------------------------------------------------|
/// | no `Origin`, or `Origin` equals the host | untouched, handler runs                        |
/// | `Origin` not allowed                     | 403, no CORS headers, handler skipped          |
/// | allowed, not `OPTIONS`                   | normal headers + allow-origin, handler runs    |
/// | allowed `OPTIONS`, method/headers ok     | preflight headers + allow-origin, 204, skipped |
/// | allowed `OPTIONS`, method/headers denied | 403, no CORS headers, handler skipped          |
///
/// # Evaluation count
///
/// [`apply`](Self::apply) runs the matcher once per request. As a
/// [`Middleware`] the matcher runs in both `before` and `after` for an allowed
/// simple request, so origin predicates must be pure and cheap.
///
/// # Credentials
///
/// With `allow_all_origins` the engine answers `Access-Control-Allow-Origin: *`.
/// Browsers refuse to pair that with `Access-Control-Allow-Credentials: true`;
/// the headers are still emitted as configured.
///
/// # Usage
///
/// ```rust
/// use brrtrouter_cors::middleware::CorsMiddlewareBuilder;
/// use http::Method;
///
/// let cors = CorsMiddlewareBuilder::new()
///     .allowed_origins(&["https://example.com"])
///     .allowed_methods(&[Method::GET, Method::POST])
///     .allow_credentials(true)
///     .build()
///     .expect("Invalid CORS configuration");
/// assert!(!cors.matcher().allows_all());
/// ```
#[derive(Debug, Clone)]
pub struct CorsMiddleware {
    matcher: OriginMatcher,
    allowed_methods: Vec<String>,
    allowed_headers: Vec<String>,
    allow_any_header: bool,
    normal_headers: HeaderSet,
    preflight_headers: HeaderSet,
    options_response_status: u16,
}

/// Classification of an incoming request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CorsRequestKind {
    /// No `Origin` header
    NotCors,
    /// `Origin` is `http://<Host>` or `https://<Host>`
    SameOrigin,
    /// Cross-origin request that is not a preflight
    Simple,
    /// Cross-origin `OPTIONS` request
    Preflight,
}

/// What the host should do after [`CorsMiddleware::apply`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CorsFlow {
    /// Continue to the route handler
    Proceed,
    /// Send the response as is; the route handler must not run
    Abort,
}

enum Decision<'r> {
    Skip,
    Forbidden,
    Simple { origin: &'r str },
    Preflight { origin: &'r str },
}

impl CorsMiddleware {
    /// Build the middleware, panicking on an invalid configuration
    ///
    /// Meant for service startup where an invalid CORS policy must stop the
    /// process. Use [`try_new`](Self::try_new) to handle the error instead.
    ///
    /// # Panics
    ///
    /// Panics with the [`CorsConfigError`] message if `config` is invalid.
    #[must_use]
    #[allow(clippy::panic)]
    pub fn new(config: CorsConfig) -> Self {
        match Self::try_new(config) {
            Ok(cors) => cors,
            Err(e) => panic!("CORS configuration error: {e}"),
        }
    }

    /// Validate `config` and build the middleware
    ///
    /// # Errors
    ///
    /// Any [`CorsConfigError`] reported by [`CorsConfig::validate`].
    pub fn try_new(config: CorsConfig) -> Result<Self, CorsConfigError> {
        let matcher = OriginMatcher::compile(&config)?;
        let allowed_methods = normalize(&config.allowed_methods, Casing::Upper);
        let allowed_headers = normalize(&config.allowed_headers, Casing::Canonical);
        let allow_any_header = allowed_headers.iter().any(|h| h == "*");

        let cors = Self {
            allowed_methods,
            allowed_headers,
            allow_any_header,
            normal_headers: generate_normal_headers(&config),
            preflight_headers: generate_preflight_headers(&config),
            options_response_status: config.options_response_status,
            matcher,
        };

        let (exact, wildcards, patterns, special) = cors.matcher.rule_counts();
        info!(
            strategy = cors.matcher.strategy_name(),
            exact_origins = exact,
            wildcard_origins = wildcards,
            pattern_origins = patterns,
            special_scheme_origins = special,
            allowed_methods = %cors.allowed_methods.join(","),
            allow_credentials = config.allow_credentials,
            "CORS middleware configured"
        );
        Ok(cors)
    }

    /// Allow every origin with the default methods and headers
    ///
    /// Suitable for development. **Do not use in production.**
    #[must_use]
    pub fn permissive() -> Self {
        Self::new(CorsConfig {
            allow_all_origins: true,
            ..CorsConfig::default()
        })
    }

    /// The compiled origin matcher
    #[must_use]
    pub fn matcher(&self) -> &OriginMatcher {
        &self.matcher
    }

    /// Precomputed headers for actual requests
    #[must_use]
    pub fn normal_headers(&self) -> &HeaderSet {
        &self.normal_headers
    }

    /// Precomputed headers for preflight requests
    #[must_use]
    pub fn preflight_headers(&self) -> &HeaderSet {
        &self.preflight_headers
    }

    /// Determine the request's initial state
    #[must_use]
    pub fn classify(&self, req: &HandlerRequest) -> CorsRequestKind {
        let Some(origin) = origin_of(req) else {
            return CorsRequestKind::NotCors;
        };
        if is_same_origin(req, origin) {
            CorsRequestKind::SameOrigin
        } else if req.method == Method::OPTIONS {
            CorsRequestKind::Preflight
        } else {
            CorsRequestKind::Simple
        }
    }

    /// Run the CORS state machine against `res`
    ///
    /// On [`CorsFlow::Abort`] the status of `res` has been set (403, or the
    /// preflight status) and the route handler must not run. On
    /// [`CorsFlow::Proceed`] the CORS headers, if any, are already on `res`.
    pub fn apply(&self, req: &HandlerRequest, res: &mut HandlerResponse) -> CorsFlow {
        match self.decide(req) {
            Decision::Skip => CorsFlow::Proceed,
            Decision::Forbidden => {
                forbid(res);
                CorsFlow::Abort
            }
            Decision::Simple { origin } => {
                self.write_headers(&self.normal_headers, origin, res);
                CorsFlow::Proceed
            }
            Decision::Preflight { origin } => {
                self.write_headers(&self.preflight_headers, origin, res);
                res.status = self.options_response_status;
                CorsFlow::Abort
            }
        }
    }

    fn decide<'r>(&self, req: &'r HandlerRequest) -> Decision<'r> {
        let kind = self.classify(req);
        let origin = match (kind, origin_of(req)) {
            (CorsRequestKind::Simple | CorsRequestKind::Preflight, Some(origin)) => origin,
            _ => {
                debug!(kind = ?kind, path = %req.path, "CORS: not a cross-origin request, skipping");
                return Decision::Skip;
            }
        };

        if !self.matcher.allowed(origin, req) {
            warn!(origin = %origin, method = %req.method, path = %req.path, "CORS: origin not allowed");
            return Decision::Forbidden;
        }

        if kind == CorsRequestKind::Simple {
            return Decision::Simple { origin };
        }
        if self.preflight_allowed(req) {
            Decision::Preflight { origin }
        } else {
            Decision::Forbidden
        }
    }

    /// Check `Access-Control-Request-Method` and `Access-Control-Request-Headers`
    ///
    /// Absent headers have nothing to validate and pass.
    fn preflight_allowed(&self, req: &HandlerRequest) -> bool {
        if let Some(method) = req.get_header(header::ACCESS_CONTROL_REQUEST_METHOD.as_str()) {
            let method = method.trim();
            if !method.is_empty()
                && !self
                    .allowed_methods
                    .iter()
                    .any(|m| m.eq_ignore_ascii_case(method))
            {
                warn!(method = %method, "CORS preflight: method not in allowed methods");
                return false;
            }
        }

        if self.allow_any_header {
            return true;
        }
        if let Some(requested) = req.get_header(header::ACCESS_CONTROL_REQUEST_HEADERS.as_str()) {
            for name in requested.split(',').map(str::trim).filter(|h| !h.is_empty()) {
                if !self
                    .allowed_headers
                    .iter()
                    .any(|h| h.eq_ignore_ascii_case(name))
                {
                    warn!(header = %name, "CORS preflight: header not in allowed headers");
                    return false;
                }
            }
        }
        true
    }

    /// Copy a precomputed set and patch in the effective allow-origin value
    fn write_headers(&self, set: &HeaderSet, origin: &str, res: &mut HandlerResponse) {
        set.apply_to(res);
        let allow_origin = if self.matcher.allows_all() { "*" } else { origin };
        res.set_header(headers::ACCESS_CONTROL_ALLOW_ORIGIN, allow_origin.to_string());
    }
}

fn origin_of(req: &HandlerRequest) -> Option<&str> {
    req.get_header(header::ORIGIN.as_str())
        .filter(|o| !o.is_empty())
}

/// `Origin` equal to `http://<Host>` or `https://<Host>` (ASCII case-insensitive)
fn is_same_origin(req: &HandlerRequest, origin: &str) -> bool {
    let Some(host) = req.get_header(header::HOST.as_str()) else {
        return false;
    };
    ["http://", "https://"].iter().any(|scheme| {
        origin
            .get(..scheme.len())
            .is_some_and(|s| s.eq_ignore_ascii_case(scheme))
            && origin
                .get(scheme.len()..)
                .is_some_and(|rest| rest.eq_ignore_ascii_case(host))
    })
}

/// 403 with every CORS header removed
fn forbid(res: &mut HandlerResponse) {
    res.status = 403;
    res.headers.retain(|(name, _)| {
        !CORS_RESPONSE_HEADERS
            .iter()
            .any(|h| name.eq_ignore_ascii_case(h))
    });
}

impl Middleware for CorsMiddleware {
    /// Short-circuit forbidden requests and answer preflights
    ///
    /// Returns `None` for non-CORS, same-origin and allowed simple requests;
    /// their headers are added in [`after`](Middleware::after).
    fn before(&self, req: &HandlerRequest) -> Option<HandlerResponse> {
        match self.decide(req) {
            Decision::Skip | Decision::Simple { .. } => None,
            Decision::Forbidden => Some(HandlerResponse::status_only(403)),
            Decision::Preflight { origin } => {
                let mut res = HandlerResponse::status_only(self.options_response_status);
                self.write_headers(&self.preflight_headers, origin, &mut res);
                Some(res)
            }
        }
    }

    /// Add the normal CORS headers to an allowed simple request's response
    ///
    /// Preflight and rejected responses were completed in `before` and are
    /// left alone.
    ///
    /// Nothing is carried over from `before`, which may not even have run when
    /// an earlier middleware short-circuited, so the origin is matched again.
    /// Origin predicates are therefore called twice per allowed simple request
    /// on this path; [`CorsMiddleware::apply`] evaluates them once.
    fn after(&self, req: &HandlerRequest, res: &mut HandlerResponse, _latency: Duration) {
        if let Decision::Simple { origin } = self.decide(req) {
            self.write_headers(&self.normal_headers, origin, res);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatcher::HeaderVec;

    fn request(method: Method, origin: Option<&str>) -> HandlerRequest {
        let req = HandlerRequest::new(method, "/", HeaderVec::new());
        match origin {
            Some(origin) => req.with_header("Origin", origin),
            None => req,
        }
    }

    fn google_only() -> CorsMiddleware {
        CorsMiddleware::new(CorsConfig {
            allowed_origins: vec!["http://google.com".into()],
            allowed_methods: vec!["GET".into(), "POST".into(), "PUT".into(), "HEAD".into()],
            ..CorsConfig::default()
        })
    }

    #[test]
    fn test_classify() {
        let cors = google_only();
        assert_eq!(cors.classify(&request(Method::GET, None)), CorsRequestKind::NotCors);
        assert_eq!(cors.classify(&request(Method::GET, Some(""))), CorsRequestKind::NotCors);
        assert_eq!(
            cors.classify(&request(Method::GET, Some("http://google.com"))),
            CorsRequestKind::Simple
        );
        assert_eq!(
            cors.classify(&request(Method::OPTIONS, Some("http://google.com"))),
            CorsRequestKind::Preflight
        );
        let same = request(Method::GET, Some("http://facebook.com")).with_header("Host", "facebook.com");
        assert_eq!(cors.classify(&same), CorsRequestKind::SameOrigin);
    }

    #[test]
    fn test_apply_simple_allowed() {
        let cors = google_only();
        let mut res = HandlerResponse::status_only(200);
        let flow = cors.apply(&request(Method::GET, Some("http://google.com")), &mut res);
        assert_eq!(flow, CorsFlow::Proceed);
        assert_eq!(res.status, 200);
        assert_eq!(res.get_header("Access-Control-Allow-Origin"), Some("http://google.com"));
        assert_eq!(res.get_header("Vary"), Some("Origin"));
    }

    #[test]
    fn test_apply_forbidden_strips_cors_headers() {
        let cors = google_only();
        let mut res = HandlerResponse::status_only(200);
        res.set_header("Access-Control-Allow-Origin", "*".to_string());
        res.set_header("Content-Type", "text/plain".to_string());
        let flow = cors.apply(&request(Method::GET, Some("https://google.com")), &mut res);
        assert_eq!(flow, CorsFlow::Abort);
        assert_eq!(res.status, 403);
        assert_eq!(res.get_header("Access-Control-Allow-Origin"), None);
        assert_eq!(res.get_header("Content-Type"), Some("text/plain"));
    }

    #[test]
    fn test_apply_preflight() {
        let cors = google_only();
        let req = request(Method::OPTIONS, Some("http://google.com"))
            .with_header("Access-Control-Request-Method", "GET");
        let mut res = HandlerResponse::status_only(200);
        assert_eq!(cors.apply(&req, &mut res), CorsFlow::Abort);
        assert_eq!(res.status, 204);
        assert_eq!(res.get_header("Access-Control-Allow-Origin"), Some("http://google.com"));
        assert_eq!(res.get_header("Access-Control-Allow-Methods"), Some("GET,POST,PUT,HEAD"));
        assert_eq!(res.get_header("Access-Control-Max-Age"), Some("43200"));
    }

    #[test]
    fn test_preflight_rejects_unlisted_method_and_header() {
        let cors = google_only();
        let bad_method = request(Method::OPTIONS, Some("http://google.com"))
            .with_header("Access-Control-Request-Method", "DELETE");
        let mut res = HandlerResponse::status_only(200);
        assert_eq!(cors.apply(&bad_method, &mut res), CorsFlow::Abort);
        assert_eq!(res.status, 403);
        assert_eq!(res.get_header("Access-Control-Allow-Methods"), None);

        let bad_header = request(Method::OPTIONS, Some("http://google.com"))
            .with_header("Access-Control-Request-Method", "get")
            .with_header("Access-Control-Request-Headers", "content-type, X-Secret");
        let mut res = HandlerResponse::status_only(200);
        assert_eq!(cors.apply(&bad_header, &mut res), CorsFlow::Abort);
        assert_eq!(res.status, 403);

        let ok_header = request(Method::OPTIONS, Some("http://google.com"))
            .with_header("Access-Control-Request-Headers", "content-type, ORIGIN");
        let mut res = HandlerResponse::status_only(200);
        assert_eq!(cors.apply(&ok_header, &mut res), CorsFlow::Abort);
        assert_eq!(res.status, 204);
    }

    #[test]
    fn test_star_allowed_headers_accepts_anything() {
        let cors = CorsMiddleware::new(CorsConfig {
            allow_all_origins: true,
            allowed_headers: vec!["*".into()],
            ..CorsConfig::default()
        });
        let req = request(Method::OPTIONS, Some("https://any.example"))
            .with_header("Access-Control-Request-Headers", "X-Anything");
        let res = cors.before(&req).unwrap();
        assert_eq!(res.status, 204);
        assert_eq!(res.get_header("Access-Control-Allow-Origin"), Some("*"));
    }

    #[test]
    fn test_after_ignores_preflight_and_rejected_requests() {
        let cors = google_only();
        let mut res = HandlerResponse::status_only(204);
        cors.after(
            &request(Method::OPTIONS, Some("http://google.com")),
            &mut res,
            Duration::ZERO,
        );
        assert!(res.headers.is_empty());

        let mut res = HandlerResponse::status_only(403);
        cors.after(&request(Method::GET, Some("http://evil.com")), &mut res, Duration::ZERO);
        assert!(res.headers.is_empty());
    }

    #[test]
    fn test_predicate_call_counts() {
        use std::sync::atomic::{AtomicUsize, Ordering};
        use std::sync::Arc;

        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let cors = CorsMiddleware::new(CorsConfig {
            origin_predicate: Some(Arc::new(move |origin: &str| {
                counter.fetch_add(1, Ordering::SeqCst);
                origin == "https://app.example.com"
            })),
            ..CorsConfig::default()
        });
        let req = request(Method::GET, Some("https://app.example.com"));

        let mut res = HandlerResponse::status_only(200);
        assert_eq!(cors.apply(&req, &mut res), CorsFlow::Proceed);
        assert_eq!(calls.swap(0, Ordering::SeqCst), 1);

        assert!(cors.before(&req).is_none());
        let mut res = HandlerResponse::status_only(200);
        cors.after(&req, &mut res, Duration::ZERO);
        assert_eq!(calls.swap(0, Ordering::SeqCst), 2);
        assert_eq!(res.get_header("Access-Control-Allow-Origin"), Some("https://app.example.com"));

        // Non-CORS and same-origin requests never reach the predicate
        cors.after(&request(Method::GET, None), &mut res, Duration::ZERO);
        let same = request(Method::GET, Some("https://api.example.com"))
            .with_header("Host", "api.example.com");
        assert!(cors.before(&same).is_none());
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    #[should_panic(expected = "CORS configuration error")]
    fn test_new_panics_on_invalid_config() {
        let _ = CorsMiddleware::new(CorsConfig::default());
    }

    #[test]
    fn test_custom_options_status() {
        let cors = CorsMiddleware::new(CorsConfig {
            allow_all_origins: true,
            options_response_status: 200,
            ..CorsConfig::default()
        });
        let res = cors.before(&request(Method::OPTIONS, Some("https://x.dev"))).unwrap();
        assert_eq!(res.status, 200);
    }
}
