use std::fmt;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use http::Method;
use serde::Deserialize;

use super::origin::{parse_origin_entry, OriginEntry, WildcardRule, SchemeClass};
use super::CorsConfigError;
use crate::dispatcher::HandlerRequest;

/// Caller-supplied origin check: `(origin) -> allowed`
pub type OriginPredicate = Arc<dyn Fn(&str) -> bool + Send + Sync>;

/// Caller-supplied origin check that may inspect the request: `(request, origin) -> allowed`
///
/// Takes precedence over [`OriginPredicate`] when both are configured.
pub type ContextOriginPredicate = Arc<dyn Fn(&HandlerRequest, &str) -> bool + Send + Sync>;

/// Web origins are always accepted
pub const WEB_SCHEMES: &[&str] = &["http://", "https://"];
/// Accepted when `allow_browser_extensions` is set
pub const EXTENSION_SCHEMES: &[&str] = &[
    "chrome-extension://",
    "safari-extension://",
    "moz-extension://",
    "ms-browser-extension://",
];
/// Accepted when `allow_web_sockets` is set
pub const WEBSOCKET_SCHEMES: &[&str] = &["ws://", "wss://"];
/// Accepted when `allow_files` is set
pub const FILE_SCHEMES: &[&str] = &["file://"];

/// CORS policy
///
/// Plain value object: build it in code or load it from YAML, then hand it
/// to [`CorsMiddleware::try_new`](super::CorsMiddleware::try_new) which
/// validates it once and compiles the origin matcher and header sets.
///
/// Exactly one origin strategy must be active:
/// - `allow_all_origins` (or `allowed_origins: ["*"]`)
/// - one or both origin predicates
/// - a non-empty `allowed_origins` list (exact, wildcard, `/regex/flags`)
///
/// # YAML
///
/// ```yaml
/// cors:
///   allowed_origins:
///     - https://example.com
///     - https://*.example.com
///     - /^https://(foo|bar)\.example\.org$/i
///   allow_wildcard: true
///   allowed_methods: [GET, POST]
///   allowed_headers: [Content-Type, Authorization]
///   exposed_headers: [X-Total-Count]
///   allow_credentials: true
///   max_age_secs: 3600
/// ```
#[derive(Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CorsConfig {
    /// Allow every origin; `Access-Control-Allow-Origin: *` is emitted
    pub allow_all_origins: bool,
    /// Literal, wildcard (`*`), scheme-prefixed or `/regex/flags` origins
    pub allowed_origins: Vec<String>,
    /// Context-free origin predicate (code-only)
    #[serde(skip)]
    pub origin_predicate: Option<OriginPredicate>,
    /// Request-aware origin predicate (code-only)
    #[serde(skip)]
    pub context_origin_predicate: Option<ContextOriginPredicate>,
    /// Methods accepted in `Access-Control-Request-Method`
    pub allowed_methods: Vec<String>,
    /// Headers accepted in `Access-Control-Request-Headers` (`*` allows any)
    pub allowed_headers: Vec<String>,
    /// Headers listed in `Access-Control-Expose-Headers`
    pub exposed_headers: Vec<String>,
    /// Emit `Access-Control-Allow-Credentials: true`
    pub allow_credentials: bool,
    /// Emit `Access-Control-Allow-Private-Network: true` on preflights
    pub allow_private_network: bool,
    /// Preflight cache duration; omitted from responses when below one second
    #[serde(rename = "max_age_secs", deserialize_with = "deserialize_secs")]
    pub max_age: Duration,
    /// Accept origins containing a single `*`
    pub allow_wildcard: bool,
    /// Accept `chrome-extension://`, `safari-extension://`, ... origins
    pub allow_browser_extensions: bool,
    /// Accept `ws://` and `wss://` origins
    pub allow_web_sockets: bool,
    /// Accept `file://` origins
    pub allow_files: bool,
    /// Extra schemes accepted in origins, e.g. `tauri`
    pub custom_schemes: Vec<String>,
    /// Status code of a successful preflight response
    pub options_response_status: u16,
}

fn deserialize_secs<'de, D>(deserializer: D) -> Result<Duration, D::Error>
where
    D: serde::Deserializer<'de>,
{
    u64::deserialize(deserializer).map(Duration::from_secs)
}

impl Default for CorsConfig {
    /// Secure defaults: no origin strategy is selected, so the default
    /// configuration is rejected until one is configured.
    fn default() -> Self {
        Self {
            allow_all_origins: false,
            allowed_origins: vec![],
            origin_predicate: None,
            context_origin_predicate: None,
            allowed_methods: [
                Method::GET,
                Method::POST,
                Method::PUT,
                Method::PATCH,
                Method::DELETE,
                Method::HEAD,
                Method::OPTIONS,
            ]
            .iter()
            .map(|m| m.as_str().to_string())
            .collect(),
            allowed_headers: vec![
                "Origin".into(),
                "Content-Length".into(),
                "Content-Type".into(),
            ],
            exposed_headers: vec![],
            allow_credentials: false,
            allow_private_network: false,
            max_age: Duration::from_secs(12 * 60 * 60),
            allow_wildcard: false,
            allow_browser_extensions: false,
            allow_web_sockets: false,
            allow_files: false,
            custom_schemes: vec![],
            options_response_status: 204,
        }
    }
}

impl fmt::Debug for CorsConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CorsConfig")
            .field("allow_all_origins", &self.allow_all_origins)
            .field("allowed_origins", &self.allowed_origins)
            .field(
                "origin_predicate",
                &self.origin_predicate.as_ref().map(|_| "<function>"),
            )
            .field(
                "context_origin_predicate",
                &self.context_origin_predicate.as_ref().map(|_| "<function>"),
            )
            .field("allowed_methods", &self.allowed_methods)
            .field("allowed_headers", &self.allowed_headers)
            .field("exposed_headers", &self.exposed_headers)
            .field("allow_credentials", &self.allow_credentials)
            .field("allow_private_network", &self.allow_private_network)
            .field("max_age", &self.max_age)
            .field("allow_wildcard", &self.allow_wildcard)
            .field("allow_browser_extensions", &self.allow_browser_extensions)
            .field("allow_web_sockets", &self.allow_web_sockets)
            .field("allow_files", &self.allow_files)
            .field("custom_schemes", &self.custom_schemes)
            .field("options_response_status", &self.options_response_status)
            .finish()
    }
}

impl CorsConfig {
    /// Append methods to `allowed_methods`
    pub fn add_allowed_methods<I, S>(&mut self, methods: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.allowed_methods.extend(methods.into_iter().map(Into::into));
    }

    /// Append headers to `allowed_headers`
    pub fn add_allowed_headers<I, S>(&mut self, headers: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.allowed_headers.extend(headers.into_iter().map(Into::into));
    }

    /// Append headers to `exposed_headers`
    pub fn add_exposed_headers<I, S>(&mut self, headers: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.exposed_headers.extend(headers.into_iter().map(Into::into));
    }

    /// Whether a predicate strategy is configured
    #[must_use]
    pub fn has_origin_predicate(&self) -> bool {
        self.origin_predicate.is_some() || self.context_origin_predicate.is_some()
    }

    /// `allow_all_origins`, or the `["*"]` shorthand
    #[must_use]
    pub fn allows_all_origins(&self) -> bool {
        self.allow_all_origins || self.allowed_origins.iter().any(|o| o.trim() == "*")
    }

    /// Validate the policy without modifying it
    ///
    /// Checks, in order:
    /// 1. exactly one origin strategy is configured
    /// 2. every origin entry is well formed and carries an accepted scheme
    /// 3. the preflight status is a 2xx code
    ///
    /// # Errors
    ///
    /// Returns the first [`CorsConfigError`] found.
    pub fn validate(&self) -> Result<(), CorsConfigError> {
        self.validate_strategy()?;
        if !self.allows_all_origins() {
            for origin in &self.allowed_origins {
                parse_origin_entry(origin, self)?;
            }
        }
        if !(200..300).contains(&self.options_response_status) {
            return Err(CorsConfigError::InvalidOptionsStatus {
                status: self.options_response_status,
            });
        }
        Ok(())
    }

    fn validate_strategy(&self) -> Result<(), CorsConfigError> {
        let has_predicate = self.has_origin_predicate();
        let has_star = self.allowed_origins.iter().any(|o| o.trim() == "*");

        if self.allow_all_origins {
            if !self.allowed_origins.is_empty() {
                return Err(CorsConfigError::AllOriginsConflict {
                    conflicting: "allowed_origins",
                });
            }
            if has_predicate {
                return Err(CorsConfigError::AllOriginsConflict {
                    conflicting: "an origin predicate",
                });
            }
            return Ok(());
        }

        if has_star {
            if self.allowed_origins.len() > 1 {
                return Err(CorsConfigError::AllOriginsConflict {
                    conflicting: "any other allowed_origins entry",
                });
            }
            if has_predicate {
                return Err(CorsConfigError::AllOriginsConflict {
                    conflicting: "an origin predicate",
                });
            }
            return Ok(());
        }

        match (has_predicate, self.allowed_origins.is_empty()) {
            (true, false) => Err(CorsConfigError::PredicateWithOrigins),
            (false, true) => Err(CorsConfigError::NoOriginsAllowed),
            _ => Ok(()),
        }
    }

    /// Scheme prefixes accepted in origin entries, web schemes first
    #[must_use]
    pub fn allowed_schemes(&self) -> Vec<String> {
        let mut schemes: Vec<String> = WEB_SCHEMES.iter().map(|s| s.to_string()).collect();
        if self.allow_browser_extensions {
            schemes.extend(EXTENSION_SCHEMES.iter().map(|s| s.to_string()));
        }
        if self.allow_web_sockets {
            schemes.extend(WEBSOCKET_SCHEMES.iter().map(|s| s.to_string()));
        }
        if self.allow_files {
            schemes.extend(FILE_SCHEMES.iter().map(|s| s.to_string()));
        }
        schemes.extend(self.custom_schemes.iter().map(|s| custom_scheme_prefix(s)));
        schemes
    }

    /// Classify a `scheme://` prefix against the enabled scheme classes
    ///
    /// Returns `None` when the scheme is unknown or its toggle is off.
    pub(crate) fn enabled_scheme_class(&self, prefix: &str) -> Option<SchemeClass> {
        if WEB_SCHEMES.contains(&prefix) {
            Some(SchemeClass::Web)
        } else if self.allow_browser_extensions && EXTENSION_SCHEMES.contains(&prefix) {
            Some(SchemeClass::BrowserExtension)
        } else if self.allow_web_sockets && WEBSOCKET_SCHEMES.contains(&prefix) {
            Some(SchemeClass::WebSocket)
        } else if self.allow_files && FILE_SCHEMES.contains(&prefix) {
            Some(SchemeClass::File)
        } else if self
            .custom_schemes
            .iter()
            .any(|s| custom_scheme_prefix(s) == prefix)
        {
            Some(SchemeClass::Custom)
        } else {
            None
        }
    }

    /// Wildcard (prefix, suffix) table of the origin list
    ///
    /// Empty when `allow_wildcard` is off. Regex entries are not part of it.
    ///
    /// # Errors
    ///
    /// [`CorsConfigError::MultipleWildcards`] and the other per-entry errors.
    pub fn parse_wildcard_rules(&self) -> Result<Vec<WildcardRule>, CorsConfigError> {
        if !self.allow_wildcard {
            return Ok(vec![]);
        }
        let mut rules = Vec::new();
        for origin in &self.allowed_origins {
            if let OriginEntry::Wildcard { rule, .. } = parse_origin_entry(origin, self)? {
                rules.push(rule);
            }
        }
        Ok(rules)
    }

    /// Parse a policy from YAML
    ///
    /// Accepts either a bare policy document or a document with a top-level
    /// `cors:` section (the layout used by service `config.yaml` files).
    ///
    /// # Errors
    ///
    /// [`CorsConfigError::Parse`] on malformed YAML or unknown keys. The
    /// result is not validated; [`CorsMiddleware::try_new`](super::CorsMiddleware::try_new)
    /// does that.
    pub fn from_yaml_str(yaml: &str) -> Result<Self, CorsConfigError> {
        let doc: serde_yaml::Value = serde_yaml::from_str(yaml)?;
        let section = match doc.get("cors") {
            Some(section) => section.clone(),
            None => doc,
        };
        if section.is_null() {
            return Ok(Self::default());
        }
        Ok(serde_yaml::from_value(section)?)
    }
}

/// Load a [`CorsConfig`] from a YAML file
///
/// # Errors
///
/// [`CorsConfigError::Io`] when the file cannot be read, otherwise see
/// [`CorsConfig::from_yaml_str`].
pub fn load_cors_config(path: impl AsRef<Path>) -> Result<CorsConfig, CorsConfigError> {
    let path = path.as_ref();
    let contents = std::fs::read_to_string(path).map_err(|source| CorsConfigError::Io {
        path: path.display().to_string(),
        source,
    })?;
    CorsConfig::from_yaml_str(&contents)
}

fn custom_scheme_prefix(scheme: &str) -> String {
    let scheme = scheme.trim().trim_end_matches("://");
    format!("{scheme}://")
}
