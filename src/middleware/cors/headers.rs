use std::sync::Arc;

use super::CorsConfig;
use crate::dispatcher::{HandlerResponse, HeaderVec};

// Emitted names use canonical casing; `http::header` constants are lowercase.
pub const ACCESS_CONTROL_ALLOW_ORIGIN: &str = "Access-Control-Allow-Origin";
pub const ACCESS_CONTROL_ALLOW_CREDENTIALS: &str = "Access-Control-Allow-Credentials";
pub const ACCESS_CONTROL_ALLOW_METHODS: &str = "Access-Control-Allow-Methods";
pub const ACCESS_CONTROL_ALLOW_HEADERS: &str = "Access-Control-Allow-Headers";
pub const ACCESS_CONTROL_ALLOW_PRIVATE_NETWORK: &str = "Access-Control-Allow-Private-Network";
pub const ACCESS_CONTROL_EXPOSE_HEADERS: &str = "Access-Control-Expose-Headers";
pub const ACCESS_CONTROL_MAX_AGE: &str = "Access-Control-Max-Age";
pub const VARY: &str = "Vary";

/// Every response header name the CORS middleware may emit
pub const CORS_RESPONSE_HEADERS: &[&str] = &[
    ACCESS_CONTROL_ALLOW_ORIGIN,
    ACCESS_CONTROL_ALLOW_CREDENTIALS,
    ACCESS_CONTROL_ALLOW_METHODS,
    ACCESS_CONTROL_ALLOW_HEADERS,
    ACCESS_CONTROL_ALLOW_PRIVATE_NETWORK,
    ACCESS_CONTROL_EXPOSE_HEADERS,
    ACCESS_CONTROL_MAX_AGE,
];

/// Case transform applied by [`normalize`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Casing {
    /// `get` -> `GET` (methods)
    Upper,
    /// `X-User` -> `x-user`
    Lower,
    /// `x-user` -> `X-User` (header names)
    Canonical,
}

impl Casing {
    fn apply(self, value: &str) -> String {
        match self {
            Casing::Upper => value.to_ascii_uppercase(),
            Casing::Lower => value.to_ascii_lowercase(),
            Casing::Canonical => canonical_header_name(value),
        }
    }
}

/// Canonical MIME header casing: first letter and every letter after a `-`
/// upper-cased, the rest lower-cased
///
/// Values containing a space or other non-token byte are returned unchanged.
#[must_use]
pub fn canonical_header_name(name: &str) -> String {
    let is_token = name
        .bytes()
        .all(|b| b.is_ascii_alphanumeric() || b"!#$%&'*+-.^_`|~".contains(&b));
    if !is_token {
        return name.to_string();
    }
    let mut upper = true;
    name.chars()
        .map(|c| {
            let out = if upper {
                c.to_ascii_uppercase()
            } else {
                c.to_ascii_lowercase()
            };
            upper = c == '-';
            out
        })
        .collect()
}

/// Trim, re-case and de-duplicate keeping the first occurrence
///
/// Idempotent: `normalize(&normalize(x, c), c) == normalize(x, c)`.
#[must_use]
pub fn normalize<S: AsRef<str>>(values: &[S], casing: Casing) -> Vec<String> {
    let mut normalized: Vec<String> = Vec::with_capacity(values.len());
    for value in values {
        let value = casing.apply(value.as_ref().trim());
        if !normalized.contains(&value) {
            normalized.push(value);
        }
    }
    normalized
}

/// Immutable header name/value list computed once per configuration
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HeaderSet {
    entries: HeaderVec,
}

impl HeaderSet {
    fn set(&mut self, name: &str, value: String) {
        self.entries.retain(|(k, _)| !k.eq_ignore_ascii_case(name));
        self.entries.push((Arc::from(name), value));
    }

    /// Value of `name` (case-insensitive)
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Number of headers in the set
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// `true` when the set holds no header
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterate over (name, value) pairs in generation order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_ref(), v.as_str()))
    }

    /// Copy every header onto `res`, overwriting existing values
    pub fn apply_to(&self, res: &mut HandlerResponse) {
        for (name, value) in &self.entries {
            res.set_shared_header(name, value.clone());
        }
    }
}

/// Headers added to actual (non-preflight) CORS responses
#[must_use]
pub fn generate_normal_headers(config: &CorsConfig) -> HeaderSet {
    let mut headers = HeaderSet::default();
    if config.allow_credentials {
        headers.set(ACCESS_CONTROL_ALLOW_CREDENTIALS, "true".to_string());
    }
    if !config.exposed_headers.is_empty() {
        let exposed = normalize(&config.exposed_headers, Casing::Canonical);
        headers.set(ACCESS_CONTROL_EXPOSE_HEADERS, exposed.join(","));
    }
    set_origin_hint(&mut headers, config);
    headers
}

/// Headers added to successful preflight responses
#[must_use]
pub fn generate_preflight_headers(config: &CorsConfig) -> HeaderSet {
    let mut headers = HeaderSet::default();
    if config.allow_credentials {
        headers.set(ACCESS_CONTROL_ALLOW_CREDENTIALS, "true".to_string());
    }
    if !config.allowed_methods.is_empty() {
        let methods = normalize(&config.allowed_methods, Casing::Upper);
        headers.set(ACCESS_CONTROL_ALLOW_METHODS, methods.join(","));
    }
    if !config.allowed_headers.is_empty() {
        let allowed = normalize(&config.allowed_headers, Casing::Canonical);
        headers.set(ACCESS_CONTROL_ALLOW_HEADERS, allowed.join(","));
    }
    let max_age = config.max_age.as_secs();
    if max_age > 0 {
        headers.set(ACCESS_CONTROL_MAX_AGE, max_age.to_string());
    }
    if config.allow_private_network {
        headers.set(ACCESS_CONTROL_ALLOW_PRIVATE_NETWORK, "true".to_string());
    }
    set_origin_hint(&mut headers, config);
    headers
}

// The per-request handler still writes the effective allow-origin value.
fn set_origin_hint(headers: &mut HeaderSet, config: &CorsConfig) {
    if config.allows_all_origins() {
        headers.set(ACCESS_CONTROL_ALLOW_ORIGIN, "*".to_string());
    } else {
        headers.set(VARY, "Origin".to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn config() -> CorsConfig {
        CorsConfig {
            allowed_methods: vec![],
            allowed_headers: vec![],
            max_age: Duration::ZERO,
            ..CorsConfig::default()
        }
    }

    #[test]
    fn test_normalize_trims_lowercases_and_dedups() {
        let values = normalize(
            &["http-Access ", "Post", "POST", " poSt  ", "HTTP-Access", ""],
            Casing::Lower,
        );
        assert_eq!(values, vec!["http-access", "post", ""]);
        assert!(normalize::<&str>(&[], Casing::Lower).is_empty());
    }

    #[test]
    fn test_normalize_is_idempotent_and_keeps_first_seen_order() {
        let once = normalize(&["B", "a", "A", " b "], Casing::Upper);
        assert_eq!(once, vec!["B", "A"]);
        assert_eq!(normalize(&once, Casing::Upper), once);

        let headers = normalize(&["X-CSRF-TOKEN", "X-CSRF-Token", "x-csrf-token"], Casing::Canonical);
        assert_eq!(headers, vec!["X-Csrf-Token"]);
        assert_eq!(normalize(&headers, Casing::Canonical), headers);
    }

    #[test]
    fn test_canonical_header_name() {
        assert_eq!(canonical_header_name("content-type"), "Content-Type");
        assert_eq!(canonical_header_name("xPassword"), "Xpassword");
        assert_eq!(canonical_header_name("x-user"), "X-User");
        assert_eq!(canonical_header_name("has space"), "has space");
    }

    #[test]
    fn test_normal_headers_origin_hint() {
        let headers = generate_normal_headers(&config());
        assert_eq!(headers.get("Access-Control-Allow-Origin"), None);
        assert_eq!(headers.get("Vary"), Some("Origin"));
        assert_eq!(headers.len(), 1);

        let headers = generate_normal_headers(&CorsConfig {
            allow_all_origins: true,
            ..config()
        });
        assert_eq!(headers.get("Access-Control-Allow-Origin"), Some("*"));
        assert_eq!(headers.get("Vary"), None);
        assert_eq!(headers.len(), 1);
    }

    #[test]
    fn test_normal_headers_credentials_and_exposed() {
        let headers = generate_normal_headers(&CorsConfig {
            allow_credentials: true,
            exposed_headers: vec!["X-user".into(), "xPassword".into()],
            ..config()
        });
        assert_eq!(headers.get("Access-Control-Allow-Credentials"), Some("true"));
        assert_eq!(
            headers.get("Access-Control-Expose-Headers"),
            Some("X-User,Xpassword")
        );
        assert_eq!(headers.get("Vary"), Some("Origin"));
        assert_eq!(headers.len(), 3);
        // Preflight-only headers never leak into the normal set
        assert_eq!(headers.get("Access-Control-Allow-Methods"), None);
        assert_eq!(headers.get("Access-Control-Max-Age"), None);
    }

    #[test]
    fn test_preflight_headers_minimal() {
        let headers = generate_preflight_headers(&config());
        assert_eq!(headers.get("Vary"), Some("Origin"));
        assert_eq!(headers.len(), 1);
    }

    #[test]
    fn test_preflight_headers_full() {
        let headers = generate_preflight_headers(&CorsConfig {
            allow_credentials: true,
            allow_private_network: true,
            allowed_methods: vec!["GET ".into(), "post".into(), "PUT".into(), " put  ".into()],
            allowed_headers: vec!["X-user".into(), "Content-Type".into()],
            exposed_headers: vec!["X-Hidden".into()],
            max_age: Duration::from_secs(12 * 60 * 60),
            ..config()
        });
        assert_eq!(headers.get("Access-Control-Allow-Credentials"), Some("true"));
        assert_eq!(headers.get("Access-Control-Allow-Methods"), Some("GET,POST,PUT"));
        assert_eq!(
            headers.get("Access-Control-Allow-Headers"),
            Some("X-User,Content-Type")
        );
        assert_eq!(headers.get("Access-Control-Max-Age"), Some("43200"));
        assert_eq!(
            headers.get("Access-Control-Allow-Private-Network"),
            Some("true")
        );
        assert_eq!(headers.get("Access-Control-Expose-Headers"), None);
        assert_eq!(headers.get("Vary"), Some("Origin"));
        assert_eq!(headers.len(), 6);
    }

    #[test]
    fn test_sub_second_max_age_is_omitted() {
        let headers = generate_preflight_headers(&CorsConfig {
            max_age: Duration::from_millis(500),
            ..config()
        });
        assert_eq!(headers.get("Access-Control-Max-Age"), None);
    }

    #[test]
    fn test_emitted_names_are_canonical() {
        let config = CorsConfig {
            allow_credentials: true,
            allow_private_network: true,
            exposed_headers: vec!["x-total-count".into()],
            ..CorsConfig::default()
        };
        let preflight_set = generate_preflight_headers(&config);
        let preflight: Vec<&str> = preflight_set
            .iter()
            .map(|(name, _)| name)
            .collect();
        assert_eq!(
            preflight,
            vec![
                "Access-Control-Allow-Credentials",
                "Access-Control-Allow-Methods",
                "Access-Control-Allow-Headers",
                "Access-Control-Max-Age",
                "Access-Control-Allow-Private-Network",
                "Vary",
            ]
        );
        let normal_set = generate_normal_headers(&config);
        let normal: Vec<&str> = normal_set
            .iter()
            .map(|(name, _)| name)
            .collect();
        assert_eq!(
            normal,
            vec![
                "Access-Control-Allow-Credentials",
                "Access-Control-Expose-Headers",
                "Vary",
            ]
        );
        let allow_all = generate_normal_headers(&CorsConfig {
            allow_all_origins: true,
            ..CorsConfig::default()
        });
        assert_eq!(
            allow_all.iter().next(),
            Some(("Access-Control-Allow-Origin", "*"))
        );
    }

    #[test]
    fn test_apply_to_overwrites_existing_values() {
        let headers = generate_normal_headers(&config());
        let mut res = HandlerResponse::status_only(200);
        res.set_header("Vary", "Accept".to_string());
        headers.apply_to(&mut res);
        assert_eq!(res.get_all_headers("vary").collect::<Vec<_>>(), vec!["Origin"]);
    }
}
