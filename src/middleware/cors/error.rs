use thiserror::Error;

/// CORS configuration error
///
/// Returned by [`CorsConfig::validate`](super::CorsConfig::validate),
/// [`CorsMiddleware::try_new`](super::CorsMiddleware::try_new) and
/// [`CorsMiddlewareBuilder::build`](super::CorsMiddlewareBuilder::build) when
/// the policy is contradictory or malformed. None of these are recoverable:
/// a service must not start serving with a configuration that produces one.
#[derive(Debug, Error)]
pub enum CorsConfigError {
    /// `allow_all_origins` (or a bare `"*"` origin) combined with an origin
    /// list or a predicate
    #[error(
        "conflict settings: all origins are allowed, {conflicting} is not needed"
    )]
    AllOriginsConflict {
        /// Which explicit setting was also configured
        conflicting: &'static str,
    },

    /// An origin predicate combined with an explicit origin list
    #[error("conflict settings: an origin predicate is configured, allowed_origins is not needed")]
    PredicateWithOrigins,

    /// No strategy allows any origin
    #[error("conflict settings: all origins disabled")]
    NoOriginsAllowed,

    /// Literal origin without any `scheme://` prefix (e.g. `google.com`)
    #[error("bad origin '{origin}': origins must include a scheme such as http:// or https://")]
    MissingScheme {
        /// The offending origin entry
        origin: String,
    },

    /// Origin whose scheme is not enabled by a toggle or `custom_schemes`
    #[error("bad origin '{origin}': scheme '{scheme}' is not allowed, accepted schemes are {accepted}")]
    UnsupportedScheme {
        /// The offending origin entry
        origin: String,
        /// The scheme found in the entry
        scheme: String,
        /// Comma separated list of accepted scheme prefixes
        accepted: String,
    },

    /// Wildcard origin configured while `allow_wildcard` is off
    #[error("bad origin '{origin}': wildcard origins require allow_wildcard")]
    WildcardDisabled {
        /// The offending origin entry
        origin: String,
    },

    /// More than one `*` in a single origin pattern
    #[error("bad origin '{origin}': only one wildcard is allowed per origin")]
    MultipleWildcards {
        /// The offending origin entry
        origin: String,
    },

    /// Wildcard origin that starts with the regex delimiter
    #[error("bad origin '{origin}': wildcard origins cannot start with the pattern delimiter '/'")]
    WildcardInPattern {
        /// The offending origin entry
        origin: String,
    },

    /// Entry starting with `/` that is not of the form `/regex/flags`
    #[error("bad origin pattern '{origin}': expected /regex/ with optional flags (i, m, s, x)")]
    MalformedPattern {
        /// The offending origin entry
        origin: String,
    },

    /// Delimited pattern that does not compile
    #[error("bad origin pattern '{origin}': {source}")]
    InvalidRegex {
        /// The offending origin entry
        origin: String,
        /// Compilation error from the regex engine
        #[source]
        source: regex::Error,
    },

    /// Preflight status outside the 2xx range
    #[error("options_response_status must be a 2xx status code, got {status}")]
    InvalidOptionsStatus {
        /// The configured status code
        status: u16,
    },

    /// Configuration file could not be read
    #[error("failed to read CORS config '{path}': {source}")]
    Io {
        /// Path of the configuration file
        path: String,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// Configuration file could not be parsed
    #[error("failed to parse CORS config: {0}")]
    Parse(#[from] serde_yaml::Error),
}
