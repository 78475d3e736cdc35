//! Origin matching compiled once from a [`CorsConfig`].
//!
//! Supported `allowed_origins` entry forms:
//! - `"https://example.com"` exact (case-sensitive after normalisation)
//! - `"https://*.example.com"`, `"*.example.com"`, `"https://api.*"` single
//!   wildcard, stored as a (prefix, suffix) pair
//! - `"/^https://(foo|bar)\.example\.com$/i"` regex between `/` delimiters,
//!   optional `i`, `m`, `s`, `x` flags; full-string unless the pattern anchors
//!   itself
//! - `"chrome-extension://abc"`, `"wss://host"`, `"file://..."`, `"tauri://..."`
//!   special-scheme entries, checked after the web rules for origins of that
//!   scheme; a scheme whose toggle is off has no entries to match
//!
//! Nothing here is mutated after construction, so a matcher is shared by
//! every request without synchronisation.

use std::fmt;

use regex::{Regex, RegexBuilder};

use super::config::{ContextOriginPredicate, CorsConfig, OriginPredicate};
use super::CorsConfigError;
use crate::dispatcher::HandlerRequest;

const PATTERN_DELIMITER: char = '/';
const PATTERN_FLAGS: &str = "imsx";

/// Category of an origin scheme
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchemeClass {
    /// `http://`, `https://`
    Web,
    /// Browser extension schemes, gated by `allow_browser_extensions`
    BrowserExtension,
    /// `ws://`, `wss://`, gated by `allow_web_sockets`
    WebSocket,
    /// `file://`, gated by `allow_files`
    File,
    /// Schemes listed in `custom_schemes`
    Custom,
}

/// A single-wildcard origin pattern split at its `*`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WildcardRule {
    /// Text before the `*` (empty for a leading wildcard)
    pub prefix: String,
    /// Text after the `*` (empty for a trailing wildcard)
    pub suffix: String,
}

impl WildcardRule {
    /// Split `pattern` at its only `*`
    ///
    /// Returns `Ok(None)` when the pattern has no wildcard.
    ///
    /// # Errors
    ///
    /// [`CorsConfigError::MultipleWildcards`] when it has more than one.
    pub fn parse(pattern: &str) -> Result<Option<Self>, CorsConfigError> {
        let mut parts = pattern.splitn(3, '*');
        let prefix = parts.next().unwrap_or_default();
        let Some(suffix) = parts.next() else {
            return Ok(None);
        };
        if parts.next().is_some() {
            return Err(CorsConfigError::MultipleWildcards {
                origin: pattern.to_string(),
            });
        }
        Ok(Some(Self {
            prefix: prefix.to_string(),
            suffix: suffix.to_string(),
        }))
    }

    /// Whether `origin` starts with the prefix and ends with the suffix
    /// without the two overlapping
    #[inline]
    #[must_use]
    pub fn matches(&self, origin: &str) -> bool {
        origin.len() >= self.prefix.len() + self.suffix.len()
            && origin.starts_with(&self.prefix)
            && origin.ends_with(&self.suffix)
    }
}

/// A validated `allowed_origins` entry
#[derive(Debug, Clone)]
pub(crate) enum OriginEntry {
    Exact {
        origin: String,
        class: SchemeClass,
        scheme: Option<String>,
    },
    Wildcard {
        rule: WildcardRule,
        class: SchemeClass,
        scheme: Option<String>,
    },
    Pattern(Regex),
}

/// Validate and classify one `allowed_origins` entry
///
/// Literal and wildcard entries are trimmed and lower-cased; pattern
/// entries are compiled as written.
pub(crate) fn parse_origin_entry(
    raw: &str,
    config: &CorsConfig,
) -> Result<OriginEntry, CorsConfigError> {
    let entry = raw.trim();

    if entry.starts_with(PATTERN_DELIMITER) {
        return compile_pattern(entry).map(OriginEntry::Pattern);
    }

    let entry = entry.to_ascii_lowercase();
    let scheme = scheme_prefix(&entry);

    if let Some(star) = entry.find('*') {
        if !config.allow_wildcard {
            return Err(CorsConfigError::WildcardDisabled { origin: entry });
        }
        // `*` may stand for a host part, never for part of the scheme
        if entry
            .find("://")
            .is_some_and(|sep| star < sep || scheme.is_none())
        {
            return Err(CorsConfigError::MalformedPattern { origin: entry });
        }
        let rule = WildcardRule::parse(&entry)?.ok_or_else(|| CorsConfigError::MalformedPattern {
            origin: entry.clone(),
        })?;
        // Scheme-less entries (`*.golang.org`) match any scheme
        let (class, scheme) = match scheme {
            Some(prefix) => (checked_class(&entry, prefix, config)?, Some(prefix.to_string())),
            None => (SchemeClass::Web, None),
        };
        return Ok(OriginEntry::Wildcard {
            rule,
            class,
            scheme,
        });
    }

    let Some(prefix) = scheme else {
        return Err(CorsConfigError::MissingScheme { origin: entry });
    };
    let class = checked_class(&entry, prefix, config)?;
    let scheme = Some(prefix.to_string());
    Ok(OriginEntry::Exact {
        origin: entry,
        class,
        scheme,
    })
}

fn checked_class(
    entry: &str,
    prefix: &str,
    config: &CorsConfig,
) -> Result<SchemeClass, CorsConfigError> {
    config
        .enabled_scheme_class(prefix)
        .ok_or_else(|| CorsConfigError::UnsupportedScheme {
            origin: entry.to_string(),
            scheme: prefix.trim_end_matches("://").to_string(),
            accepted: config.allowed_schemes().join(","),
        })
}

/// `scheme://` prefix of `origin`, including the separator
fn scheme_prefix(origin: &str) -> Option<&str> {
    let idx = origin.find("://")?;
    let scheme = &origin[..idx];
    let valid = !scheme.is_empty()
        && scheme
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'));
    valid.then(|| &origin[..idx + 3])
}

fn compile_pattern(entry: &str) -> Result<Regex, CorsConfigError> {
    let malformed = || {
        if entry.contains('*') && !entry[1..].contains(PATTERN_DELIMITER) {
            CorsConfigError::WildcardInPattern {
                origin: entry.to_string(),
            }
        } else {
            CorsConfigError::MalformedPattern {
                origin: entry.to_string(),
            }
        }
    };

    let body = &entry[1..];
    let close = body.rfind(PATTERN_DELIMITER).ok_or_else(|| malformed())?;
    let (source, flags) = (&body[..close], &body[close + 1..]);
    if source.is_empty() || !flags.chars().all(|c| PATTERN_FLAGS.contains(c)) {
        return Err(malformed());
    }

    let anchored = if source.starts_with('^') || source.ends_with('$') {
        source.to_string()
    } else {
        format!("^(?:{source})$")
    };

    RegexBuilder::new(&anchored)
        .case_insensitive(flags.contains('i'))
        .multi_line(flags.contains('m'))
        .dot_matches_new_line(flags.contains('s'))
        .ignore_whitespace(flags.contains('x'))
        .build()
        .map_err(|source| CorsConfigError::InvalidRegex {
            origin: entry.to_string(),
            source,
        })
}

/// Literal and wildcard entries of one special scheme
#[derive(Debug, Clone)]
struct SchemeRules {
    scheme: String,
    exact: Vec<String>,
    wildcards: Vec<WildcardRule>,
}

impl SchemeRules {
    fn allows(&self, origin: &str) -> bool {
        origin.starts_with(&self.scheme)
            && (self.exact.iter().any(|o| o == origin)
                || self.wildcards.iter().any(|w| w.matches(origin)))
    }
}

/// Compiled explicit origin list
///
/// Special-scheme entries only exist when their scheme class was enabled at
/// compile time, so a disabled scheme has no partition to fall back to.
#[derive(Debug, Clone, Default)]
struct OriginRules {
    exact: Vec<String>,
    wildcards: Vec<WildcardRule>,
    patterns: Vec<Regex>,
    special: Vec<SchemeRules>,
}

impl OriginRules {
    fn compile(config: &CorsConfig) -> Result<Self, CorsConfigError> {
        let mut rules = OriginRules::default();

        for raw in &config.allowed_origins {
            match parse_origin_entry(raw, config)? {
                OriginEntry::Pattern(re) => rules.patterns.push(re),
                OriginEntry::Exact {
                    origin,
                    class: SchemeClass::Web,
                    ..
                } => {
                    if !rules.exact.contains(&origin) {
                        rules.exact.push(origin);
                    }
                }
                OriginEntry::Wildcard {
                    rule,
                    class: SchemeClass::Web,
                    ..
                } => rules.wildcards.push(rule),
                OriginEntry::Exact { origin, scheme, .. } => {
                    rules.scheme_rules(scheme).exact.push(origin);
                }
                OriginEntry::Wildcard { rule, scheme, .. } => {
                    rules.scheme_rules(scheme).wildcards.push(rule);
                }
            }
        }
        Ok(rules)
    }

    fn scheme_rules(&mut self, scheme: Option<String>) -> &mut SchemeRules {
        let scheme = scheme.unwrap_or_default();
        let idx = match self.special.iter().position(|r| r.scheme == scheme) {
            Some(idx) => idx,
            None => {
                self.special.push(SchemeRules {
                    scheme,
                    exact: vec![],
                    wildcards: vec![],
                });
                self.special.len() - 1
            }
        };
        &mut self.special[idx]
    }

    /// Exact, then wildcard, then regex, then the origin's own scheme entries
    fn allows(&self, origin: &str) -> bool {
        self.exact.iter().any(|o| o == origin)
            || self.wildcards.iter().any(|w| w.matches(origin))
            || self.patterns.iter().any(|re| re.is_match(origin))
            || self.special.iter().any(|r| r.allows(origin))
    }
}

/// Origin authorization strategy
///
/// Exactly one variant is built per configuration; the configuration
/// validation guarantees the strategies never overlap.
#[derive(Clone)]
enum OriginStrategy {
    /// Every origin is allowed
    AllowAll,
    /// Caller-supplied predicates; the request-aware one wins when both exist
    Predicate {
        with_context: Option<ContextOriginPredicate>,
        plain: Option<OriginPredicate>,
    },
    /// Exact, wildcard, regex and scheme-class rules
    List(OriginRules),
}

/// Compiled origin matcher
#[derive(Clone)]
pub struct OriginMatcher {
    strategy: OriginStrategy,
}

impl fmt::Debug for OriginMatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.strategy {
            OriginStrategy::AllowAll => write!(f, "AllowAll"),
            OriginStrategy::Predicate { with_context, plain } => f
                .debug_struct("Predicate")
                .field("with_context", &with_context.is_some())
                .field("plain", &plain.is_some())
                .finish(),
            OriginStrategy::List(rules) => f
                .debug_struct("List")
                .field("exact", &rules.exact)
                .field("wildcards", &rules.wildcards)
                .field(
                    "patterns",
                    &rules.patterns.iter().map(Regex::as_str).collect::<Vec<_>>(),
                )
                .field("special", &rules.special)
                .finish(),
        }
    }
}

impl OriginMatcher {
    /// Validate `config` and compile its origin strategy
    ///
    /// # Errors
    ///
    /// Any [`CorsConfigError`] reported by [`CorsConfig::validate`].
    pub fn compile(config: &CorsConfig) -> Result<Self, CorsConfigError> {
        config.validate()?;
        let strategy = if config.allows_all_origins() {
            OriginStrategy::AllowAll
        } else if config.has_origin_predicate() {
            OriginStrategy::Predicate {
                with_context: config.context_origin_predicate.clone(),
                plain: config.origin_predicate.clone(),
            }
        } else {
            OriginStrategy::List(OriginRules::compile(config)?)
        };
        Ok(Self { strategy })
    }

    /// Whether `origin` is authorized for `req`
    ///
    /// Predicates only get a shared borrow of the request.
    #[must_use]
    pub fn allowed(&self, origin: &str, req: &HandlerRequest) -> bool {
        match &self.strategy {
            OriginStrategy::AllowAll => true,
            OriginStrategy::Predicate {
                with_context: Some(check),
                ..
            } => check(req, origin),
            OriginStrategy::Predicate {
                plain: Some(check), ..
            } => check(origin),
            OriginStrategy::Predicate { .. } => false,
            OriginStrategy::List(rules) => rules.allows(origin),
        }
    }

    /// `true` when every origin is allowed and `*` is echoed
    #[must_use]
    pub fn allows_all(&self) -> bool {
        matches!(self.strategy, OriginStrategy::AllowAll)
    }

    /// Short name of the active strategy, for logs
    #[must_use]
    pub fn strategy_name(&self) -> &'static str {
        match &self.strategy {
            OriginStrategy::AllowAll => "allow_all",
            OriginStrategy::Predicate {
                with_context: Some(_),
                ..
            } => "context_predicate",
            OriginStrategy::Predicate { .. } => "predicate",
            OriginStrategy::List(_) => "origin_list",
        }
    }

    /// (exact, wildcard, pattern, special-scheme) rule counts, for logs
    #[must_use]
    pub fn rule_counts(&self) -> (usize, usize, usize, usize) {
        match &self.strategy {
            OriginStrategy::List(rules) => (
                rules.exact.len(),
                rules.wildcards.len(),
                rules.patterns.len(),
                rules
                    .special
                    .iter()
                    .map(|r| r.exact.len() + r.wildcards.len())
                    .sum(),
            ),
            _ => (0, 0, 0, 0),
        }
    }
}
