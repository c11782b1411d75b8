//! Route matching logic.
//!
//! # Responsibilities
//! - Match host (exact or `*.` wildcard, case-insensitive, port ignored)
//! - Match path against a route template
//! - Combine conditions with AND semantics
//!
//! # Design Decisions
//! - Host matching is case-insensitive, as HTTP hosts are
//! - Template literals compare case-insensitively, like the templates' origin
//! - Empty host list = always matches (wildcard)
//! - Templates are parsed once at publish time, never per request

/// What a matcher needs to know about a request.
#[derive(Debug, Clone, Copy)]
pub struct RequestTarget<'a> {
    /// Host without port, if the request carried one.
    pub host: Option<&'a str>,
    pub path: &'a str,
}

impl<'a> RequestTarget<'a> {
    /// Build a target from a raw `Host` value (port allowed) and a path.
    pub fn new(host: Option<&'a str>, path: &'a str) -> Self {
        Self {
            host: host.map(strip_port),
            path,
        }
    }
}

/// Trait for matching requests against conditions.
pub trait Matcher: Send + Sync + std::fmt::Debug {
    /// Returns true if the request matches this condition.
    fn matches(&self, target: &RequestTarget<'_>) -> bool;
}

/// Drop a trailing `:port` from a host value. IPv6 literals keep their brackets.
pub fn strip_port(host: &str) -> &str {
    if host.starts_with('[') {
        return match host.find(']') {
            Some(end) => &host[..=end],
            None => host,
        };
    }
    match host.rsplit_once(':') {
        Some((name, port)) if port.chars().all(|c| c.is_ascii_digit()) => name,
        _ => host,
    }
}

/// Matches the request host against a set of patterns.
#[derive(Debug, Clone, Default)]
pub struct HostMatcher {
    exact: Vec<String>,
    /// Suffixes (with the leading dot) of `*.` patterns.
    wildcard_suffixes: Vec<String>,
}

impl HostMatcher {
    /// Patterns are normalized to lowercase for case-insensitive matching.
    pub fn new<I, S>(hosts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut matcher = Self::default();
        for host in hosts {
            let host = host.as_ref().trim().to_lowercase();
            if host.is_empty() {
                continue;
            }
            match host.strip_prefix('*') {
                Some(suffix) if suffix.starts_with('.') => matcher.wildcard_suffixes.push(suffix.to_string()),
                _ => matcher.exact.push(strip_port(&host).to_string()),
            }
        }
        matcher
    }

    /// True when no patterns were given.
    pub fn is_any(&self) -> bool {
        self.exact.is_empty() && self.wildcard_suffixes.is_empty()
    }

    /// Exact (non-wildcard) membership test, case-insensitive.
    pub fn contains_exact(&self, host: &str) -> bool {
        let host = host.to_lowercase();
        self.exact.iter().any(|h| *h == host)
    }
}

impl Matcher for HostMatcher {
    fn matches(&self, target: &RequestTarget<'_>) -> bool {
        if self.is_any() {
            return true;
        }
        let Some(host) = target.host else {
            return false;
        };
        let host = host.to_lowercase();
        self.exact.iter().any(|h| *h == host)
            || self
                .wildcard_suffixes
                .iter()
                .any(|suffix| host.len() > suffix.len() && host.ends_with(suffix.as_str()))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    /// `{name}`: exactly one non-empty segment.
    Parameter,
    /// `{*name}`, `{**name}` or `**`: the rest of the path, possibly nothing.
    CatchAll,
}

/// A compiled route path template such as `/api/{version}/{**rest}`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathPattern {
    template: String,
    segments: Vec<Segment>,
}

impl PathPattern {
    /// Compile a template. Anything after a catch-all segment is ignored.
    pub fn parse(template: &str) -> Self {
        let mut segments = Vec::new();
        for raw in template.split('/').filter(|s| !s.is_empty()) {
            let segment = if raw == "**" {
                Segment::CatchAll
            } else if let Some(inner) = raw.strip_prefix('{').and_then(|r| r.strip_suffix('}')) {
                if inner.starts_with('*') {
                    Segment::CatchAll
                } else {
                    Segment::Parameter
                }
            } else {
                Segment::Literal(raw.to_lowercase())
            };
            let done = segment == Segment::CatchAll;
            segments.push(segment);
            if done {
                break;
            }
        }
        Self {
            template: template.to_string(),
            segments,
        }
    }

    pub fn template(&self) -> &str {
        &self.template
    }

    fn matches_path(&self, path: &str) -> bool {
        let mut parts = path.split('/').filter(|s| !s.is_empty());
        for segment in &self.segments {
            match segment {
                Segment::CatchAll => return true,
                Segment::Parameter => {
                    if parts.next().is_none() {
                        return false;
                    }
                }
                Segment::Literal(expected) => match parts.next() {
                    Some(actual) if actual.eq_ignore_ascii_case(expected) => {}
                    _ => return false,
                },
            }
        }
        parts.next().is_none()
    }
}

impl Matcher for PathPattern {
    fn matches(&self, target: &RequestTarget<'_>) -> bool {
        self.matches_path(target.path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn target<'a>(host: &'a str, path: &'a str) -> RequestTarget<'a> {
        RequestTarget::new(Some(host), path)
    }

    #[test]
    fn test_host_matcher() {
        let matcher = HostMatcher::new(["example.com"]);

        assert!(matcher.matches(&target("example.com", "/")));
        assert!(matcher.matches(&target("EXAMPLE.COM", "/"))); // Case insensitive
        assert!(matcher.matches(&target("example.com:8443", "/")));
        assert!(!matcher.matches(&target("other.com", "/")));
        assert!(!matcher.matches(&RequestTarget::new(None, "/")));
    }

    #[test]
    fn test_empty_host_list_matches_anything() {
        let matcher = HostMatcher::new(Vec::<String>::new());
        assert!(matcher.matches(&RequestTarget::new(None, "/")));
        assert!(matcher.matches(&target("whatever.org", "/")));
    }

    #[test]
    fn test_wildcard_host() {
        let matcher = HostMatcher::new(["*.example.com"]);
        assert!(matcher.matches(&target("api.example.com", "/")));
        assert!(!matcher.matches(&target("example.com", "/")));
        assert!(!matcher.contains_exact("api.example.com"));
    }

    #[test]
    fn test_strip_port() {
        assert_eq!(strip_port("a.com:80"), "a.com");
        assert_eq!(strip_port("a.com"), "a.com");
        assert_eq!(strip_port("[::1]:8080"), "[::1]");
    }

    #[test]
    fn test_catch_all_template() {
        let pattern = PathPattern::parse("{**catch-all}");
        assert!(pattern.matches_path("/"));
        assert!(pattern.matches_path("/anything/at/all"));

        let glob = PathPattern::parse("/**");
        assert!(glob.matches_path("/"));
        assert!(glob.matches_path("/x/y"));
    }

    #[test]
    fn test_prefixed_template() {
        let pattern = PathPattern::parse("/api/{**rest}");
        assert!(pattern.matches_path("/api"));
        assert!(pattern.matches_path("/API/v1/users"));
        assert!(!pattern.matches_path("/images/logo.png"));
    }

    #[test]
    fn test_parameter_template() {
        let pattern = PathPattern::parse("/users/{id}");
        assert!(pattern.matches_path("/users/42"));
        assert!(pattern.matches_path("/users/42/"));
        assert!(!pattern.matches_path("/users"));
        assert!(!pattern.matches_path("/users/42/orders"));
    }

    #[test]
    fn test_exact_template() {
        let pattern = PathPattern::parse("/health");
        assert!(pattern.matches_path("/health"));
        assert!(!pattern.matches_path("/healthz"));
        assert!(!pattern.matches_path("/"));
    }
}
