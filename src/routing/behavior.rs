//! Metadata-driven route behavior.
//!
//! # Responsibilities
//! - Read the known metadata flags (`RedirectWww`, `UseOriginalHostHeader`)
//! - Decide www → apex redirects against the live table
//! - Decide whether forwarded requests keep the original `Host` header
//!
//! # Design Decisions
//! - Unknown metadata keys are carried untouched
//! - Flags parse like booleans: "true" in any case, surrounding whitespace ignored
//! - All flag lookups go through `metadata_flag`

use std::collections::BTreeMap;

use url::Url;

use crate::document::RouteEntry;
use crate::observability::metrics;
use crate::routing::matcher::strip_port;
use crate::routing::table::RouteTable;

/// Metadata keys with defined behavior.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetadataFlag {
    /// Redirect `www.<host>` to `<host>`.
    RedirectWww,
    /// Forward the client's `Host` header unchanged.
    UseOriginalHostHeader,
}

impl MetadataFlag {
    pub const fn key(self) -> &'static str {
        match self {
            MetadataFlag::RedirectWww => "RedirectWww",
            MetadataFlag::UseOriginalHostHeader => "UseOriginalHostHeader",
        }
    }
}

/// Whether `flag` is switched on in a route's metadata.
pub fn metadata_flag(metadata: &BTreeMap<String, String>, flag: MetadataFlag) -> bool {
    metadata
        .get(flag.key())
        .map(|value| value.trim().eq_ignore_ascii_case("true"))
        .unwrap_or(false)
}

/// What to send as `Host` to the destination.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostHeaderPolicy {
    /// Keep the client's `Host` header.
    Preserve,
    /// Use the destination's authority.
    Substitute,
}

pub fn resolve_host_header_policy(route: &RouteEntry) -> HostHeaderPolicy {
    if metadata_flag(&route.metadata, MetadataFlag::UseOriginalHostHeader) {
        HostHeaderPolicy::Preserve
    } else {
        HostHeaderPolicy::Substitute
    }
}

/// Per-route decisions resolved once when a table is published.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RouteFlags {
    pub redirect_www: bool,
    pub host_header: HostHeaderPolicy,
}

impl RouteFlags {
    pub fn resolve(route: &RouteEntry) -> Self {
        Self {
            redirect_www: metadata_flag(&route.metadata, MetadataFlag::RedirectWww),
            host_header: resolve_host_header_policy(route),
        }
    }
}

/// The parts of an inbound request a redirect is built from.
#[derive(Debug, Clone, Copy)]
pub struct RedirectRequest<'a> {
    pub scheme: &'a str,
    /// `Host` value as received, port included if present.
    pub host: &'a str,
    pub path: &'a str,
    pub query: Option<&'a str>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RedirectDecision {
    /// Permanently redirect to this absolute URL.
    RedirectTo(String),
    NoRedirect,
}

/// Decide whether a `www.` request should be sent to its bare host.
pub fn resolve_redirect(request: &RedirectRequest<'_>, table: &RouteTable) -> RedirectDecision {
    let hostname = strip_port(request.host);
    let Some(candidate) = strip_www(hostname) else {
        return RedirectDecision::NoRedirect;
    };

    let Some(route) = table.routes().iter().find(|r| r.hosts().contains_exact(candidate)) else {
        tracing::warn!(
            host = %request.host,
            candidate = %candidate,
            "No route matches the host without its www prefix"
        );
        metrics::record_redirect_miss();
        return RedirectDecision::NoRedirect;
    };

    if !route.flags().redirect_www {
        return RedirectDecision::NoRedirect;
    }

    let port = match request.host[hostname.len()..].strip_prefix(':') {
        None | Some("") => None,
        Some(port) => match port.parse::<u16>() {
            Ok(port) => Some(port),
            Err(_) => {
                tracing::warn!(host = %request.host, "Invalid port in Host header, not redirecting");
                return RedirectDecision::NoRedirect;
            }
        },
    };

    match build_url(request.scheme, candidate, port, request.path, request.query) {
        Some(url) => {
            tracing::debug!(route_id = %route.id(), location = %url, "Redirecting www host");
            RedirectDecision::RedirectTo(url)
        }
        None => {
            tracing::warn!(host = %request.host, scheme = %request.scheme, "Could not build redirect URL");
            RedirectDecision::NoRedirect
        }
    }
}

fn strip_www(host: &str) -> Option<&str> {
    let prefix = host.get(..4)?;
    if prefix.eq_ignore_ascii_case("www.") && host.len() > 4 {
        Some(&host[4..])
    } else {
        None
    }
}

fn build_url(scheme: &str, host: &str, port: Option<u16>, path: &str, query: Option<&str>) -> Option<String> {
    let mut url = Url::parse(&format!("{scheme}://{host}")).ok()?;
    url.set_path(path);
    url.set_query(query.filter(|q| !q.is_empty()));
    // Default ports (80 for http, 443 for https) are dropped by `Url` itself.
    url.set_port(port).ok()?;
    Some(url.to_string())
}
