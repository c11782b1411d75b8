//! Client-facing scheme detection.
//!
//! A proxy in front of us (load balancer, CDN) may terminate TLS, so the
//! scheme the client used is taken from forwarding headers when present.

use axum::{
    body::Body,
    extract::State,
    http::{HeaderMap, Request},
    middleware::Next,
    response::Response,
};
use serde::Deserialize;

use crate::http::server::AppState;

/// Scheme the client used, attached to every request as an extension.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForwardedScheme(pub String);

impl ForwardedScheme {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Payload of Cloudflare's `CF-Visitor` header, e.g. `{"scheme":"https"}`.
#[derive(Debug, Deserialize)]
struct CfVisitor {
    scheme: Option<String>,
}

/// Scheme announced by `X-Forwarded-Proto`, falling back to `CF-Visitor`.
///
/// Only `http` and `https` are accepted; anything else is ignored.
pub fn scheme_from_headers(headers: &HeaderMap) -> Option<String> {
    let forwarded = headers
        .get("x-forwarded-proto")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .and_then(normalize);
    if forwarded.is_some() {
        return forwarded;
    }

    let visitor = headers.get("cf-visitor")?.to_str().ok()?;
    let visitor: CfVisitor = serde_json::from_str(visitor).ok()?;
    visitor.scheme.as_deref().and_then(normalize)
}

fn normalize(scheme: &str) -> Option<String> {
    let scheme = scheme.trim().to_ascii_lowercase();
    matches!(scheme.as_str(), "http" | "https").then_some(scheme)
}

pub async fn forwarded_scheme(State(state): State<AppState>, mut request: Request<Body>, next: Next) -> Response {
    let scheme = scheme_from_headers(request.headers()).unwrap_or_else(|| state.listener_scheme.to_string());
    request.extensions_mut().insert(ForwardedScheme(scheme));
    next.run(request).await
}
