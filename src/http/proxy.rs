//! Forwarding of matched requests to their destination.
//!
//! # Responsibilities
//! - Match the request against the live route table
//! - Rewrite the URI onto the route's destination
//! - Apply the route's Host header policy and forwarding headers
//! - Stream the upstream response back to the client
//!
//! # Design Decisions
//! - One table snapshot per request; a publish mid-request does not affect it
//! - Hop-by-hop headers are stripped before forwarding
//! - Upstream failures map to 502, a route without destinations to 503

use std::time::Instant;

use axum::{
    body::Body,
    extract::State,
    http::{header, uri::InvalidUri, HeaderMap, HeaderName, HeaderValue, Request, StatusCode, Uri, Version},
    response::{IntoResponse, Response},
};
use url::Url;

use crate::http::middleware::ForwardedScheme;
use crate::http::server::AppState;
use crate::observability::metrics;
use crate::routing::{HostHeaderPolicy, RequestTarget};

const X_FORWARDED_HOST: HeaderName = HeaderName::from_static("x-forwarded-host");
const X_FORWARDED_PROTO: HeaderName = HeaderName::from_static("x-forwarded-proto");

/// Connection-scoped headers that must not be forwarded.
const HOP_BY_HOP: [HeaderName; 7] = [
    header::CONNECTION,
    HeaderName::from_static("keep-alive"),
    HeaderName::from_static("proxy-connection"),
    header::PROXY_AUTHORIZATION,
    header::TE,
    header::TRANSFER_ENCODING,
    header::UPGRADE,
];

/// Host the client asked for: the `Host` header, or the URI authority (HTTP/2).
pub(crate) fn request_host<B>(request: &Request<B>) -> Option<&str> {
    request
        .headers()
        .get(header::HOST)
        .and_then(|v| v.to_str().ok())
        .or_else(|| request.uri().authority().map(|a| a.as_str()))
        .filter(|h| !h.is_empty())
}

/// `host[:port]` of a destination, port omitted when it is the scheme default.
pub(crate) fn destination_authority(address: &Url) -> Option<String> {
    let host = address.host_str()?;
    Some(match address.port() {
        Some(port) => format!("{host}:{port}"),
        None => host.to_string(),
    })
}

/// Join the destination's base path with the request's path and query.
pub(crate) fn upstream_uri(address: &Url, original: &Uri) -> Result<Uri, InvalidUri> {
    let authority = destination_authority(address).unwrap_or_default();
    let prefix = address.path().trim_end_matches('/');
    let path_and_query = original.path_and_query().map(|pq| pq.as_str()).unwrap_or("/");
    format!("{}://{authority}{prefix}{path_and_query}", address.scheme()).parse()
}

fn strip_hop_by_hop(headers: &mut HeaderMap) {
    // Headers named in `Connection` are connection-scoped too.
    let named: Vec<HeaderName> = headers
        .get_all(header::CONNECTION)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .filter_map(|name| HeaderName::from_bytes(name.trim().as_bytes()).ok())
        .collect();
    for name in named.iter().chain(HOP_BY_HOP.iter()) {
        headers.remove(name);
    }
}

/// Main proxy handler.
pub async fn proxy_handler(State(state): State<AppState>, request: Request<Body>) -> Response {
    let start = Instant::now();
    let method = request.method().to_string();
    let request_id = request
        .headers()
        .get("x-request-id")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("unknown")
        .to_string();
    let original_host = request_host(&request).map(str::to_string);
    let scheme = request
        .extensions()
        .get::<ForwardedScheme>()
        .map(|s| s.as_str().to_string())
        .unwrap_or_else(|| state.listener_scheme.to_string());

    let table = state.table.load();
    let target = RequestTarget::new(original_host.as_deref(), request.uri().path());

    let Some(route) = table.match_request(&target) else {
        tracing::warn!(
            request_id = %request_id,
            host = ?original_host,
            path = %request.uri().path(),
            "No route matched"
        );
        metrics::record_request(&method, 404, start);
        return (StatusCode::NOT_FOUND, "No matching route found").into_response();
    };

    let Some(destination) = route.primary_destination() else {
        tracing::warn!(request_id = %request_id, route_id = %route.id(), cluster_id = %route.cluster_id(), "Route has no usable destination");
        metrics::record_request(&method, 503, start);
        return (StatusCode::SERVICE_UNAVAILABLE, "No destination available").into_response();
    };

    let uri = match upstream_uri(&destination.address, request.uri()) {
        Ok(uri) => uri,
        Err(e) => {
            tracing::error!(request_id = %request_id, route_id = %route.id(), error = %e, "Could not build upstream URI");
            metrics::record_request(&method, 502, start);
            return (StatusCode::BAD_GATEWAY, "Invalid upstream address").into_response();
        }
    };

    tracing::debug!(
        request_id = %request_id,
        route_id = %route.id(),
        destination = %destination.name,
        upstream = %uri,
        table_version = table.version(),
        "Proxying request"
    );

    let (mut parts, body) = request.into_parts();
    parts.uri = uri;
    parts.version = Version::HTTP_11;
    strip_hop_by_hop(&mut parts.headers);

    let upstream_host = match (route.flags().host_header, original_host.as_deref()) {
        (HostHeaderPolicy::Preserve, Some(host)) => Some(host.to_string()),
        _ => destination_authority(&destination.address),
    };
    if let Some(value) = upstream_host.and_then(|h| HeaderValue::from_str(&h).ok()) {
        parts.headers.insert(header::HOST, value);
    }
    if let Some(value) = original_host.as_deref().and_then(|h| HeaderValue::from_str(h).ok()) {
        parts.headers.insert(X_FORWARDED_HOST, value);
    }
    if let Ok(value) = HeaderValue::from_str(&scheme) {
        parts.headers.insert(X_FORWARDED_PROTO, value);
    }

    match state.client.request(Request::from_parts(parts, body)).await {
        Ok(response) => {
            let response: hyper::Response<hyper::body::Incoming> = response;
            let status = response.status();
            metrics::record_request(&method, status.as_u16(), start);
            let (mut parts, body) = response.into_parts();
            strip_hop_by_hop(&mut parts.headers);
            Response::from_parts(parts, Body::new(body))
        }
        Err(e) => {
            tracing::error!(
                request_id = %request_id,
                route_id = %route.id(),
                destination = %destination.address,
                error = %e,
                "Upstream error"
            );
            metrics::record_request(&method, 502, start);
            (StatusCode::BAD_GATEWAY, "Upstream request failed").into_response()
        }
    }
}
