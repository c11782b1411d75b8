//! `www.` to bare host redirects for routes that opt in.

use axum::{
    body::Body,
    extract::State,
    http::{header, Request, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};

use crate::http::middleware::scheme::ForwardedScheme;
use crate::http::proxy::request_host;
use crate::http::server::AppState;
use crate::observability::metrics;
use crate::routing::{resolve_redirect, RedirectDecision, RedirectRequest};

pub async fn redirect_www(State(state): State<AppState>, request: Request<Body>, next: Next) -> Response {
    let decision = match request_host(&request) {
        Some(host) => {
            let scheme = request
                .extensions()
                .get::<ForwardedScheme>()
                .map(ForwardedScheme::as_str)
                .unwrap_or(state.listener_scheme.as_ref());
            let redirect = RedirectRequest {
                scheme,
                host,
                path: request.uri().path(),
                query: request.uri().query(),
            };
            resolve_redirect(&redirect, &state.table.load())
        }
        None => RedirectDecision::NoRedirect,
    };

    match decision {
        RedirectDecision::RedirectTo(location) => {
            tracing::info!(location = %location, "Permanent redirect to bare host");
            metrics::record_redirect();
            (StatusCode::MOVED_PERMANENTLY, [(header::LOCATION, location)]).into_response()
        }
        RedirectDecision::NoRedirect => next.run(request).await,
    }
}
