//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create Axum Router with the proxy handler
//! - Wire up middleware (tracing, request ID, timeout, scheme, redirect)
//! - Bind server to listener
//! - Serve until the shutdown signal fires

use std::sync::Arc;
use std::time::Duration;

use axum::{body::Body, middleware::from_fn_with_state, routing::any, Router};
use hyper_util::{
    client::legacy::{connect::HttpConnector, Client},
    rt::TokioExecutor,
};
use tokio::net::TcpListener;
use tower_http::{
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};

use crate::config::ProxySettings;
use crate::http::middleware::{forwarded_scheme, redirect_www};
use crate::http::proxy::proxy_handler;
use crate::lifecycle::ShutdownSignal;
use crate::routing::LiveRouteTable;

/// Application state injected into handlers and middleware.
#[derive(Clone)]
pub struct AppState {
    pub table: LiveRouteTable,
    pub client: Client<HttpConnector, Body>,
    /// Scheme of our own listener, used when no forwarding header is present.
    pub listener_scheme: Arc<str>,
}

/// HTTP server for the reverse proxy.
pub struct HttpServer {
    router: Router,
}

impl HttpServer {
    /// Create a server that routes through `table`.
    pub fn new(settings: &ProxySettings, table: LiveRouteTable) -> Self {
        let mut connector = HttpConnector::new();
        connector.set_connect_timeout(Some(Duration::from_secs(settings.timeouts.connect_secs)));
        let client = Client::builder(TokioExecutor::new()).build(connector);

        let state = AppState {
            table,
            client,
            listener_scheme: Arc::from(settings.listener.scheme.as_str()),
        };

        let router = Self::build_router(settings, state);
        Self { router }
    }

    /// Build the Axum router with all middleware layers.
    ///
    /// The last layer added runs first.
    #[allow(deprecated)]
    fn build_router(settings: &ProxySettings, state: AppState) -> Router {
        Router::new()
            .route("/{*path}", any(proxy_handler))
            .route("/", any(proxy_handler))
            .layer(from_fn_with_state(state.clone(), redirect_www))
            .layer(from_fn_with_state(state.clone(), forwarded_scheme))
            .with_state(state)
            .layer(TimeoutLayer::new(Duration::from_secs(settings.timeouts.request_secs)))
            .layer(PropagateRequestIdLayer::x_request_id())
            .layer(TraceLayer::new_for_http())
            .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
    }

    /// The fully layered router, for serving it some other way.
    pub fn router(&self) -> Router {
        self.router.clone()
    }

    /// Run the server until `shutdown` fires, then drain in-flight requests.
    pub async fn run(self, listener: TcpListener, mut shutdown: ShutdownSignal) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "HTTP server starting");

        axum::serve(listener, self.router.into_make_service())
            .with_graceful_shutdown(async move {
                shutdown.recv().await;
                tracing::info!("HTTP server draining connections");
            })
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }
}
