use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;

use kv_route_proxy::config::{self, ProxySettings, SettingsError, SettingsOverrides, StoreBackend};
use kv_route_proxy::lifecycle::{self, Shutdown};
use kv_route_proxy::observability::{logging, metrics};

#[derive(Parser, Debug)]
#[command(name = "kv-route-proxy")]
#[command(about = "Reverse proxy with routes synced from a key-value store", long_about = None)]
struct Args {
    /// Settings file (TOML). Built-in defaults are used when omitted.
    #[arg(short, long, env = "PROXY_CONFIG")]
    config: Option<PathBuf>,

    /// Listener address, e.g. 0.0.0.0:8080
    #[arg(long, env = "PROXY_BIND_ADDRESS")]
    bind: Option<String>,

    /// Where the routing document lives: nats, file or memory
    #[arg(long, env = "PROXY_STORE_BACKEND")]
    store: Option<StoreBackend>,

    #[arg(long, env = "PROXY_NATS_URL")]
    nats_url: Option<String>,

    #[arg(long, env = "PROXY_BUCKET")]
    bucket: Option<String>,

    /// Key holding the routing document
    #[arg(long, env = "PROXY_KEY")]
    key: Option<String>,

    /// Document path for the file backend
    #[arg(long, env = "PROXY_FILE")]
    file: Option<PathBuf>,
}

impl Args {
    fn settings(&self) -> Result<ProxySettings, SettingsError> {
        let overrides = SettingsOverrides {
            bind_address: self.bind.clone(),
            store_backend: self.store,
            nats_url: self.nats_url.clone(),
            bucket: self.bucket.clone(),
            key: self.key.clone(),
            file_path: self.file.clone(),
        };
        config::resolve_settings(self.config.as_deref(), &overrides)
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let settings = args.settings().context("invalid settings")?;

    logging::init_logging(&settings.observability);

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "kv-route-proxy starting");
    tracing::info!(
        bind_address = %settings.listener.bind_address,
        backend = ?settings.store.backend,
        key = %settings.store.key,
        request_timeout_secs = settings.timeouts.request_secs,
        "Settings loaded"
    );

    if settings.observability.metrics_enabled {
        let addr: SocketAddr = settings
            .observability
            .metrics_address
            .parse()
            .context("invalid metrics address")?;
        metrics::init_metrics(addr);
    }

    let shutdown = Shutdown::new();
    let trigger = shutdown.clone();
    tokio::spawn(async move {
        lifecycle::wait_for_shutdown_signal().await;
        trigger.trigger();
    });

    lifecycle::run(&settings, &shutdown).await.context("proxy failed")?;
    Ok(())
}
