//! Shared utilities for integration tests.

#![allow(dead_code)]

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

use kv_route_proxy::config::ProxySettings;
use kv_route_proxy::document::{encode_document, ConfigurationDocument};
use kv_route_proxy::store::{ConfigStore, MemoryStore};

pub const KEY: &str = "route-config";

/// Start a mock backend that echoes the Host header and path it received.
///
/// The body is `<name> host=<host> path=<path-and-query>`.
pub async fn start_echo_backend(name: &'static str) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        loop {
            match listener.accept().await {
                Ok((mut socket, _)) => {
                    tokio::spawn(async move {
                        let mut head = Vec::new();
                        let mut buf = [0u8; 1024];
                        while !head.windows(4).any(|w| w == b"\r\n\r\n") {
                            match socket.read(&mut buf).await {
                                Ok(0) | Err(_) => return,
                                Ok(n) => head.extend_from_slice(&buf[..n]),
                            }
                        }

                        let head = String::from_utf8_lossy(&head);
                        let mut lines = head.lines();
                        let path = lines
                            .next()
                            .and_then(|l| l.split_whitespace().nth(1))
                            .unwrap_or("")
                            .to_string();
                        let host = lines
                            .find_map(|l| {
                                let (name, value) = l.split_once(':')?;
                                name.eq_ignore_ascii_case("host").then(|| value.trim().to_string())
                            })
                            .unwrap_or_default();

                        let body = format!("{name} host={host} path={path}");
                        let response = format!(
                            "HTTP/1.1 200 OK\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                            body.len(),
                            body
                        );
                        let _ = socket.write_all(response.as_bytes()).await;
                        let _ = socket.shutdown().await;
                    });
                }
                Err(_) => break,
            }
        }
    });

    addr
}

/// Settings for an in-process proxy on an ephemeral port.
pub fn test_settings() -> ProxySettings {
    let mut settings = ProxySettings::default();
    settings.listener.bind_address = "127.0.0.1:0".to_string();
    settings.store.key = KEY.to_string();
    settings.sync.watch_backoff_base_ms = 10;
    settings.sync.watch_backoff_max_ms = 50;
    settings
}

/// Write `document` to the store under [`KEY`].
pub async fn put_document(store: &Arc<MemoryStore>, document: &ConfigurationDocument) {
    let payload = encode_document(document).unwrap();
    store.put(KEY, Bytes::from(payload)).await.unwrap();
}

/// Poll `check` until it returns true, failing the test after `timeout`.
pub async fn eventually<F, Fut>(timeout: Duration, mut check: F)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        if check().await {
            return;
        }
        assert!(tokio::time::Instant::now() < deadline, "condition not met within {timeout:?}");
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

/// HTTP client that reports redirects instead of following them.
pub fn client() -> reqwest::Client {
    reqwest::Client::builder()
        .redirect(reqwest::redirect::Policy::none())
        .build()
        .unwrap()
}
