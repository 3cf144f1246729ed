//! Shared utilities for integration tests.

use std::net::SocketAddr;
use std::time::Duration;

use status_remap::config::ServerConfig;
use status_remap::{HttpServer, Shutdown, SharedMapping};
use tokio::net::TcpListener;
use tokio::sync::mpsc;

/// A server running on an ephemeral port.
pub struct TestServer {
    pub addr: SocketAddr,
    pub mapping: SharedMapping,
    pub config_updates: mpsc::UnboundedSender<ServerConfig>,
    pub shutdown: Shutdown,
}

impl TestServer {
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.shutdown.trigger();
    }
}

/// Start a server with the given config and `FROM=TO` overrides.
pub async fn start_server(config: ServerConfig, overrides: &[(&str, &str)]) -> TestServer {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let overrides = overrides
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    let server = HttpServer::with_overrides(config, overrides);
    let mapping = server.mapping().clone();

    let (config_updates, updates_rx) = mpsc::unbounded_channel();
    let shutdown = Shutdown::new();
    let signal = shutdown.subscribe();
    tokio::spawn(async move {
        let _ = server.run(listener, updates_rx, signal).await;
    });

    TestServer {
        addr,
        mapping,
        config_updates,
        shutdown,
    }
}

/// HTTP client that neither pools nor follows redirects.
pub fn client() -> reqwest::Client {
    reqwest::Client::builder()
        .pool_max_idle_per_host(0)
        .redirect(reqwest::redirect::Policy::none())
        .timeout(Duration::from_secs(5))
        .no_proxy()
        .build()
        .unwrap()
}
