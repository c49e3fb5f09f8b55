//! Test server management.
//!
//! Runs an in-process relay on ephemeral ports, backed by a
//! [`ScriptedProvider`](super::ScriptedProvider).

use std::net::SocketAddr;
use std::sync::Arc;
use tiktok_relay::config::Config;
use tiktok_relay::server::RelayServer;
use tiktok_relay::state::RelayHandle;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

use super::ScriptedProvider;

/// A test relay instance.
pub struct TestServer {
    server: RelayServer,
    pub provider: Arc<ScriptedProvider>,
}

#[allow(dead_code)]
impl TestServer {
    /// Default test configuration: loopback, ephemeral ports, HTTP enabled.
    pub fn config() -> Config {
        let mut config = Config::default();
        config.upstream.username = "@teststreamer".into();
        config.listen.address = "127.0.0.1:0".parse().expect("loopback address");
        config.http.address = Some("127.0.0.1:0".parse().expect("loopback address"));
        config
    }

    /// Spawn a relay with the default test configuration.
    pub async fn spawn(provider: ScriptedProvider) -> anyhow::Result<Self> {
        Self::spawn_with(Self::config(), provider).await
    }

    pub async fn spawn_with(config: Config, provider: ScriptedProvider) -> anyhow::Result<Self> {
        let provider = Arc::new(provider);
        let server = RelayServer::start(&config, provider.clone()).await?;
        Ok(Self { server, provider })
    }

    pub fn addr(&self) -> SocketAddr {
        self.server.local_addr()
    }

    /// Plain HTTP/1.1 GET against the side-channel; returns status and body.
    pub async fn http_get(&self, path: &str) -> anyhow::Result<(u16, String)> {
        let addr = self
            .server
            .http_addr()
            .ok_or_else(|| anyhow::anyhow!("HTTP disabled"))?;
        let mut stream = TcpStream::connect(addr).await?;
        let request =
            format!("GET {path} HTTP/1.1\r\nHost: {addr}\r\nConnection: close\r\n\r\n");
        stream.write_all(request.as_bytes()).await?;

        let mut raw = String::new();
        stream.read_to_string(&mut raw).await?;
        let (head, body) = raw
            .split_once("\r\n\r\n")
            .ok_or_else(|| anyhow::anyhow!("malformed HTTP response"))?;
        let status = head
            .split_whitespace()
            .nth(1)
            .and_then(|s| s.parse().ok())
            .ok_or_else(|| anyhow::anyhow!("missing status line"))?;
        Ok((status, body.to_string()))
    }

    pub fn handle(&self) -> RelayHandle {
        self.server.handle()
    }

    pub async fn shutdown(self) {
        self.server.shutdown().await;
    }
}
