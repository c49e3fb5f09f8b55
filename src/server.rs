//! Relay server composition.
//!
//! Wires the relay actor, the subscriber gateway and the optional HTTP
//! endpoints together, and owns the shutdown signal they share.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::config::{Config, ListenConfig};
use crate::error::RelayError;
use crate::network::Gateway;
use crate::state::{Backoff, RelayActor, RelayHandle, RelayParams};
use crate::upstream::UpstreamProvider;

/// A running relay.
pub struct RelayServer {
    relay: RelayHandle,
    local_addr: SocketAddr,
    http_addr: Option<SocketAddr>,
    shutdown_tx: broadcast::Sender<()>,
    tasks: Vec<JoinHandle<()>>,
}

impl RelayServer {
    /// Spawn the relay actor, bind the listeners and start serving.
    pub async fn start(
        config: &Config,
        provider: Arc<dyn UpstreamProvider>,
    ) -> Result<Self, RelayError> {
        let relay = RelayActor::spawn(RelayParams {
            account: config.upstream.username.clone(),
            backoff: Backoff::new(config.lifecycle.retry_base(), config.lifecycle.retry_max()),
            grace: config.lifecycle.shutdown_grace(),
            stable: config.lifecycle.stable_period(),
            provider,
        });

        match Self::bind(config, relay.clone()).await {
            Ok(server) => Ok(server),
            Err(e) => {
                let _ = relay.shutdown().await;
                Err(e)
            }
        }
    }

    async fn bind(config: &Config, relay: RelayHandle) -> Result<Self, RelayError> {
        let gateway = Gateway::bind(config.listen.clone(), relay.clone()).await?;
        let local_addr = gateway.local_addr().map_err(|source| RelayError::Bind {
            addr: config.listen.address,
            source,
        })?;

        let (shutdown_tx, _) = broadcast::channel(4);
        let mut tasks = Vec::new();

        let http_addr = match config.http.address {
            Some(addr) => {
                let listener = TcpListener::bind(addr)
                    .await
                    .map_err(|source| RelayError::Bind { addr, source })?;
                let bound = listener
                    .local_addr()
                    .map_err(|source| RelayError::Bind { addr, source })?;
                let listen = ListenConfig {
                    address: local_addr,
                    ..config.listen.clone()
                };
                let app = crate::http::router(config.http.backend_url(&listen), relay.clone());
                tasks.push(tokio::spawn(crate::http::run_http_server(
                    listener,
                    app,
                    shutdown_tx.subscribe(),
                )));
                Some(bound)
            }
            None => None,
        };

        tasks.push(tokio::spawn(gateway.run(shutdown_tx.subscribe())));

        info!(
            address = %local_addr,
            account = %config.upstream.username,
            "Relay listening"
        );

        Ok(Self {
            relay,
            local_addr,
            http_addr,
            shutdown_tx,
            tasks,
        })
    }

    /// Address of the subscriber listener.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Address of the HTTP endpoints, when enabled.
    pub fn http_addr(&self) -> Option<SocketAddr> {
        self.http_addr
    }

    pub fn handle(&self) -> RelayHandle {
        self.relay.clone()
    }

    /// Serve until `signal` resolves, then shut down.
    pub async fn run_until<F>(self, signal: F)
    where
        F: Future<Output = ()>,
    {
        signal.await;
        info!("Shutdown requested");
        self.shutdown().await;
    }

    /// Stop accepting, release the upstream and close every subscriber.
    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(());
        if let Err(e) = self.relay.shutdown().await {
            warn!(error = %e, "Relay already stopped");
        }
        for task in self.tasks {
            let _ = task.await;
        }
        info!("Relay server stopped");
    }
}
