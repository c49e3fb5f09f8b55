//! Gateway - accepts subscriber sockets and spawns a [`Connection`] for each.

use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::broadcast;
use tokio_tungstenite::accept_hdr_async;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tracing::{Instrument, debug, error, info, warn};

use super::Connection;
use crate::config::ListenConfig;
use crate::error::RelayError;
use crate::state::{RelayHandle, SubscriberId};

/// The Gateway accepts incoming WebSocket connections from subscribers.
pub struct Gateway {
    listener: TcpListener,
    config: Arc<ListenConfig>,
    relay: RelayHandle,
}

impl Gateway {
    /// Bind the gateway to `config.address`.
    pub async fn bind(config: ListenConfig, relay: RelayHandle) -> Result<Self, RelayError> {
        let listener = TcpListener::bind(config.address)
            .await
            .map_err(|source| RelayError::Bind {
                addr: config.address,
                source,
            })?;
        info!(address = %config.address, "Subscriber listener bound");
        Ok(Self {
            listener,
            config: Arc::new(config),
            relay,
        })
    }

    /// Address actually bound (useful when binding port 0).
    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Accept connections until `shutdown` fires.
    pub async fn run(self, mut shutdown: broadcast::Receiver<()>) {
        loop {
            tokio::select! {
                _ = shutdown.recv() => {
                    info!("Gateway stopped accepting subscribers");
                    return;
                }
                accepted = self.listener.accept() => match accepted {
                    Ok((stream, addr)) => {
                        debug!(%addr, "Subscriber connection attempt");
                        let config = Arc::clone(&self.config);
                        let relay = self.relay.clone();
                        tokio::spawn(handle_socket(stream, addr, config, relay));
                    }
                    Err(e) => {
                        error!(error = %e, "Failed to accept subscriber connection");
                    }
                }
            }
        }
    }
}

/// Upgrade one socket and run it as a subscriber connection.
async fn handle_socket(
    stream: TcpStream,
    addr: SocketAddr,
    config: Arc<ListenConfig>,
    relay: RelayHandle,
) {
    // Origin allow-list check during the handshake.
    let origin_check = |req: &Request, response: Response| -> Result<Response, ErrorResponse> {
        let origin = req
            .headers()
            .get(http::header::ORIGIN)
            .and_then(|o| o.to_str().ok());
        if config.origin_allowed(origin) {
            return Ok(response);
        }
        warn!(%addr, origin = origin.unwrap_or("-"), "WebSocket origin rejected");
        let mut rejection = ErrorResponse::new(Some("Origin not allowed".to_string()));
        *rejection.status_mut() = http::StatusCode::FORBIDDEN;
        Err(rejection)
    };

    let ws = match accept_hdr_async(stream, origin_check).await {
        Ok(ws) => ws,
        Err(e) => {
            warn!(%addr, error = %e, "WebSocket handshake failed");
            return;
        }
    };

    let id = SubscriberId::new();
    let span = crate::telemetry::spans::connection(&id.to_string(), &addr.to_string());
    Connection::new(id, ws, relay, config.send_queue)
        .run()
        .instrument(span)
        .await;
}
