//! WebSocket bridge provider.
//!
//! Connects to a bridge process that owns the live-stream session and
//! forwards it as JSON frames (see [`relay_proto::upstream`]). The bridge is
//! asked for a room with `?uniqueId=<account>`; `connect()` completes once it
//! answers with a `connected` frame.

use async_trait::async_trait;
use futures_util::StreamExt;
use parking_lot::Mutex;
use relay_proto::{BridgeFrame, UpstreamEvent};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::oneshot;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tracing::{debug, info, warn};
use url::form_urlencoded;

use super::{ConnectInfo, UpstreamProvider, UpstreamSink};
use crate::config::UpstreamConfig;
use crate::error::UpstreamError;

type BridgeStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// A live bridge session: dropping or firing `close_tx` stops the reader.
struct BridgeSession {
    close_tx: oneshot::Sender<()>,
}

/// Upstream provider backed by a WebSocket bridge.
pub struct BridgeProvider {
    url: String,
    account: String,
    connect_timeout: Duration,
    session: Mutex<Option<BridgeSession>>,
}

impl BridgeProvider {
    pub fn new(config: &UpstreamConfig) -> Self {
        Self {
            url: config.bridge_url.clone(),
            account: config.username.trim_start_matches('@').to_string(),
            connect_timeout: config.connect_timeout(),
            session: Mutex::new(None),
        }
    }

    /// URL requesting the configured account's room.
    pub fn session_url(&self) -> String {
        let separator = if self.url.contains('?') { '&' } else { '?' };
        let account: String = form_urlencoded::byte_serialize(self.account.as_bytes()).collect();
        format!("{}{}uniqueId={}", self.url, separator, account)
    }

    fn stop_session(&self) -> bool {
        match self.session.lock().take() {
            Some(session) => {
                let _ = session.close_tx.send(());
                true
            }
            None => false,
        }
    }

    async fn open(&self) -> Result<(BridgeStream, String), UpstreamError> {
        let url = self.session_url();
        let (mut ws, _) = connect_async(url.as_str())
            .await
            .map_err(|e| UpstreamError::Connect(e.to_string()))?;
        debug!(%url, "Bridge socket open, waiting for room");
        let room_id = wait_for_room(&mut ws).await?;
        Ok((ws, room_id))
    }
}

/// Read frames until the bridge reports the joined room.
async fn wait_for_room(ws: &mut BridgeStream) -> Result<String, UpstreamError> {
    loop {
        match ws.next().await {
            Some(Ok(WsMessage::Text(text))) => match BridgeFrame::parse(&text) {
                Ok(BridgeFrame::Connected { room_id }) => return Ok(room_id.to_string()),
                Ok(BridgeFrame::Error { message }) => return Err(UpstreamError::Rejected(message)),
                Ok(BridgeFrame::Disconnected) => return Err(UpstreamError::Closed),
                Ok(_) => {}
                Err(e) => warn!(error = %e, "Ignoring malformed bridge frame"),
            },
            Some(Ok(WsMessage::Close(_))) | None => return Err(UpstreamError::Closed),
            Some(Ok(_)) => {}
            Some(Err(e)) => return Err(UpstreamError::Protocol(e.to_string())),
        }
    }
}

/// Forward session frames into the relay until closed from either side.
async fn pump(mut ws: BridgeStream, sink: UpstreamSink, mut close_rx: oneshot::Receiver<()>) {
    loop {
        tokio::select! {
            _ = &mut close_rx => {
                let _ = ws.close(None).await;
                debug!(attempt = sink.attempt().get(), "Bridge session closed locally");
                return;
            }
            msg = ws.next() => match msg {
                Some(Ok(WsMessage::Text(text))) => {
                    let event = match BridgeFrame::parse(&text) {
                        Ok(frame) => frame.into_event(),
                        Err(e) => {
                            warn!(error = %e, "Ignoring malformed bridge frame");
                            None
                        }
                    };
                    let Some(event) = event else { continue };
                    let ended = event == UpstreamEvent::Disconnected;
                    if !sink.emit(event).await || ended {
                        return;
                    }
                }
                Some(Ok(WsMessage::Close(_))) | None => {
                    info!(attempt = sink.attempt().get(), "Bridge closed the session");
                    let _ = sink.emit(UpstreamEvent::Disconnected).await;
                    return;
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    warn!(error = %e, "Bridge socket error");
                    let _ = sink.emit(UpstreamEvent::Error(e.to_string())).await;
                    let _ = sink.emit(UpstreamEvent::Disconnected).await;
                    return;
                }
            }
        }
    }
}

#[async_trait]
impl UpstreamProvider for BridgeProvider {
    async fn connect(&self, sink: UpstreamSink) -> Result<ConnectInfo, UpstreamError> {
        if self.stop_session() {
            debug!("Replacing previous bridge session");
        }

        let (ws, room_id) = timeout(self.connect_timeout, self.open())
            .await
            .map_err(|_| UpstreamError::Timeout(self.connect_timeout.as_secs()))??;

        let (close_tx, close_rx) = oneshot::channel();
        tokio::spawn(pump(ws, sink, close_rx));
        if let Some(previous) = self.session.lock().replace(BridgeSession { close_tx }) {
            let _ = previous.close_tx.send(());
        }

        Ok(ConnectInfo { room_id })
    }

    async fn disconnect(&self) {
        if self.stop_session() {
            info!(account = %self.account, "Bridge session stopped");
        }
    }
}
