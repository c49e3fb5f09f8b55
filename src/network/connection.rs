//! Connection - one subscriber socket.
//!
//! ```text
//!   relay actor ──Arc<str>──▶ [outbound queue] ──▶ writer task ──▶ socket
//!                                   ▲
//!   socket ──▶ reader loop ── pong ─┘
//! ```
//!
//! The relay holds the only strong sender to the outbound queue. When it
//! drops the subscriber (shutdown, or a full queue) the writer sends a close
//! frame and the reader loop ends.

use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use relay_proto::{ClientMessage, ServerMessage};
use std::sync::Arc;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::WebSocketStream;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tracing::{debug, info, warn};

use crate::state::{RelayHandle, Subscriber, SubscriberId};

type WsSink = SplitSink<WebSocketStream<TcpStream>, WsMessage>;

/// A subscriber connection handler.
pub struct Connection {
    id: SubscriberId,
    ws: WebSocketStream<TcpStream>,
    relay: RelayHandle,
    send_queue: usize,
}

impl Connection {
    pub fn new(
        id: SubscriberId,
        ws: WebSocketStream<TcpStream>,
        relay: RelayHandle,
        send_queue: usize,
    ) -> Self {
        Self {
            id,
            ws,
            relay,
            send_queue,
        }
    }

    /// Register with the relay and pump frames until either side goes away.
    pub async fn run(self) {
        let Self {
            id,
            ws,
            relay,
            send_queue,
        } = self;

        let (tx, rx) = mpsc::channel(send_queue.max(1));
        let replies = tx.downgrade();
        let (sink, mut stream) = ws.split();
        let mut writer = tokio::spawn(write_loop(sink, rx));

        if relay.subscribe(Subscriber::new(id, tx)).await.is_err() {
            warn!("Relay is gone, closing subscriber");
            writer.abort();
            return;
        }
        info!("Subscriber connected");

        loop {
            tokio::select! {
                _ = &mut writer => {
                    debug!("Outbound queue closed");
                    break;
                }
                msg = stream.next() => match msg {
                    Some(Ok(WsMessage::Text(text))) => {
                        if let Some(ClientMessage::Ping) = ClientMessage::parse(&text) {
                            reply_pong(&replies);
                        }
                    }
                    Some(Ok(WsMessage::Close(_))) | None => break,
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        debug!(error = %e, "Subscriber socket error");
                        break;
                    }
                }
            }
        }

        let _ = relay.unsubscribe(id).await;
        writer.abort();
        info!("Subscriber disconnected");
    }
}

/// Queue a pong behind whatever the relay already queued.
fn reply_pong(replies: &mpsc::WeakSender<Arc<str>>) {
    let Some(tx) = replies.upgrade() else { return };
    match ServerMessage::Pong.to_json() {
        Ok(json) => {
            if tx.try_send(Arc::from(json)).is_err() {
                debug!("Outbound queue unavailable, pong dropped");
            }
        }
        Err(e) => warn!(error = %e, "Failed to serialize pong"),
    }
}

/// Drain the outbound queue into the socket; close it once the queue ends.
async fn write_loop(mut sink: WsSink, mut rx: mpsc::Receiver<Arc<str>>) {
    while let Some(frame) = rx.recv().await {
        if let Err(e) = sink.send(WsMessage::Text(frame.to_string())).await {
            debug!(error = %e, "Subscriber write failed");
            return;
        }
    }
    let _ = sink.send(WsMessage::Close(None)).await;
}
