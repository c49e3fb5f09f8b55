//! Test WebSocket client.
//!
//! Connects to a relay like an overlay page would and decodes the JSON frames
//! it receives.

use futures_util::{SinkExt, StreamExt};
use serde_json::Value;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};

/// A test subscriber.
pub struct TestClient {
    ws: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

#[allow(dead_code)]
impl TestClient {
    /// Connect to a relay listener.
    pub async fn connect(addr: SocketAddr) -> anyhow::Result<Self> {
        let (ws, _) = connect_async(format!("ws://{addr}")).await?;
        Ok(Self { ws })
    }

    /// Connect with an `Origin` header.
    pub async fn connect_with_origin(addr: SocketAddr, origin: &str) -> anyhow::Result<Self> {
        let mut request = format!("ws://{addr}").into_client_request()?;
        request
            .headers_mut()
            .insert(http::header::ORIGIN, origin.parse()?);
        let (ws, _) = connect_async(request).await?;
        Ok(Self { ws })
    }

    /// Send a raw text frame.
    pub async fn send_text(&mut self, text: &str) -> anyhow::Result<()> {
        self.ws.send(WsMessage::Text(text.to_string())).await?;
        Ok(())
    }

    pub async fn ping(&mut self) -> anyhow::Result<()> {
        self.send_text(r#"{"type":"ping"}"#).await
    }

    /// Receive the next JSON frame.
    pub async fn recv(&mut self) -> anyhow::Result<Value> {
        self.recv_timeout(Duration::from_secs(5)).await
    }

    /// Receive the next JSON frame, failing after `dur`.
    pub async fn recv_timeout(&mut self, dur: Duration) -> anyhow::Result<Value> {
        loop {
            match timeout(dur, self.ws.next()).await? {
                Some(Ok(WsMessage::Text(text))) => return Ok(serde_json::from_str(&text)?),
                Some(Ok(WsMessage::Close(_))) | None => anyhow::bail!("connection closed"),
                Some(Ok(_)) => continue,
                Some(Err(e)) => return Err(e.into()),
            }
        }
    }

    /// Receive frames until one of type `kind` arrives.
    pub async fn recv_type(&mut self, kind: &str) -> anyhow::Result<Value> {
        loop {
            let frame = self.recv().await?;
            if frame["type"] == kind {
                return Ok(frame);
            }
        }
    }

    /// Receive the next info frame's message text.
    pub async fn recv_info(&mut self) -> anyhow::Result<String> {
        let frame = self.recv_type("info").await?;
        Ok(frame["message"].as_str().unwrap_or_default().to_string())
    }

    /// Whether the relay closes the socket within `dur`.
    pub async fn expect_closed(&mut self, dur: Duration) -> bool {
        loop {
            match timeout(dur, self.ws.next()).await {
                Ok(Some(Ok(WsMessage::Close(_)))) | Ok(None) | Ok(Some(Err(_))) => return true,
                Ok(Some(Ok(_))) => continue,
                Err(_) => return false,
            }
        }
    }

    pub async fn close(mut self) -> anyhow::Result<()> {
        self.ws.close(None).await?;
        Ok(())
    }
}
