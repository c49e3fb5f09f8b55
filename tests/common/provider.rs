//! Scripted upstream provider.
//!
//! Connect outcomes are queued up front; every call is timestamped on the
//! tokio clock so tests running with a paused clock can assert exact delays.
//! The sink of the latest session is kept for injecting events.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::VecDeque;
use tiktok_relay::error::UpstreamError;
use tiktok_relay::proto::UpstreamEvent;
use tiktok_relay::upstream::{ConnectInfo, UpstreamProvider, UpstreamSink};
use tokio::sync::watch;
use tokio::time::Instant;

pub struct ScriptedProvider {
    outcomes: Mutex<VecDeque<Result<ConnectInfo, UpstreamError>>>,
    connects: Mutex<Vec<Instant>>,
    disconnects: Mutex<Vec<Instant>>,
    sink: Mutex<Option<UpstreamSink>>,
    connect_count: watch::Sender<usize>,
    disconnect_count: watch::Sender<usize>,
}

#[allow(dead_code)]
impl ScriptedProvider {
    pub fn new() -> Self {
        Self {
            outcomes: Mutex::new(VecDeque::new()),
            connects: Mutex::new(Vec::new()),
            disconnects: Mutex::new(Vec::new()),
            sink: Mutex::new(None),
            connect_count: watch::channel(0).0,
            disconnect_count: watch::channel(0).0,
        }
    }

    /// Queue a successful connect to `room_id`.
    pub fn succeed(&self, room_id: &str) -> &Self {
        self.outcomes.lock().push_back(Ok(ConnectInfo {
            room_id: room_id.to_string(),
        }));
        self
    }

    /// Queue a failed connect.
    pub fn fail(&self, reason: &str) -> &Self {
        self.outcomes
            .lock()
            .push_back(Err(UpstreamError::Connect(reason.to_string())));
        self
    }

    pub fn connects(&self) -> Vec<Instant> {
        self.connects.lock().clone()
    }

    pub fn disconnects(&self) -> Vec<Instant> {
        self.disconnects.lock().clone()
    }

    /// Wait until `connect()` has been called at least `n` times.
    pub async fn wait_for_connects(&self, n: usize) {
        let mut rx = self.connect_count.subscribe();
        let _ = rx.wait_for(|count| *count >= n).await;
    }

    /// Wait until `disconnect()` has been called at least `n` times.
    pub async fn wait_for_disconnects(&self, n: usize) {
        let mut rx = self.disconnect_count.subscribe();
        let _ = rx.wait_for(|count| *count >= n).await;
    }

    /// Push an event into the latest session.
    pub async fn emit(&self, event: UpstreamEvent) {
        let sink = self.sink.lock().clone();
        if let Some(sink) = sink {
            sink.emit(event).await;
        }
    }
}

#[async_trait]
impl UpstreamProvider for ScriptedProvider {
    async fn connect(&self, sink: UpstreamSink) -> Result<ConnectInfo, UpstreamError> {
        self.connects.lock().push(Instant::now());
        *self.sink.lock() = Some(sink);
        let outcome = self
            .outcomes
            .lock()
            .pop_front()
            .unwrap_or_else(|| Err(UpstreamError::Connect("nothing scripted".into())));
        self.connect_count.send_modify(|n| *n += 1);
        outcome
    }

    async fn disconnect(&self) {
        self.disconnects.lock().push(Instant::now());
        self.disconnect_count.send_modify(|n| *n += 1);
    }
}
