//! Upstream connection providers.
//!
//! The relay depends on a narrow capability set: `connect()`, `disconnect()`
//! and a stream of [`UpstreamEvent`]s. Providers push events through the
//! [`UpstreamSink`] handed to `connect()`; the sink tags them with the
//! attempt that opened the session so the relay can discard events from a
//! session it has already abandoned.

mod bridge;

pub use bridge::BridgeProvider;

use async_trait::async_trait;
use relay_proto::UpstreamEvent;
use tokio::sync::mpsc;

use crate::error::UpstreamError;
use crate::state::{AttemptId, RelayCommand};

/// Result of a successful connect.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectInfo {
    pub room_id: String,
}

/// Source of live-stream events.
#[async_trait]
pub trait UpstreamProvider: Send + Sync + 'static {
    /// Open the upstream session. Events for this session go to `sink`.
    async fn connect(&self, sink: UpstreamSink) -> Result<ConnectInfo, UpstreamError>;

    /// Close the current session, if any. Must not report `Disconnected`.
    async fn disconnect(&self);
}

/// Event channel from a provider session into the relay.
#[derive(Debug, Clone)]
pub struct UpstreamSink {
    attempt: AttemptId,
    mailbox: mpsc::Sender<RelayCommand>,
}

impl UpstreamSink {
    pub(crate) fn new(attempt: AttemptId, mailbox: mpsc::Sender<RelayCommand>) -> Self {
        Self { attempt, mailbox }
    }

    pub fn attempt(&self) -> AttemptId {
        self.attempt
    }

    /// Deliver an event. Returns `false` once the relay has stopped.
    pub async fn emit(&self, event: UpstreamEvent) -> bool {
        self.mailbox
            .send(RelayCommand::Upstream {
                attempt: self.attempt,
                event,
            })
            .await
            .is_ok()
    }
}
