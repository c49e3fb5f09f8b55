//! The relay actor.
//!
//! A single tokio task owns the subscriber registry, the lifecycle controller
//! and the timers, and applies [`RelayCommand`]s one at a time. Subscriber
//! connections, upstream sessions and timers only ever talk to it through the
//! mailbox, so every state transition is serialized without locks.
//!
//! # Architecture
//!
//! - **State Ownership**: `RelayActor` owns all relay state.
//! - **Message Passing**: [`RelayHandle`] is the only way in.
//! - **Provider Calls**: `connect()`/`disconnect()` run on a companion task in
//!   the order the controller requested them; connect outcomes come back as
//!   [`RelayCommand::ConnectFinished`].

use chrono::{DateTime, Utc};
use relay_proto::{DomainEvent, UpstreamEvent};
use serde::Serialize;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{Instrument, debug, info, warn};

use super::fanout;
use super::lifecycle::{
    Action, AttemptId, Backoff, LifecycleController, TimerKind, TimerToken, UpstreamState,
};
use super::registry::{Subscriber, SubscriberId, SubscriberRegistry};
use super::timer::Timers;
use crate::error::{RelayError, UpstreamError};
use crate::upstream::{ConnectInfo, UpstreamProvider, UpstreamSink};

const MAILBOX_CAPACITY: usize = 1024;

/// Commands processed by the relay actor.
#[derive(Debug)]
pub enum RelayCommand {
    /// Register a subscriber and send it the welcome message.
    Subscribe { subscriber: Subscriber },
    /// Remove a subscriber.
    Unsubscribe { id: SubscriberId },
    /// An event from the upstream session opened by `attempt`.
    Upstream {
        attempt: AttemptId,
        event: UpstreamEvent,
    },
    /// The provider's `connect()` for `attempt` returned.
    ConnectFinished {
        attempt: AttemptId,
        result: Result<ConnectInfo, UpstreamError>,
    },
    /// A lifecycle timer elapsed.
    TimerFired { kind: TimerKind, token: TimerToken },
    /// Snapshot the relay state.
    Status {
        reply_tx: oneshot::Sender<RelayStatus>,
    },
    /// Cancel timers, disconnect upstream, drop every subscriber and stop.
    Shutdown { reply_tx: oneshot::Sender<()> },
}

/// Point-in-time view of the relay, served at `/status`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RelayStatus {
    pub account: String,
    pub state: UpstreamState,
    pub subscribers: usize,
    pub failures: u32,
    /// Consecutive losses of established sessions.
    pub losses: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub room_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub connected_since: Option<String>,
}

/// Everything the actor needs besides its mailbox.
pub struct RelayParams {
    /// Account whose live stream is relayed, e.g. `@streamer`.
    pub account: String,
    pub backoff: Backoff,
    pub grace: Duration,
    /// Uptime after which earlier session losses stop counting towards backoff.
    pub stable: Duration,
    pub provider: Arc<dyn UpstreamProvider>,
}

enum ProviderOp {
    Connect(AttemptId),
    Disconnect,
}

/// Runs provider calls strictly in the order they were requested.
async fn drive_provider(
    provider: Arc<dyn UpstreamProvider>,
    mut ops: mpsc::UnboundedReceiver<ProviderOp>,
    mailbox: mpsc::WeakSender<RelayCommand>,
) {
    while let Some(op) = ops.recv().await {
        match op {
            ProviderOp::Connect(attempt) => {
                let Some(tx) = mailbox.upgrade() else { break };
                let sink = UpstreamSink::new(attempt, tx.clone());
                let result = provider
                    .connect(sink)
                    .instrument(crate::telemetry::spans::upstream(attempt.get()))
                    .await;
                if tx
                    .send(RelayCommand::ConnectFinished { attempt, result })
                    .await
                    .is_err()
                {
                    break;
                }
            }
            ProviderOp::Disconnect => provider.disconnect().await,
        }
    }
}

/// The relay actor.
pub struct RelayActor {
    account: String,
    registry: SubscriberRegistry,
    controller: LifecycleController,
    timers: Timers,
    provider: Arc<dyn UpstreamProvider>,
    provider_ops: mpsc::UnboundedSender<ProviderOp>,
    provider_task: JoinHandle<()>,
    connected_since: Option<DateTime<Utc>>,
}

impl RelayActor {
    /// Spawn the actor and return the handle to reach it.
    pub fn spawn(params: RelayParams) -> RelayHandle {
        let (tx, rx) = mpsc::channel(MAILBOX_CAPACITY);
        let (ops_tx, ops_rx) = mpsc::unbounded_channel();

        let provider_task = tokio::spawn(drive_provider(
            Arc::clone(&params.provider),
            ops_rx,
            tx.downgrade(),
        ));

        let span = crate::telemetry::spans::relay(&params.account);
        let actor = Self {
            controller: LifecycleController::new(params.account.clone(), params.backoff, params.grace)
                .with_stable_period(params.stable),
            account: params.account,
            registry: SubscriberRegistry::new(),
            timers: Timers::new(tx.downgrade()),
            provider: params.provider,
            provider_ops: ops_tx,
            provider_task,
            connected_since: None,
        };

        tokio::spawn(actor.run(rx).instrument(span));

        RelayHandle { tx }
    }

    /// The main actor loop.
    async fn run(mut self, mut rx: mpsc::Receiver<RelayCommand>) {
        info!("Relay started");
        while let Some(command) = rx.recv().await {
            if let RelayCommand::Shutdown { reply_tx } = command {
                self.teardown().await;
                let _ = reply_tx.send(());
                info!("Relay stopped");
                return;
            }
            self.handle_command(command);
            self.refresh_connected();
        }
        // Every handle is gone.
        self.teardown().await;
        info!("Relay stopped");
    }

    fn handle_command(&mut self, command: RelayCommand) {
        match command {
            RelayCommand::Subscribe { subscriber } => self.handle_subscribe(subscriber),
            RelayCommand::Unsubscribe { id } => {
                let remaining = self.registry.remove(&id);
                debug!(subscriber = %id, remaining, "Subscriber left");
                self.settle(VecDeque::new());
            }
            RelayCommand::Upstream { attempt, event } => self.handle_upstream(attempt, event),
            RelayCommand::ConnectFinished { attempt, result } => {
                if let Err(err) = &result {
                    crate::metrics::inc_connect_failures(err.error_code());
                }
                let actions = self.controller.on_connect_result(attempt, result);
                self.settle(actions.into());
            }
            RelayCommand::TimerFired { kind, token } => {
                let actions = self.controller.on_timer(kind, token);
                self.settle(actions.into());
            }
            RelayCommand::Status { reply_tx } => {
                let _ = reply_tx.send(self.status());
            }
            RelayCommand::Shutdown { .. } => {}
        }
    }

    fn handle_subscribe(&mut self, subscriber: Subscriber) {
        let id = subscriber.id();
        let count = self.registry.add(subscriber);
        info!(subscriber = %id, subscribers = count, "Subscriber joined");

        let handle = self.account.trim_start_matches('@');
        let welcome = DomainEvent::info(format!("Connected to TikTok Relay (@{handle})"));
        if fanout::send_to(&mut self.registry, &id, &welcome)
            && let Some(room_id) = self.controller.room_id()
        {
            let live = DomainEvent::info(format!(
                "Connected to TikTok roomId {room_id} (@{handle})"
            ));
            fanout::send_to(&mut self.registry, &id, &live);
        }

        self.settle(VecDeque::new());
    }

    fn handle_upstream(&mut self, attempt: AttemptId, event: UpstreamEvent) {
        let actions = match event {
            UpstreamEvent::Chat(chat) => self.relay_event(attempt, chat.into()),
            UpstreamEvent::Gift(gift) => self.relay_event(attempt, gift.into()),
            UpstreamEvent::Disconnected => self.controller.on_disconnected(attempt),
            UpstreamEvent::Error(message) => self.controller.on_error(attempt, &message),
        };
        self.settle(actions.into());
    }

    fn relay_event(&mut self, attempt: AttemptId, event: DomainEvent) -> Vec<Action> {
        if !self.controller.accepts_events_from(attempt) {
            debug!(attempt = attempt.get(), kind = event.kind(), "Dropping event from stale session");
            return Vec::new();
        }
        vec![Action::Broadcast(event)]
    }

    /// Carry out `actions` and feed every demand change they cause back into
    /// the controller until nothing is left to do.
    fn settle(&mut self, mut actions: VecDeque<Action>) {
        loop {
            while let Some(action) = actions.pop_front() {
                self.execute(action);
            }
            match self.registry.take_demand_change() {
                Some(change) => actions.extend(self.controller.on_demand(change.count)),
                None => break,
            }
        }
    }

    fn execute(&mut self, action: Action) {
        match action {
            Action::Connect(attempt) => {
                info!(attempt = attempt.get(), "Connecting upstream");
                self.request(ProviderOp::Connect(attempt));
            }
            Action::Disconnect => {
                info!("Disconnecting upstream");
                self.request(ProviderOp::Disconnect);
            }
            Action::ScheduleTimer { kind, token, delay } => {
                self.timers.schedule(kind, token, delay);
            }
            Action::CancelTimer(kind) => {
                self.timers.cancel(kind);
            }
            Action::Broadcast(event) => {
                fanout::broadcast(&mut self.registry, &event);
            }
        }
    }

    fn request(&self, op: ProviderOp) {
        if self.provider_ops.send(op).is_err() {
            warn!("Provider task is gone, dropping upstream request");
        }
    }

    fn refresh_connected(&mut self) {
        let connected = self.controller.is_connected();
        match (connected, self.connected_since) {
            (true, None) => self.connected_since = Some(Utc::now()),
            (false, Some(_)) => self.connected_since = None,
            _ => return,
        }
        crate::metrics::set_upstream_connected(connected);
    }

    fn status(&self) -> RelayStatus {
        RelayStatus {
            account: self.account.clone(),
            state: self.controller.state(),
            subscribers: self.registry.count(),
            failures: self.controller.retry().failures,
            losses: self.controller.losses(),
            room_id: self.controller.room_id().map(str::to_string),
            connected_since: self.connected_since.map(|t| t.to_rfc3339()),
        }
    }

    async fn teardown(&mut self) {
        let needs_disconnect = self
            .controller
            .shutdown()
            .iter()
            .any(|a| matches!(a, Action::Disconnect));
        self.timers.cancel_all();
        self.registry.clear();
        let _ = self.registry.take_demand_change();

        // An in-flight connect is abandoned rather than awaited.
        self.provider_task.abort();
        if needs_disconnect {
            self.provider.disconnect().await;
        }
        self.refresh_connected();
    }
}

/// Cloneable handle to the relay actor.
#[derive(Debug, Clone)]
pub struct RelayHandle {
    tx: mpsc::Sender<RelayCommand>,
}

impl RelayHandle {
    pub async fn subscribe(&self, subscriber: Subscriber) -> Result<(), RelayError> {
        self.send(RelayCommand::Subscribe { subscriber }).await
    }

    pub async fn unsubscribe(&self, id: SubscriberId) -> Result<(), RelayError> {
        self.send(RelayCommand::Unsubscribe { id }).await
    }

    pub async fn status(&self) -> Result<RelayStatus, RelayError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.send(RelayCommand::Status { reply_tx }).await?;
        reply_rx.await.map_err(|_| RelayError::ActorGone)
    }

    /// Stop the relay and wait until it has released the upstream.
    pub async fn shutdown(&self) -> Result<(), RelayError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.send(RelayCommand::Shutdown { reply_tx }).await?;
        reply_rx.await.map_err(|_| RelayError::ActorGone)
    }

    async fn send(&self, command: RelayCommand) -> Result<(), RelayError> {
        self.tx.send(command).await.map_err(|_| RelayError::ActorGone)
    }
}
