//! Upstream connection lifecycle controller.
//!
//! Decides when the single upstream connection is opened, retried and closed,
//! based on downstream demand. The controller performs no I/O: every input
//! returns the [`Action`]s the owner must carry out.
//!
//! ## State Machine
//!
//! ```text
//!            demand ≥ 1                 connect ok
//!  ┌──────┐ ───────────► ┌────────────┐ ──────────► ┌───────────┐
//!  │ Idle │              │ Connecting │             │ Connected │
//!  └──────┘ ◄─────┐      └────────────┘ ◄─────┐     └─────┬─────┘
//!     ▲           │         │   ▲  loss,      └───────────┘
//!     │           │ connect │   │  demand ≥ 1
//!     │           │ failed  ▼   │ retry timer, demand ≥ 1
//!     │           │      ┌────────────────┐
//!     │           └──────┤ RetryScheduled │ (retry timer, demand = 0)
//!     │                  └────────────────┘
//!     │  grace timer, demand = 0
//!  ┌──┴────────────────┐  demand = 0 from any active state
//!  │ ShutdownScheduled │ ◄──────────────────────────────
//!  └───────────────────┘  demand ≥ 1 resumes the previous state
//! ```
//!
//! Retry delays grow as `base * 2^(failures - 1)` capped at `max`; a
//! successful connect resets the failure count. The first loss of a session
//! reconnects at once, further consecutive losses wait on the same schedule.
//! The loss count clears once a session has stayed up for the stable period.
//! Timer firings and connect results carry tokens so that superseded ones are
//! ignored.

use relay_proto::DomainEvent;
use serde::Serialize;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::error::UpstreamError;
use crate::upstream::ConnectInfo;

/// Identifies one `connect()` invocation and the session it opens.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AttemptId(u64);

impl AttemptId {
    pub fn new(raw: u64) -> Self {
        Self(raw)
    }

    pub fn get(self) -> u64 {
        self.0
    }
}

/// Generation number of a scheduled timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimerToken(u64);

impl TimerToken {
    pub fn new(raw: u64) -> Self {
        Self(raw)
    }

    pub fn get(self) -> u64 {
        self.0
    }
}

/// Timers the controller schedules.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimerKind {
    Retry,
    ShutdownGrace,
    /// Marks a session as stable enough to forget earlier losses.
    Stable,
}

/// Default uptime after which a session's earlier losses are forgotten.
pub const DEFAULT_STABLE_PERIOD: Duration = Duration::from_secs(60);

/// Externally observable upstream state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum UpstreamState {
    /// No demand, not connected.
    Idle,
    /// A connect attempt is in flight.
    Connecting,
    /// Receiving events.
    Connected,
    /// The last connect failed; a retry timer is pending.
    RetryScheduled,
    /// Demand dropped to zero; the grace timer is pending.
    ShutdownScheduled,
}

/// Consecutive connect failures and the pending retry timer, if any.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RetryState {
    pub failures: u32,
    pub scheduled: Option<TimerToken>,
}

/// Side effects requested by the controller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    /// Invoke the provider's `connect()` for this attempt.
    Connect(AttemptId),
    /// Invoke the provider's `disconnect()`.
    Disconnect,
    /// Arm a timer; it must report back with `kind` and `token`.
    ScheduleTimer {
        kind: TimerKind,
        token: TimerToken,
        delay: Duration,
    },
    /// Cancel the pending timer of this kind.
    CancelTimer(TimerKind),
    /// Send an event to every subscriber.
    Broadcast(DomainEvent),
}

/// Exponential backoff schedule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Backoff {
    pub base: Duration,
    pub max: Duration,
}

impl Backoff {
    pub fn new(base: Duration, max: Duration) -> Self {
        Self { base, max }
    }

    /// Delay before the retry that follows the `failures`-th consecutive failure.
    pub fn delay_for(&self, failures: u32) -> Duration {
        let exponent = failures.saturating_sub(1).min(31);
        self.base
            .checked_mul(1u32 << exponent)
            .map_or(self.max, |d| d.min(self.max))
    }
}

impl Default for Backoff {
    fn default() -> Self {
        Self::new(Duration::from_secs(10), Duration::from_secs(300))
    }
}

/// Where the connection itself stands, independent of a pending shutdown.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Phase {
    Idle,
    Connecting {
        attempt: AttemptId,
        lost_early: bool,
    },
    Connected {
        attempt: AttemptId,
        room_id: String,
    },
    RetryScheduled,
}

/// The upstream lifecycle state machine.
#[derive(Debug)]
pub struct LifecycleController {
    account: String,
    backoff: Backoff,
    grace: Duration,
    stable: Duration,
    phase: Phase,
    retry: RetryState,
    losses: u32,
    stable_timer: Option<TimerToken>,
    shutdown: Option<TimerToken>,
    demand: usize,
    next_attempt: u64,
    next_token: u64,
}

impl LifecycleController {
    /// `account` is only used to phrase status messages.
    pub fn new(account: impl Into<String>, backoff: Backoff, grace: Duration) -> Self {
        Self {
            account: account.into(),
            backoff,
            grace,
            stable: DEFAULT_STABLE_PERIOD,
            phase: Phase::Idle,
            retry: RetryState::default(),
            losses: 0,
            stable_timer: None,
            shutdown: None,
            demand: 0,
            next_attempt: 0,
            next_token: 0,
        }
    }

    /// Uptime after which a session counts as stable.
    pub fn with_stable_period(mut self, stable: Duration) -> Self {
        self.stable = stable;
        self
    }

    pub fn state(&self) -> UpstreamState {
        if self.shutdown.is_some() {
            return UpstreamState::ShutdownScheduled;
        }
        match self.phase {
            Phase::Idle => UpstreamState::Idle,
            Phase::Connecting { .. } => UpstreamState::Connecting,
            Phase::Connected { .. } => UpstreamState::Connected,
            Phase::RetryScheduled => UpstreamState::RetryScheduled,
        }
    }

    pub fn retry(&self) -> RetryState {
        self.retry
    }

    /// Consecutive losses of established sessions.
    pub fn losses(&self) -> u32 {
        self.losses
    }

    /// Room of the live session, if connected (a pending shutdown included).
    pub fn room_id(&self) -> Option<&str> {
        match &self.phase {
            Phase::Connected { room_id, .. } => Some(room_id),
            _ => None,
        }
    }

    pub fn is_connected(&self) -> bool {
        matches!(self.phase, Phase::Connected { .. })
    }

    /// Whether upstream events tagged with `attempt` belong to the current session.
    pub fn accepts_events_from(&self, attempt: AttemptId) -> bool {
        match self.phase {
            Phase::Connecting { attempt: a, .. } | Phase::Connected { attempt: a, .. } => {
                a == attempt
            }
            _ => false,
        }
    }

    /// Demand-change signal: the subscriber count after a transition.
    pub fn on_demand(&mut self, count: usize) -> Vec<Action> {
        self.demand = count;
        let mut actions = Vec::new();

        if count > 0 {
            if self.shutdown.take().is_some() {
                info!(subscribers = count, "Demand returned, shutdown grace cancelled");
                actions.push(Action::CancelTimer(TimerKind::ShutdownGrace));
            }
            if self.phase == Phase::Idle {
                self.retry = RetryState::default();
                self.losses = 0;
                self.begin_connect(&mut actions);
            }
        } else if self.phase != Phase::Idle && self.shutdown.is_none() {
            let token = self.mint_token();
            self.shutdown = Some(token);
            info!(
                grace_secs = self.grace.as_secs(),
                "No subscribers left, scheduling upstream shutdown"
            );
            actions.push(Action::ScheduleTimer {
                kind: TimerKind::ShutdownGrace,
                token,
                delay: self.grace,
            });
        }

        actions
    }

    /// Outcome of the provider's `connect()` for `attempt`.
    pub fn on_connect_result(
        &mut self,
        attempt: AttemptId,
        result: Result<ConnectInfo, UpstreamError>,
    ) -> Vec<Action> {
        let lost_early = match self.phase {
            Phase::Connecting {
                attempt: current,
                lost_early,
            } if current == attempt => lost_early,
            _ => return self.on_stale_result(attempt, result),
        };

        let mut actions = Vec::new();
        match result {
            Ok(info) => {
                info!(
                    room_id = %info.room_id,
                    account = %self.account,
                    "Connected to upstream"
                );
                self.retry = RetryState::default();
                actions.push(Action::Broadcast(DomainEvent::info(format!(
                    "Connected to TikTok roomId {} (@{})",
                    info.room_id,
                    self.account_handle()
                ))));
                self.phase = Phase::Connected {
                    attempt,
                    room_id: info.room_id,
                };
                let token = self.mint_token();
                self.stable_timer = Some(token);
                actions.push(Action::ScheduleTimer {
                    kind: TimerKind::Stable,
                    token,
                    delay: self.stable,
                });
                if lost_early {
                    actions.extend(self.on_disconnected(attempt));
                }
            }
            Err(err) => {
                self.retry.failures += 1;
                let delay = self.backoff.delay_for(self.retry.failures);
                let token = self.mint_token();
                self.retry.scheduled = Some(token);
                self.phase = Phase::RetryScheduled;
                warn!(
                    error = %err,
                    failures = self.retry.failures,
                    retry_secs = delay.as_secs(),
                    "Upstream connect failed"
                );
                actions.push(Action::ScheduleTimer {
                    kind: TimerKind::Retry,
                    token,
                    delay,
                });
                actions.push(Action::Broadcast(DomainEvent::info(format!(
                    "Failed to connect to TikTok: {err}. Retrying in {}s...",
                    delay.as_secs()
                ))));
            }
        }
        actions
    }

    fn on_stale_result(
        &mut self,
        attempt: AttemptId,
        result: Result<ConnectInfo, UpstreamError>,
    ) -> Vec<Action> {
        debug!(attempt = attempt.get(), ok = result.is_ok(), "Ignoring stale connect result");
        // A superseded attempt that still succeeded while nobody wants the
        // upstream leaves a live session behind.
        if result.is_ok() && self.phase == Phase::Idle {
            return vec![Action::Disconnect];
        }
        Vec::new()
    }

    /// The provider reported that the session opened by `attempt` ended.
    pub fn on_disconnected(&mut self, attempt: AttemptId) -> Vec<Action> {
        match &mut self.phase {
            Phase::Connected { attempt: current, .. } if *current == attempt => {}
            Phase::Connecting {
                attempt: current,
                lost_early,
            } if *current == attempt => {
                *lost_early = true;
                return Vec::new();
            }
            _ => {
                debug!(attempt = attempt.get(), "Ignoring loss of a stale session");
                return Vec::new();
            }
        }

        let mut actions = Vec::new();
        self.cancel_stable(&mut actions);
        self.retry = RetryState::default();
        if self.demand == 0 {
            info!("Upstream connection lost during shutdown grace");
            actions.push(Action::Broadcast(DomainEvent::info("TikTok connection lost.")));
            self.losses = 0;
            self.phase = Phase::Idle;
            if self.shutdown.take().is_some() {
                actions.push(Action::CancelTimer(TimerKind::ShutdownGrace));
            }
            return actions;
        }

        self.losses += 1;
        if self.losses == 1 {
            warn!(subscribers = self.demand, "Upstream connection lost, reconnecting");
            actions.push(Action::Broadcast(DomainEvent::info(
                "TikTok connection lost. Reconnecting...",
            )));
            self.begin_connect(&mut actions);
            return actions;
        }

        let delay = self.backoff.delay_for(self.losses - 1);
        let token = self.mint_token();
        self.retry.scheduled = Some(token);
        self.phase = Phase::RetryScheduled;
        warn!(
            losses = self.losses,
            retry_secs = delay.as_secs(),
            "Upstream connection lost again, backing off"
        );
        actions.push(Action::ScheduleTimer {
            kind: TimerKind::Retry,
            token,
            delay,
        });
        actions.push(Action::Broadcast(DomainEvent::info(format!(
            "TikTok connection lost. Reconnecting in {}s...",
            delay.as_secs()
        ))));
        actions
    }

    /// The provider reported an error; the session is left untouched.
    pub fn on_error(&mut self, attempt: AttemptId, message: &str) -> Vec<Action> {
        if !self.accepts_events_from(attempt) {
            return Vec::new();
        }
        warn!(error = %message, "Upstream reported an error");
        vec![Action::Broadcast(DomainEvent::info(format!(
            "TikTok error: {message}"
        )))]
    }

    /// A timer armed by [`Action::ScheduleTimer`] fired.
    pub fn on_timer(&mut self, kind: TimerKind, token: TimerToken) -> Vec<Action> {
        match kind {
            TimerKind::Retry => self.on_retry_timer(token),
            TimerKind::ShutdownGrace => self.on_grace_timer(token),
            TimerKind::Stable => self.on_stable_timer(token),
        }
    }

    fn on_stable_timer(&mut self, token: TimerToken) -> Vec<Action> {
        if self.stable_timer != Some(token) || !self.is_connected() {
            debug!(token = token.get(), "Ignoring stale stability timer");
            return Vec::new();
        }
        self.stable_timer = None;
        if self.losses > 0 {
            debug!(losses = self.losses, "Upstream session stable, forgetting losses");
            self.losses = 0;
        }
        Vec::new()
    }

    fn on_retry_timer(&mut self, token: TimerToken) -> Vec<Action> {
        if self.retry.scheduled != Some(token) || self.phase != Phase::RetryScheduled {
            debug!(token = token.get(), "Ignoring stale retry timer");
            return Vec::new();
        }
        self.retry.scheduled = None;

        let mut actions = Vec::new();
        if self.demand > 0 {
            info!(failures = self.retry.failures, "Retrying upstream connect");
            self.begin_connect(&mut actions);
        } else {
            info!("Retry timer fired with no subscribers, going idle");
            self.phase = Phase::Idle;
            self.retry = RetryState::default();
            self.losses = 0;
            if self.shutdown.take().is_some() {
                actions.push(Action::CancelTimer(TimerKind::ShutdownGrace));
            }
        }
        actions
    }

    fn on_grace_timer(&mut self, token: TimerToken) -> Vec<Action> {
        if self.shutdown != Some(token) {
            debug!(token = token.get(), "Ignoring stale shutdown timer");
            return Vec::new();
        }
        self.shutdown = None;
        if self.demand > 0 {
            return Vec::new();
        }

        info!("Shutdown grace expired, disconnecting upstream");
        let mut actions = Vec::new();
        if self.retry.scheduled.is_some() {
            actions.push(Action::CancelTimer(TimerKind::Retry));
        }
        self.cancel_stable(&mut actions);
        self.retry = RetryState::default();
        self.losses = 0;
        self.phase = Phase::Idle;
        actions.push(Action::Disconnect);
        actions
    }

    /// Tear everything down for server shutdown.
    pub fn shutdown(&mut self) -> Vec<Action> {
        let mut actions = Vec::new();
        if self.retry.scheduled.is_some() {
            actions.push(Action::CancelTimer(TimerKind::Retry));
        }
        if self.shutdown.take().is_some() {
            actions.push(Action::CancelTimer(TimerKind::ShutdownGrace));
        }
        self.cancel_stable(&mut actions);
        if self.phase != Phase::Idle {
            actions.push(Action::Disconnect);
        }
        self.phase = Phase::Idle;
        self.retry = RetryState::default();
        self.losses = 0;
        self.demand = 0;
        actions
    }

    fn begin_connect(&mut self, actions: &mut Vec<Action>) {
        self.next_attempt += 1;
        let attempt = AttemptId(self.next_attempt);
        self.phase = Phase::Connecting {
            attempt,
            lost_early: false,
        };
        crate::metrics::inc_connect_attempts();
        actions.push(Action::Connect(attempt));
    }

    fn cancel_stable(&mut self, actions: &mut Vec<Action>) {
        if self.stable_timer.take().is_some() {
            actions.push(Action::CancelTimer(TimerKind::Stable));
        }
    }

    fn mint_token(&mut self) -> TimerToken {
        self.next_token += 1;
        TimerToken(self.next_token)
    }

    fn account_handle(&self) -> &str {
        self.account.trim_start_matches('@')
    }
}
