//! State management module.
//!
//! Everything that mutates relay state is owned by the [`RelayActor`]:
//!
//! - [`registry`]: the set of connected subscribers
//! - [`lifecycle`]: the upstream connection state machine (pure, no I/O)
//! - [`timer`]: cancellable retry, shutdown-grace and stability timers
//! - [`fanout`]: serialize-once broadcast with per-subscriber failure isolation
//! - [`actor`]: the task that serializes demand changes, timer firings and
//!   provider callbacks, and executes the controller's actions

pub mod actor;
pub mod fanout;
pub mod lifecycle;
pub mod registry;
pub mod timer;

pub use actor::{RelayActor, RelayCommand, RelayHandle, RelayParams, RelayStatus};
pub use lifecycle::{
    Action, AttemptId, Backoff, LifecycleController, RetryState, TimerKind, TimerToken,
    UpstreamState,
};
pub use registry::{DemandChange, Subscriber, SubscriberId, SubscriberRegistry};
