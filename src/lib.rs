//! tiktok-relay - fans one TikTok live session out to local WebSocket subscribers.
//!
//! The relay keeps at most one upstream connection per configured account and
//! only while somebody is listening: the first subscriber triggers a connect,
//! failures back off exponentially, and the connection is released a grace
//! period after the last subscriber leaves. Chat and gift events are
//! serialized once and queued to every subscriber.
//!
//! See [`server::RelayServer`] for the composition root and
//! [`state::LifecycleController`] for the connection state machine.

pub mod config;
pub mod error;
pub mod http;
pub mod metrics;
pub mod network;
pub mod server;
pub mod state;
pub mod telemetry;
pub mod upstream;

pub use relay_proto as proto;
