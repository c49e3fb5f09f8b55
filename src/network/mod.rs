//! Network module.
//!
//! Contains the Gateway (subscriber listener) and the per-subscriber
//! Connection handler.

mod connection;
mod gateway;

pub use connection::Connection;
pub use gateway::Gateway;
