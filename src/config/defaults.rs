//! Default value functions for configuration.
//!
//! Separated into its own module for clarity and reuse. The defaults mirror
//! the environment the relay was first deployed in.

use std::net::SocketAddr;

// =============================================================================
// Listen Defaults
// =============================================================================

pub const DEFAULT_PORT: u16 = 8081;

pub fn default_listen_address() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], DEFAULT_PORT))
}

pub fn default_send_queue() -> usize {
    64
}

// =============================================================================
// Upstream Defaults
// =============================================================================

pub fn default_username() -> String {
    "@ultimateshades".to_string()
}

pub fn default_bridge_url() -> String {
    "ws://127.0.0.1:8787".to_string()
}

pub fn default_connect_timeout() -> u64 {
    15
}

// =============================================================================
// Lifecycle Defaults
// =============================================================================

pub fn default_retry_base() -> u64 {
    10
}

pub fn default_retry_max() -> u64 {
    300
}

pub fn default_shutdown_grace() -> u64 {
    300 // 5 minutes
}

pub fn default_stable() -> u64 {
    60
}
