//! Subscriber listener configuration.

use serde::Deserialize;
use std::net::SocketAddr;

use super::defaults::{default_listen_address, default_send_queue};

/// WebSocket listener for downstream subscribers.
#[derive(Debug, Clone, Deserialize)]
pub struct ListenConfig {
    /// Address to bind to (e.g., "0.0.0.0:8081").
    #[serde(default = "default_listen_address")]
    pub address: SocketAddr,
    /// Allowed origins for the WebSocket handshake (e.g., `["https://overlay.example"]`).
    /// Empty list allows all origins.
    #[serde(default)]
    pub allow_origins: Vec<String>,
    /// Outbound frames buffered per subscriber before it is dropped as too slow.
    #[serde(default = "default_send_queue")]
    pub send_queue: usize,
}

impl Default for ListenConfig {
    fn default() -> Self {
        Self {
            address: default_listen_address(),
            allow_origins: Vec::new(),
            send_queue: default_send_queue(),
        }
    }
}

impl ListenConfig {
    /// Whether a handshake carrying `origin` may proceed.
    ///
    /// Requests without an Origin header (non-browser clients) are only
    /// accepted when the allow-list is empty.
    pub fn origin_allowed(&self, origin: Option<&str>) -> bool {
        if self.allow_origins.is_empty() {
            return true;
        }
        origin.is_some_and(|o| self.allow_origins.iter().any(|a| a == o || a == "*"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_allow_list_accepts_everything() {
        let listen = ListenConfig::default();
        assert!(listen.origin_allowed(None));
        assert!(listen.origin_allowed(Some("https://anything.example")));
    }

    #[test]
    fn allow_list_matches_exact_origin() {
        let listen = ListenConfig {
            allow_origins: vec!["http://localhost:3000".into()],
            ..ListenConfig::default()
        };
        assert!(listen.origin_allowed(Some("http://localhost:3000")));
        assert!(!listen.origin_allowed(Some("http://localhost:3001")));
        assert!(!listen.origin_allowed(None));
    }

    #[test]
    fn wildcard_accepts_any_origin_header() {
        let listen = ListenConfig {
            allow_origins: vec!["*".into()],
            ..ListenConfig::default()
        };
        assert!(listen.origin_allowed(Some("https://a.example")));
        assert!(!listen.origin_allowed(None));
    }

    #[test]
    fn defaults_match_original_port() {
        let listen = ListenConfig::default();
        assert_eq!(listen.address.port(), 8081);
        assert_eq!(listen.send_queue, 64);
    }
}
