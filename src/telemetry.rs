//! Standardized span constructors for relay observability.

pub mod spans {
    use tracing::{Span, info_span};

    /// Create a span for a subscriber connection.
    pub fn connection(id: &str, peer: &str) -> Span {
        info_span!("connection", subscriber = %id, peer = %peer)
    }

    /// Create a span for the relay actor.
    pub fn relay(account: &str) -> Span {
        info_span!("relay", account = %account)
    }

    /// Create a span for an upstream connect attempt.
    pub fn upstream(attempt: u64) -> Span {
        info_span!("upstream", attempt = attempt)
    }
}
