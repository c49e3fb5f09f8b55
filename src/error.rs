//! Unified error handling for tiktok-relay.
//!
//! Nothing here is fatal to the relay itself: upstream failures feed the
//! retry schedule and subscriber failures only affect that subscriber.

use thiserror::Error;

// ============================================================================
// Upstream Errors (provider connect / session)
// ============================================================================

/// Errors reported by an upstream provider.
#[derive(Debug, Clone, Error)]
pub enum UpstreamError {
    #[error("connection refused: {0}")]
    Connect(String),

    #[error("timed out after {0}s waiting for the live room")]
    Timeout(u64),

    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("upstream closed before the room was joined")]
    Closed,

    #[error("{0}")]
    Rejected(String),
}

impl UpstreamError {
    /// Static error code, used as the `reason` label of connect-failure metrics.
    #[inline]
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Connect(_) => "connect",
            Self::Timeout(_) => "timeout",
            Self::Protocol(_) => "protocol",
            Self::Closed => "closed",
            Self::Rejected(_) => "rejected",
        }
    }
}

// ============================================================================
// Relay Errors (actor / composition)
// ============================================================================

/// Errors surfaced by the relay handle and server composition.
#[derive(Debug, Error)]
pub enum RelayError {
    #[error("relay actor has stopped")]
    ActorGone,

    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: std::net::SocketAddr,
        #[source]
        source: std::io::Error,
    },
}
