//! Protocol error types.

use thiserror::Error;

/// Errors raised while encoding or decoding relay frames.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// The frame could not be serialized to JSON.
    #[error("failed to encode frame: {0}")]
    Encode(#[source] serde_json::Error),

    /// The frame was not valid JSON or did not match any known shape.
    #[error("failed to decode frame: {0}")]
    Decode(#[source] serde_json::Error),
}
