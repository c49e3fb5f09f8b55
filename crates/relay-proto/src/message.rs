//! JSON text frames exchanged with subscribers.
//!
//! Server to client:
//!
//! ```text
//! {"type":"info","message":"..."}
//! {"type":"tiktok-chat","user":{"name":"...","id":"..."},"message":"..."}
//! {"type":"tiktok-gift","user":{"name":"...","id":"..."},"gift":"...","count":1}
//! {"type":"pong"}
//! ```
//!
//! Client to server: only `{"type":"ping"}` is understood.

use serde::{Deserialize, Serialize};

use crate::error::ProtocolError;
use crate::event::DomainEvent;

/// User block embedded in chat and gift frames.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WireUser {
    /// Display name.
    pub name: String,
    /// Upstream unique id.
    pub id: String,
}

/// A frame sent from the relay to a subscriber.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ServerMessage {
    /// Relay status line.
    #[serde(rename = "info")]
    Info {
        /// Status text.
        message: String,
    },
    /// Chat comment.
    #[serde(rename = "tiktok-chat")]
    Chat {
        /// Comment author.
        user: WireUser,
        /// Comment text.
        message: String,
    },
    /// Gift notification.
    #[serde(rename = "tiktok-gift")]
    Gift {
        /// Gift sender.
        user: WireUser,
        /// Gift name.
        gift: String,
        /// Repeat count.
        count: u32,
    },
    /// Reply to a keepalive ping.
    #[serde(rename = "pong")]
    Pong,
}

impl ServerMessage {
    /// Serialize into a JSON text frame.
    pub fn to_json(&self) -> Result<String, ProtocolError> {
        serde_json::to_string(self).map_err(ProtocolError::Encode)
    }

    /// Parse a JSON text frame produced by [`ServerMessage::to_json`].
    pub fn from_json(text: &str) -> Result<Self, ProtocolError> {
        serde_json::from_str(text).map_err(ProtocolError::Decode)
    }
}

impl From<&DomainEvent> for ServerMessage {
    fn from(event: &DomainEvent) -> Self {
        match event {
            DomainEvent::Info { message } => Self::Info {
                message: message.clone(),
            },
            DomainEvent::ChatMessage {
                user_name,
                source_tag,
                text,
            } => Self::Chat {
                user: WireUser {
                    name: user_name.clone(),
                    id: source_tag.clone(),
                },
                message: text.clone(),
            },
            DomainEvent::GiftEvent {
                user_name,
                source_tag,
                gift_name,
                count,
            } => Self::Gift {
                user: WireUser {
                    name: user_name.clone(),
                    id: source_tag.clone(),
                },
                gift: gift_name.clone(),
                count: *count,
            },
        }
    }
}

/// A frame sent from a subscriber to the relay.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ClientMessage {
    /// Application-level keepalive.
    Ping,
}

impl ClientMessage {
    /// Parse an inbound text frame.
    ///
    /// Unknown message types and malformed JSON yield `None`; the relay
    /// ignores them.
    pub fn parse(text: &str) -> Option<Self> {
        serde_json::from_str(text).ok()
    }
}
