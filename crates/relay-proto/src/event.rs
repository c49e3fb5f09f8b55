//! Domain events broadcast by the relay.

use crate::upstream::{ChatPayload, GiftPayload};

/// An event the relay delivers to every subscriber.
///
/// Events are immutable once built and only live for the duration of a
/// single broadcast.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DomainEvent {
    /// A status line from the relay itself.
    Info {
        /// Human-readable status text.
        message: String,
    },
    /// A chat comment from the live stream.
    ChatMessage {
        /// Display name of the author.
        user_name: String,
        /// Stable upstream identifier of the author.
        source_tag: String,
        /// Comment text.
        text: String,
    },
    /// A gift sent during the live stream.
    GiftEvent {
        /// Display name of the sender.
        user_name: String,
        /// Stable upstream identifier of the sender.
        source_tag: String,
        /// Name of the gift.
        gift_name: String,
        /// How many times the gift was repeated.
        count: u32,
    },
}

impl DomainEvent {
    /// Build an [`DomainEvent::Info`] event.
    pub fn info(message: impl Into<String>) -> Self {
        Self::Info {
            message: message.into(),
        }
    }

    /// Short label for logs and metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Info { .. } => "info",
            Self::ChatMessage { .. } => "chat",
            Self::GiftEvent { .. } => "gift",
        }
    }
}

impl From<ChatPayload> for DomainEvent {
    fn from(chat: ChatPayload) -> Self {
        Self::ChatMessage {
            user_name: chat.user.display_name().to_string(),
            source_tag: chat.user.unique_id.unwrap_or_default(),
            text: chat.comment,
        }
    }
}

impl From<GiftPayload> for DomainEvent {
    fn from(gift: GiftPayload) -> Self {
        Self::GiftEvent {
            user_name: gift.user.display_name().to_string(),
            source_tag: gift.user.unique_id.unwrap_or_default(),
            gift_name: gift.gift_name,
            count: gift.repeat_count,
        }
    }
}
