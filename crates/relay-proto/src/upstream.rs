//! Upstream payloads and bridge frames.
//!
//! The relay never speaks the live-stream protocol itself. A bridge process
//! owns that connection and forwards what it sees as JSON text frames tagged
//! by `event`:
//!
//! ```text
//! {"event":"connected","roomId":"7281..."}
//! {"event":"chat","user":{"uniqueId":"...","nickname":"..."},"comment":"..."}
//! {"event":"gift","user":{...},"giftName":"Rose","repeatCount":3}
//! {"event":"disconnected"}
//! {"event":"error","message":"..."}
//! ```

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::ProtocolError;

/// Display name used when the upstream user carries neither a nickname nor
/// a unique id.
pub const ANONYMOUS_USER: &str = "TikTok User";

/// A user as reported by the upstream source.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct UpstreamUser {
    /// Stable account handle.
    pub unique_id: Option<String>,
    /// Free-form display nickname.
    pub nickname: Option<String>,
}

impl UpstreamUser {
    /// Nickname, else unique id, else [`ANONYMOUS_USER`].
    pub fn display_name(&self) -> &str {
        [self.nickname.as_deref(), self.unique_id.as_deref()]
            .into_iter()
            .flatten()
            .find(|s| !s.is_empty())
            .unwrap_or(ANONYMOUS_USER)
    }
}

/// A chat comment.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ChatPayload {
    /// Comment author.
    pub user: UpstreamUser,
    /// Comment text.
    pub comment: String,
}

/// A gift.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GiftPayload {
    /// Gift sender.
    #[serde(default)]
    pub user: UpstreamUser,
    /// Gift name.
    #[serde(default)]
    pub gift_name: String,
    /// Repeat count of a streaked gift.
    #[serde(default = "default_repeat_count")]
    pub repeat_count: u32,
}

fn default_repeat_count() -> u32 {
    1
}

/// Events an upstream connection reports once it is established.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpstreamEvent {
    /// A chat comment arrived.
    Chat(ChatPayload),
    /// A gift arrived.
    Gift(GiftPayload),
    /// The upstream connection ended.
    Disconnected,
    /// The upstream reported an error; the connection may still be alive.
    Error(String),
}

/// Room identifier, sent either as a string or a number.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RoomId {
    /// Numeric id.
    Number(u64),
    /// Textual id.
    Text(String),
}

impl fmt::Display for RoomId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Number(n) => write!(f, "{n}"),
            Self::Text(s) => f.write_str(s),
        }
    }
}

/// A frame received from the upstream bridge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "lowercase")]
pub enum BridgeFrame {
    /// The bridge joined the live room.
    Connected {
        /// Room the bridge joined.
        #[serde(rename = "roomId")]
        room_id: RoomId,
    },
    /// Chat comment.
    Chat(ChatPayload),
    /// Gift.
    Gift(GiftPayload),
    /// The live connection ended.
    Disconnected,
    /// Upstream error report.
    Error {
        /// Error description.
        #[serde(default)]
        message: String,
    },
}

impl BridgeFrame {
    /// Parse a bridge text frame.
    pub fn parse(text: &str) -> Result<Self, ProtocolError> {
        serde_json::from_str(text).map_err(ProtocolError::Decode)
    }

    /// Convert into an [`UpstreamEvent`]; `connected` frames have no
    /// event counterpart and yield `None`.
    pub fn into_event(self) -> Option<UpstreamEvent> {
        match self {
            Self::Connected { .. } => None,
            Self::Chat(chat) => Some(UpstreamEvent::Chat(chat)),
            Self::Gift(gift) => Some(UpstreamEvent::Gift(gift)),
            Self::Disconnected => Some(UpstreamEvent::Disconnected),
            Self::Error { message } => Some(UpstreamEvent::Error(message)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_name_prefers_nickname() {
        let user = UpstreamUser {
            unique_id: Some("id".into()),
            nickname: Some("Nick".into()),
        };
        assert_eq!(user.display_name(), "Nick");
    }

    #[test]
    fn display_name_skips_empty_nickname() {
        let user = UpstreamUser {
            unique_id: Some("id".into()),
            nickname: Some(String::new()),
        };
        assert_eq!(user.display_name(), "id");
        assert_eq!(UpstreamUser::default().display_name(), ANONYMOUS_USER);
    }

    #[test]
    fn parses_connected_with_numeric_room() {
        let frame = BridgeFrame::parse(r#"{"event":"connected","roomId":123}"#).unwrap();
        match frame {
            BridgeFrame::Connected { room_id } => assert_eq!(room_id.to_string(), "123"),
            other => panic!("unexpected frame {other:?}"),
        }
    }

    #[test]
    fn parses_chat_frame() {
        let frame = BridgeFrame::parse(
            r#"{"event":"chat","user":{"uniqueId":"u1","nickname":"User"},"comment":"hey"}"#,
        )
        .unwrap();
        assert_eq!(
            frame.into_event(),
            Some(UpstreamEvent::Chat(ChatPayload {
                user: UpstreamUser {
                    unique_id: Some("u1".into()),
                    nickname: Some("User".into()),
                },
                comment: "hey".into(),
            }))
        );
    }

    #[test]
    fn gift_repeat_count_defaults_to_one() {
        let frame = BridgeFrame::parse(r#"{"event":"gift","giftName":"Rose"}"#).unwrap();
        match frame.into_event() {
            Some(UpstreamEvent::Gift(gift)) => {
                assert_eq!(gift.gift_name, "Rose");
                assert_eq!(gift.repeat_count, 1);
            }
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[test]
    fn unknown_event_is_an_error() {
        assert!(BridgeFrame::parse(r#"{"event":"like"}"#).is_err());
        assert!(BridgeFrame::parse("garbage").is_err());
    }
}
