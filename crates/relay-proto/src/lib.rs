//! # relay-proto
//!
//! Wire types shared by the relay daemon and its tests.
//!
//! - [`event`]: the [`DomainEvent`] a relay broadcasts to every subscriber
//! - [`message`]: JSON text frames exchanged with subscribers
//!   ([`ServerMessage`], [`ClientMessage`])
//! - [`upstream`]: payloads reported by the upstream live-stream source and
//!   the frames spoken by the upstream bridge
//!
//! ## Quick Start
//!
//! ```rust
//! use relay_proto::{ClientMessage, DomainEvent, ServerMessage};
//!
//! let event = DomainEvent::info("Connected to TikTok Relay (@someone)");
//! let json = ServerMessage::from(&event).to_json().unwrap();
//! assert_eq!(json, r#"{"type":"info","message":"Connected to TikTok Relay (@someone)"}"#);
//!
//! assert_eq!(ClientMessage::parse(r#"{"type":"ping"}"#), Some(ClientMessage::Ping));
//! assert_eq!(ClientMessage::parse("not json"), None);
//! ```

#![deny(clippy::all)]
#![warn(missing_docs)]

pub mod error;
pub mod event;
pub mod message;
pub mod upstream;

pub use error::ProtocolError;
pub use event::DomainEvent;
pub use message::{ClientMessage, ServerMessage, WireUser};
pub use upstream::{BridgeFrame, ChatPayload, GiftPayload, UpstreamEvent, UpstreamUser};
