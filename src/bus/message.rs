//! Message types for the ConvoClaw message bus
//!
//! Channel adapters turn platform events into [`InboundMessage`]s and send
//! [`OutboundMessage`]s back out; the agent loop sits between them.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Represents an incoming message from a channel (e.g., Telegram, Discord, etc.)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InboundMessage {
    /// The channel this message came from (e.g., "telegram", "discord")
    pub channel: String,
    /// Unique identifier of the sender
    pub sender_id: String,
    /// Unique identifier of the chat/conversation
    pub chat_id: String,
    /// The text content of the message
    pub content: String,
    /// Session key for history lookup (default: "channel:chat_id")
    pub session_key: String,
    /// Additional metadata key-value pairs
    pub metadata: HashMap<String, String>,
}

/// Represents an outgoing message to be sent via a channel
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutboundMessage {
    /// The channel to send this message through
    pub channel: String,
    /// The chat/conversation to send to
    pub chat_id: String,
    /// The text content to send
    pub content: String,
    /// Optional message ID to reply to
    pub reply_to: Option<String>,
}

impl InboundMessage {
    /// Creates a new inbound message with the required fields.
    ///
    /// The session key is automatically generated as "channel:chat_id".
    ///
    /// # Example
    /// ```
    /// use convoclaw::bus::InboundMessage;
    ///
    /// let msg = InboundMessage::new("zalo", "user123", "chat456", "Hello, bot!");
    /// assert_eq!(msg.session_key, "zalo:chat456");
    /// ```
    pub fn new(channel: &str, sender_id: &str, chat_id: &str, content: &str) -> Self {
        Self {
            channel: channel.to_string(),
            sender_id: sender_id.to_string(),
            chat_id: chat_id.to_string(),
            content: content.to_string(),
            session_key: format!("{}:{}", channel, chat_id),
            metadata: HashMap::new(),
        }
    }

    /// Route this message to a different session (e.g. per-sender threads).
    pub fn with_session_key(mut self, session_key: &str) -> Self {
        self.session_key = session_key.to_string();
        self
    }

    /// Adds a metadata key-value pair to the message (builder pattern).
    pub fn with_metadata(mut self, key: &str, value: &str) -> Self {
        self.metadata.insert(key.to_string(), value.to_string());
        self
    }
}

impl OutboundMessage {
    /// Creates a new outbound message.
    pub fn new(channel: &str, chat_id: &str, content: &str) -> Self {
        Self {
            channel: channel.to_string(),
            chat_id: chat_id.to_string(),
            content: content.to_string(),
            reply_to: None,
        }
    }

    /// Creates a reply addressed to the chat `inbound` came from.
    ///
    /// Threads the reply onto the original platform message when the
    /// adapter recorded its id under the `message_id` metadata key.
    ///
    /// # Example
    /// ```
    /// use convoclaw::bus::{InboundMessage, OutboundMessage};
    ///
    /// let inbound = InboundMessage::new("telegram", "u1", "c1", "hi")
    ///     .with_metadata("message_id", "77");
    /// let reply = OutboundMessage::reply_to(&inbound, "hello");
    /// assert_eq!(reply.chat_id, "c1");
    /// assert_eq!(reply.reply_to.as_deref(), Some("77"));
    /// ```
    pub fn reply_to(inbound: &InboundMessage, content: &str) -> Self {
        Self {
            reply_to: inbound.metadata.get("message_id").cloned(),
            ..Self::new(&inbound.channel, &inbound.chat_id, content)
        }
    }
}
