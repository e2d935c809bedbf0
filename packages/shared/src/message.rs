//! Wire record exchanged between clients and the relay.
//!
//! The JSON key names are the interoperability contract and must stay as they
//! are: `id`, `type`, `username`, `message`, `target_user`, `excluded_user`,
//! `color`, `timestamp`, `is_typing`, `message_id`.

use serde::{Deserialize, Serialize};

/// Message type for all records on the wire
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageType {
    Join,
    Leave,
    Message,
    Direct,
    Excluded,
    System,
    Typing,
    Ack,
}

impl MessageType {
    /// Whether records of this type are written to history.
    pub fn is_persisted(self) -> bool {
        !matches!(self, MessageType::Typing | MessageType::Ack)
    }
}

/// Chat record (both directions)
///
/// Optional keys are omitted when absent and default when missing, so a
/// record survives an encode/decode cycle unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub r#type: MessageType,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_user: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub excluded_user: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    #[serde(default)]
    pub timestamp: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_typing: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message_id: Option<String>,
}

impl ChatMessage {
    /// A record of the given type with every optional field empty.
    pub fn new(
        r#type: MessageType,
        username: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            id: None,
            r#type,
            username: username.into(),
            message: message.into(),
            target_user: None,
            excluded_user: None,
            color: None,
            timestamp: 0,
            is_typing: None,
            message_id: None,
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_timestamp(mut self, timestamp: i64) -> Self {
        self.timestamp = timestamp;
        self
    }
}
