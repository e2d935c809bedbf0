//! Routing envelope: the server-side, strongly typed form of a wire record.
//!
//! Each [`Kind`] variant carries only the fields legal for it, so a record
//! with both a target and an exclusion cannot be represented.

use chatrelay_shared::message::{ChatMessage, MessageType};

use super::error::EnvelopeError;

/// Sender name used for records generated by the relay itself.
pub const SYSTEM_SENDER: &str = "System";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Kind {
    Join,
    Leave,
    Message,
    Direct { target: String },
    Excluded { excluded: String },
    System,
    Typing { is_typing: bool },
    Ack { message_id: String },
}

impl Kind {
    pub fn message_type(&self) -> MessageType {
        match self {
            Kind::Join => MessageType::Join,
            Kind::Leave => MessageType::Leave,
            Kind::Message => MessageType::Message,
            Kind::Direct { .. } => MessageType::Direct,
            Kind::Excluded { .. } => MessageType::Excluded,
            Kind::System => MessageType::System,
            Kind::Typing { .. } => MessageType::Typing,
            Kind::Ack { .. } => MessageType::Ack,
        }
    }

    pub fn is_persisted(&self) -> bool {
        self.message_type().is_persisted()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
    pub id: Option<String>,
    pub sender: String,
    pub body: String,
    pub color: Option<String>,
    pub timestamp: i64,
    pub kind: Kind,
}

impl Envelope {
    /// A relay-generated `system` record.
    pub fn system(body: impl Into<String>, timestamp: i64) -> Self {
        Self {
            id: None,
            sender: SYSTEM_SENDER.to_string(),
            body: body.into(),
            color: None,
            timestamp,
            kind: Kind::System,
        }
    }

    /// A presence record (`join` / `leave`) on behalf of `sender`.
    pub fn presence(
        kind: Kind,
        sender: impl Into<String>,
        body: impl Into<String>,
        timestamp: i64,
    ) -> Self {
        Self {
            id: None,
            sender: sender.into(),
            body: body.into(),
            color: None,
            timestamp,
            kind,
        }
    }

    pub fn to_wire(&self) -> ChatMessage {
        ChatMessage::from(self.clone())
    }
}

impl TryFrom<ChatMessage> for Envelope {
    type Error = EnvelopeError;

    fn try_from(msg: ChatMessage) -> Result<Self, Self::Error> {
        let missing = |field| EnvelopeError::MissingField {
            kind: msg.r#type,
            field,
        };
        let kind = match msg.r#type {
            MessageType::Join => Kind::Join,
            MessageType::Leave => Kind::Leave,
            MessageType::Message => Kind::Message,
            MessageType::Direct => Kind::Direct {
                target: msg.target_user.clone().ok_or_else(|| missing("target_user"))?,
            },
            MessageType::Excluded => Kind::Excluded {
                excluded: msg
                    .excluded_user
                    .clone()
                    .ok_or_else(|| missing("excluded_user"))?,
            },
            MessageType::System => Kind::System,
            MessageType::Typing => Kind::Typing {
                is_typing: msg.is_typing.unwrap_or(true),
            },
            MessageType::Ack => Kind::Ack {
                message_id: msg.message_id.clone().ok_or_else(|| missing("message_id"))?,
            },
        };

        Ok(Self {
            id: msg.id,
            sender: msg.username,
            body: msg.message,
            color: msg.color,
            timestamp: msg.timestamp,
            kind,
        })
    }
}

impl From<Envelope> for ChatMessage {
    fn from(envelope: Envelope) -> Self {
        let mut msg = ChatMessage::new(envelope.kind.message_type(), envelope.sender, envelope.body)
            .with_timestamp(envelope.timestamp);
        msg.id = envelope.id;
        msg.color = envelope.color;
        match envelope.kind {
            Kind::Direct { target } => msg.target_user = Some(target),
            Kind::Excluded { excluded } => msg.excluded_user = Some(excluded),
            Kind::Typing { is_typing } => msg.is_typing = Some(is_typing),
            Kind::Ack { message_id } => msg.message_id = Some(message_id),
            Kind::Join | Kind::Leave | Kind::Message | Kind::System => {}
        }
        msg
    }
}
