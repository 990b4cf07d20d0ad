use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::model::{ChatId, MessageId, UserId};

/// Who sent an update, as the chat platform reports it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sender {
    pub id: UserId,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub first_name: String,
}

/// One inbound event from the chat platform.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Update {
    pub sender: Sender,
    pub chat_id: ChatId,
    #[serde(flatten)]
    pub kind: UpdateKind,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum UpdateKind {
    Message {
        text: String,
    },
    /// A button press on a message the bot sent earlier.
    Callback {
        id: String,
        data: String,
        message_id: MessageId,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Button {
    pub text: String,
    pub data: String,
}

impl Button {
    pub fn new(text: impl Into<String>, data: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            data: data.into(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutgoingMessage {
    pub text: String,
    /// Button rows; empty for plain text.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub keyboard: Vec<Vec<Button>>,
}

impl OutgoingMessage {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            keyboard: Vec::new(),
        }
    }

    pub fn with_keyboard(text: impl Into<String>, keyboard: Vec<Vec<Button>>) -> Self {
        Self {
            text: text.into(),
            keyboard,
        }
    }
}

/// The outbound half of the chat platform.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Deliver a message and return the id the platform assigned it.
    async fn send(&self, chat: ChatId, message: OutgoingMessage) -> Result<MessageId, TransportError>;
    async fn delete(&self, chat: ChatId, message: MessageId) -> Result<(), TransportError>;
    /// Acknowledge a button press with a short toast.
    async fn answer_callback(&self, callback_id: &str, text: &str) -> Result<(), TransportError>;
}

#[derive(Debug)]
pub enum TransportError {
    Closed,
    Rejected(String),
}

impl std::fmt::Display for TransportError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransportError::Closed => write!(f, "transport closed"),
            TransportError::Rejected(msg) => write!(f, "transport rejected request: {msg}"),
        }
    }
}

impl std::error::Error for TransportError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_message_update() {
        let line = r#"{"type":"message","sender":{"id":7,"username":"ana","first_name":"Ana"},"chat_id":7,"text":"/select"}"#;
        let update: Update = serde_json::from_str(line).unwrap();
        assert_eq!(update.sender.id, 7);
        assert_eq!(update.kind, UpdateKind::Message { text: "/select".into() });
    }

    #[test]
    fn decode_callback_update_without_username() {
        let line = r#"{"type":"callback","sender":{"id":9},"chat_id":9,"id":"cb1","data":"all","message_id":12}"#;
        let update: Update = serde_json::from_str(line).unwrap();
        assert_eq!(update.sender.username, "");
        assert_eq!(
            update.kind,
            UpdateKind::Callback { id: "cb1".into(), data: "all".into(), message_id: 12 }
        );
    }

    #[test]
    fn plain_text_omits_keyboard() {
        let json = serde_json::to_string(&OutgoingMessage::text("hi")).unwrap();
        assert_eq!(json, r#"{"text":"hi"}"#);
    }
}
