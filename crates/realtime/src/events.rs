//! Decoded realtime payloads.
//!
//! DM payloads name the channel `threadId`, group payloads `channelId`; both
//! land in `channel_id`.

use {
    chrono::{DateTime, Utc},
    serde::{Deserialize, Serialize},
};

use crate::topic::EventKind;

/// Author attached to messages and typing indicators.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageAuthor {
    pub id: String,
    pub display_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar_url: Option<String>,
}

/// A chat message as delivered by `messageAdded` / `messageUpdated`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    pub id: String,
    #[serde(alias = "threadId")]
    pub channel_id: String,
    pub body: String,
    pub sender: MessageAuthor,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub edited_at: Option<DateTime<Utc>>,
}

/// Reference to a removed message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageDeletion {
    pub id: String,
    #[serde(alias = "threadId")]
    pub channel_id: String,
}

/// Transient "is typing" signal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TypingIndicator {
    #[serde(alias = "threadId")]
    pub channel_id: String,
    pub user: MessageAuthor,
    pub is_typing: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Reaction {
    pub id: String,
    pub message_id: String,
    #[serde(alias = "threadId")]
    pub channel_id: String,
    pub user_id: String,
    pub emoji: String,
    pub created_at: DateTime<Utc>,
}

/// One decoded event, tagged by kind. Not persisted by this layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "payload", rename_all = "snake_case")]
pub enum DeliveredEvent {
    MessageAdded(ChatMessage),
    MessageUpdated(ChatMessage),
    MessageDeleted(MessageDeletion),
    Typing(TypingIndicator),
    ReactionAdded(Reaction),
}

impl DeliveredEvent {
    #[must_use]
    pub fn kind(&self) -> EventKind {
        match self {
            Self::MessageAdded(_) => EventKind::MessageAdded,
            Self::MessageUpdated(_) => EventKind::MessageUpdated,
            Self::MessageDeleted(_) => EventKind::MessageDeleted,
            Self::Typing(_) => EventKind::Typing,
            Self::ReactionAdded(_) => EventKind::ReactionAdded,
        }
    }

    /// Channel the event belongs to, as reported by the server.
    #[must_use]
    pub fn channel_id(&self) -> &str {
        match self {
            Self::MessageAdded(m) | Self::MessageUpdated(m) => &m.channel_id,
            Self::MessageDeleted(d) => &d.channel_id,
            Self::Typing(t) => &t.channel_id,
            Self::ReactionAdded(r) => &r.channel_id,
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use {super::*, serde_json::json};

    #[test]
    fn dm_message_accepts_thread_id() {
        let msg: ChatMessage = serde_json::from_value(json!({
            "id": "m-1",
            "threadId": "t-1",
            "body": "see you at the meetup",
            "createdAt": "2026-03-01T18:30:00Z",
            "editedAt": null,
            "sender": {"id": "u-1", "displayName": "Sam"}
        }))
        .unwrap();
        assert_eq!(msg.channel_id, "t-1");
        assert!(msg.edited_at.is_none());
        assert!(msg.sender.avatar_url.is_none());
    }

    #[test]
    fn event_serializes_with_kind_tag() {
        let event = DeliveredEvent::Typing(TypingIndicator {
            channel_id: "c-1".into(),
            user: MessageAuthor {
                id: "u-2".into(),
                display_name: "Ari".into(),
                avatar_url: None,
            },
            is_typing: true,
        });
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["kind"], "typing");
        assert_eq!(value["payload"]["isTyping"], true);
        assert_eq!(event.kind(), EventKind::Typing);
        assert_eq!(event.channel_id(), "c-1");
    }

    #[test]
    fn reaction_requires_timestamp() {
        let result = serde_json::from_value::<Reaction>(json!({
            "id": "r-1",
            "messageId": "m-1",
            "channelId": "c-1",
            "userId": "u-1",
            "emoji": "🎉"
        }));
        assert!(result.is_err());
    }
}
