//! Topic identification and per-topic adapters.
//!
//! A [`SubscriptionTopic`] names one logical stream. A [`TopicDescriptor`]
//! knows how to turn a channel id into a subscription payload, and the
//! [`Topic`] trait ties an event kind to its payload type so one generic
//! controller can serve all five event kinds.

use {
    rally_protocol::SubscribePayload,
    serde::{Deserialize, Serialize, de::DeserializeOwned},
    serde_json::Value,
};

use crate::{
    documents,
    error::{Error, Result},
    events::{ChatMessage, DeliveredEvent, MessageDeletion, Reaction, TypingIndicator},
};

/// Direct-message thread or group/event channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelKind {
    Dm,
    Group,
}

impl ChannelKind {
    pub const ALL: [Self; 2] = [Self::Dm, Self::Group];

    /// Name of the variable carrying the channel identifier.
    #[must_use]
    pub fn variable_name(self) -> &'static str {
        match self {
            Self::Dm => "threadId",
            Self::Group => "channelId",
        }
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Dm => "dm",
            Self::Group => "group",
        }
    }
}

impl std::fmt::Display for ChannelKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ChannelKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "dm" | "thread" => Ok(Self::Dm),
            "group" | "channel" => Ok(Self::Group),
            other => Err(format!("unknown channel kind '{other}' (expected dm or group)")),
        }
    }
}

/// The five realtime event streams available per channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    MessageAdded,
    MessageUpdated,
    MessageDeleted,
    Typing,
    ReactionAdded,
}

impl EventKind {
    pub const ALL: [Self; 5] = [
        Self::MessageAdded,
        Self::MessageUpdated,
        Self::MessageDeleted,
        Self::Typing,
        Self::ReactionAdded,
    ];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::MessageAdded => "message_added",
            Self::MessageUpdated => "message_updated",
            Self::MessageDeleted => "message_deleted",
            Self::Typing => "typing",
            Self::ReactionAdded => "reaction_added",
        }
    }

    /// Message lifecycle events, the only ones with default cache effects.
    #[must_use]
    pub fn is_message_lifecycle(self) -> bool {
        matches!(
            self,
            Self::MessageAdded | Self::MessageUpdated | Self::MessageDeleted
        )
    }
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for EventKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|k| k.as_str() == s.replace('-', "_"))
            .ok_or_else(|| format!("unknown event kind '{s}'"))
    }
}

/// Static description of one (channel kind, event kind) stream: document,
/// variable builder, and the root field the decoder reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TopicDescriptor {
    pub channel_kind: ChannelKind,
    pub event_kind: EventKind,
}

impl TopicDescriptor {
    #[must_use]
    pub const fn new(channel_kind: ChannelKind, event_kind: EventKind) -> Self {
        Self {
            channel_kind,
            event_kind,
        }
    }

    #[must_use]
    pub fn document(&self) -> &'static str {
        documents::document(self.channel_kind, self.event_kind)
    }

    #[must_use]
    pub fn variables(&self, channel_id: &str) -> Value {
        let mut vars = serde_json::Map::new();
        vars.insert(
            self.channel_kind.variable_name().to_owned(),
            Value::String(channel_id.to_owned()),
        );
        Value::Object(vars)
    }

    #[must_use]
    pub fn root_field(&self) -> &'static str {
        match (self.channel_kind, self.event_kind) {
            (ChannelKind::Dm, EventKind::MessageAdded) => "dmMessageAdded",
            (ChannelKind::Dm, EventKind::MessageUpdated) => "dmMessageUpdated",
            (ChannelKind::Dm, EventKind::MessageDeleted) => "dmMessageDeleted",
            (ChannelKind::Dm, EventKind::Typing) => "dmTyping",
            (ChannelKind::Dm, EventKind::ReactionAdded) => "dmReactionAdded",
            (ChannelKind::Group, EventKind::MessageAdded) => "channelMessageAdded",
            (ChannelKind::Group, EventKind::MessageUpdated) => "channelMessageUpdated",
            (ChannelKind::Group, EventKind::MessageDeleted) => "channelMessageDeleted",
            (ChannelKind::Group, EventKind::Typing) => "channelTyping",
            (ChannelKind::Group, EventKind::ReactionAdded) => "channelReactionAdded",
        }
    }

    /// Pull the root field out of `data` and deserialize it.
    pub fn extract<P: DeserializeOwned>(&self, data: Value) -> Result<P> {
        let field = self.root_field();
        let Value::Object(mut map) = data else {
            return Err(Error::MissingField { field });
        };
        match map.remove(field) {
            Some(Value::Null) | None => Err(Error::MissingField { field }),
            Some(inner) => Ok(serde_json::from_value(inner)?),
        }
    }
}

/// Identifies exactly one logical stream.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SubscriptionTopic {
    pub channel_kind: ChannelKind,
    pub event_kind: EventKind,
    pub channel_id: String,
}

impl SubscriptionTopic {
    pub fn new(channel_kind: ChannelKind, event_kind: EventKind, channel_id: impl Into<String>) -> Self {
        Self {
            channel_kind,
            event_kind,
            channel_id: channel_id.into(),
        }
    }

    #[must_use]
    pub fn descriptor(&self) -> TopicDescriptor {
        TopicDescriptor::new(self.channel_kind, self.event_kind)
    }

    /// The `subscribe` payload for this topic.
    #[must_use]
    pub fn payload(&self) -> SubscribePayload {
        let descriptor = self.descriptor();
        SubscribePayload::new(descriptor.document(), descriptor.variables(&self.channel_id))
    }
}

impl std::fmt::Display for SubscriptionTopic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}/{}", self.channel_kind, self.event_kind, self.channel_id)
    }
}

/// Binds an event kind to its payload type.
///
/// Implemented by the five marker types below; the controller is generic
/// over this trait so the retry/session machinery exists exactly once.
pub trait Topic: Send + Sync + 'static {
    type Payload: DeserializeOwned + Send + 'static;

    const EVENT: EventKind;

    fn into_event(payload: Self::Payload) -> DeliveredEvent;

    /// Decode the `data` member of an execution result.
    fn decode(channel_kind: ChannelKind, data: Value) -> Result<DeliveredEvent> {
        TopicDescriptor::new(channel_kind, Self::EVENT)
            .extract::<Self::Payload>(data)
            .map(Self::into_event)
    }
}

macro_rules! topic_marker {
    ($(#[$doc:meta])* $name:ident, $payload:ty, $kind:ident, $variant:ident) => {
        $(#[$doc])*
        #[derive(Debug, Clone, Copy, Default)]
        pub struct $name;

        impl Topic for $name {
            type Payload = $payload;

            const EVENT: EventKind = EventKind::$kind;

            fn into_event(payload: Self::Payload) -> DeliveredEvent {
                DeliveredEvent::$variant(payload)
            }
        }
    };
}

topic_marker!(
    /// New message posted.
    MessageAdded, ChatMessage, MessageAdded, MessageAdded
);
topic_marker!(
    /// Message body edited.
    MessageUpdated, ChatMessage, MessageUpdated, MessageUpdated
);
topic_marker!(
    /// Message removed.
    MessageDeleted, MessageDeletion, MessageDeleted, MessageDeleted
);
topic_marker!(
    /// Someone started or stopped typing.
    Typing, TypingIndicator, Typing, Typing
);
topic_marker!(
    /// Reaction attached to a message.
    ReactionAdded, Reaction, ReactionAdded, ReactionAdded
);
