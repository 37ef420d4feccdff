//! Subscription documents, one per (channel kind, event kind) pair.
//!
//! DM documents take `$threadId`, group documents take `$channelId`. The root
//! field of each document is what [`crate::topic::TopicDescriptor::root_field`]
//! returns and is where the decoder looks for the payload.

use crate::topic::{ChannelKind, EventKind};

pub const DM_MESSAGE_ADDED: &str = r#"subscription DmMessageAdded($threadId: ID!) {
  dmMessageAdded(threadId: $threadId) {
    id
    threadId
    body
    createdAt
    editedAt
    sender { id displayName avatarUrl }
  }
}"#;

pub const DM_MESSAGE_UPDATED: &str = r#"subscription DmMessageUpdated($threadId: ID!) {
  dmMessageUpdated(threadId: $threadId) {
    id
    threadId
    body
    createdAt
    editedAt
    sender { id displayName avatarUrl }
  }
}"#;

pub const DM_MESSAGE_DELETED: &str = r#"subscription DmMessageDeleted($threadId: ID!) {
  dmMessageDeleted(threadId: $threadId) {
    id
    threadId
  }
}"#;

pub const DM_TYPING: &str = r#"subscription DmTyping($threadId: ID!) {
  dmTyping(threadId: $threadId) {
    threadId
    isTyping
    user { id displayName avatarUrl }
  }
}"#;

pub const DM_REACTION_ADDED: &str = r#"subscription DmReactionAdded($threadId: ID!) {
  dmReactionAdded(threadId: $threadId) {
    id
    messageId
    threadId
    userId
    emoji
    createdAt
  }
}"#;

pub const CHANNEL_MESSAGE_ADDED: &str = r#"subscription ChannelMessageAdded($channelId: ID!) {
  channelMessageAdded(channelId: $channelId) {
    id
    channelId
    body
    createdAt
    editedAt
    sender { id displayName avatarUrl }
  }
}"#;

pub const CHANNEL_MESSAGE_UPDATED: &str = r#"subscription ChannelMessageUpdated($channelId: ID!) {
  channelMessageUpdated(channelId: $channelId) {
    id
    channelId
    body
    createdAt
    editedAt
    sender { id displayName avatarUrl }
  }
}"#;

pub const CHANNEL_MESSAGE_DELETED: &str = r#"subscription ChannelMessageDeleted($channelId: ID!) {
  channelMessageDeleted(channelId: $channelId) {
    id
    channelId
  }
}"#;

pub const CHANNEL_TYPING: &str = r#"subscription ChannelTyping($channelId: ID!) {
  channelTyping(channelId: $channelId) {
    channelId
    isTyping
    user { id displayName avatarUrl }
  }
}"#;

pub const CHANNEL_REACTION_ADDED: &str = r#"subscription ChannelReactionAdded($channelId: ID!) {
  channelReactionAdded(channelId: $channelId) {
    id
    messageId
    channelId
    userId
    emoji
    createdAt
  }
}"#;

/// Look up the fixed document for a kind pair.
#[must_use]
pub fn document(channel: ChannelKind, event: EventKind) -> &'static str {
    match (channel, event) {
        (ChannelKind::Dm, EventKind::MessageAdded) => DM_MESSAGE_ADDED,
        (ChannelKind::Dm, EventKind::MessageUpdated) => DM_MESSAGE_UPDATED,
        (ChannelKind::Dm, EventKind::MessageDeleted) => DM_MESSAGE_DELETED,
        (ChannelKind::Dm, EventKind::Typing) => DM_TYPING,
        (ChannelKind::Dm, EventKind::ReactionAdded) => DM_REACTION_ADDED,
        (ChannelKind::Group, EventKind::MessageAdded) => CHANNEL_MESSAGE_ADDED,
        (ChannelKind::Group, EventKind::MessageUpdated) => CHANNEL_MESSAGE_UPDATED,
        (ChannelKind::Group, EventKind::MessageDeleted) => CHANNEL_MESSAGE_DELETED,
        (ChannelKind::Group, EventKind::Typing) => CHANNEL_TYPING,
        (ChannelKind::Group, EventKind::ReactionAdded) => CHANNEL_REACTION_ADDED,
    }
}
