//! Realtime channel subscriptions for rally.
//!
//! Keeps at most one live GraphQL subscription per host handle, keyed by
//! channel kind, event kind, and channel id. Transport failures and stream
//! completions are retried on a fixed backoff ladder; every async
//! continuation is tied to a session id so stale work can never touch a
//! newer session. Decoded events go to a host callback or, by default, to
//! cache invalidation signals.

pub mod backoff;
pub mod cache;
pub mod controller;
pub mod dispatch;
pub mod documents;
pub mod error;
pub mod events;
pub mod hooks;
pub mod session;
pub mod state;
pub mod topic;
pub mod transport;

pub use {
    backoff::BackoffScheduler,
    cache::{BroadcastInvalidator, CacheInvalidator, CacheKey, CacheScope, NoopInvalidator},
    controller::{ChannelSubscriptionController, Phase},
    dispatch::EventCallback,
    error::{Error, Result},
    events::{
        ChatMessage, DeliveredEvent, MessageAuthor, MessageDeletion, Reaction, TypingIndicator,
    },
    hooks::{
        ChannelSubscription, RealtimeContext, SubscribeParams, SubscriptionStatus,
        dm_message_added, dm_message_deleted, dm_message_updated, dm_reaction_added, dm_typing,
        group_message_added, group_message_deleted, group_message_updated, group_reaction_added,
        group_typing,
    },
    session::SessionId,
    topic::{ChannelKind, EventKind, SubscriptionTopic, Topic},
    transport::{
        SubscriptionObserver, Transport, TransportFactory, TransportLease, TransportProvider,
        Unsubscribe,
    },
};
