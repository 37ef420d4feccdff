//! Routes decoded events to the host callback or to default cache effects.

use std::{marker::PhantomData, sync::Arc};

use {serde_json::Value, tracing::warn};

#[cfg(feature = "metrics")]
use rally_metrics::{counter, labels, realtime as rt_metrics};

use crate::{
    cache::{CacheInvalidator, CacheKey},
    events::DeliveredEvent,
    topic::{SubscriptionTopic, Topic},
};

/// Host callback receiving every decoded event of a subscription.
pub type EventCallback = Arc<dyn Fn(DeliveredEvent) + Send + Sync>;

/// Cache keys touched by an event when no callback is installed.
///
/// Message lifecycle events mark the channel's message list, its unread
/// count, and the parent detail entry stale. Typing and reactions have no
/// default effect.
#[must_use]
pub fn default_invalidations(topic: &SubscriptionTopic, event: &DeliveredEvent) -> Vec<CacheKey> {
    if !event.kind().is_message_lifecycle() {
        return Vec::new();
    }
    let kind = topic.channel_kind;
    let id = topic.channel_id.as_str();
    vec![
        CacheKey::messages(kind, id),
        CacheKey::unread_count(kind, id),
        CacheKey::detail(kind, id),
    ]
}

/// Per-session dispatcher. Built on `start` and dropped on `stop`.
pub struct EventDispatcher<T: Topic> {
    topic: SubscriptionTopic,
    callback: Option<EventCallback>,
    invalidator: Arc<dyn CacheInvalidator>,
    _topic: PhantomData<fn() -> T>,
}

impl<T: Topic> EventDispatcher<T> {
    pub fn new(
        topic: SubscriptionTopic,
        callback: Option<EventCallback>,
        invalidator: Arc<dyn CacheInvalidator>,
    ) -> Self {
        Self {
            topic,
            callback,
            invalidator,
            _topic: PhantomData,
        }
    }

    #[must_use]
    pub fn topic(&self) -> &SubscriptionTopic {
        &self.topic
    }

    /// Decode `data` and route it. Undecodable payloads are logged and
    /// dropped; they never affect connection state.
    pub fn handle(&self, data: Value) {
        match T::decode(self.topic.channel_kind, data) {
            Ok(event) => self.dispatch(event),
            Err(e) => {
                #[cfg(feature = "metrics")]
                counter!(rt_metrics::DECODE_FAILURES_TOTAL, labels::EVENT => T::EVENT.as_str())
                    .increment(1);
                warn!(topic = %self.topic, error = %e, "dropping undecodable subscription payload");
            },
        }
    }

    /// Route an already decoded event. An explicit callback receives it
    /// exclusively; otherwise the kind-specific default runs.
    pub fn dispatch(&self, event: DeliveredEvent) {
        #[cfg(feature = "metrics")]
        counter!(rt_metrics::EVENTS_DELIVERED_TOTAL, labels::EVENT => T::EVENT.as_str())
            .increment(1);

        match &self.callback {
            Some(callback) => callback(event),
            None => {
                for key in default_invalidations(&self.topic, &event) {
                    self.invalidator.invalidate(&key);
                }
            },
        }
    }
}
