//! Cache invalidation signals for the default (callback-less) dispatch path.
//!
//! This layer never reads the cache; it only tells the data-fetching layer
//! which entries went stale.

use {serde::Serialize, tokio::sync::broadcast};

use crate::topic::ChannelKind;

/// Which cached query a key refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CacheScope {
    /// Paginated message list of a channel.
    Messages,
    /// Unread badge count of a channel.
    UnreadCount,
    /// Channel detail (last message preview, member list, ...).
    Detail,
}

impl CacheScope {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Messages => "messages",
            Self::UnreadCount => "unread_count",
            Self::Detail => "detail",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct CacheKey {
    pub channel_kind: ChannelKind,
    pub scope: CacheScope,
    pub channel_id: String,
}

impl CacheKey {
    pub fn messages(channel_kind: ChannelKind, channel_id: impl Into<String>) -> Self {
        Self::new(channel_kind, CacheScope::Messages, channel_id)
    }

    pub fn unread_count(channel_kind: ChannelKind, channel_id: impl Into<String>) -> Self {
        Self::new(channel_kind, CacheScope::UnreadCount, channel_id)
    }

    pub fn detail(channel_kind: ChannelKind, channel_id: impl Into<String>) -> Self {
        Self::new(channel_kind, CacheScope::Detail, channel_id)
    }

    fn new(channel_kind: ChannelKind, scope: CacheScope, channel_id: impl Into<String>) -> Self {
        Self {
            channel_kind,
            scope,
            channel_id: channel_id.into(),
        }
    }
}

impl std::fmt::Display for CacheKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}:{}:{}",
            self.channel_kind,
            self.scope.as_str(),
            self.channel_id
        )
    }
}

/// Sink for invalidation signals. The data-fetching layer provides the
/// concrete implementation.
pub trait CacheInvalidator: Send + Sync {
    fn invalidate(&self, key: &CacheKey);
}

/// Discards every signal.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopInvalidator;

impl CacheInvalidator for NoopInvalidator {
    fn invalidate(&self, _key: &CacheKey) {}
}

/// Fans invalidation keys out to any number of listeners.
#[derive(Debug, Clone)]
pub struct BroadcastInvalidator {
    tx: broadcast::Sender<CacheKey>,
}

impl BroadcastInvalidator {
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<CacheKey> {
        self.tx.subscribe()
    }
}

impl Default for BroadcastInvalidator {
    fn default() -> Self {
        Self::new(256)
    }
}

impl CacheInvalidator for BroadcastInvalidator {
    fn invalidate(&self, key: &CacheKey) {
        // No listeners is fine: nothing is cached yet.
        let _ = self.tx.send(key.clone());
    }
}
