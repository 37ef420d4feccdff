//! Host-facing subscription handles.
//!
//! A host holds one [`ChannelSubscription`] per (channel kind, event kind)
//! it cares about and calls [`ChannelSubscription::update`] whenever its
//! inputs change, the way a UI re-renders. The handle starts, switches, or
//! stops its controller so that exactly one session runs per distinct
//! enabled channel id.

use std::sync::Arc;

use {rally_config::RealtimeConfig, tokio::sync::watch, tracing::debug};

use crate::{
    backoff::BackoffScheduler,
    cache::{CacheInvalidator, NoopInvalidator},
    controller::{ChannelSubscriptionController, Phase},
    dispatch::EventCallback,
    topic::{
        ChannelKind, MessageAdded, MessageDeleted, MessageUpdated, ReactionAdded, Topic, Typing,
    },
    transport::{TransportFactory, TransportProvider},
};

/// Shared dependencies of every subscription in a process.
#[derive(Clone)]
pub struct RealtimeContext {
    pub provider: Arc<TransportProvider>,
    pub invalidator: Arc<dyn CacheInvalidator>,
    pub backoff: BackoffScheduler,
}

impl RealtimeContext {
    pub fn new(
        provider: Arc<TransportProvider>,
        invalidator: Arc<dyn CacheInvalidator>,
        backoff: BackoffScheduler,
    ) -> Self {
        Self {
            provider,
            invalidator,
            backoff,
        }
    }

    /// Context using `factory` for the shared client and the configured
    /// backoff ladder. Invalidation signals are discarded until
    /// [`RealtimeContext::with_invalidator`] installs a sink.
    pub fn from_config(config: &RealtimeConfig, factory: Arc<dyn TransportFactory>) -> Self {
        Self::new(
            Arc::new(TransportProvider::new(factory)),
            Arc::new(NoopInvalidator),
            BackoffScheduler::from_config(&config.backoff),
        )
    }

    #[must_use]
    pub fn with_invalidator(mut self, invalidator: Arc<dyn CacheInvalidator>) -> Self {
        self.invalidator = invalidator;
        self
    }
}

/// Inputs of one [`ChannelSubscription::update`] call.
#[derive(Clone, Default)]
pub struct SubscribeParams {
    pub channel_id: Option<String>,
    pub enabled: bool,
    pub on_event: Option<EventCallback>,
}

impl SubscribeParams {
    /// Enabled params for `channel_id` with no callback.
    pub fn channel(channel_id: impl Into<String>) -> Self {
        Self {
            channel_id: Some(channel_id.into()),
            enabled: true,
            on_event: None,
        }
    }

    #[must_use]
    pub fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    #[must_use]
    pub fn on_event(mut self, callback: EventCallback) -> Self {
        self.on_event = Some(callback);
        self
    }

    /// The channel id to subscribe to, if the inputs call for a session.
    fn target(&self) -> Option<&str> {
        if !self.enabled {
            return None;
        }
        self.channel_id.as_deref().filter(|id| !id.is_empty())
    }
}

impl std::fmt::Debug for SubscribeParams {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubscribeParams")
            .field("channel_id", &self.channel_id)
            .field("enabled", &self.enabled)
            .field("on_event", &self.on_event.is_some())
            .finish()
    }
}

/// What the host reads back after an update.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubscriptionStatus {
    pub connected: bool,
}

/// One subscription bound to a host's lifetime. Dropping it stops the
/// session.
pub struct ChannelSubscription<T: Topic> {
    channel_kind: ChannelKind,
    controller: ChannelSubscriptionController<T>,
    active: Option<String>,
}

impl<T: Topic> ChannelSubscription<T> {
    pub fn new(ctx: &RealtimeContext, channel_kind: ChannelKind) -> Self {
        Self {
            channel_kind,
            controller: ChannelSubscriptionController::new(
                Arc::clone(&ctx.provider),
                Arc::clone(&ctx.invalidator),
                ctx.backoff.clone(),
            ),
            active: None,
        }
    }

    /// Reconcile the running session with `params`.
    ///
    /// Disabled params or a missing/empty channel id stop any session and
    /// never touch the transport. A new channel id starts a fresh session.
    /// An unchanged channel id keeps the running session; its callback was
    /// captured when the session started.
    pub fn update(&mut self, params: SubscribeParams) -> SubscriptionStatus {
        match params.target() {
            None => {
                if self.active.take().is_some() {
                    debug!(channel_kind = %self.channel_kind, event = %T::EVENT, "subscription disabled");
                }
                self.controller.stop();
            },
            Some(id) if self.active.as_deref() == Some(id) => {},
            Some(id) => {
                let id = id.to_owned();
                self.controller
                    .start(self.channel_kind, id.clone(), params.on_event);
                self.active = Some(id);
            },
        }
        self.status()
    }

    #[must_use]
    pub fn status(&self) -> SubscriptionStatus {
        SubscriptionStatus {
            connected: self.controller.connected(),
        }
    }

    #[must_use]
    pub fn connected(&self) -> bool {
        self.controller.connected()
    }

    #[must_use]
    pub fn watch_connected(&self) -> watch::Receiver<bool> {
        self.controller.watch_connected()
    }

    #[must_use]
    pub fn channel_id(&self) -> Option<&str> {
        self.active.as_deref()
    }

    #[must_use]
    pub fn phase(&self) -> Phase {
        self.controller.phase()
    }

    /// Stop the session explicitly. Dropping the handle does the same.
    pub fn stop(&mut self) {
        self.active = None;
        self.controller.stop();
    }
}

macro_rules! subscription_constructor {
    ($(#[$doc:meta])* $fn_name:ident, $kind:ident, $topic:ty) => {
        $(#[$doc])*
        #[must_use]
        pub fn $fn_name(ctx: &RealtimeContext) -> ChannelSubscription<$topic> {
            ChannelSubscription::new(ctx, ChannelKind::$kind)
        }
    };
}

subscription_constructor!(
    /// New messages in a direct-message thread.
    dm_message_added, Dm, MessageAdded
);
subscription_constructor!(dm_message_updated, Dm, MessageUpdated);
subscription_constructor!(dm_message_deleted, Dm, MessageDeleted);
subscription_constructor!(
    /// Typing indicators in a direct-message thread. Only useful with a
    /// callback.
    dm_typing, Dm, Typing
);
subscription_constructor!(dm_reaction_added, Dm, ReactionAdded);
subscription_constructor!(
    /// New messages in a group channel.
    group_message_added, Group, MessageAdded
);
subscription_constructor!(group_message_updated, Group, MessageUpdated);
subscription_constructor!(group_message_deleted, Group, MessageDeleted);
subscription_constructor!(group_typing, Group, Typing);
subscription_constructor!(group_reaction_added, Group, ReactionAdded);
