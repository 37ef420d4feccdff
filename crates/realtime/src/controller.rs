//! The channel subscription controller.
//!
//! One controller owns at most one session at a time. A session acquires the
//! shared transport, opens one subscription, forwards clean results to its
//! [`EventDispatcher`], and on transport error, stream completion, or setup
//! failure marks the channel disconnected and retries on the backoff ladder.
//! Every continuation captures its [`SessionId`] and re-checks it under the
//! state lock, so `stop` (or a restart) disables all pending work at once.
//!
//! ```text
//! Idle ─► Connecting ─► Connected
//!            ▲   │          │
//!            │   ▼          ▼
//!         RetryScheduled ◄──┘        any ─► TornDown (stop)
//! ```
//!
//! The state lock is never held while calling into the transport, an
//! unsubscribe handle, or the host callback, so all of them may call back
//! into the controller.

use std::{
    marker::PhantomData,
    sync::{
        Arc, Mutex, MutexGuard, Weak,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};

use {
    rally_protocol::ExecutionResult,
    tokio::{sync::watch, task::JoinHandle, time::Instant},
    tracing::{debug, info, warn},
};

#[cfg(feature = "metrics")]
use rally_metrics::{counter, gauge, labels, realtime as rt_metrics};

use crate::{
    backoff::BackoffScheduler,
    cache::CacheInvalidator,
    dispatch::{EventCallback, EventDispatcher},
    error::{Error, Result},
    session::{Session, SessionGuard, SessionId},
    state::ConnectionState,
    topic::{ChannelKind, SubscriptionTopic, Topic},
    transport::{SubscriptionObserver, Transport, TransportLease, TransportProvider, Unsubscribe},
};

/// Lifecycle of the current session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Connecting,
    Connected,
    RetryScheduled,
    TornDown,
}

/// Why a session lost its stream.
#[derive(Debug)]
enum Disconnect {
    Error(Error),
    Completed,
    Setup(Error),
}

impl Disconnect {
    fn cause(&self) -> &'static str {
        match self {
            Self::Error(_) => "error",
            Self::Completed => "complete",
            Self::Setup(_) => "setup",
        }
    }
}

/// Orchestrates connect, retry, and teardown for one logical subscription.
///
/// Must be used from within a Tokio runtime: connection attempts and retry
/// timers run as spawned tasks.
pub struct ChannelSubscriptionController<T: Topic> {
    shared: Arc<Shared<T>>,
}

impl<T: Topic> ChannelSubscriptionController<T> {
    pub fn new(
        provider: Arc<TransportProvider>,
        invalidator: Arc<dyn CacheInvalidator>,
        backoff: BackoffScheduler,
    ) -> Self {
        Self {
            shared: Arc::new(Shared {
                provider,
                invalidator,
                backoff,
                connection: ConnectionState::new(),
                inner: Mutex::new(Inner::default()),
                _topic: PhantomData,
            }),
        }
    }

    /// Begin a fresh session for `channel_id`, tearing down any existing one.
    ///
    /// The attempt index resets to zero. `on_event`, when given, receives
    /// every decoded event of this session instead of the default cache
    /// invalidation.
    pub fn start(
        &self,
        channel_kind: ChannelKind,
        channel_id: impl Into<String>,
        on_event: Option<EventCallback>,
    ) -> SessionId {
        let topic = SubscriptionTopic::new(channel_kind, T::EVENT, channel_id);
        let dispatcher = Arc::new(EventDispatcher::new(
            topic.clone(),
            on_event,
            Arc::clone(&self.shared.invalidator),
        ));

        let (session, teardown) = {
            let mut inner = self.shared.lock();
            let teardown = inner.teardown();
            let id = inner.guard.begin();
            inner.session = Some(Session {
                id,
                topic: topic.clone(),
            });
            inner.attempt = 0;
            inner.phase = Phase::Idle;
            inner.dispatcher = Some(dispatcher);
            (id, teardown)
        };
        self.shared.connection.set(false);
        teardown.run();

        #[cfg(feature = "metrics")]
        counter!(rt_metrics::SUBSCRIPTIONS_STARTED_TOTAL, labels::EVENT => T::EVENT.as_str())
            .increment(1);
        debug!(topic = %topic, session = %session, "subscription session started");

        Shared::spawn_connect(&self.shared, session);
        session
    }

    /// Tear down the current session. Safe to call any number of times, and
    /// always leaves the controller in [`Phase::TornDown`].
    ///
    /// Invalidates pending async work, cancels a pending retry, clears the
    /// connected flag, runs the unsubscribe handle if one is held, and
    /// returns the transport lease. Unsubscribe failures are logged, never
    /// returned.
    pub fn stop(&self) {
        let teardown = {
            let mut inner = self.shared.lock();
            let teardown = inner.teardown();
            inner.guard.invalidate();
            if let Some(session) = inner.session.take() {
                debug!(topic = %session.topic, session = %session.id, "subscription session stopped");
            }
            inner.phase = Phase::TornDown;
            inner.dispatcher = None;
            teardown
        };
        self.shared.connection.set(false);
        teardown.run();
    }

    #[must_use]
    pub fn connected(&self) -> bool {
        self.shared.connection.get()
    }

    #[must_use]
    pub fn watch_connected(&self) -> watch::Receiver<bool> {
        self.shared.connection.subscribe()
    }

    #[must_use]
    pub fn phase(&self) -> Phase {
        self.shared.lock().phase
    }

    #[must_use]
    pub fn session(&self) -> Option<Session> {
        self.shared.lock().session.clone()
    }

    /// Index used for the next retry delay.
    #[must_use]
    pub fn attempt_index(&self) -> u32 {
        self.shared.lock().attempt
    }
}

impl<T: Topic> Drop for ChannelSubscriptionController<T> {
    fn drop(&mut self) {
        self.stop();
    }
}

struct Shared<T: Topic> {
    provider: Arc<TransportProvider>,
    invalidator: Arc<dyn CacheInvalidator>,
    backoff: BackoffScheduler,
    connection: ConnectionState,
    inner: Mutex<Inner<T>>,
    _topic: PhantomData<fn() -> T>,
}

struct Inner<T: Topic> {
    guard: SessionGuard,
    session: Option<Session>,
    phase: Phase,
    attempt: u32,
    dispatcher: Option<Arc<EventDispatcher<T>>>,
    retry: Option<JoinHandle<()>>,
    subscription: Option<ActiveSubscription>,
    /// Held from the first successful acquire until the session ends, so a
    /// controller waiting to retry still counts as a transport user.
    lease: Option<TransportLease>,
}

impl<T: Topic> Default for Inner<T> {
    fn default() -> Self {
        Self {
            guard: SessionGuard::new(),
            session: None,
            phase: Phase::Idle,
            attempt: 0,
            dispatcher: None,
            retry: None,
            subscription: None,
            lease: None,
        }
    }
}

impl<T: Topic> Inner<T> {
    fn is_current(&self, session: SessionId) -> bool {
        self.guard.is_current(session) && self.session.is_some()
    }

    fn topic(&self) -> Option<SubscriptionTopic> {
        self.session.as_ref().map(|s| s.topic.clone())
    }

    /// Detach the timer, subscription, and lease so they can be released
    /// after the lock is dropped.
    fn teardown(&mut self) -> Teardown {
        Teardown {
            retry: self.retry.take(),
            subscription: self.subscription.take(),
            lease: self.lease.take(),
        }
    }
}

struct Teardown {
    retry: Option<JoinHandle<()>>,
    subscription: Option<ActiveSubscription>,
    lease: Option<TransportLease>,
}

impl Teardown {
    fn run(self) {
        if let Some(timer) = self.retry {
            timer.abort();
        }
        if let Some(subscription) = self.subscription {
            subscription.release();
        }
        // Unsubscribe first; the lease goes last.
        drop(self.lease);
    }
}

/// A subscription opened on the shared transport.
struct ActiveSubscription {
    topic: SubscriptionTopic,
    unsubscribe: Unsubscribe,
    /// Whether the subscription was ever stored as the session's live one.
    stored: bool,
}

impl ActiveSubscription {
    fn release(self) {
        debug!(topic = %self.topic, stored = self.stored, "releasing subscription");
        #[cfg(feature = "metrics")]
        if self.stored {
            gauge!(rt_metrics::SUBSCRIPTIONS_ACTIVE).decrement(1.0);
        }
        if let Err(e) = self.unsubscribe.call() {
            warn!(topic = %self.topic, error = %e, "unsubscribe failed, ignoring");
        }
    }
}

impl<T: Topic> Shared<T> {
    fn lock(&self) -> MutexGuard<'_, Inner<T>> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn spawn_connect(this: &Arc<Self>, session: SessionId) {
        tokio::spawn(Arc::clone(this).connect(session));
    }

    async fn connect(self: Arc<Self>, session: SessionId) {
        let (topic, held) = {
            let mut inner = self.lock();
            if !inner.is_current(session) {
                return;
            }
            inner.phase = Phase::Connecting;
            let Some(topic) = inner.topic() else {
                return;
            };
            let held = inner.lease.as_ref().map(|lease| Arc::clone(lease.transport()));
            (topic, held)
        };

        let transport = match held {
            Some(transport) => transport,
            None => match self.acquire_for(session).await {
                Ok(Some(transport)) => transport,
                Ok(None) => {
                    debug!(topic = %topic, session = %session, "session superseded while acquiring transport");
                    return;
                },
                Err(e) => {
                    self.on_disconnect(session, Disconnect::Setup(e));
                    return;
                },
            },
        };

        let observer = Arc::new(SessionObserver::<T> {
            shared: Arc::downgrade(&self),
            session,
            finished: AtomicBool::new(false),
        });
        let unsubscribe =
            transport.subscribe(topic.payload(), Arc::clone(&observer) as Arc<dyn SubscriptionObserver>);
        let mut opened = ActiveSubscription {
            topic: topic.clone(),
            unsubscribe,
            stored: false,
        };
        debug!(topic = %topic, session = %session, "subscription opened");

        let discard = {
            let mut inner = self.lock();
            if !inner.is_current(session) || observer.finished.load(Ordering::Acquire) {
                Some(opened)
            } else {
                opened.stored = true;
                #[cfg(feature = "metrics")]
                gauge!(rt_metrics::SUBSCRIPTIONS_ACTIVE).increment(1.0);
                inner.subscription.replace(opened)
            }
        };
        if let Some(subscription) = discard {
            subscription.release();
        }
    }

    /// Take a lease for `session`. `None` when the session ended while the
    /// shared client was being acquired; the lease is returned right away.
    async fn acquire_for(
        &self,
        session: SessionId,
    ) -> Result<Option<Arc<dyn Transport>>> {
        let lease = self.provider.acquire().await?;
        let mut inner = self.lock();
        if !inner.is_current(session) {
            return Ok(None);
        }
        let transport = Arc::clone(lease.transport());
        if inner.lease.is_none() {
            inner.lease = Some(lease);
        }
        Ok(Some(transport))
    }

    fn on_next(&self, session: SessionId, result: ExecutionResult) {
        let dispatcher = {
            let mut inner = self.lock();
            if !inner.is_current(session) {
                #[cfg(feature = "metrics")]
                counter!(rt_metrics::STALE_CALLBACKS_DROPPED_TOTAL).increment(1);
                return;
            }
            if result.has_errors() {
                let messages: Vec<&str> = result
                    .errors
                    .iter()
                    .flatten()
                    .map(|e| e.message.as_str())
                    .collect();
                #[cfg(feature = "metrics")]
                counter!(rt_metrics::PAYLOAD_ERRORS_TOTAL, labels::EVENT => T::EVENT.as_str())
                    .increment(1);
                warn!(
                    topic = ?inner.topic(),
                    session = %session,
                    errors = ?messages,
                    "subscription returned GraphQL errors"
                );
                return;
            }
            inner.phase = Phase::Connected;
            if self.connection.set(true) {
                info!(topic = ?inner.topic(), session = %session, "subscription connected");
            }
            inner.dispatcher.clone()
        };

        match (dispatcher, result.data) {
            (Some(dispatcher), Some(data)) if !data.is_null() => dispatcher.handle(data),
            _ => debug!(session = %session, "subscription result without data"),
        }
    }

    fn on_disconnect(self: &Arc<Self>, session: SessionId, reason: Disconnect) {
        let (topic, attempt, delay, released) = {
            let mut inner = self.lock();
            if !inner.is_current(session) {
                #[cfg(feature = "metrics")]
                counter!(rt_metrics::STALE_CALLBACKS_DROPPED_TOTAL).increment(1);
                return;
            }
            self.connection.set(false);

            let attempt = inner.attempt;
            let delay = self.backoff.delay_for(attempt);
            inner.attempt = attempt.saturating_add(1);
            inner.phase = Phase::RetryScheduled;

            let timer = self.schedule_retry(session, delay);
            if let Some(previous) = inner.retry.replace(timer) {
                previous.abort();
            }
            (inner.topic(), attempt, delay, inner.subscription.take())
        };

        #[cfg(feature = "metrics")]
        counter!(
            rt_metrics::RETRIES_SCHEDULED_TOTAL,
            labels::EVENT => T::EVENT.as_str(),
            labels::CAUSE => reason.cause()
        )
        .increment(1);

        let delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX);
        match &reason {
            Disconnect::Error(e) | Disconnect::Setup(e) => warn!(
                topic = ?topic,
                session = %session,
                cause = reason.cause(),
                error = %e,
                attempt,
                delay_ms,
                "subscription disconnected, retry scheduled"
            ),
            Disconnect::Completed => info!(
                topic = ?topic,
                session = %session,
                cause = reason.cause(),
                attempt,
                delay_ms,
                "subscription stream completed, retry scheduled"
            ),
        }

        if let Some(subscription) = released {
            subscription.release();
        }
    }

    fn schedule_retry(self: &Arc<Self>, session: SessionId, delay: Duration) -> JoinHandle<()> {
        let deadline = Instant::now() + delay;
        let weak = Arc::downgrade(self);
        tokio::spawn(async move {
            tokio::time::sleep_until(deadline).await;
            if let Some(shared) = weak.upgrade() {
                shared.on_retry_due(session);
            }
        })
    }

    fn on_retry_due(self: &Arc<Self>, session: SessionId) {
        {
            let mut inner = self.lock();
            if !inner.is_current(session) || inner.phase != Phase::RetryScheduled {
                return;
            }
            // This task is the timer; detach rather than abort it.
            drop(inner.retry.take());
        }
        debug!(session = %session, "retry timer fired");
        Self::spawn_connect(self, session);
    }
}

/// Observer handed to the transport for one subscription of one session.
struct SessionObserver<T: Topic> {
    shared: Weak<Shared<T>>,
    session: SessionId,
    /// Set once `error` or `complete` arrived; later callbacks are ignored.
    finished: AtomicBool,
}

impl<T: Topic> SessionObserver<T> {
    fn finish(&self, reason: Disconnect) {
        if self.finished.swap(true, Ordering::AcqRel) {
            return;
        }
        if let Some(shared) = self.shared.upgrade() {
            shared.on_disconnect(self.session, reason);
        }
    }
}

impl<T: Topic> SubscriptionObserver for SessionObserver<T> {
    fn next(&self, result: ExecutionResult) {
        if self.finished.load(Ordering::Acquire) {
            return;
        }
        if let Some(shared) = self.shared.upgrade() {
            shared.on_next(self.session, result);
        }
    }

    fn error(&self, error: Error) {
        self.finish(Disconnect::Error(error));
    }

    fn complete(&self) {
        self.finish(Disconnect::Completed);
    }
}
