//! Transport contract and the shared client provider.
//!
//! The transport opens one logical subscription per `subscribe` call and
//! reports results through a [`SubscriptionObserver`]. A single transport
//! client is shared by every controller in the process; the
//! [`TransportProvider`] creates it lazily and counts live users.

use std::sync::{
    Arc, Mutex, MutexGuard,
    atomic::{AtomicUsize, Ordering},
};

use {
    async_trait::async_trait,
    rally_protocol::{ExecutionResult, SubscribePayload},
    tokio::sync::OnceCell,
    tracing::{debug, info},
};

use crate::error::{Error, Result};

/// Receives the results of one subscription. Called by the transport at
/// arbitrary times from its own tasks.
pub trait SubscriptionObserver: Send + Sync {
    fn next(&self, result: ExecutionResult);
    fn error(&self, error: Error);
    fn complete(&self);
}

/// Handle that tears down one subscription. Consumed on use, so it can run
/// at most once.
#[must_use = "dropping an Unsubscribe leaves the subscription running"]
pub struct Unsubscribe(Box<dyn FnOnce() -> Result<()> + Send>);

impl Unsubscribe {
    pub fn new(f: impl FnOnce() -> Result<()> + Send + 'static) -> Self {
        Self(Box::new(f))
    }

    /// A handle for subscriptions that hold no resources.
    pub fn noop() -> Self {
        Self::new(|| Ok(()))
    }

    pub fn call(self) -> Result<()> {
        (self.0)()
    }
}

impl std::fmt::Debug for Unsubscribe {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Unsubscribe")
    }
}

/// A multiplexed connection able to open subscription streams.
pub trait Transport: Send + Sync {
    fn subscribe(
        &self,
        payload: SubscribePayload,
        observer: Arc<dyn SubscriptionObserver>,
    ) -> Unsubscribe;
}

/// Builds the shared transport client. Called at most once per successful
/// initialization.
#[async_trait]
pub trait TransportFactory: Send + Sync {
    async fn connect(&self) -> Result<Arc<dyn Transport>>;
}

/// Process-wide owner of the shared transport client.
///
/// `acquire` initializes the client on first use (concurrent callers wait
/// for the same initialization) and hands out [`TransportLease`]s. A failed
/// initialization leaves the provider empty so the next `acquire` tries
/// again.
pub struct TransportProvider {
    factory: Arc<dyn TransportFactory>,
    client: Mutex<Arc<OnceCell<Arc<dyn Transport>>>>,
    live: Arc<AtomicUsize>,
}

impl TransportProvider {
    pub fn new(factory: Arc<dyn TransportFactory>) -> Self {
        Self {
            factory,
            client: Mutex::new(Arc::new(OnceCell::new())),
            live: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// A provider around an already connected transport.
    pub fn ready(transport: Arc<dyn Transport>) -> Self {
        let factory = Arc::new(Prebuilt(Arc::clone(&transport)));
        Self {
            factory,
            client: Mutex::new(Arc::new(OnceCell::new_with(Some(transport)))),
            live: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Get the shared client, creating it if needed.
    ///
    /// If `shutdown` reset the provider while this call was initializing,
    /// the client it built is adopted as the new shared one, unless another
    /// caller already installed a client, which then wins.
    pub async fn acquire(&self) -> Result<TransportLease> {
        let cell = Arc::clone(&*self.lock_client());
        let initialized = cell
            .get_or_try_init(|| async {
                debug!("initializing shared transport client");
                let transport = self.factory.connect().await?;
                info!("shared transport client ready");
                Ok::<_, Error>(transport)
            })
            .await?;

        // Counted under the lock so `shutdown` sees every handed-out lease.
        let mut current = self.lock_client();
        let transport = if Arc::ptr_eq(&*current, &cell) {
            Arc::clone(initialized)
        } else if let Some(existing) = current.get() {
            Arc::clone(existing)
        } else {
            debug!("provider reset during initialization, adopting new client");
            *current = Arc::clone(&cell);
            Arc::clone(initialized)
        };
        self.live.fetch_add(1, Ordering::AcqRel);
        drop(current);

        Ok(TransportLease {
            transport,
            live: Arc::clone(&self.live),
        })
    }

    fn lock_client(&self) -> MutexGuard<'_, Arc<OnceCell<Arc<dyn Transport>>>> {
        self.client.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Number of leases currently held.
    #[must_use]
    pub fn live_leases(&self) -> usize {
        self.live.load(Ordering::Acquire)
    }

    #[must_use]
    pub fn is_initialized(&self) -> bool {
        self.lock_client().initialized()
    }

    /// Forget the shared client if nobody is using it. The next `acquire`
    /// creates a fresh one. Returns whether the client was released.
    pub fn shutdown(&self) -> bool {
        let mut client = self.lock_client();
        let live = self.live.load(Ordering::Acquire);
        if live > 0 {
            debug!(live, "transport still in use, not shutting down");
            return false;
        }
        let released = client.initialized();
        *client = Arc::new(OnceCell::new());
        if released {
            info!("shared transport client released");
        }
        released
    }
}

struct Prebuilt(Arc<dyn Transport>);

#[async_trait]
impl TransportFactory for Prebuilt {
    async fn connect(&self) -> Result<Arc<dyn Transport>> {
        Ok(Arc::clone(&self.0))
    }
}

/// A counted reference to the shared client. Dropping it releases the count.
pub struct TransportLease {
    transport: Arc<dyn Transport>,
    live: Arc<AtomicUsize>,
}

impl TransportLease {
    #[must_use]
    pub fn transport(&self) -> &Arc<dyn Transport> {
        &self.transport
    }
}

impl Drop for TransportLease {
    fn drop(&mut self) {
        self.live.fetch_sub(1, Ordering::AcqRel);
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use std::sync::atomic::AtomicU32;

    use super::*;

    struct NullTransport;

    impl Transport for NullTransport {
        fn subscribe(
            &self,
            _payload: SubscribePayload,
            _observer: Arc<dyn SubscriptionObserver>,
        ) -> Unsubscribe {
            Unsubscribe::noop()
        }
    }

    /// Fails the first `fail_first` connects, then succeeds.
    struct FlakyFactory {
        calls: AtomicU32,
        fail_first: u32,
    }

    #[async_trait]
    impl TransportFactory for FlakyFactory {
        async fn connect(&self) -> Result<Arc<dyn Transport>> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            if n < self.fail_first {
                return Err(Error::unavailable("endpoint down"));
            }
            Ok(Arc::new(NullTransport))
        }
    }

    fn flaky(fail_first: u32) -> Arc<FlakyFactory> {
        Arc::new(FlakyFactory {
            calls: AtomicU32::new(0),
            fail_first,
        })
    }

    #[tokio::test]
    async fn acquire_shares_one_client() {
        let factory = flaky(0);
        let provider = TransportProvider::new(factory.clone());
        let a = provider.acquire().await.unwrap();
        let b = provider.acquire().await.unwrap();
        assert!(Arc::ptr_eq(a.transport(), b.transport()));
        assert_eq!(factory.calls.load(Ordering::SeqCst), 1);
        assert_eq!(provider.live_leases(), 2);
        drop(a);
        assert_eq!(provider.live_leases(), 1);
    }

    #[tokio::test]
    async fn failed_init_is_retried_on_next_acquire() {
        let factory = flaky(1);
        let provider = TransportProvider::new(factory.clone());
        assert!(provider.acquire().await.is_err());
        assert!(!provider.is_initialized());
        assert_eq!(provider.live_leases(), 0);
        assert!(provider.acquire().await.is_ok());
        assert_eq!(factory.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn shutdown_waits_for_leases() {
        let factory = flaky(0);
        let provider = TransportProvider::new(factory.clone());
        let lease = provider.acquire().await.unwrap();
        assert!(!provider.shutdown());
        drop(lease);
        assert!(provider.shutdown());
        assert!(!provider.is_initialized());

        let _again = provider.acquire().await.unwrap();
        assert_eq!(factory.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn ready_provider_skips_factory() {
        let provider = TransportProvider::ready(Arc::new(NullTransport));
        assert!(provider.is_initialized());
        assert!(provider.acquire().await.is_ok());
    }

    /// Connects only after the test opens the gate.
    struct GatedFactory {
        calls: AtomicU32,
        gate: tokio::sync::Notify,
    }

    #[async_trait]
    impl TransportFactory for GatedFactory {
        async fn connect(&self) -> Result<Arc<dyn Transport>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.gate.notified().await;
            Ok(Arc::new(NullTransport))
        }
    }

    #[tokio::test]
    async fn shutdown_during_init_keeps_one_client() {
        let factory = Arc::new(GatedFactory {
            calls: AtomicU32::new(0),
            gate: tokio::sync::Notify::new(),
        });
        let provider = Arc::new(TransportProvider::new(factory.clone()));

        let pending = tokio::spawn({
            let provider = Arc::clone(&provider);
            async move { provider.acquire().await.map(|lease| Arc::clone(lease.transport())) }
        });
        while factory.calls.load(Ordering::SeqCst) == 0 {
            tokio::task::yield_now().await;
        }

        // Nothing to release yet, but the provider is reset all the same.
        assert!(!provider.shutdown());
        factory.gate.notify_one();
        let first = pending.await.unwrap().unwrap();

        assert!(provider.is_initialized());
        let again = provider.acquire().await.unwrap();
        assert!(Arc::ptr_eq(&first, again.transport()));
        assert_eq!(factory.calls.load(Ordering::SeqCst), 1);
        assert_eq!(provider.live_leases(), 1);
    }

    #[test]
    fn unsubscribe_runs_closure_once() {
        let hits = Arc::new(AtomicU32::new(0));
        let counter = hits.clone();
        let handle = Unsubscribe::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });
        handle.call().unwrap();
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }
}
