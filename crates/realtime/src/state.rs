//! Connection health flag exposed to the host.

use tokio::sync::watch;

/// Boolean "stream is healthy" signal, one per controller.
///
/// Readable synchronously with [`ConnectionState::get`]; hosts that want
/// change notifications can hold a [`watch::Receiver`].
#[derive(Debug)]
pub struct ConnectionState {
    tx: watch::Sender<bool>,
}

impl Default for ConnectionState {
    fn default() -> Self {
        Self::new()
    }
}

impl ConnectionState {
    #[must_use]
    pub fn new() -> Self {
        let (tx, _) = watch::channel(false);
        Self { tx }
    }

    /// Set the flag. Returns `true` when the value actually changed; watchers
    /// are only woken on change.
    pub fn set(&self, connected: bool) -> bool {
        self.tx.send_if_modified(|current| {
            if *current == connected {
                false
            } else {
                *current = connected;
                true
            }
        })
    }

    #[must_use]
    pub fn get(&self) -> bool {
        *self.tx.borrow()
    }

    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.tx.subscribe()
    }
}
