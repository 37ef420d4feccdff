//! Per-controller session numbering.
//!
//! Every async continuation (transport acquisition, observer callbacks,
//! retry timers) captures the [`SessionId`] that was current when it was
//! created and checks it again on resumption. Bumping the counter therefore
//! disables all of them at once without locks or explicit cancellation.

use crate::topic::SubscriptionTopic;

/// Identifier of one controller session. Strictly increasing, never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SessionId(u64);

impl SessionId {
    #[must_use]
    pub fn get(self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Monotonic counter owned by one controller.
#[derive(Debug, Default)]
pub struct SessionGuard {
    current: u64,
}

impl SessionGuard {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a new session. All previously issued ids become stale.
    pub fn begin(&mut self) -> SessionId {
        self.invalidate();
        SessionId(self.current)
    }

    /// Make every issued id stale without starting a new session.
    pub fn invalidate(&mut self) {
        self.current = self.current.wrapping_add(1);
    }

    #[must_use]
    pub fn current(&self) -> SessionId {
        SessionId(self.current)
    }

    #[must_use]
    pub fn is_current(&self, id: SessionId) -> bool {
        self.current == id.0
    }
}

/// A live (or retrying) subscription lifetime for one topic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub id: SessionId,
    pub topic: SubscriptionTopic,
}
