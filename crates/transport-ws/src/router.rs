use std::{
    collections::HashMap,
    sync::{Arc, Mutex, MutexGuard},
};

use {
    rally_protocol::ServerMessage,
    rally_realtime::{Error as RealtimeError, SubscriptionObserver},
    tracing::{debug, trace},
};

#[cfg(feature = "metrics")]
use rally_metrics::{gauge, websocket as ws_metrics};

/// Maps operation ids multiplexed over one socket to their observers.
///
/// Observers are always invoked after the routing table lock is released,
/// so they may subscribe or unsubscribe from within a callback.
#[derive(Default)]
pub struct OperationRouter {
    routes: Mutex<HashMap<String, Arc<dyn SubscriptionObserver>>>,
}

impl OperationRouter {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn routes(&self) -> MutexGuard<'_, HashMap<String, Arc<dyn SubscriptionObserver>>> {
        self.routes.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn insert(&self, id: impl Into<String>, observer: Arc<dyn SubscriptionObserver>) {
        let mut routes = self.routes();
        routes.insert(id.into(), observer);
        record_active(routes.len());
    }

    pub fn remove(&self, id: &str) -> Option<Arc<dyn SubscriptionObserver>> {
        let mut routes = self.routes();
        let removed = routes.remove(id);
        record_active(routes.len());
        removed
    }

    #[must_use]
    pub fn contains(&self, id: &str) -> bool {
        self.routes().contains_key(id)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.routes().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.routes().is_empty()
    }

    /// Deliver an operation frame to its observer.
    ///
    /// `error` and `complete` end the operation and drop its route. Returns
    /// `false` when the frame has no operation id or the id is unknown.
    pub fn route(&self, message: ServerMessage) -> bool {
        match message {
            ServerMessage::Next { id, payload } => {
                let Some(observer) = self.routes().get(&id).cloned() else {
                    trace!(id = %id, "next for unknown operation");
                    return false;
                };
                observer.next(payload);
                true
            },
            ServerMessage::Error { id, payload } => {
                let Some(observer) = self.remove(&id) else {
                    return false;
                };
                let messages: Vec<&str> = payload.iter().map(|e| e.message.as_str()).collect();
                debug!(id = %id, errors = ?messages, "operation failed");
                observer.error(RealtimeError::transport(messages.join("; ")));
                true
            },
            ServerMessage::Complete { id } => {
                let Some(observer) = self.remove(&id) else {
                    return false;
                };
                debug!(id = %id, "operation completed by server");
                observer.complete();
                true
            },
            _ => false,
        }
    }

    /// Fail every open operation, e.g. after the socket dropped.
    pub fn fail_all(&self, reason: &str) -> usize {
        let drained: Vec<_> = {
            let mut routes = self.routes();
            let drained = routes.drain().map(|(_, observer)| observer).collect();
            record_active(0);
            drained
        };
        for observer in &drained {
            observer.error(RealtimeError::transport(reason));
        }
        drained.len()
    }
}

#[cfg(feature = "metrics")]
fn record_active(count: usize) {
    gauge!(ws_metrics::OPERATIONS_ACTIVE).set(count as f64);
}

#[cfg(not(feature = "metrics"))]
fn record_active(_count: usize) {}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use {
        super::*,
        rally_protocol::{ExecutionResult, GraphQLError},
        serde_json::json,
    };

    #[derive(Default)]
    struct Recorder {
        log: Mutex<Vec<String>>,
    }

    impl SubscriptionObserver for Recorder {
        fn next(&self, result: ExecutionResult) {
            self.log
                .lock()
                .unwrap()
                .push(format!("next:{}", result.data.unwrap_or_default()));
        }

        fn error(&self, error: RealtimeError) {
            self.log.lock().unwrap().push(format!("error:{error}"));
        }

        fn complete(&self) {
            self.log.lock().unwrap().push("complete".into());
        }
    }

    fn entries(recorder: &Recorder) -> Vec<String> {
        recorder.log.lock().unwrap().clone()
    }

    #[test]
    fn next_keeps_route_and_complete_drops_it() {
        let router = OperationRouter::new();
        let recorder = Arc::new(Recorder::default());
        router.insert("op-1", recorder.clone());

        assert!(router.route(ServerMessage::Next {
            id: "op-1".into(),
            payload: ExecutionResult::data(json!({"n": 1})),
        }));
        assert!(router.contains("op-1"));

        assert!(router.route(ServerMessage::Complete { id: "op-1".into() }));
        assert!(router.is_empty());
        assert_eq!(entries(&recorder), vec![r#"next:{"n":1}"#, "complete"]);
    }

    #[test]
    fn error_frame_joins_messages() {
        let router = OperationRouter::new();
        let recorder = Arc::new(Recorder::default());
        router.insert("op-2", recorder.clone());

        router.route(ServerMessage::Error {
            id: "op-2".into(),
            payload: vec![GraphQLError::new("forbidden"), GraphQLError::new("try later")],
        });
        assert_eq!(entries(&recorder), vec![
            "error:transport error: forbidden; try later"
        ]);
        assert!(!router.contains("op-2"));
    }

    #[test]
    fn unknown_ids_and_connection_frames_are_not_routed() {
        let router = OperationRouter::new();
        assert!(!router.route(ServerMessage::Complete { id: "ghost".into() }));
        assert!(!router.route(ServerMessage::Ping { payload: None }));
    }

    #[test]
    fn fail_all_drains_every_route() {
        let router = OperationRouter::new();
        let a = Arc::new(Recorder::default());
        let b = Arc::new(Recorder::default());
        router.insert("a", a.clone());
        router.insert("b", b.clone());

        assert_eq!(router.fail_all("socket closed"), 2);
        assert!(router.is_empty());
        assert_eq!(entries(&a), vec!["error:transport error: socket closed"]);
        assert_eq!(entries(&b), vec!["error:transport error: socket closed"]);
    }
}
