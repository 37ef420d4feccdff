//! Metric name and label definitions.
//!
//! Centralizing these definitions keeps names consistent between the
//! controller, the transport, and dashboards.

/// Channel subscription controller metrics
pub mod realtime {
    /// Sessions started (every `start`, including topic switches)
    pub const SUBSCRIPTIONS_STARTED_TOTAL: &str = "rally_realtime_subscriptions_started_total";
    /// Controllers currently holding a live subscription
    pub const SUBSCRIPTIONS_ACTIVE: &str = "rally_realtime_subscriptions_active";
    /// Retries scheduled after a transport error, completion, or setup failure
    pub const RETRIES_SCHEDULED_TOTAL: &str = "rally_realtime_retries_scheduled_total";
    /// Events forwarded to a callback or the default invalidation path
    pub const EVENTS_DELIVERED_TOTAL: &str = "rally_realtime_events_delivered_total";
    /// `next` results carrying GraphQL errors
    pub const PAYLOAD_ERRORS_TOTAL: &str = "rally_realtime_payload_errors_total";
    /// Callbacks ignored because their session was superseded
    pub const STALE_CALLBACKS_DROPPED_TOTAL: &str =
        "rally_realtime_stale_callbacks_dropped_total";
    /// Payloads that could not be decoded into an event
    pub const DECODE_FAILURES_TOTAL: &str = "rally_realtime_decode_failures_total";
}

/// WebSocket transport metrics
pub mod websocket {
    /// Successful socket handshakes (initial and reconnects)
    pub const CONNECTIONS_TOTAL: &str = "rally_ws_connections_total";
    /// Reconnect attempts after the socket dropped
    pub const RECONNECTS_TOTAL: &str = "rally_ws_reconnects_total";
    /// Operations currently multiplexed over the socket
    pub const OPERATIONS_ACTIVE: &str = "rally_ws_operations_active";
    /// Frames received from the server
    pub const FRAMES_RECEIVED_TOTAL: &str = "rally_ws_frames_received_total";
}

/// Common label keys
pub mod labels {
    pub const EVENT: &str = "event";
    pub const CAUSE: &str = "cause";
}
