//! GraphQL-over-WebSocket protocol definitions.
//!
//! Implements the `graphql-transport-ws` subprotocol. All communication uses
//! JSON text frames tagged by `type`.
//!
//! Frame types:
//! - `ClientMessage` - client → server (`connection_init`, `subscribe`, `complete`, `ping`, `pong`)
//! - `ServerMessage` - server → client (`connection_ack`, `next`, `error`, `complete`, `ping`, `pong`)

use serde::{Deserialize, Serialize};

// ── Constants ────────────────────────────────────────────────────────────────

/// Value sent in the `Sec-WebSocket-Protocol` header.
pub const SUBPROTOCOL: &str = "graphql-transport-ws";
pub const ACK_TIMEOUT_MS: u64 = 10_000; // 10s
pub const KEEPALIVE_INTERVAL_MS: u64 = 30_000; // 30s
pub const MAX_PAYLOAD_BYTES: usize = 524_288; // 512 KB

// ── Close codes ──────────────────────────────────────────────────────────────

pub mod close_codes {
    pub const BAD_REQUEST: u16 = 4400;
    pub const UNAUTHORIZED: u16 = 4401;
    pub const FORBIDDEN: u16 = 4403;
    pub const SUBSCRIBER_ALREADY_EXISTS: u16 = 4409;
    pub const TOO_MANY_INIT_REQUESTS: u16 = 4429;
    pub const CONNECTION_INIT_TIMEOUT: u16 = 4408;
    pub const INTERNAL_CLIENT_ERROR: u16 = 4499;

    /// Close codes after which reconnecting with the same credentials is
    /// pointless.
    #[must_use]
    pub fn is_terminal(code: u16) -> bool {
        matches!(code, UNAUTHORIZED | FORBIDDEN | SUBSCRIBER_ALREADY_EXISTS)
    }
}

// ── Operation payloads ───────────────────────────────────────────────────────

/// Body of a `subscribe` frame: one GraphQL operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubscribePayload {
    pub query: String,
    #[serde(default)]
    pub variables: serde_json::Value,
    #[serde(rename = "operationName", skip_serializing_if = "Option::is_none")]
    pub operation_name: Option<String>,
}

impl SubscribePayload {
    pub fn new(query: impl Into<String>, variables: serde_json::Value) -> Self {
        Self {
            query: query.into(),
            variables,
            operation_name: None,
        }
    }
}

/// A single GraphQL error as reported by the server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphQLError {
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<Vec<serde_json::Value>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extensions: Option<serde_json::Value>,
}

impl GraphQLError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            path: None,
            extensions: None,
        }
    }
}

impl std::fmt::Display for GraphQLError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.message)
    }
}

/// Result of one execution step, carried by a `next` frame.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExecutionResult {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub errors: Option<Vec<GraphQLError>>,
}

impl ExecutionResult {
    pub fn data(data: serde_json::Value) -> Self {
        Self {
            data: Some(data),
            errors: None,
        }
    }

    pub fn errors(errors: Vec<GraphQLError>) -> Self {
        Self {
            data: None,
            errors: Some(errors),
        }
    }

    /// True when the server attached at least one GraphQL error.
    #[must_use]
    pub fn has_errors(&self) -> bool {
        self.errors.as_ref().is_some_and(|e| !e.is_empty())
    }
}

// ── Frames ───────────────────────────────────────────────────────────────────

/// Client → server frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    ConnectionInit {
        #[serde(skip_serializing_if = "Option::is_none")]
        payload: Option<serde_json::Value>,
    },
    Subscribe {
        id: String,
        payload: SubscribePayload,
    },
    Complete {
        id: String,
    },
    Ping {
        #[serde(skip_serializing_if = "Option::is_none")]
        payload: Option<serde_json::Value>,
    },
    Pong {
        #[serde(skip_serializing_if = "Option::is_none")]
        payload: Option<serde_json::Value>,
    },
}

impl ClientMessage {
    /// Build the `connection_init` frame, carrying a bearer token when one is
    /// configured.
    pub fn init(token: Option<&str>) -> Self {
        Self::ConnectionInit {
            payload: token.map(|t| serde_json::json!({ "authorization": format!("Bearer {t}") })),
        }
    }

    pub fn to_text(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

/// Server → client frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    ConnectionAck {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        payload: Option<serde_json::Value>,
    },
    Next {
        id: String,
        payload: ExecutionResult,
    },
    Error {
        id: String,
        payload: Vec<GraphQLError>,
    },
    Complete {
        id: String,
    },
    Ping {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        payload: Option<serde_json::Value>,
    },
    Pong {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        payload: Option<serde_json::Value>,
    },
}

impl ServerMessage {
    pub fn parse(text: &str) -> serde_json::Result<Self> {
        serde_json::from_str(text)
    }

    /// Operation id for frames that belong to a single subscription.
    #[must_use]
    pub fn operation_id(&self) -> Option<&str> {
        match self {
            Self::Next { id, .. } | Self::Error { id, .. } | Self::Complete { id } => Some(id),
            _ => None,
        }
    }
}
