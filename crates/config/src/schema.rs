/// Config schema types (transport endpoint, auth, retry ladder).
use std::time::Duration;

use {
    secrecy::{ExposeSecret, Secret},
    serde::{Deserialize, Serialize},
};

/// Default GraphQL-over-WebSocket endpoint used when no config file exists.
pub const DEFAULT_ENDPOINT: &str = "ws://localhost:4000/graphql";

/// Default retry ladder in milliseconds.
pub const DEFAULT_LADDER_MS: [u64; 4] = [1_000, 2_000, 5_000, 10_000];

/// Top-level config (`rally.toml`).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RealtimeConfig {
    pub transport: TransportConfig,
    pub backoff: BackoffConfig,
}

impl RealtimeConfig {
    /// Copy with the auth token masked, for display.
    #[must_use]
    pub fn redacted(&self) -> Self {
        let mut copy = self.clone();
        if copy.transport.auth_token.is_some() {
            copy.transport.auth_token = Some(Secret::new(REDACTED.to_owned()));
        }
        copy
    }
}

/// Placeholder written instead of secret values.
pub const REDACTED: &str = "[REDACTED]";

/// Connection settings for the shared transport client.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportConfig {
    /// `ws://` or `wss://` URL of the GraphQL subscription endpoint.
    pub endpoint: String,
    /// Bearer token sent in the `connection_init` payload.
    #[serde(
        serialize_with = "serialize_option_secret",
        skip_serializing_if = "Option::is_none"
    )]
    pub auth_token: Option<Secret<String>>,
    /// How long to wait for `connection_ack` after `connection_init`.
    pub ack_timeout_ms: u64,
    /// Interval between client keepalive pings.
    pub keepalive_ms: u64,
    /// Upper bound for the socket-level reconnect delay.
    pub reconnect_max_ms: u64,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.into(),
            auth_token: None,
            ack_timeout_ms: 10_000,
            keepalive_ms: 30_000,
            reconnect_max_ms: 10_000,
        }
    }
}

impl TransportConfig {
    #[must_use]
    pub fn ack_timeout(&self) -> Duration {
        Duration::from_millis(self.ack_timeout_ms)
    }

    #[must_use]
    pub fn keepalive(&self) -> Duration {
        Duration::from_millis(self.keepalive_ms)
    }

    #[must_use]
    pub fn reconnect_max(&self) -> Duration {
        Duration::from_millis(self.reconnect_max_ms)
    }

    /// The token with its secrecy wrapper removed, for the init handshake.
    #[must_use]
    pub fn token(&self) -> Option<&str> {
        self.auth_token.as_ref().map(|t| t.expose_secret().as_str())
    }
}

/// Subscription retry ladder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackoffConfig {
    /// Delay per consecutive failure; the last entry repeats forever.
    pub ladder_ms: Vec<u64>,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            ladder_ms: DEFAULT_LADDER_MS.to_vec(),
        }
    }
}

// ── Serde helpers for Secret<String> ────────────────────────────────────────

fn serialize_option_secret<S: serde::Serializer>(
    secret: &Option<Secret<String>>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    match secret {
        Some(s) => serializer.serialize_some(s.expose_secret()),
        None => serializer.serialize_none(),
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;

    #[test]
    fn empty_document_yields_defaults() {
        let cfg: RealtimeConfig = toml::from_str("").unwrap();
        assert_eq!(cfg.transport.endpoint, DEFAULT_ENDPOINT);
        assert_eq!(cfg.backoff.ladder_ms, vec![1_000, 2_000, 5_000, 10_000]);
        assert!(cfg.transport.token().is_none());
    }

    #[test]
    fn partial_section_keeps_other_defaults() {
        let cfg: RealtimeConfig = toml::from_str(
            r#"
            [transport]
            endpoint = "wss://events.example.com/graphql"
            auth_token = "s3cret"
            "#,
        )
        .unwrap();
        assert_eq!(cfg.transport.endpoint, "wss://events.example.com/graphql");
        assert_eq!(cfg.transport.token(), Some("s3cret"));
        assert_eq!(cfg.transport.ack_timeout(), Duration::from_secs(10));
    }

    #[test]
    fn redacted_copy_masks_token_when_serialized() {
        let cfg: RealtimeConfig = toml::from_str("[transport]\nauth_token = \"s3cret\"").unwrap();
        let shown = toml::to_string(&cfg.redacted()).unwrap();
        assert!(shown.contains(REDACTED));
        assert!(!shown.contains("s3cret"));
        assert_eq!(cfg.transport.token(), Some("s3cret"));
    }

    #[test]
    fn debug_output_redacts_token() {
        let cfg: RealtimeConfig = toml::from_str("[transport]\nauth_token = \"s3cret\"").unwrap();
        assert!(!format!("{cfg:?}").contains("s3cret"));
    }
}
