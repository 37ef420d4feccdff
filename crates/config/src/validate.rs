//! Semantic checks on a loaded [`RealtimeConfig`].

use crate::schema::RealtimeConfig;

/// Severity level for a diagnostic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    Error,
    Warning,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Error => write!(f, "error"),
            Self::Warning => write!(f, "warning"),
        }
    }
}

/// A single validation finding.
#[derive(Debug, Clone)]
pub struct Diagnostic {
    pub severity: Severity,
    /// Dotted path, e.g. "transport.endpoint"
    pub path: &'static str,
    pub message: String,
}

impl std::fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} at {}: {}", self.severity, self.path, self.message)
    }
}

/// Check a config for values the transport or retry loop cannot work with.
///
/// Returns an empty list when the config is usable.
#[must_use]
pub fn validate(config: &RealtimeConfig) -> Vec<Diagnostic> {
    let mut out = Vec::new();

    match url::Url::parse(&config.transport.endpoint) {
        Ok(url) if matches!(url.scheme(), "ws" | "wss") => {},
        Ok(url) => out.push(Diagnostic {
            severity: Severity::Error,
            path: "transport.endpoint",
            message: format!("unsupported scheme '{}', expected ws or wss", url.scheme()),
        }),
        Err(e) => out.push(Diagnostic {
            severity: Severity::Error,
            path: "transport.endpoint",
            message: format!("invalid URL: {e}"),
        }),
    }

    let ladder = &config.backoff.ladder_ms;
    if ladder.is_empty() {
        out.push(Diagnostic {
            severity: Severity::Error,
            path: "backoff.ladder_ms",
            message: "retry ladder must contain at least one delay".into(),
        });
    } else if ladder.contains(&0) {
        out.push(Diagnostic {
            severity: Severity::Error,
            path: "backoff.ladder_ms",
            message: "retry delays must be greater than zero".into(),
        });
    } else if ladder.windows(2).any(|w| w[1] < w[0]) {
        out.push(Diagnostic {
            severity: Severity::Warning,
            path: "backoff.ladder_ms",
            message: "retry ladder is not monotonically increasing".into(),
        });
    }

    if config.transport.ack_timeout_ms == 0 {
        out.push(Diagnostic {
            severity: Severity::Error,
            path: "transport.ack_timeout_ms",
            message: "ack timeout must be greater than zero".into(),
        });
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        assert!(validate(&RealtimeConfig::default()).is_empty());
    }

    #[test]
    fn rejects_http_endpoint() {
        let mut cfg = RealtimeConfig::default();
        cfg.transport.endpoint = "https://example.com/graphql".into();
        let diags = validate(&cfg);
        assert_eq!(diags.len(), 1);
        assert_eq!(diags[0].severity, Severity::Error);
        assert_eq!(diags[0].path, "transport.endpoint");
    }

    #[test]
    fn rejects_empty_and_zero_ladders() {
        let mut cfg = RealtimeConfig::default();
        cfg.backoff.ladder_ms.clear();
        assert_eq!(validate(&cfg)[0].path, "backoff.ladder_ms");

        cfg.backoff.ladder_ms = vec![1_000, 0];
        assert_eq!(validate(&cfg)[0].severity, Severity::Error);
    }

    #[test]
    fn warns_on_decreasing_ladder() {
        let mut cfg = RealtimeConfig::default();
        cfg.backoff.ladder_ms = vec![5_000, 1_000];
        let diags = validate(&cfg);
        assert_eq!(diags.len(), 1);
        assert_eq!(diags[0].severity, Severity::Warning);
    }
}
