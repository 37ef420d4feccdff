use std::error::Error as StdError;

/// Crate-wide result type for realtime operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Failures surfaced to the controller by the transport, the provider, or
/// payload decoding. None of these reach the host: the controller logs them
/// and either drops the event or schedules a retry.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The transport reported a failure for a subscription.
    #[error("transport error: {message}")]
    Transport { message: String },

    /// Wrapped source error from the transport implementation.
    #[error("transport failed: {context}: {source}")]
    External {
        context: String,
        #[source]
        source: Box<dyn StdError + Send + Sync>,
    },

    /// The provider could not produce a transport client.
    #[error("transport unavailable: {message}")]
    Unavailable { message: String },

    /// The payload did not contain the subscription's root field.
    #[error("subscription payload missing field `{field}`")]
    MissingField { field: &'static str },

    /// JSON (de)serialization failed.
    #[error(transparent)]
    SerdeJson(#[from] serde_json::Error),
}

impl Error {
    #[must_use]
    pub fn transport(message: impl std::fmt::Display) -> Self {
        Self::Transport {
            message: message.to_string(),
        }
    }

    #[must_use]
    pub fn unavailable(message: impl std::fmt::Display) -> Self {
        Self::Unavailable {
            message: message.to_string(),
        }
    }

    #[must_use]
    pub fn external(
        context: impl Into<String>,
        source: impl StdError + Send + Sync + 'static,
    ) -> Self {
        Self::External {
            context: context.into(),
            source: Box::new(source),
        }
    }
}
