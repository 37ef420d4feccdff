/// Errors raised by the WebSocket client.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("connection failed: {0}")]
    Connection(String),

    #[error("server rejected credentials (close code {code})")]
    Auth { code: u16 },

    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("invalid endpoint: {0}")]
    Endpoint(#[from] url::ParseError),

    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("connection closed")]
    Closed,
}

pub type Result<T> = std::result::Result<T, Error>;

impl From<Error> for rally_realtime::Error {
    fn from(err: Error) -> Self {
        match err {
            Error::Closed => Self::transport("websocket connection closed"),
            other => Self::external("websocket", other),
        }
    }
}
