use thiserror::Error;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error("{0}")]
    Validation(String),
    #[error("request error: {0}")]
    Reqwest(#[from] reqwest::Error),
    #[error("websocket error: {0}")]
    WebSocket(Box<tokio_tungstenite::tungstenite::Error>),
    #[error("json decode error: {0}")]
    SimdJson(#[from] simd_json::Error),
    #[error("{0}")]
    Rejected(String),
}

impl From<tokio_tungstenite::tungstenite::Error> for ClientError {
    fn from(value: tokio_tungstenite::tungstenite::Error) -> Self {
        Self::WebSocket(Box::new(value))
    }
}

impl ClientError {
    /// Local validation failures never reach the network; callers use this to
    /// distinguish them from transport failures when deciding whether a retry
    /// makes sense.
    pub fn is_local(&self) -> bool {
        matches!(self, Self::InvalidArgument(_) | Self::Validation(_))
    }
}
