use thiserror::Error;

#[derive(Error, Debug)]
pub enum IndexerError {
    #[error("Serialization error: {0}")]
    SerdeError(#[from] serde_json::Error),

    #[error("WebSocket error: {0}")]
    WebSocketError(#[from] Box<tokio_tungstenite::tungstenite::Error>),

    #[error("Feed connection closed: {0}")]
    ConnectionClosed(String),

    #[error("Invalid configuration: {0}")]
    ConfigError(String),
}

impl From<tokio_tungstenite::tungstenite::Error> for IndexerError {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        IndexerError::WebSocketError(Box::new(err))
    }
}
