use thiserror::Error;

/// Errors raised by the shared queue layer.
#[derive(Debug, Error)]
pub enum QueueError {
    /// Configuration file missing, unreadable, or malformed.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Job data or options failed to encode/decode.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, QueueError>;
