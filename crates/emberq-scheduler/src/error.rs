use thiserror::Error;

/// Errors that can occur within the scheduler subsystem.
#[derive(Debug, Error)]
pub enum SchedulerError {
    /// The repeat options are contradictory or incomplete. Raised before any
    /// store contact.
    #[error("Invalid repeat options: {0}")]
    Validation(String),

    /// A sub-operation of the composite upsert transaction failed; the whole
    /// transaction aborted and no partial state is visible. Covers racing
    /// duplicate instances — callers may retry those.
    #[error("Error upserting job scheduler {scheduler_id} - {reason}")]
    Upsert {
        scheduler_id: String,
        reason: String,
    },

    /// Connection-level store failure, propagated unchanged.
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    /// Definition fields or job payloads failed to encode/decode.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl From<emberq_core::QueueError> for SchedulerError {
    fn from(err: emberq_core::QueueError) -> Self {
        match err {
            emberq_core::QueueError::Serialization(e) => SchedulerError::Serialization(e),
            other => SchedulerError::Validation(other.to_string()),
        }
    }
}

pub type Result<T> = std::result::Result<T, SchedulerError>;
