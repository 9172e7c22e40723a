use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("failed to read '{key}': {message}")]
    Read { key: String, message: String },

    #[error("failed to write '{key}': {message}")]
    Write { key: String, message: String },

    #[error("stored value for '{key}' is not a valid collection: {source}")]
    Decode {
        key: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to encode collection '{key}': {source}")]
    Encode {
        key: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("storage backend error: {0}")]
    Backend(#[from] sqlx::Error),

    #[error("migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("runtime error: {0}")]
    Runtime(#[from] std::io::Error),
}

#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("progress must be between 0 and 100, got {0}")]
    InvalidProgress(u8),

    #[error("rating for criterion {criterion_id} must be between 0 and 5, got {rating}")]
    InvalidRating { criterion_id: Uuid, rating: u8 },

    #[error("{kind} {id} not found")]
    NotFound { kind: &'static str, id: Uuid },
}

pub type Result<T> = std::result::Result<T, EngineError>;
