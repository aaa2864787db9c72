use thiserror::Error;

#[derive(Debug, Error)]
pub enum WatchdogError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Persistence mismatch: detected {expected} alerts, persisted {persisted}")]
    PersistenceMismatch { expected: usize, persisted: usize },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, WatchdogError>;
