//! Database error types.

use thiserror::Error;
use watchdog_common::WatchdogError;

pub type Result<T> = std::result::Result<T, DbError>;

#[derive(Debug, Error)]
pub enum DbError {
    #[error("PostgreSQL error: {0}")]
    Postgres(#[from] tokio_postgres::Error),

    #[error("Connection pool error: {0}")]
    Pool(String),

    #[error("Invalid database configuration: {0}")]
    Config(String),

    #[error("Unexpected result shape: {0}")]
    Shape(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl From<deadpool_postgres::PoolError> for DbError {
    fn from(err: deadpool_postgres::PoolError) -> Self {
        DbError::Pool(err.to_string())
    }
}

impl From<deadpool_postgres::CreatePoolError> for DbError {
    fn from(err: deadpool_postgres::CreatePoolError) -> Self {
        DbError::Config(err.to_string())
    }
}

impl From<DbError> for WatchdogError {
    fn from(err: DbError) -> Self {
        WatchdogError::Database(err.to_string())
    }
}
