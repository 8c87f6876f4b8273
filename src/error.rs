use crate::providers::ProviderError;
use thiserror::Error;

/// Tollbooth application error types
#[derive(Error, Debug)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] crate::config::ConfigError),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("Provider setup error: {0}")]
    Provider(#[from] ProviderError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Server error: {0}")]
    Server(String),
}

impl Error {
    pub fn server(message: impl Into<String>) -> Self {
        Self::Server(message.into())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
