//! Error types for whaddyasay-core.

use std::time::Duration;
use thiserror::Error;

/// Result type alias using the whaddyasay-core Error
pub type Result<T> = std::result::Result<T, Error>;

/// Core error types for advice generation, storage, and encryption
#[derive(Error, Debug)]
pub enum Error {
    // Backend errors
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("{backend} returned status {status}: {body}")]
    BackendStatus {
        backend: String,
        status: u16,
        body: String,
    },

    #[error("{backend} did not answer within {}ms", .timeout.as_millis())]
    Timeout { backend: String, timeout: Duration },

    #[error("Could not parse advice from {backend}: {reason}")]
    InvalidAdvice { backend: String, reason: String },

    #[error("Model runtime error: {0}")]
    Runtime(String),

    #[error("Unknown model: {0}")]
    UnknownModel(String),

    // Storage errors
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Database lock poisoned")]
    LockPoisoned,

    #[error("Record not found: {0}")]
    NotFound(i64),

    // Encryption errors
    #[error("Invalid master password")]
    InvalidPassword,

    #[error("Vault is locked - unlock it with the master password first")]
    VaultLocked,

    #[error("Encryption failed")]
    Encryption,

    #[error("Decryption failed: {0}")]
    Decryption(String),

    // IO and serialization
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl Error {
    pub fn backend_status(backend: impl Into<String>, status: u16, body: impl Into<String>) -> Self {
        Self::BackendStatus {
            backend: backend.into(),
            status,
            body: body.into(),
        }
    }

    pub fn invalid_advice(backend: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidAdvice {
            backend: backend.into(),
            reason: reason.into(),
        }
    }
}
