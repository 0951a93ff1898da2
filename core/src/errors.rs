use thiserror::Error;

/// Session errors
#[derive(Error, Debug)]
pub enum SessionError {
    #[error("Session name is empty")]
    MissingSessionName,

    #[error("Lock key name is empty")]
    MissingLockKey,

    #[error("Encoding Error: {0}")]
    Encode(String),

    #[error("Decoding Error: {0}")]
    Decode(String),

    #[error("Configuration Error: {0}")]
    ConfigError(String),

    #[error(transparent)]
    SerdeError(#[from] serde_json::Error),

    #[error(transparent)]
    IoError(#[from] std::io::Error),
}

/// Result type for session operations
pub type SessionResult<T> = Result<T, SessionError>;
