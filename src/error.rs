use thiserror::Error;

#[derive(Debug, Error)]
pub enum TraderbotError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("PRIVATE_KEY_ENCRYPTION_KEY is not set. Unable to handle sensitive data.")]
    MissingKeyMaterial,

    #[error("Authentication failed: stored secret is corrupt or was tampered with")]
    AuthenticationFailed,

    #[error("Encryption error: {0}")]
    EncryptionFailed(String),

    #[error("Database error: {0}")]
    DatabaseError(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("User not found: {0}")]
    UserNotFound(String),

    #[error("Trade order queue is closed")]
    OrderQueueClosed,

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Telegram error: {0}")]
    Telegram(#[from] teloxide::RequestError),
}

impl TraderbotError {
    /// Errors that mean the process is misconfigured rather than that one message went wrong.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::MissingKeyMaterial | Self::ConfigError(_) | Self::OrderQueueClosed
        )
    }
}

impl From<sled::Error> for TraderbotError {
    fn from(err: sled::Error) -> Self {
        Self::DatabaseError(err.to_string())
    }
}

impl From<serde_json::Error> for TraderbotError {
    fn from(err: serde_json::Error) -> Self {
        Self::SerializationError(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, TraderbotError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fatal_classification() {
        assert!(TraderbotError::MissingKeyMaterial.is_fatal());
        assert!(TraderbotError::ConfigError("bad".into()).is_fatal());
        assert!(TraderbotError::OrderQueueClosed.is_fatal());
        assert!(!TraderbotError::AuthenticationFailed.is_fatal());
        assert!(!TraderbotError::UserNotFound("42".into()).is_fatal());
    }
}
