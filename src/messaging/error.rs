// src/messaging/error.rs

use lapin::Error as LapinError;
use serde_json::Error as SerdeError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum MessagingError {
    #[error("Invalid messaging configuration: {0}")]
    InvalidConfig(String),

    #[error("Connection to broker was not initialized: {0}")]
    NotConnected(String),

    #[error("Failed to connect to AMQP compatible broker at {address}: {reason}")]
    Connection { address: String, reason: String },

    #[error("Connection timeout: {0}")]
    Timeout(String),

    #[error("Broker channel error: {0}")]
    Channel(String),

    #[error("Declare error: {0}")]
    Declare(String),

    #[error("Queue bind error: {0}")]
    Bind(String),

    #[error("Broker publish error: {0}")]
    Publish(String),

    #[error("Broker consume error: {0}")]
    Consume(String),

    #[error("Message serialization error: {0}")]
    Serialization(#[from] SerdeError),

    #[error("Subscription registry lock was poisoned")]
    LockPoisoned,

    #[error("Broker protocol error: {0}")]
    Protocol(#[from] LapinError),
}

// Custom Result type for messaging operations
pub type Result<T> = std::result::Result<T, MessagingError>;

impl MessagingError {
    /// Misuse and startup failures. A caller is expected to abort on these
    /// rather than retry.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            MessagingError::InvalidConfig(_)
                | MessagingError::NotConnected(_)
                | MessagingError::Connection { .. }
                | MessagingError::Timeout(_)
        )
    }
}

impl From<String> for MessagingError {
    fn from(message: String) -> Self {
        MessagingError::InvalidConfig(message)
    }
}

impl From<&str> for MessagingError {
    fn from(message: &str) -> Self {
        MessagingError::InvalidConfig(message.to_string())
    }
}
