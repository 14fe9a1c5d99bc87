//! Error types specific to card transports

use thiserror::Error;

/// Failure reported by a transport capability provider
#[derive(Debug, Error)]
pub enum TransportError {
    /// Connection error
    #[error("Failed to connect to card")]
    Connection,

    /// Transmission error
    #[error("Failed to transmit data")]
    Transmission,

    /// Device error
    #[error("Device error")]
    Device,

    /// The card left the field or the slot
    #[error("Card was removed")]
    CardRemoved,

    /// Timeout error
    #[error("Operation timed out")]
    Timeout,

    /// Cancelled operation
    #[error("Operation cancelled")]
    Cancelled,

    /// The provider cannot perform this operation
    #[error("Unsupported operation: {0}")]
    Unsupported(&'static str),

    /// I/O error raised by the platform binding
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Other error with message
    #[error("{0}")]
    Other(String),
}

impl TransportError {
    /// Create a general other error
    pub fn other<S: Into<String>>(message: S) -> Self {
        Self::Other(message.into())
    }

    /// Check if the failure means the card is gone
    pub const fn is_card_removed(&self) -> bool {
        matches!(self, Self::CardRemoved)
    }
}
