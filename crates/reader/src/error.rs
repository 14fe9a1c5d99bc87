//! Core error type for reader operations
//!
//! Every failure a reader surfaces to its caller is one of the variants
//! below. Where a transport failure caused it, the [`TransportError`] is kept
//! as the error source so diagnostics can walk the chain.

use crate::transport::TransportError;

/// Convenience alias used throughout the crate
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Reader error taxonomy
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Unrecognized parameter name or rejected value
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// No supported technology for a discovered card
    #[error("Discovery error: {message}")]
    Discovery {
        /// What went wrong
        message: String,
        /// Transport failure that caused it, if any
        #[source]
        source: Option<TransportError>,
    },

    /// Protocol identifier absent from the registry
    #[error("Protocol not found: {0}")]
    ProtocolNotFound(String),

    /// Channel could not be opened
    #[error("Channel open error: {message}")]
    ChannelOpen {
        /// What went wrong
        message: String,
        /// Transport failure that caused it, if any
        #[source]
        source: Option<TransportError>,
    },

    /// Transport disconnect failed; the reader state was cleared regardless
    #[error("Channel close error: failed to disconnect card")]
    ChannelClose {
        /// Transport failure reported by disconnect
        #[source]
        source: TransportError,
    },

    /// APDU exchange failed
    #[error("Transmission error: {message}")]
    Transmission {
        /// What went wrong
        message: String,
        /// Transport failure that caused it, if any
        #[source]
        source: Option<TransportError>,
    },
}

impl Error {
    /// Create a new configuration error
    pub fn configuration<S: Into<String>>(message: S) -> Self {
        Self::Configuration(message.into())
    }

    /// Create a new discovery error with no transport cause
    pub fn discovery<S: Into<String>>(message: S) -> Self {
        Self::Discovery {
            message: message.into(),
            source: None,
        }
    }

    /// Create a new channel open error with no transport cause
    pub fn channel_open<S: Into<String>>(message: S) -> Self {
        Self::ChannelOpen {
            message: message.into(),
            source: None,
        }
    }

    /// Create a new transmission error with no transport cause
    pub fn transmission<S: Into<String>>(message: S) -> Self {
        Self::Transmission {
            message: message.into(),
            source: None,
        }
    }

    /// Transport failure behind this error, if any
    pub const fn transport_error(&self) -> Option<&TransportError> {
        match self {
            Self::Discovery { source, .. }
            | Self::ChannelOpen { source, .. }
            | Self::Transmission { source, .. } => source.as_ref(),
            Self::ChannelClose { source } => Some(source),
            Self::Configuration(_) | Self::ProtocolNotFound(_) => None,
        }
    }
}
