//! Transport traits for card communication
//!
//! A transport is the per-technology link a platform exposes for one physical
//! card. It connects, disconnects and moves raw bytes. It has no knowledge of
//! APDU structure or of the reader's channel state.

pub mod error;

use std::fmt;

use bytes::Bytes;
pub use error::TransportError;
use tracing::{debug, trace};

/// Trait for per-technology card transports
///
/// These are the capability-provider operations the reader relies on. Every
/// platform binding (contactless tag technology, contact session) implements
/// it once per technology it supports.
pub trait CardTransport: Send + fmt::Debug {
    /// Establish the transport-level session
    fn connect(&mut self) -> Result<(), TransportError>;

    /// Tear the transport-level session down
    fn disconnect(&mut self) -> Result<(), TransportError>;

    /// Check if the transport-level session is live
    fn is_connected(&self) -> bool;

    /// Send raw APDU bytes to card and return response bytes
    ///
    /// The bytes are forwarded as-is. Response validation is the reader's
    /// job, not the transport's.
    fn transmit_raw(&mut self, command: &[u8]) -> Result<Bytes, TransportError> {
        trace!(command = %hex::encode(command), "Transmitting raw command");
        let result = self.do_transmit_raw(command);
        match &result {
            Ok(response) => {
                trace!(response = %hex::encode(response), "Received raw response");
            }
            Err(e) => {
                debug!(error = ?e, "Transport error during transmission");
            }
        }
        result
    }

    /// Internal implementation of transmit_raw
    /// This is the method that concrete implementations should override
    fn do_transmit_raw(&mut self, command: &[u8]) -> Result<Bytes, TransportError>;

    /// Answer-to-reset bytes, if the transport exposes any
    fn atr(&self) -> Option<Bytes>;
}

#[cfg(test)]
pub(crate) use mock::MockTransport;
