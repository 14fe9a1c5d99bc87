//! Reader events and the detection collaborator

use bytes::Bytes;

use crate::config::ReaderMode;
use crate::transport::TransportError;

/// Events related to card insertion/removal
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReaderEvent {
    /// A supported card was discovered
    CardInserted {
        /// Reader name
        reader: String,
        /// ATR of the inserted card
        atr: Option<Bytes>,
    },
    /// A removal wait confirmed that the card is gone
    CardRemoved {
        /// Reader name
        reader: String,
    },
}

impl ReaderEvent {
    /// Name of the reader the event belongs to
    pub fn reader(&self) -> &str {
        match self {
            Self::CardInserted { reader, .. } | Self::CardRemoved { reader } => reader,
        }
    }
}

/// Platform side of card detection
///
/// The reader computes the [`ReaderMode`] from its active protocols and
/// parameters; the implementation turns it into whatever the platform needs
/// to start or stop reporting discovered cards.
pub trait DetectionControl {
    /// Start reporting discovered cards with the given mode
    fn enable_reader_mode(&self, mode: &ReaderMode) -> Result<(), TransportError>;

    /// Stop reporting discovered cards
    fn disable_reader_mode(&self) -> Result<(), TransportError>;
}
