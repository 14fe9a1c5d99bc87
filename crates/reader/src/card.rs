//! Card handles and the factory that builds them from discovered cards
//!
//! The platform hands the reader an opaque [`RawCard`] whenever a card shows
//! up. [`CardHandle::try_build`] walks the technologies the platform reports
//! in a fixed priority order and wraps the first one this crate knows how to
//! drive.

use std::fmt;
use std::sync::Arc;

use bytes::Bytes;
use tracing::{debug, trace};

use crate::error::{Error, Result};
use crate::protocol::{ProtocolRegistry, tech};
use crate::removal::RemovalNotifier;
use crate::transport::{CardTransport, TransportError};

/// ATR reported for MIFARE Classic tags, which have none of their own
pub const MIFARE_CLASSIC_ATR: &[u8] = &[
    0x3B, 0x8F, 0x80, 0x01, 0x80, 0x4F, 0x0C, 0xA0, 0x00, 0x00, 0x03, 0x06, 0x03, 0x00, 0x01,
    0x00, 0x00, 0x00, 0x00, 0x6A,
];

/// ATR reported for MIFARE Ultralight tags, which have none of their own
pub const MIFARE_ULTRALIGHT_ATR: &[u8] = &[
    0x3B, 0x8F, 0x80, 0x01, 0x80, 0x4F, 0x0C, 0xA0, 0x00, 0x00, 0x03, 0x06, 0x03, 0x00, 0x03,
    0x00, 0x00, 0x00, 0x00, 0x68,
];

/// Physical card object as reported by the platform
///
/// This is the opaque reference a discovery callback delivers. The reader
/// never looks inside it beyond these operations.
pub trait RawCard: fmt::Debug + Send + Sync {
    /// Card identifier (UID for tags, ATR or slot id for contact cards)
    fn id(&self) -> Bytes;

    /// Technology names the platform reports for this card
    fn technologies(&self) -> Vec<String>;

    /// Obtain the transport for one of the reported technologies
    fn open(&self, technology: &str) -> Result<Box<dyn CardTransport>, TransportError>;

    /// Probe whether the card is still reachable
    fn is_present(&self) -> bool;

    /// Arrange for `notifier` to fire once the card is gone
    ///
    /// Platforms with no removal notification keep the default, and readers
    /// over them are built with the polling removal strategy.
    fn watch_removal(&self, notifier: RemovalNotifier) -> Result<(), TransportError> {
        drop(notifier);
        Err(TransportError::Unsupported("native removal notification"))
    }
}

/// Physical transport family a reader drives
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, derive_more::Display)]
pub enum TransportKind {
    /// Proximity tag reader
    #[display("contactless")]
    Contactless,
    /// Contact secure-element session
    #[display("contact")]
    Contact,
}

impl TransportKind {
    /// Protocol registry of this transport family
    pub fn registry(self) -> &'static ProtocolRegistry {
        match self {
            Self::Contactless => ProtocolRegistry::contactless(),
            Self::Contact => ProtocolRegistry::contact(),
        }
    }

    /// Technologies a card handle can be built from, most preferred first
    pub const fn technology_priority(self) -> &'static [&'static str] {
        match self {
            Self::Contactless => &[tech::MIFARE_CLASSIC, tech::MIFARE_ULTRALIGHT, tech::ISO_DEP],
            Self::Contact => &[tech::ISO_7816_3_T1, tech::ISO_7816_3_T0, tech::ISO_7816_3],
        }
    }

    /// Check if this is the contactless family
    pub const fn is_contactless(self) -> bool {
        matches!(self, Self::Contactless)
    }
}

/// A card that is currently present in the reader
///
/// Owned exclusively by the reader's channel state; dropped when the channel
/// is closed.
pub struct CardHandle {
    raw: Arc<dyn RawCard>,
    technology: &'static str,
    technologies: Vec<String>,
    transport: Box<dyn CardTransport>,
    atr: Option<Bytes>,
}

impl fmt::Debug for CardHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CardHandle")
            .field("id", &hex::encode_upper(self.raw.id()))
            .field("technology", &self.technology)
            .field("technologies", &self.technologies)
            .field("atr", &self.atr.as_ref().map(hex::encode_upper))
            .field("transport", &self.transport)
            .finish()
    }
}

impl CardHandle {
    /// Build a handle for `raw`, picking its technology by priority
    ///
    /// Fails with [`Error::Discovery`] when none of the reported technologies
    /// is supported by `kind`, or when opening the matching transport fails.
    pub fn try_build(kind: TransportKind, raw: Arc<dyn RawCard>) -> Result<Self> {
        let technologies = raw.technologies();
        trace!(?technologies, "Inspecting card technologies");

        let technology = kind
            .technology_priority()
            .iter()
            .copied()
            .find(|candidate| technologies.iter().any(|t| t == candidate))
            .ok_or_else(|| {
                Error::discovery(format!(
                    "{kind} reader supports only {}, card reports [{}]",
                    kind.technology_priority()
                        .iter()
                        .map(|t| tech::short_name(t))
                        .collect::<Vec<_>>()
                        .join(", "),
                    technologies.join(", ")
                ))
            })?;

        let transport = raw.open(technology).map_err(|source| Error::Discovery {
            message: format!("failed to open {} transport", tech::short_name(technology)),
            source: Some(source),
        })?;

        let atr = proxy_atr(technology, transport.as_ref());
        debug!(technology, atr = ?atr.as_ref().map(hex::encode_upper), "Built card handle");

        Ok(Self {
            raw,
            technology,
            technologies,
            transport,
            atr,
        })
    }

    /// Technology selector the handle was built for
    pub const fn technology(&self) -> &'static str {
        self.technology
    }

    /// Every technology the platform reported
    pub fn technologies(&self) -> &[String] {
        &self.technologies
    }

    /// Cached answer-to-reset bytes
    pub const fn atr(&self) -> Option<&Bytes> {
        self.atr.as_ref()
    }

    /// Platform reference the handle was built from
    pub const fn raw(&self) -> &Arc<dyn RawCard> {
        &self.raw
    }

    /// Check if the underlying transport session is live
    pub fn is_connected(&self) -> bool {
        self.transport.is_connected()
    }

    /// `"<hex id> - <technologies>"`, used in log lines
    pub fn description(&self) -> String {
        let id = self
            .raw
            .id()
            .iter()
            .map(|b| format!("{b:02X}"))
            .collect::<Vec<_>>()
            .join(" ");
        let technologies = self
            .technologies
            .iter()
            .map(|t| tech::short_name(t))
            .collect::<Vec<_>>()
            .join(", ");
        format!("{id} - {technologies}")
    }

    pub(crate) fn connect(&mut self) -> Result<(), TransportError> {
        self.transport.connect()?;
        if self.atr.is_none() {
            self.atr = proxy_atr(self.technology, self.transport.as_ref());
        }
        Ok(())
    }

    pub(crate) fn disconnect(&mut self) -> Result<(), TransportError> {
        self.transport.disconnect()
    }

    pub(crate) fn transmit_raw(&mut self, command: &[u8]) -> Result<Bytes, TransportError> {
        self.transport.transmit_raw(command)
    }
}

fn proxy_atr(technology: &str, transport: &dyn CardTransport) -> Option<Bytes> {
    match technology {
        tech::MIFARE_CLASSIC => Some(Bytes::from_static(MIFARE_CLASSIC_ATR)),
        tech::MIFARE_ULTRALIGHT => Some(Bytes::from_static(MIFARE_ULTRALIGHT_ATR)),
        _ => transport.atr().filter(|atr| !atr.is_empty()),
    }
}
