//! PC/SC transport implementation

use std::ffi::CString;
use std::fmt;

use bytes::Bytes;
use nexum_apdu_reader::{CardTransport, TransportError};
use pcsc::{Card, Context, Disposition, Protocols};
use tracing::{debug, warn};

use crate::config::ShareMode;
use crate::error::PcscError;

/// Session with the card in one PC/SC reader slot
pub struct PcscTransport {
    /// PC/SC context
    context: Context,
    /// Card connection, if established
    card: Option<Card>,
    /// Reader name
    reader: CString,
    share_mode: ShareMode,
    protocols: Protocols,
    /// ATR seen when the card was discovered, refreshed on connect
    atr: Bytes,
}

impl fmt::Debug for PcscTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PcscTransport")
            .field("reader", &self.reader)
            .field("has_card", &self.card.is_some())
            .field("share_mode", &self.share_mode)
            .field("protocols", &self.protocols)
            .field("atr", &hex::encode_upper(&self.atr))
            .finish()
    }
}

impl PcscTransport {
    pub(crate) const fn new(
        context: Context,
        reader: CString,
        share_mode: ShareMode,
        protocols: Protocols,
        atr: Bytes,
    ) -> Self {
        Self {
            context,
            card: None,
            reader,
            share_mode,
            protocols,
            atr,
        }
    }

    /// Get the reader name
    pub fn reader_name(&self) -> String {
        self.reader.to_string_lossy().into_owned()
    }

    fn connect_card(&mut self) -> Result<(), PcscError> {
        if self.card.is_some() {
            return Ok(());
        }

        let card = match self
            .context
            .connect(&self.reader, self.share_mode.into(), self.protocols)
        {
            Ok(card) => card,
            Err(pcsc::Error::NoSmartcard) => return Err(PcscError::NoCard(self.reader_name())),
            Err(e) => return Err(e.into()),
        };

        match card.get_attribute_owned(pcsc::Attribute::AtrString) {
            Ok(atr) if !atr.is_empty() => self.atr = Bytes::from(atr),
            Ok(_) => {}
            Err(e) => debug!(error = %e, "Could not read ATR attribute"),
        }
        self.card = Some(card);
        Ok(())
    }

    fn transmit_command(&mut self, command: &[u8]) -> Result<Bytes, PcscError> {
        let Some(card) = self.card.as_mut() else {
            return Err(PcscError::NoCard(self.reader_name()));
        };

        let mut response_buffer = [0u8; pcsc::MAX_BUFFER_SIZE_EXTENDED];
        match card.transmit(command, &mut response_buffer) {
            Ok(response) => Ok(Bytes::copy_from_slice(response)),
            Err(e) => {
                // the handle is useless once the card was reset or pulled
                if matches!(e, pcsc::Error::ResetCard | pcsc::Error::RemovedCard) {
                    self.card = None;
                }
                Err(e.into())
            }
        }
    }
}

impl CardTransport for PcscTransport {
    fn connect(&mut self) -> Result<(), TransportError> {
        self.connect_card().map_err(TransportError::from)
    }

    fn disconnect(&mut self) -> Result<(), TransportError> {
        let Some(card) = self.card.take() else {
            return Ok(());
        };
        card.disconnect(Disposition::LeaveCard)
            .map_err(|(_, e)| TransportError::from(PcscError::from(e)))
    }

    fn is_connected(&self) -> bool {
        self.card.is_some()
    }

    fn do_transmit_raw(&mut self, command: &[u8]) -> Result<Bytes, TransportError> {
        self.transmit_command(command).map_err(TransportError::from)
    }

    fn atr(&self) -> Option<Bytes> {
        (!self.atr.is_empty()).then(|| self.atr.clone())
    }
}

impl Drop for PcscTransport {
    fn drop(&mut self) {
        if let Some(card) = self.card.take() {
            if let Err((_, e)) = card.disconnect(Disposition::LeaveCard) {
                warn!(error = %e, "Failed to release card on drop");
            }
        }
    }
}
