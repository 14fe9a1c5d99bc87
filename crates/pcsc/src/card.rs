//! Card present in a PC/SC reader slot

use std::ffi::CString;
use std::fmt;
use std::thread;
use std::time::Duration;

use bytes::Bytes;
use nexum_apdu_reader::{CardTransport, RawCard, RemovalNotifier, TransportError, tech};
use pcsc::{Context, Protocols, ReaderState, Scope, State};
use tracing::{debug, trace};

use crate::atr;
use crate::config::PcscConfig;
use crate::error::PcscError;
use crate::transport::PcscTransport;

/// How long one removal-watch status call may block before re-checking
/// whether the wait is still pending
const WATCH_SLICE: Duration = Duration::from_millis(250);

/// Card reported by a PC/SC status change
///
/// Identified by its ATR; a different ATR in the same slot is a different
/// card.
pub struct PcscCard {
    context: Context,
    reader: CString,
    atr: Bytes,
    config: PcscConfig,
}

impl fmt::Debug for PcscCard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PcscCard")
            .field("reader", &self.reader)
            .field("atr", &hex::encode_upper(&self.atr))
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl PcscCard {
    /// Card in `reader` that answered with `atr`
    pub const fn new(context: Context, reader: CString, atr: Bytes, config: PcscConfig) -> Self {
        Self {
            context,
            reader,
            atr,
            config,
        }
    }

    /// Reader slot holding the card
    pub fn reader_name(&self) -> String {
        self.reader.to_string_lossy().into_owned()
    }

    /// Answer-to-reset the card was discovered with
    pub const fn atr(&self) -> &Bytes {
        &self.atr
    }

    fn is_same_card(&self, state: &ReaderState) -> bool {
        let event = state.event_state();
        event.contains(State::PRESENT)
            && !event.contains(State::EMPTY)
            && state.atr() == self.atr.as_ref()
    }
}

impl RawCard for PcscCard {
    fn id(&self) -> Bytes {
        self.atr.clone()
    }

    fn technologies(&self) -> Vec<String> {
        atr::technologies(&self.atr)
    }

    fn open(&self, technology: &str) -> Result<Box<dyn CardTransport>, TransportError> {
        let protocols = match technology {
            tech::ISO_7816_3_T0 => Protocols::T0,
            tech::ISO_7816_3_T1 => Protocols::T1,
            tech::ISO_7816_3 => self.config.protocols,
            _ => return Err(TransportError::Unsupported("technology outside ISO/IEC 7816-3")),
        };
        debug!(reader = ?self.reader, technology, "Opening PC/SC transport");
        Ok(Box::new(PcscTransport::new(
            self.context.clone(),
            self.reader.clone(),
            self.config.share_mode,
            protocols,
            self.atr.clone(),
        )))
    }

    fn is_present(&self) -> bool {
        let mut states = [ReaderState::new(self.reader.clone(), State::UNAWARE)];
        match self
            .context
            .get_status_change(Some(Duration::ZERO), &mut states)
        {
            Ok(()) => self.is_same_card(&states[0]),
            Err(e) => {
                debug!(error = %e, "Presence probe failed");
                false
            }
        }
    }

    fn watch_removal(&self, notifier: RemovalNotifier) -> Result<(), TransportError> {
        // dedicated context for the blocking status calls
        let context = Context::establish(Scope::User).map_err(PcscError::from)?;
        let reader = self.reader.clone();
        let atr = self.atr.clone();

        thread::Builder::new()
            .name("nxm-pcsc-removal".to_string())
            .spawn(move || {
                let mut states = [ReaderState::new(reader, State::UNAWARE)];
                while notifier.is_pending() {
                    match context.get_status_change(Some(WATCH_SLICE), &mut states) {
                        Ok(()) => {
                            let event = states[0].event_state();
                            let gone = event.contains(State::EMPTY)
                                || !event.contains(State::PRESENT)
                                || states[0].atr() != atr.as_ref();
                            if gone {
                                trace!(state = ?event, "Card left the slot");
                                notifier.notify();
                                return;
                            }
                            states[0].sync_current_state();
                        }
                        Err(pcsc::Error::Timeout) => {}
                        Err(pcsc::Error::UnknownReader | pcsc::Error::ReaderUnavailable) => {
                            debug!("Reader disappeared, treating card as removed");
                            notifier.notify();
                            return;
                        }
                        Err(e) => {
                            debug!(error = %e, "Removal watch stopped");
                            return;
                        }
                    }
                }
            })?;
        Ok(())
    }
}
