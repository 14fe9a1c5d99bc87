//! Device manager for PC/SC operations

use std::ffi::CString;
use std::sync::Arc;

use nexum_apdu_reader::{Reader, RemovalStrategy, TransportKind};
use pcsc::{Context, Scope};
use tracing::debug;

use crate::config::PcscConfig;
use crate::error::PcscError;
use crate::monitor::PcscMonitor;
use crate::reader::PcscReader;

/// Manager for PC/SC device operations
#[allow(missing_debug_implementations)]
pub struct PcscDeviceManager {
    /// PC/SC context
    context: Context,
    config: PcscConfig,
}

impl PcscDeviceManager {
    /// Create a new PC/SC device manager
    pub fn new() -> Result<Self, PcscError> {
        Self::with_config(PcscConfig::default())
    }

    /// Create a manager whose cards connect with `config`
    pub fn with_config(config: PcscConfig) -> Result<Self, PcscError> {
        let context = Context::establish(Scope::User)?;
        Ok(Self { context, config })
    }

    /// Connection settings handed to discovered cards
    pub const fn config(&self) -> &PcscConfig {
        &self.config
    }

    /// List all available card readers
    pub fn list_readers(&self) -> Result<Vec<PcscReader>, PcscError> {
        let readers = match self.context.list_readers_owned() {
            Ok(readers) => readers,
            Err(pcsc::Error::NoReadersAvailable) => return Err(PcscError::NoReadersAvailable),
            Err(e) => return Err(e.into()),
        };
        if readers.is_empty() {
            return Err(PcscError::NoReadersAvailable);
        }

        let mut result = Vec::with_capacity(readers.len());
        for reader_name in readers {
            let mut reader_states = [pcsc::ReaderState::new(
                reader_name.as_c_str(),
                pcsc::State::UNAWARE,
            )];

            match self.context.get_status_change(None, &mut reader_states) {
                Ok(()) => result.push(PcscReader::from_reader_state(&reader_states[0])),
                Err(e) => {
                    debug!(reader = ?reader_name, error = %e, "Could not read reader status");
                    result.push(PcscReader::new(
                        reader_name.to_string_lossy().into_owned(),
                        false,
                        None,
                    ));
                }
            }
        }

        Ok(result)
    }

    /// Build the uniform reader for one PC/SC slot
    ///
    /// PC/SC reports removal itself, so the reader uses the native removal
    /// strategy.
    pub fn reader(&self, name: &str) -> Result<Arc<Reader>, PcscError> {
        let wanted = CString::new(name).map_err(|_| PcscError::ReaderNotFound(name.to_string()))?;
        let known = self.context.list_readers_owned()?;
        if !known.contains(&wanted) {
            return Err(PcscError::ReaderNotFound(name.to_string()));
        }

        Ok(Arc::new(Reader::new(
            name,
            TransportKind::Contact,
            RemovalStrategy::from_capability(true),
        )))
    }

    /// Create a monitor that reports cards inserted into `reader`
    pub fn monitor(&self, reader: Arc<Reader>) -> PcscMonitor {
        PcscMonitor::new(self.context.clone(), reader, self.config)
    }
}
