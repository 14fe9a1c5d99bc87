//! Status-change monitor feeding discovered cards into a reader

use std::ffi::CString;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use bytes::Bytes;
use nexum_apdu_reader::{DetectionControl, Reader, ReaderFlags, ReaderMode, TransportError};
use parking_lot::Mutex;
use pcsc::{Context, ReaderState, Scope, State};
use tracing::{debug, info, trace, warn};

use crate::card::PcscCard;
use crate::config::PcscConfig;
use crate::error::PcscError;

/// Shortest status-change timeout the monitor will use
const MIN_POLL_INTERVAL: Duration = Duration::from_millis(10);

struct Worker {
    context: Context,
    running: Arc<AtomicBool>,
    handle: JoinHandle<()>,
}

/// Watches one PC/SC reader slot and reports inserted cards to a [`Reader`]
///
/// Detection starts when the reader enables it through [`DetectionControl`]
/// and stops when disabled or when the monitor is dropped.
#[allow(missing_debug_implementations)]
pub struct PcscMonitor {
    /// Context shared with the transports of discovered cards
    context: Context,
    reader: Arc<Reader>,
    config: PcscConfig,
    worker: Mutex<Option<Worker>>,
}

impl PcscMonitor {
    /// Create a monitor for `reader`
    pub(crate) fn new(context: Context, reader: Arc<Reader>, config: PcscConfig) -> Self {
        Self {
            context,
            reader,
            config,
            worker: Mutex::new(None),
        }
    }

    /// Reader fed by this monitor
    pub const fn reader(&self) -> &Arc<Reader> {
        &self.reader
    }

    /// Check if the monitor thread is running
    pub fn is_running(&self) -> bool {
        self.worker
            .lock()
            .as_ref()
            .is_some_and(|worker| worker.running.load(Ordering::SeqCst))
    }

    fn start(&self, interval: Duration) -> Result<(), PcscError> {
        let mut worker = self.worker.lock();
        if worker.is_some() {
            debug!(reader = self.reader.name(), "Monitor already running");
            return Ok(());
        }

        let name = CString::new(self.reader.name())
            .map_err(|_| PcscError::ReaderNotFound(self.reader.name().to_string()))?;
        let watch_context = Context::establish(Scope::User)?;
        let running = Arc::new(AtomicBool::new(true));

        let handle = {
            let context = watch_context.clone();
            let card_context = self.context.clone();
            let reader = Arc::clone(&self.reader);
            let running = Arc::clone(&running);
            let config = self.config;
            thread::Builder::new()
                .name("nxm-pcsc-monitor".to_string())
                .spawn(move || {
                    watch(&context, &card_context, &reader, &running, name, interval, config);
                })
                .map_err(|e| PcscError::Other(e.to_string()))?
        };

        info!(reader = self.reader.name(), ?interval, "Monitor started");
        *worker = Some(Worker {
            context: watch_context,
            running,
            handle,
        });
        Ok(())
    }

    fn stop(&self) -> Result<(), PcscError> {
        let Some(worker) = self.worker.lock().take() else {
            return Ok(());
        };

        worker.running.store(false, Ordering::SeqCst);
        // wake a blocked status call; the loop exits on Cancelled
        let cancelled = worker.context.cancel();
        if worker.handle.join().is_err() {
            warn!(reader = self.reader.name(), "Monitor thread panicked");
        }
        info!(reader = self.reader.name(), "Monitor stopped");
        cancelled.map_err(PcscError::from)
    }
}

fn watch(
    context: &Context,
    card_context: &Context,
    reader: &Reader,
    running: &AtomicBool,
    name: CString,
    interval: Duration,
    config: PcscConfig,
) {
    let mut states = [ReaderState::new(name.clone(), State::UNAWARE)];
    let mut last_atr: Option<Bytes> = None;

    while running.load(Ordering::SeqCst) {
        match context.get_status_change(Some(interval), &mut states) {
            Ok(()) => {
                let event = states[0].event_state();
                trace!(state = ?event, "Status change");
                if event.contains(State::PRESENT)
                    && !event.contains(State::EMPTY)
                    && !event.contains(State::MUTE)
                {
                    let atr = Bytes::copy_from_slice(states[0].atr());
                    if last_atr.as_ref() != Some(&atr) {
                        last_atr = Some(atr.clone());
                        let card = PcscCard::new(card_context.clone(), name.clone(), atr, config);
                        reader.on_discovered(Arc::new(card));
                    }
                } else if event.contains(State::EMPTY) && last_atr.take().is_some() {
                    debug!(reader = reader.name(), "Slot empty");
                }
                states[0].sync_current_state();
            }
            Err(pcsc::Error::Timeout) => {}
            Err(pcsc::Error::Cancelled) => break,
            Err(e) => {
                warn!(reader = reader.name(), error = %e, "Status change failed");
                thread::sleep(interval);
            }
        }
    }
    running.store(false, Ordering::SeqCst);
}

impl DetectionControl for PcscMonitor {
    fn enable_reader_mode(&self, mode: &ReaderMode) -> Result<(), TransportError> {
        if !mode.flags.contains(ReaderFlags::CONTACT) {
            return Err(TransportError::Unsupported(
                "detection without an active contact protocol",
            ));
        }
        let interval = mode
            .presence_check_delay
            .unwrap_or(self.config.poll_interval)
            .max(MIN_POLL_INTERVAL);
        self.start(interval).map_err(TransportError::from)
    }

    fn disable_reader_mode(&self) -> Result<(), TransportError> {
        self.stop().map_err(TransportError::from)
    }
}

impl Drop for PcscMonitor {
    fn drop(&mut self) {
        if let Err(e) = self.stop() {
            debug!(error = %e, "Failed to stop monitor cleanly");
        }
    }
}
