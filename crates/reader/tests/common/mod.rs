//! Common test utilities

#![allow(dead_code, unreachable_pub)]

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use bytes::Bytes;
use nexum_apdu_reader::{
    CardTransport, RawCard, Reader, RemovalNotifier, RemovalStrategy, TransportError,
    TransportKind, tech,
};
use parking_lot::Mutex;

/// Shared counters and canned responses behind a [`FakeTransport`]
#[derive(Debug, Default)]
pub struct Probe {
    pub connected: AtomicBool,
    pub connects: AtomicUsize,
    pub disconnects: AtomicUsize,
    pub fail_connect: AtomicBool,
    pub fail_disconnect: AtomicBool,
    pub fail_transmit: AtomicBool,
    pub response: Mutex<Bytes>,
    pub commands: Mutex<Vec<Bytes>>,
}

impl Probe {
    pub fn respond_with(&self, response: &'static [u8]) {
        *self.response.lock() = Bytes::from_static(response);
    }

    pub fn connects(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    pub fn disconnects(&self) -> usize {
        self.disconnects.load(Ordering::SeqCst)
    }
}

/// Transport recording every call into a [`Probe`]
#[derive(Debug)]
pub struct FakeTransport {
    probe: Arc<Probe>,
    atr: Option<Bytes>,
}

impl CardTransport for FakeTransport {
    fn connect(&mut self) -> Result<(), TransportError> {
        self.probe.connects.fetch_add(1, Ordering::SeqCst);
        if self.probe.fail_connect.load(Ordering::SeqCst) {
            return Err(TransportError::Connection);
        }
        self.probe.connected.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn disconnect(&mut self) -> Result<(), TransportError> {
        self.probe.disconnects.fetch_add(1, Ordering::SeqCst);
        self.probe.connected.store(false, Ordering::SeqCst);
        if self.probe.fail_disconnect.load(Ordering::SeqCst) {
            return Err(TransportError::Device);
        }
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.probe.connected.load(Ordering::SeqCst)
    }

    fn do_transmit_raw(&mut self, command: &[u8]) -> Result<Bytes, TransportError> {
        self.probe
            .commands
            .lock()
            .push(Bytes::copy_from_slice(command));
        if self.probe.fail_transmit.load(Ordering::SeqCst) {
            return Err(TransportError::Transmission);
        }
        Ok(self.probe.response.lock().clone())
    }

    fn atr(&self) -> Option<Bytes> {
        self.atr.clone()
    }
}

/// Platform card whose removal the test controls
#[derive(Debug)]
pub struct FakeCard {
    pub technologies: Vec<String>,
    pub probe: Arc<Probe>,
    pub atr: Option<Bytes>,
    pub present: AtomicBool,
    pub native_removal: bool,
    pub notifiers: Mutex<Vec<RemovalNotifier>>,
}

impl FakeCard {
    pub fn new(technologies: &[&str]) -> Self {
        Self {
            technologies: technologies.iter().map(|t| t.to_string()).collect(),
            probe: Arc::new(Probe::default()),
            atr: Some(Bytes::from_static(&[0x3B, 0x80, 0x80, 0x01, 0x01])),
            present: AtomicBool::new(true),
            native_removal: true,
            notifiers: Mutex::new(Vec::new()),
        }
    }

    pub fn iso_dep() -> Self {
        Self::new(&[tech::NFC_A, tech::ISO_DEP, tech::NDEF])
    }

    /// Pull the card out: presence probes fail and native watchers fire
    pub fn remove(&self) {
        self.present.store(false, Ordering::SeqCst);
        for notifier in self.notifiers.lock().drain(..) {
            notifier.notify();
        }
    }
}

impl RawCard for FakeCard {
    fn id(&self) -> Bytes {
        Bytes::from_static(&[0x04, 0x11, 0x22, 0x33])
    }

    fn technologies(&self) -> Vec<String> {
        self.technologies.clone()
    }

    fn open(&self, _technology: &str) -> Result<Box<dyn CardTransport>, TransportError> {
        Ok(Box::new(FakeTransport {
            probe: Arc::clone(&self.probe),
            atr: self.atr.clone(),
        }))
    }

    fn is_present(&self) -> bool {
        self.present.load(Ordering::SeqCst)
    }

    fn watch_removal(&self, notifier: RemovalNotifier) -> Result<(), TransportError> {
        if !self.native_removal {
            return Err(TransportError::Unsupported("native removal notification"));
        }
        self.notifiers.lock().push(notifier);
        Ok(())
    }
}

pub fn contactless_reader() -> Reader {
    Reader::new("nfc", TransportKind::Contactless, RemovalStrategy::Native)
}

pub fn polling_reader() -> Reader {
    Reader::new(
        "nfc-polling",
        TransportKind::Contactless,
        RemovalStrategy::Polling {
            interval: Duration::from_millis(20),
        },
    )
}

/// Deliver `card` to `reader` and hand it back for later control
pub fn insert(reader: &Reader, card: FakeCard) -> Arc<FakeCard> {
    let card = Arc::new(card);
    reader.on_discovered(card.clone());
    card
}
