//! The uniform reader and its channel state machine
//!
//! A [`Reader`] is shared between the platform thread that reports
//! discovered cards and the application threads that open, use and close the
//! channel. The channel state and the card handle live together in one
//! tagged value behind one mutex, so no thread ever sees a handle without its
//! state or the other way round.

use std::collections::BTreeSet;
use std::fmt;
use std::mem;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use crossbeam_channel::{Receiver, Sender, unbounded};
use parking_lot::{Mutex, RwLock};
use tracing::{debug, error, info, trace, warn};

use crate::card::{CardHandle, RawCard, TransportKind};
use crate::config::{ReaderMode, ReaderParameters};
use crate::error::{Error, Result};
use crate::event::{DetectionControl, ReaderEvent};
use crate::removal::{RemovalOutcome, RemovalStrategy, RemovalWaiter};
use crate::transceiver::transceive;

/// Description reported when no card is present
const NO_TAG: &str = "no-tag";

/// Observable state of a reader's channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, derive_more::Display)]
pub enum ChannelState {
    /// No card present
    #[display("absent")]
    Absent,
    /// Card present, channel not open
    #[display("disconnected")]
    Disconnected,
    /// Card present, channel open
    #[display("connected")]
    Connected,
}

#[derive(Debug, Default)]
enum Channel {
    #[default]
    Absent,
    Disconnected(CardHandle),
    Connected(CardHandle),
}

impl Channel {
    fn take(&mut self) -> Self {
        mem::take(self)
    }

    const fn state(&self) -> ChannelState {
        match self {
            Self::Absent => ChannelState::Absent,
            Self::Disconnected(_) => ChannelState::Disconnected,
            Self::Connected(_) => ChannelState::Connected,
        }
    }

    const fn handle(&self) -> Option<&CardHandle> {
        match self {
            Self::Absent => None,
            Self::Disconnected(handle) | Self::Connected(handle) => Some(handle),
        }
    }

    const fn connected_mut(&mut self) -> Option<&mut CardHandle> {
        match self {
            Self::Connected(handle) => Some(handle),
            _ => None,
        }
    }

    fn into_handle(self) -> Option<CardHandle> {
        match self {
            Self::Absent => None,
            Self::Disconnected(handle) | Self::Connected(handle) => Some(handle),
        }
    }
}

/// Channel state and ATR taken under one lock
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReaderStatus {
    /// Channel state
    pub state: ChannelState,
    /// ATR of the present card, if any
    pub atr: Option<Bytes>,
}

/// One physical reader seen through the uniform abstraction
pub struct Reader {
    name: String,
    kind: TransportKind,
    channel: Mutex<Channel>,
    parameters: RwLock<ReaderParameters>,
    protocols: RwLock<BTreeSet<String>>,
    removal: RemovalWaiter,
    removal_strategy: RemovalStrategy,
    event_tx: Sender<ReaderEvent>,
    event_rx: Receiver<ReaderEvent>,
}

impl fmt::Debug for Reader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Reader")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("state", &self.state())
            .field("removal_strategy", &self.removal_strategy)
            .finish_non_exhaustive()
    }
}

impl Reader {
    /// Create a reader with no card present
    pub fn new<S: Into<String>>(name: S, kind: TransportKind, removal: RemovalStrategy) -> Self {
        let (event_tx, event_rx) = unbounded();
        Self {
            name: name.into(),
            kind,
            channel: Mutex::new(Channel::Absent),
            parameters: RwLock::new(ReaderParameters::new()),
            protocols: RwLock::new(BTreeSet::new()),
            removal: RemovalWaiter::new(),
            removal_strategy: removal,
            event_tx,
            event_rx,
        }
    }

    /// Reader name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Transport family
    pub const fn kind(&self) -> TransportKind {
        self.kind
    }

    /// Check if this is a proximity reader
    pub const fn is_contactless(&self) -> bool {
        self.kind.is_contactless()
    }

    /// Removal strategy chosen at construction
    pub const fn removal_strategy(&self) -> RemovalStrategy {
        self.removal_strategy
    }

    /// Handle a card reported by the platform
    ///
    /// Called from the platform's discovery thread. A card with no supported
    /// technology is logged and otherwise ignored; the reader keeps its
    /// previous state.
    pub fn on_discovered(&self, raw: Arc<dyn RawCard>) {
        let handle = match CardHandle::try_build(self.kind, raw) {
            Ok(handle) => handle,
            Err(e) => {
                error!(reader = %self.name, error = %e, "Discarding discovered card");
                return;
            }
        };
        let description = handle.description();
        let atr = handle.atr().cloned();

        {
            let mut channel = self.channel.lock();
            if let Channel::Connected(mut previous) = channel.take() {
                debug!(reader = %self.name, "Replacing connected card");
                if let Err(e) = previous.disconnect() {
                    warn!(reader = %self.name, error = %e, "Failed to disconnect superseded card");
                }
            }
            *channel = Channel::Disconnected(handle);
        }

        info!(reader = %self.name, card = %description, "Card discovered");
        let _ = self.event_tx.send(ReaderEvent::CardInserted {
            reader: self.name.clone(),
            atr,
        });
    }

    /// Open the logical channel to the present card
    ///
    /// Does nothing when the channel is already open.
    pub fn open(&self) -> Result<()> {
        let mut channel = self.channel.lock();
        match channel.take() {
            Channel::Absent => Err(Error::channel_open("no card present")),
            Channel::Connected(handle) => {
                trace!(reader = %self.name, "Channel already open");
                *channel = Channel::Connected(handle);
                Ok(())
            }
            Channel::Disconnected(mut handle) => {
                if handle.is_connected() {
                    debug!(reader = %self.name, "Transport already connected");
                    *channel = Channel::Connected(handle);
                    return Ok(());
                }
                match handle.connect() {
                    Ok(()) => {
                        info!(reader = %self.name, card = %handle.description(), "Channel opened");
                        *channel = Channel::Connected(handle);
                        Ok(())
                    }
                    Err(source) => {
                        *channel = Channel::Disconnected(handle);
                        Err(Error::ChannelOpen {
                            message: "failed to connect card".to_string(),
                            source: Some(source),
                        })
                    }
                }
            }
        }
    }

    /// Close the channel and forget the card
    ///
    /// The reader ends up with no card present even when the transport
    /// reports a disconnect failure.
    pub fn close(&self) -> Result<()> {
        let mut channel = self.channel.lock();
        let Some(mut handle) = channel.take().into_handle() else {
            trace!(reader = %self.name, "No channel to close");
            return Ok(());
        };

        let result = handle.disconnect();
        drop(handle);
        match result {
            Ok(()) => {
                info!(reader = %self.name, "Channel closed");
                Ok(())
            }
            Err(source) => {
                warn!(reader = %self.name, error = %source, "Disconnect failed, channel cleared");
                Err(Error::ChannelClose { source })
            }
        }
    }

    /// Exchange one APDU over the open channel
    ///
    /// Holds the channel lock for the whole exchange, so concurrent calls are
    /// serialized.
    pub fn transmit(&self, command: &[u8]) -> Result<Bytes> {
        let mut channel = self.channel.lock();
        transceive(channel.connected_mut(), command)
    }

    /// Block until the present card is removed or `timeout` elapses
    ///
    /// Returns `true` right away when no card is present. If another wait is
    /// already outstanding, returns whether that one has seen removal without
    /// waiting. A confirmed removal closes the channel and forgets the card.
    pub fn wait_for_removal(&self, timeout: Duration) -> bool {
        let raw = self.channel.lock().handle().map(|h| Arc::clone(h.raw()));
        let Some(raw) = raw else {
            debug!(reader = %self.name, "No card to wait for");
            return true;
        };

        let strategy = self.removal_strategy;
        let armed = Arc::clone(&raw);
        let outcome = self
            .removal
            .wait(timeout, move |notifier| strategy.arm(armed, notifier));

        if outcome == RemovalOutcome::Removed {
            self.forget_removed(&raw);
            info!(reader = %self.name, "Card removed");
            let _ = self.event_tx.send(ReaderEvent::CardRemoved {
                reader: self.name.clone(),
            });
        }
        outcome.is_removed()
    }

    /// Drop `raw` from the channel unless a newer card has replaced it
    fn forget_removed(&self, raw: &Arc<dyn RawCard>) {
        let mut channel = self.channel.lock();
        if !channel.handle().is_some_and(|h| Arc::ptr_eq(h.raw(), raw)) {
            debug!(reader = %self.name, "Removed card already superseded");
            return;
        }
        if let Channel::Connected(mut handle) = channel.take()
            && let Err(e) = handle.disconnect()
        {
            debug!(reader = %self.name, error = %e, "Disconnect of removed card failed");
        }
    }

    /// Unblock an outstanding [`Self::wait_for_removal`]
    pub fn cancel_removal_wait(&self) {
        self.removal.cancel();
    }

    /// Check if the present card was matched by `protocol`
    ///
    /// Always `false` with no card present.
    pub fn is_current_protocol(&self, protocol: &str) -> Result<bool> {
        let selector = self.kind.registry().resolve(protocol)?;
        Ok(self
            .channel
            .lock()
            .handle()
            .is_some_and(|handle| handle.technology() == selector))
    }

    /// Cached ATR of the present card
    pub fn atr(&self) -> Option<Bytes> {
        self.channel.lock().handle().and_then(|h| h.atr().cloned())
    }

    /// Check if a card is present
    pub fn is_present(&self) -> bool {
        self.state() != ChannelState::Absent
    }

    /// Check if the channel is open
    pub fn is_channel_open(&self) -> bool {
        self.state() == ChannelState::Connected
    }

    /// Snapshot of the channel state
    pub fn state(&self) -> ChannelState {
        self.channel.lock().state()
    }

    /// State and ATR observed together
    pub fn status(&self) -> ReaderStatus {
        let channel = self.channel.lock();
        ReaderStatus {
            state: channel.state(),
            atr: channel.handle().and_then(|h| h.atr().cloned()),
        }
    }

    /// `"<hex id> - <technologies>"` of the present card, or `"no-tag"`
    pub fn card_description(&self) -> String {
        self.channel
            .lock()
            .handle()
            .map_or_else(|| NO_TAG.to_string(), CardHandle::description)
    }

    /// Receiver of insert/remove events
    pub fn events(&self) -> Receiver<ReaderEvent> {
        self.event_rx.clone()
    }

    /// Validate and store a reader parameter
    pub fn set_parameter(&self, name: &str, value: &str) -> Result<()> {
        self.parameters.write().set(name, value)
    }

    /// Current parameter values
    pub fn parameters(&self) -> ReaderParameters {
        self.parameters.read().clone()
    }

    /// Enable detection of cards speaking `protocol`
    pub fn activate_protocol(&self, protocol: &str) -> Result<()> {
        self.kind.registry().resolve(protocol)?;
        debug!(reader = %self.name, protocol, "Activating protocol");
        self.protocols.write().insert(protocol.to_string());
        Ok(())
    }

    /// Enable every known protocol in `protocols`; unknown ids are skipped
    pub fn activate_protocols<I, S>(&self, protocols: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let known = self.kind.registry().resolve_subset(protocols);
        self.protocols.write().extend(known.into_keys());
    }

    /// Stop detecting cards speaking `protocol`
    ///
    /// Returns whether the protocol was active.
    pub fn deactivate_protocol(&self, protocol: &str) -> bool {
        self.protocols.write().remove(protocol)
    }

    /// Currently active protocol ids
    pub fn active_protocols(&self) -> Vec<String> {
        self.protocols.read().iter().cloned().collect()
    }

    /// Detection settings computed from active protocols and parameters
    pub fn reader_mode(&self) -> ReaderMode {
        let flags = self
            .kind
            .registry()
            .detection_flags(self.protocols.read().iter())
            | self.parameters.read().flags();
        let presence_check_delay = self.parameters.read().presence_check_delay();
        ReaderMode {
            flags,
            presence_check_delay,
        }
    }

    /// Ask the platform to start reporting cards
    pub fn enable_detection<C: DetectionControl + ?Sized>(&self, control: &C) -> Result<()> {
        let mode = self.reader_mode();
        info!(reader = %self.name, flags = %mode.flags, "Enabling card detection");
        control
            .enable_reader_mode(&mode)
            .map_err(|source| Error::Discovery {
                message: "failed to enable card detection".to_string(),
                source: Some(source),
            })
    }

    /// Ask the platform to stop reporting cards
    pub fn disable_detection<C: DetectionControl + ?Sized>(&self, control: &C) -> Result<()> {
        info!(reader = %self.name, "Disabling card detection");
        control
            .disable_reader_mode()
            .map_err(|source| Error::Discovery {
                message: "failed to disable card detection".to_string(),
                source: Some(source),
            })
    }
}
