//! Bounded, cancellable wait for card removal
//!
//! The platform signals removal from its own thread while an application
//! thread blocks in [`RemovalWaiter::wait`]. Both sides meet on a dedicated
//! mutex and condition variable that is never the reader's state lock.

use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};
use tracing::{debug, trace, warn};

use crate::card::RawCard;
use crate::transport::TransportError;

/// How a reader learns that its card has gone
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemovalStrategy {
    /// The raw card reference delivers its own removal notification
    Native,
    /// A helper thread probes presence every `interval`
    Polling {
        /// Delay between two presence probes
        interval: Duration,
    },
}

impl RemovalStrategy {
    /// Poll interval used when the platform offers no native notification
    pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(100);

    /// Pick the strategy from the platform capability flag
    pub const fn from_capability(native: bool) -> Self {
        if native {
            Self::Native
        } else {
            Self::Polling {
                interval: Self::DEFAULT_POLL_INTERVAL,
            }
        }
    }

    /// Arrange for `notifier` to fire when `card` is removed
    pub fn arm(&self, card: Arc<dyn RawCard>, notifier: RemovalNotifier) -> Result<(), TransportError> {
        match *self {
            Self::Native => card.watch_removal(notifier),
            Self::Polling { interval } => {
                thread::Builder::new()
                    .name("nxm-removal-poll".to_string())
                    .spawn(move || {
                        while notifier.is_pending() {
                            if !card.is_present() {
                                trace!("Presence probe reports card gone");
                                notifier.notify();
                                break;
                            }
                            thread::sleep(interval);
                        }
                    })?;
                Ok(())
            }
        }
    }
}

/// Result of one removal wait
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemovalOutcome {
    /// The platform confirmed removal
    Removed,
    /// The timeout elapsed first
    TimedOut,
    /// [`RemovalWaiter::cancel`] ended the wait
    Cancelled,
    /// The platform notification could not be armed
    Failed,
    /// Another wait was outstanding; no second wait was started
    AlreadyWaiting {
        /// Whether the outstanding wait has already observed removal
        removed: bool,
    },
}

impl RemovalOutcome {
    /// Check if this outcome reports the card as removed
    pub const fn is_removed(self) -> bool {
        matches!(
            self,
            Self::Removed | Self::AlreadyWaiting { removed: true }
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Signal {
    Removed,
    Cancelled,
}

#[derive(Debug, Default)]
struct WaitState {
    outstanding: bool,
    generation: u64,
    outcome: Option<Signal>,
}

#[derive(Debug, Default)]
struct Shared {
    state: Mutex<WaitState>,
    signal: Condvar,
}

/// Coordinates one waiting thread with removal and cancel signals
#[derive(Debug, Default)]
pub struct RemovalWaiter {
    shared: Arc<Shared>,
}

impl RemovalWaiter {
    /// Create an idle waiter
    pub fn new() -> Self {
        Self::default()
    }

    /// Block until removal is signalled, the wait is cancelled or `timeout`
    /// elapses
    ///
    /// `arm` receives the notifier for this wait and must hand it to whatever
    /// will observe removal. It runs before blocking and outside the waiter's
    /// lock, so a notifier fired from inside `arm` is not lost.
    pub fn wait<F>(&self, timeout: Duration, arm: F) -> RemovalOutcome
    where
        F: FnOnce(RemovalNotifier) -> Result<(), TransportError>,
    {
        let generation = {
            let mut state = self.shared.state.lock();
            if state.outstanding {
                let removed = state.outcome == Some(Signal::Removed);
                debug!(removed, "Removal wait already outstanding");
                return RemovalOutcome::AlreadyWaiting { removed };
            }
            state.outstanding = true;
            state.outcome = None;
            state.generation = state.generation.wrapping_add(1);
            state.generation
        };

        let notifier = RemovalNotifier {
            shared: Arc::clone(&self.shared),
            generation,
        };
        if let Err(error) = arm(notifier) {
            warn!(%error, "Failed to arm removal notification");
            self.shared.state.lock().outstanding = false;
            return RemovalOutcome::Failed;
        }

        let deadline = Instant::now().checked_add(timeout);
        let mut state = self.shared.state.lock();
        while state.outcome.is_none() {
            match deadline {
                Some(deadline) => {
                    if self.shared.signal.wait_until(&mut state, deadline).timed_out() {
                        break;
                    }
                }
                None => self.shared.signal.wait(&mut state),
            }
        }

        state.outstanding = false;
        let outcome = match state.outcome.take() {
            Some(Signal::Removed) => RemovalOutcome::Removed,
            Some(Signal::Cancelled) => RemovalOutcome::Cancelled,
            None => RemovalOutcome::TimedOut,
        };
        debug!(?outcome, "Removal wait finished");
        outcome
    }

    /// Unblock the outstanding wait, which then reports no removal
    ///
    /// Does nothing when no wait is outstanding.
    pub fn cancel(&self) {
        let mut state = self.shared.state.lock();
        if state.outstanding {
            state.outcome = Some(Signal::Cancelled);
            self.shared.signal.notify_all();
        }
    }

    /// Check if a wait is in progress
    pub fn is_waiting(&self) -> bool {
        self.shared.state.lock().outstanding
    }
}

/// Handle the platform uses to report removal for one specific wait
///
/// Signals from a notifier whose wait has already finished are ignored.
#[derive(Debug, Clone)]
pub struct RemovalNotifier {
    shared: Arc<Shared>,
    generation: u64,
}

impl RemovalNotifier {
    /// Report that the card is gone
    pub fn notify(&self) {
        let mut state = self.shared.state.lock();
        if state.outstanding && state.generation == self.generation {
            state.outcome = Some(Signal::Removed);
            self.shared.signal.notify_all();
        } else {
            trace!(generation = self.generation, "Ignoring stale removal signal");
        }
    }

    /// Check if the wait this notifier belongs to is still undecided
    pub fn is_pending(&self) -> bool {
        let state = self.shared.state.lock();
        state.outstanding && state.generation == self.generation && state.outcome.is_none()
    }
}
