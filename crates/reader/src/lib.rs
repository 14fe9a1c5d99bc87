//! Uniform smart-card reader abstraction
//!
//! This crate lets card-access code drive a proximity tag reader and a
//! contact secure-element session through one [`Reader`] type: detect card
//! presence, open and close a logical channel, identify the active protocol
//! and exchange raw APDUs (ISO/IEC 7816-4).
//!
//! Platform bindings plug in at two seams:
//!
//! - [`RawCard`] is the opaque card reference a discovery callback delivers,
//!   handing out one [`CardTransport`] per technology it supports.
//! - [`DetectionControl`] starts and stops the platform's card detection with
//!   the [`ReaderMode`] computed from active protocols and parameters.
//!
//! # Examples
//!
//! ```
//! # fn main() -> Result<(), nexum_apdu_reader::Error> {
//! use nexum_apdu_reader::{ProtocolRegistry, ReaderFlags, protocols};
//!
//! let registry = ProtocolRegistry::contactless();
//! assert_eq!(registry.resolve(protocols::ISO_14443_4)?, "android.nfc.tech.IsoDep");
//!
//! let flags = registry.detection_flags([protocols::ISO_14443_4, protocols::NFC_F_JIS_6319_4]);
//! assert_eq!(flags, ReaderFlags::NFC_A | ReaderFlags::NFC_B | ReaderFlags::NFC_F);
//! # Ok(())
//! # }
//! ```
#![cfg_attr(not(test), warn(unused_crate_dependencies))]
#![forbid(unsafe_code)]
#![warn(missing_docs, rustdoc::missing_crate_level_docs)]

pub use bytes::Bytes;

pub mod card;
pub mod config;
pub mod error;
pub mod event;
pub mod protocol;
pub mod reader;
pub mod removal;
mod transceiver;
pub mod transport;

pub use card::{CardHandle, RawCard, TransportKind};
pub use config::{ReaderFlags, ReaderMode, ReaderParameter, ReaderParameters};
pub use error::{Error, Result};
pub use event::{DetectionControl, ReaderEvent};
pub use protocol::{ProtocolBinding, ProtocolRegistry, protocols, tech};
pub use reader::{ChannelState, Reader, ReaderStatus};
pub use removal::{RemovalNotifier, RemovalOutcome, RemovalStrategy, RemovalWaiter};
pub use transport::{CardTransport, TransportError};

/// Prelude module containing commonly used traits and types
pub mod prelude {
    pub use crate::{
        Bytes, CardTransport, ChannelState, DetectionControl, Error, RawCard, Reader,
        ReaderEvent, RemovalStrategy, TransportError, TransportKind,
    };
}
