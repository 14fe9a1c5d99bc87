//! PC/SC contact transport for the nexum reader abstraction
//!
//! This crate realises the contact secure-element side of
//! `nexum-apdu-reader` over the PC/SC API: [`PcscCard`] is the raw card
//! reference handed to a [`Reader`](nexum_apdu_reader::Reader),
//! [`PcscTransport`] the session behind it, and [`PcscMonitor`] the
//! status-change loop that reports inserted cards.
//!
//! # Examples
//!
//! ```no_run
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! use std::time::Duration;
//!
//! use nexum_apdu_reader::protocols;
//! use nexum_apdu_transport_pcsc::PcscDeviceManager;
//!
//! let manager = PcscDeviceManager::new()?;
//! let readers = manager.list_readers()?;
//! let reader = manager.reader(readers[0].name())?;
//! reader.activate_protocol(protocols::ISO_7816_3)?;
//!
//! let monitor = manager.monitor(reader.clone());
//! reader.enable_detection(&monitor)?;
//!
//! // wait for the monitor to report a card
//! reader.events().recv()?;
//! reader.open()?;
//! let response = reader.transmit(&hex::decode("00A4040008A000000003000000")?)?;
//! println!("Response: {}", hex::encode_upper(&response));
//! reader.close()?;
//!
//! reader.wait_for_removal(Duration::from_secs(30));
//! reader.disable_detection(&monitor)?;
//! # Ok(())
//! # }
//! ```
#![cfg_attr(not(test), warn(unused_crate_dependencies))]
#![warn(missing_docs)]

pub mod atr;
mod card;
mod config;
mod error;
mod manager;
mod monitor;
mod reader;
mod transport;

pub use card::PcscCard;
pub use config::{PcscConfig, ShareMode};
pub use error::PcscError;
pub use manager::PcscDeviceManager;
pub use monitor::PcscMonitor;
pub use reader::PcscReader;
pub use transport::PcscTransport;

// Re-export some pcsc types for convenience
pub use pcsc::Protocols;
