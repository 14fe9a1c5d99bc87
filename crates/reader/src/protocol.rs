//! Protocol identifiers and the transport selectors that detect them
//!
//! Application code names card protocols with identifiers from a fixed
//! vocabulary ([`protocols`]). Each transport kind detects them through its
//! own technology names ([`tech`]). [`ProtocolRegistry`] is the one place that
//! maps between the two.

use std::collections::BTreeMap;

use tracing::debug;

use crate::config::ReaderFlags;
use crate::error::{Error, Result};

/// Protocol identifiers understood by the registries
pub mod protocols {
    /// ISO 14443-4 (contactless ISO 7816 APDU transport)
    pub const ISO_14443_4: &str = "ISO_14443_4";
    /// NFC-A / ISO 14443-3A
    pub const NFC_A_ISO_14443_3A: &str = "NFC_A_ISO_14443_3A";
    /// NFC-B / ISO 14443-3B
    pub const NFC_B_ISO_14443_3B: &str = "NFC_B_ISO_14443_3B";
    /// NFC-F / JIS 6319-4
    pub const NFC_F_JIS_6319_4: &str = "NFC_F_JIS_6319_4";
    /// NFC-V / ISO 15693
    pub const NFC_V_ISO_15693: &str = "NFC_V_ISO_15693";
    /// NDEF formatted tag
    pub const NFC_NDEF_TAG: &str = "NFC_NDEF_TAG";
    /// Tag that can be NDEF formatted
    pub const NFC_NDEF_FORMATABLE: &str = "NFC_NDEF_FORMATABLE";
    /// NFC barcode
    pub const NFC_BARCODE: &str = "NFC_BARCODE";
    /// MIFARE Ultralight
    pub const MIFARE_ULTRA_LIGHT: &str = "MIFARE_ULTRA_LIGHT";
    /// MIFARE Classic
    pub const MIFARE_CLASSIC: &str = "MIFARE_CLASSIC";
    /// ISO 7816-3 contact card, any transmission protocol
    pub const ISO_7816_3: &str = "ISO_7816_3";
    /// ISO 7816-3 contact card, T=0
    pub const ISO_7816_3_T0: &str = "ISO_7816_3_T0";
    /// ISO 7816-3 contact card, T=1
    pub const ISO_7816_3_T1: &str = "ISO_7816_3_T1";
}

/// Transport-specific technology selectors
pub mod tech {
    /// ISO-DEP (ISO 14443-4) tag technology
    pub const ISO_DEP: &str = "android.nfc.tech.IsoDep";
    /// NFC-A tag technology
    pub const NFC_A: &str = "android.nfc.tech.NfcA";
    /// NFC-B tag technology
    pub const NFC_B: &str = "android.nfc.tech.NfcB";
    /// NFC-F tag technology
    pub const NFC_F: &str = "android.nfc.tech.NfcF";
    /// NFC-V tag technology
    pub const NFC_V: &str = "android.nfc.tech.NfcV";
    /// NDEF tag technology
    pub const NDEF: &str = "android.nfc.tech.Ndef";
    /// NDEF formatable tag technology
    pub const NDEF_FORMATABLE: &str = "android.nfc.tech.NdefFormatable";
    /// NFC barcode tag technology
    pub const NFC_BARCODE: &str = "android.nfc.tech.NfcBarcode";
    /// MIFARE Ultralight tag technology
    pub const MIFARE_ULTRALIGHT: &str = "android.nfc.tech.MifareUltralight";
    /// MIFARE Classic tag technology
    pub const MIFARE_CLASSIC: &str = "android.nfc.tech.MifareClassic";
    /// Contact session, transmission protocol not pinned
    pub const ISO_7816_3: &str = "iso7816-3";
    /// Contact session over T=0
    pub const ISO_7816_3_T0: &str = "iso7816-3.t0";
    /// Contact session over T=1
    pub const ISO_7816_3_T1: &str = "iso7816-3.t1";

    /// Technology name without its platform package prefix
    pub fn short_name(technology: &str) -> &str {
        technology.rsplit('.').next().unwrap_or(technology)
    }
}

/// One entry of a registry: a protocol identifier and the selector that
/// detects it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProtocolBinding {
    protocol: &'static str,
    selector: &'static str,
    flags: ReaderFlags,
}

impl ProtocolBinding {
    const fn new(protocol: &'static str, selector: &'static str, flags: ReaderFlags) -> Self {
        Self {
            protocol,
            selector,
            flags,
        }
    }

    /// Protocol identifier
    pub const fn protocol(&self) -> &'static str {
        self.protocol
    }

    /// Transport selector
    pub const fn selector(&self) -> &'static str {
        self.selector
    }

    /// Detection capability requested when this protocol is active
    pub const fn flags(&self) -> ReaderFlags {
        self.flags
    }
}

/// Fixed mapping from protocol identifiers to transport selectors
#[derive(Debug)]
pub struct ProtocolRegistry {
    bindings: &'static [ProtocolBinding],
}

static CONTACTLESS: ProtocolRegistry = ProtocolRegistry {
    bindings: &[
        ProtocolBinding::new(
            protocols::ISO_14443_4,
            tech::ISO_DEP,
            ReaderFlags::NFC_A.union(ReaderFlags::NFC_B),
        ),
        ProtocolBinding::new(protocols::NFC_A_ISO_14443_3A, tech::NFC_A, ReaderFlags::NFC_A),
        ProtocolBinding::new(protocols::NFC_B_ISO_14443_3B, tech::NFC_B, ReaderFlags::NFC_B),
        ProtocolBinding::new(protocols::NFC_F_JIS_6319_4, tech::NFC_F, ReaderFlags::NFC_F),
        ProtocolBinding::new(protocols::NFC_V_ISO_15693, tech::NFC_V, ReaderFlags::NFC_V),
        ProtocolBinding::new(protocols::NFC_NDEF_TAG, tech::NDEF, ReaderFlags::NONE),
        ProtocolBinding::new(
            protocols::NFC_NDEF_FORMATABLE,
            tech::NDEF_FORMATABLE,
            ReaderFlags::NONE,
        ),
        ProtocolBinding::new(
            protocols::NFC_BARCODE,
            tech::NFC_BARCODE,
            ReaderFlags::NFC_BARCODE,
        ),
        ProtocolBinding::new(
            protocols::MIFARE_ULTRA_LIGHT,
            tech::MIFARE_ULTRALIGHT,
            ReaderFlags::NFC_A,
        ),
        ProtocolBinding::new(
            protocols::MIFARE_CLASSIC,
            tech::MIFARE_CLASSIC,
            ReaderFlags::NFC_A,
        ),
    ],
};

static CONTACT: ProtocolRegistry = ProtocolRegistry {
    bindings: &[
        ProtocolBinding::new(protocols::ISO_7816_3, tech::ISO_7816_3, ReaderFlags::CONTACT),
        ProtocolBinding::new(
            protocols::ISO_7816_3_T0,
            tech::ISO_7816_3_T0,
            ReaderFlags::CONTACT,
        ),
        ProtocolBinding::new(
            protocols::ISO_7816_3_T1,
            tech::ISO_7816_3_T1,
            ReaderFlags::CONTACT,
        ),
    ],
};

impl ProtocolRegistry {
    /// Registry of the contactless tag transport
    pub fn contactless() -> &'static Self {
        &CONTACTLESS
    }

    /// Registry of the contact secure-element transport
    pub fn contact() -> &'static Self {
        &CONTACT
    }

    fn binding(&self, protocol: &str) -> Option<&'static ProtocolBinding> {
        self.bindings.iter().find(|b| b.protocol == protocol)
    }

    /// Transport selector for a protocol identifier
    pub fn resolve(&self, protocol: &str) -> Result<&'static str> {
        self.binding(protocol)
            .map(|b| b.selector)
            .ok_or_else(|| Error::ProtocolNotFound(protocol.to_string()))
    }

    /// Selectors for the known identifiers of `protocols`
    ///
    /// Identifiers missing from the registry are left out of the result
    /// instead of failing the whole lookup.
    pub fn resolve_subset<I, S>(&self, protocols: I) -> BTreeMap<String, &'static str>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        protocols
            .into_iter()
            .filter_map(|protocol| {
                let protocol = protocol.as_ref();
                match self.binding(protocol) {
                    Some(binding) => Some((protocol.to_string(), binding.selector)),
                    None => {
                        debug!(protocol, "Ignoring unknown protocol");
                        None
                    }
                }
            })
            .collect()
    }

    /// Detection flags for a set of active protocol identifiers
    ///
    /// The result only depends on which identifiers are present, never on
    /// their order or multiplicity.
    pub fn detection_flags<I, S>(&self, active: I) -> ReaderFlags
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        active
            .into_iter()
            .filter_map(|protocol| self.binding(protocol.as_ref()))
            .fold(ReaderFlags::NONE, |flags, binding| flags | binding.flags)
    }

    /// Check if the registry knows a protocol identifier
    pub fn contains(&self, protocol: &str) -> bool {
        self.binding(protocol).is_some()
    }

    /// Iterate the fixed table
    pub fn bindings(&self) -> impl Iterator<Item = &'static ProtocolBinding> {
        self.bindings.iter()
    }
}
