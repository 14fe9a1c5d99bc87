//! Reader parameters and the detection mode derived from them

use std::collections::BTreeMap;
use std::fmt;
use std::ops::{BitOr, BitOrAssign};
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::error::{Error, Result};

/// Detection capability bitmask handed to the platform when card detection is
/// enabled
///
/// Contactless bit values match the platform reader-mode constants.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct ReaderFlags(u32);

impl ReaderFlags {
    /// No capability requested
    pub const NONE: Self = Self(0);
    /// Poll for NFC-A (ISO 14443-3A) technology
    pub const NFC_A: Self = Self(0x1);
    /// Poll for NFC-B (ISO 14443-3B) technology
    pub const NFC_B: Self = Self(0x2);
    /// Poll for NFC-F (JIS 6319-4) technology
    pub const NFC_F: Self = Self(0x4);
    /// Poll for NFC-V (ISO 15693) technology
    pub const NFC_V: Self = Self(0x8);
    /// Poll for NFC barcode technology
    pub const NFC_BARCODE: Self = Self(0x10);
    /// Skip the NDEF check on discovered tags
    pub const SKIP_NDEF_CHECK: Self = Self(0x80);
    /// Do not play platform sounds on discovery
    pub const NO_PLATFORM_SOUNDS: Self = Self(0x100);
    /// Watch contact slots for an inserted card
    pub const CONTACT: Self = Self(0x1000);

    /// Raw bit value
    pub const fn bits(self) -> u32 {
        self.0
    }

    /// Build from a raw bit value
    pub const fn from_bits(bits: u32) -> Self {
        Self(bits)
    }

    /// Check if every bit of `other` is set
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    /// Check if no bit is set
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Bitwise union
    pub const fn union(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }
}

impl BitOr for ReaderFlags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        self.union(rhs)
    }
}

impl BitOrAssign for ReaderFlags {
    fn bitor_assign(&mut self, rhs: Self) {
        *self = self.union(rhs);
    }
}

impl fmt::Display for ReaderFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#06x}", self.0)
    }
}

/// Recognized reader parameter names
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, derive_more::Display)]
pub enum ReaderParameter {
    /// `"1"` skips the NDEF check on discovered tags
    #[display("skip_ndef_check")]
    SkipNdefCheck,
    /// `"1"` silences the platform discovery sound
    #[display("no_platform_sounds")]
    NoPlatformSounds,
    /// Presence check delay in milliseconds
    #[display("presence_check_delay")]
    PresenceCheckDelay,
}

impl ReaderParameter {
    /// Every recognized parameter
    pub const ALL: [Self; 3] = [
        Self::SkipNdefCheck,
        Self::NoPlatformSounds,
        Self::PresenceCheckDelay,
    ];

    /// Configuration name of the parameter
    pub const fn name(self) -> &'static str {
        match self {
            Self::SkipNdefCheck => "skip_ndef_check",
            Self::NoPlatformSounds => "no_platform_sounds",
            Self::PresenceCheckDelay => "presence_check_delay",
        }
    }

    /// Look a parameter up by its configuration name
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|param| param.name() == name)
    }

    /// Check a value against this parameter's accept predicate
    pub fn accepts(self, value: &str) -> bool {
        match self {
            Self::SkipNdefCheck | Self::NoPlatformSounds => matches!(value, "0" | "1"),
            Self::PresenceCheckDelay => value.parse::<u32>().is_ok(),
        }
    }
}

/// Validated reader parameter values
///
/// Entries are only ever stored after their name is recognized and the value
/// passes that name's predicate.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReaderParameters {
    values: BTreeMap<ReaderParameter, String>,
}

impl ReaderParameters {
    /// Create an empty parameter set
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate and store a parameter
    pub fn set(&mut self, name: &str, value: &str) -> Result<()> {
        let Some(param) = ReaderParameter::from_name(name) else {
            warn!(name, "Unrecognized parameter");
            return Err(Error::configuration(format!(
                "unrecognized parameter {name}"
            )));
        };

        if !param.accepts(value) {
            warn!(name, value, "Rejected parameter value");
            return Err(Error::configuration(format!(
                "invalid value for {name}: {value}"
            )));
        }

        info!(name, value, "Adding parameter");
        self.values.insert(param, value.to_string());
        Ok(())
    }

    /// Stored value of a parameter
    pub fn get(&self, param: ReaderParameter) -> Option<&str> {
        self.values.get(&param).map(String::as_str)
    }

    /// Check if a switch parameter is set to `"1"`
    pub fn is_enabled(&self, param: ReaderParameter) -> bool {
        self.get(param) == Some("1")
    }

    /// Presence check delay, if configured
    pub fn presence_check_delay(&self) -> Option<Duration> {
        self.get(ReaderParameter::PresenceCheckDelay)
            .and_then(|value| value.parse::<u64>().ok())
            .map(Duration::from_millis)
    }

    /// Flags contributed by switch parameters
    pub fn flags(&self) -> ReaderFlags {
        let mut flags = ReaderFlags::NONE;
        if self.is_enabled(ReaderParameter::SkipNdefCheck) {
            flags |= ReaderFlags::SKIP_NDEF_CHECK;
        }
        if self.is_enabled(ReaderParameter::NoPlatformSounds) {
            flags |= ReaderFlags::NO_PLATFORM_SOUNDS;
        }
        debug!(%flags, "Computed parameter flags");
        flags
    }
}

/// Detection settings handed to the platform when card detection is enabled
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReaderMode {
    /// Technology and behaviour flags
    pub flags: ReaderFlags,
    /// How often the platform checks that a card is still present
    pub presence_check_delay: Option<Duration>,
}
