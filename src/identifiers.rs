//! Type-safe identifiers for the peripheral and its LED channels.
//!
//! | Type | Description |
//! |------|-------------|
//! | [`TargetId`] | The one peripheral of interest (address or advertised name) |
//! | [`Channel`] | LED channel on the bar, `0..=4` |

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

// ============================================================================
// Constants
// ============================================================================

/// Hardware address pattern, `XX:XX:XX:XX:XX:XX`.
static ADDRESS_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[0-9A-Fa-f]{2}(:[0-9A-Fa-f]{2}){5}$").expect("address pattern is valid")
});

// ============================================================================
// TargetId
// ============================================================================

/// Identifies the peripheral a session should talk to.
///
/// A string shaped like a hardware address resolves to [`TargetId::Address`]
/// and is compared case-insensitively; anything else is treated as an
/// advertised device name and compared exactly.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "lowercase")]
pub enum TargetId {
    /// Hardware address, stored upper-case.
    Address(String),
    /// Advertised device name.
    Name(String),
}

impl TargetId {
    /// Parses an identifier string.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidArgument`] if the string is empty.
    pub fn parse(raw: &str) -> Result<Self> {
        let raw = raw.trim();
        if raw.is_empty() {
            return Err(Error::invalid_argument("target identifier is empty"));
        }

        if ADDRESS_PATTERN.is_match(raw) {
            Ok(Self::Address(raw.to_ascii_uppercase()))
        } else {
            Ok(Self::Name(raw.to_string()))
        }
    }

    /// Returns `true` if a device with this address and name is the target.
    #[must_use]
    pub fn matches(&self, address: &str, name: Option<&str>) -> bool {
        match self {
            Self::Address(wanted) => wanted.eq_ignore_ascii_case(address),
            Self::Name(wanted) => name == Some(wanted.as_str()),
        }
    }

    /// Returns the raw identifier text.
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Address(s) | Self::Name(s) => s,
        }
    }

    /// Returns `true` if this targets a hardware address.
    #[inline]
    #[must_use]
    pub const fn is_address(&self) -> bool {
        matches!(self, Self::Address(_))
    }
}

impl fmt::Display for TargetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TargetId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl TryFrom<&str> for TargetId {
    type Error = Error;

    fn try_from(value: &str) -> Result<Self> {
        Self::parse(value)
    }
}

impl TryFrom<String> for TargetId {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        Self::parse(&value)
    }
}

// ============================================================================
// Channel
// ============================================================================

/// An LED channel index, guaranteed to be in `0..=4`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct Channel(u8);

impl Channel {
    /// Number of channels on the bar.
    pub const COUNT: u8 = 5;

    /// Creates a channel, returning `None` when out of range.
    #[inline]
    #[must_use]
    pub const fn new(index: u8) -> Option<Self> {
        if index < Self::COUNT {
            Some(Self(index))
        } else {
            None
        }
    }

    /// Returns the channel index.
    #[inline]
    #[must_use]
    pub const fn index(self) -> u8 {
        self.0
    }

    /// Iterates all channels in ascending order.
    pub fn all() -> impl Iterator<Item = Self> {
        (0..Self::COUNT).map(Self)
    }
}

impl TryFrom<u8> for Channel {
    type Error = Error;

    fn try_from(index: u8) -> Result<Self> {
        Self::new(index).ok_or_else(|| {
            Error::invalid_argument(format!(
                "channel {index} out of range 0..={}",
                Self::COUNT - 1
            ))
        })
    }
}

impl From<Channel> for u8 {
    #[inline]
    fn from(channel: Channel) -> Self {
        channel.0
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ============================================================================
// Tests
// ============================================================================
