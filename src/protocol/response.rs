//! Inbound reply lines.
//!
//! The only command that produces a reply is the battery query. The reply is
//! one line containing `VAL:` followed immediately by a decimal integer, the
//! raw 10-bit ADC reading.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

// ============================================================================
// Constants
// ============================================================================

/// First `VAL:` marker and the digits that follow it.
static BATTERY_VALUE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"VAL:(\d+)").expect("battery pattern is valid"));

/// Highest value a 10-bit ADC reports.
const ADC_MAX: u16 = 1023;

/// Approximate raw-to-volts divisor for the bar's battery divider.
const VOLTS_DIVISOR: f64 = 158.7;

// ============================================================================
// BatteryReading
// ============================================================================

/// Raw battery ADC value in `0..=1023`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct BatteryReading(u16);

impl BatteryReading {
    /// Creates a reading, returning `None` above the ADC range.
    #[inline]
    #[must_use]
    pub const fn new(raw: u16) -> Option<Self> {
        if raw <= ADC_MAX { Some(Self(raw)) } else { None }
    }

    /// Returns the raw ADC value.
    #[inline]
    #[must_use]
    pub const fn raw(self) -> u16 {
        self.0
    }

    /// Rough battery voltage.
    #[inline]
    #[must_use]
    pub fn approx_volts(self) -> f64 {
        f64::from(self.0) / VOLTS_DIVISOR
    }
}

impl fmt::Display for BatteryReading {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ============================================================================
// Decoder
// ============================================================================

/// Decodes a battery reply line.
///
/// `None` means the peer closed the stream before replying.
///
/// # Errors
///
/// Returns [`Error::Protocol`] if the line is absent, empty, has no
/// `VAL:<digits>` marker, or the value exceeds the ADC range.
pub fn decode_battery_response(line: Option<&str>) -> Result<BatteryReading> {
    let line = line.ok_or_else(|| Error::protocol("peer disconnected before replying"))?;

    if line.is_empty() {
        return Err(Error::protocol("empty battery reply"));
    }

    let digits = BATTERY_VALUE
        .captures(line)
        .and_then(|caps| caps.get(1))
        .ok_or_else(|| Error::protocol(format!("malformed battery reply: {line:?}")))?
        .as_str();

    digits
        .parse::<u16>()
        .ok()
        .and_then(BatteryReading::new)
        .ok_or_else(|| Error::protocol(format!("battery value out of range: {digits}")))
}

// ============================================================================
// Tests
// ============================================================================
