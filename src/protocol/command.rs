//! Outbound command frames.
//!
//! Every frame is plain ASCII terminated by the sentinel `M`. Channel and
//! scaled intensity are written as decimal digits with no separator between
//! them; the peripheral's fixed-width parser tolerates this. Commands are
//! one-way, so there is no decoder for them.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::identifiers::Channel;

// ============================================================================
// Constants
// ============================================================================

/// Frame terminator.
pub const FRAME_TERMINATOR: char = 'M';

/// Full scale of the scaled intensity.
const INTENSITY_SCALE: f64 = 255.0;

/// Battery query frame.
const BATTERY_QUERY_FRAME: &str = "BM";

// ============================================================================
// Intensity
// ============================================================================

/// Fraction of full brightness, validated to `[0.0, 1.0]`.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize, Deserialize)]
#[serde(try_from = "f64", into = "f64")]
pub struct Intensity(f64);

impl Intensity {
    /// Fully off.
    pub const OFF: Self = Self(0.0);
    /// Full brightness.
    pub const FULL: Self = Self(1.0);

    /// Creates an intensity.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidArgument`] if the value is NaN or outside
    /// `[0.0, 1.0]`.
    pub fn new(value: f64) -> Result<Self> {
        if (0.0..=1.0).contains(&value) {
            Ok(Self(value))
        } else {
            Err(Error::invalid_argument(format!(
                "intensity {value} out of range 0.0..=1.0"
            )))
        }
    }

    /// Returns the raw fraction.
    #[inline]
    #[must_use]
    pub const fn value(self) -> f64 {
        self.0
    }

    /// Scales to the 8-bit wire range, rounding half up.
    #[inline]
    #[must_use]
    pub fn scaled(self) -> u8 {
        // f64::round is half-away-from-zero, which is half-up for [0, 1].
        (self.0 * INTENSITY_SCALE).round() as u8
    }
}

impl TryFrom<f64> for Intensity {
    type Error = Error;

    fn try_from(value: f64) -> Result<Self> {
        Self::new(value)
    }
}

impl From<Intensity> for f64 {
    #[inline]
    fn from(intensity: Intensity) -> Self {
        intensity.0
    }
}

// ============================================================================
// Command
// ============================================================================

/// A command the peripheral understands.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "command", rename_all = "camelCase")]
pub enum Command {
    /// Set a channel to an intensity immediately.
    SetChannel {
        /// Target channel.
        channel: Channel,
        /// Destination intensity.
        intensity: Intensity,
    },
    /// Fade a channel from its current intensity over a duration.
    FadeChannel {
        /// Target channel.
        channel: Channel,
        /// Fade duration in milliseconds.
        duration_ms: u64,
        /// Destination intensity.
        intensity: Intensity,
    },
    /// Ask for the raw battery ADC value.
    BatteryQuery,
}

impl Command {
    /// Builds a validated [`Command::SetChannel`].
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidArgument`] for an out-of-range channel or
    /// intensity.
    pub fn set(channel: u8, intensity: f64) -> Result<Self> {
        Ok(Self::SetChannel {
            channel: Channel::try_from(channel)?,
            intensity: Intensity::new(intensity)?,
        })
    }

    /// Builds a validated [`Command::FadeChannel`].
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidArgument`] for an out-of-range channel or
    /// intensity.
    pub fn fade(channel: u8, duration_ms: u64, intensity: f64) -> Result<Self> {
        Ok(Self::FadeChannel {
            channel: Channel::try_from(channel)?,
            duration_ms,
            intensity: Intensity::new(intensity)?,
        })
    }

    /// Encodes the command into its wire frame.
    #[must_use]
    pub fn encode(&self) -> String {
        match *self {
            Self::SetChannel { channel, intensity } => {
                format!("S{channel}{}{FRAME_TERMINATOR}", intensity.scaled())
            }
            Self::FadeChannel {
                channel,
                duration_ms,
                intensity,
            } => format!(
                "F{channel}{duration_ms},{}{FRAME_TERMINATOR}",
                intensity.scaled()
            ),
            Self::BatteryQuery => BATTERY_QUERY_FRAME.to_string(),
        }
    }

    /// Returns `true` if the peripheral answers this command with a line.
    #[inline]
    #[must_use]
    pub const fn expects_reply(&self) -> bool {
        matches!(self, Self::BatteryQuery)
    }

    /// Short name for logging.
    #[inline]
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::SetChannel { .. } => "set",
            Self::FadeChannel { .. } => "fade",
            Self::BatteryQuery => "battery",
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.encode())
    }
}

// ============================================================================
// Encoders
// ============================================================================

/// Encodes `S<channel><0-255>M`.
///
/// # Errors
///
/// Returns [`Error::InvalidArgument`] for an out-of-range channel or intensity.
pub fn encode_set(channel: u8, intensity: f64) -> Result<String> {
    Command::set(channel, intensity).map(|c| c.encode())
}

/// Encodes `F<channel><durationMs>,<0-255>M`.
///
/// # Errors
///
/// Returns [`Error::InvalidArgument`] for an out-of-range channel or intensity.
pub fn encode_fade(channel: u8, duration_ms: u64, intensity: f64) -> Result<String> {
    Command::fade(channel, duration_ms, intensity).map(|c| c.encode())
}

/// Encodes the battery query, `BM`.
#[inline]
#[must_use]
pub fn encode_battery_query() -> String {
    Command::BatteryQuery.encode()
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use proptest::prelude::*;

    #[test]
    fn test_encode_set_half() {
        assert_eq!(encode_set(2, 0.5).unwrap(), "S2128M");
    }

    #[test]
    fn test_encode_set_bounds() {
        assert_eq!(encode_set(0, 0.0).unwrap(), "S00M");
        assert_eq!(encode_set(4, 1.0).unwrap(), "S4255M");
    }

    #[test]
    fn test_encode_fade() {
        assert_eq!(encode_fade(1, 1500, 1.0).unwrap(), "F11500,255M");
        assert_eq!(encode_fade(3, 0, 0.0).unwrap(), "F30,0M");
    }

    #[test]
    fn test_encode_battery_query() {
        assert_eq!(encode_battery_query(), "BM");
        assert!(Command::BatteryQuery.expects_reply());
    }

    #[test]
    fn test_rejects_bad_channel() {
        let err = encode_set(5, 0.5).unwrap_err();
        assert!(matches!(err, Error::InvalidArgument { .. }));
    }

    #[test]
    fn test_rejects_bad_intensity() {
        assert!(encode_set(0, 1.01).is_err());
        assert!(encode_set(0, -0.01).is_err());
        assert!(encode_fade(0, 10, f64::NAN).is_err());
        assert!(Intensity::new(f64::INFINITY).is_err());
    }

    #[test]
    fn test_scaled_rounds_half_up() {
        // 0.5 * 255 = 127.5
        assert_eq!(Intensity::new(0.5).unwrap().scaled(), 128);
        assert_eq!(Intensity::new(1.0 / 255.0).unwrap().scaled(), 1);
        assert_eq!(Intensity::OFF.scaled(), 0);
        assert_eq!(Intensity::FULL.scaled(), 255);
    }

    #[test]
    fn test_command_display_is_frame() {
        let cmd = Command::set(2, 0.5).unwrap();
        assert_eq!(cmd.to_string(), "S2128M");
        assert_eq!(cmd.name(), "set");
        assert!(!cmd.expects_reply());
    }

    #[test]
    fn test_command_deserialize_validates() {
        let ok: Command =
            serde_json::from_str(r#"{"command":"setChannel","channel":1,"intensity":0.25}"#)
                .unwrap();
        assert_eq!(ok.encode(), "S164M");

        let bad = serde_json::from_str::<Command>(
            r#"{"command":"setChannel","channel":9,"intensity":0.25}"#,
        );
        assert!(bad.is_err());
    }

    proptest! {
        #[test]
        fn prop_scaled_in_range(value in 0.0f64..=1.0) {
            let scaled = Intensity::new(value).unwrap().scaled();
            let expected = (value * 255.0).round();
            prop_assert_eq!(f64::from(scaled), expected);
        }

        #[test]
        fn prop_set_frame_shape(channel in 0u8..5, value in 0.0f64..=1.0) {
            let frame = encode_set(channel, value).unwrap();
            let scaled = Intensity::new(value).unwrap().scaled();
            prop_assert_eq!(frame, format!("S{channel}{scaled}M"));
        }

        #[test]
        fn prop_fade_frame_shape(channel in 0u8..5, duration in 0u64..100_000, value in 0.0f64..=1.0) {
            let frame = encode_fade(channel, duration, value).unwrap();
            let scaled = Intensity::new(value).unwrap().scaled();
            prop_assert!(frame.ends_with('M'));
            prop_assert_eq!(frame, format!("F{channel}{duration},{scaled}M"));
        }

        #[test]
        fn prop_out_of_range_rejected(value in prop_oneof![-1.0e6f64..-1.0e-9, 1.000_000_1f64..1.0e6]) {
            prop_assert!(encode_set(0, value).is_err());
        }
    }
}
