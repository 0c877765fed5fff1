//! Wire microprotocol spoken by the LED bar.
//!
//! All frames are ASCII with no byte-order concerns:
//!
//! | Direction | Frame | Meaning |
//! |-----------|-------|---------|
//! | out | `S<channel><0-255>M` | set channel to scaled intensity immediately |
//! | out | `F<channel><durationMs>,<0-255>M` | fade channel to scaled intensity |
//! | out | `BM` | query battery |
//! | in | `...VAL:<int>...` (line) | battery ADC reading reply |
//!
//! Everything here is pure; I/O lives in [`crate::transport`].

// ============================================================================
// Submodules
// ============================================================================

/// Outbound command frames.
pub mod command;

/// Inbound reply decoding.
pub mod response;

// ============================================================================
// Re-exports
// ============================================================================

pub use command::{
    Command, FRAME_TERMINATOR, Intensity, encode_battery_query, encode_fade, encode_set,
};
pub use response::{BatteryReading, decode_battery_response};
