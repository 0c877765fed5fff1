//! Error types for the HUD link.
//!
//! This module defines all error types used throughout the crate.
//!
//! # Usage
//!
//! All fallible operations return [`Result<T>`] which uses [`Error`]:
//!
//! ```ignore
//! use hud_link::{ConnectionManager, Result};
//!
//! async fn example(manager: &ConnectionManager) -> Result<()> {
//!     manager.set(2, 0.5).await?;
//!     let reading = manager.battery_query().await?;
//!     println!("battery: {}", reading.raw());
//!     Ok(())
//! }
//! ```
//!
//! # Error Categories
//!
//! | Category | Variants | Recovered by session loop |
//! |----------|----------|---------------------------|
//! | Configuration | [`Error::Config`] | no |
//! | Adapter | [`Error::NoAdapter`] | no (fatal) |
//! | Discovery | [`Error::Discovery`] | yes |
//! | Transport | [`Error::Transport`] | yes |
//! | Protocol | [`Error::Protocol`] | no (caller only) |
//! | Caller | [`Error::NotConnected`], [`Error::InvalidArgument`], [`Error::PartialBroadcast`] | no |
//! | Timing | [`Error::Timeout`] | depends on operation |

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::result::Result as StdResult;

use thiserror::Error;

use crate::identifiers::{Channel, TargetId};

// ============================================================================
// Result Alias
// ============================================================================

/// Result type alias using crate [`enum@Error`].
///
/// All fallible operations in this crate return this type.
pub type Result<T> = StdResult<T, Error>;

// ============================================================================
// Error Enum
// ============================================================================

/// Main error type for the crate.
#[derive(Error, Debug)]
pub enum Error {
    // ========================================================================
    // Configuration Errors
    // ========================================================================
    /// Configuration error.
    ///
    /// Returned when builder or session options are invalid.
    #[error("Configuration error: {message}")]
    Config {
        /// Description of the configuration error.
        message: String,
    },

    // ========================================================================
    // Adapter / Discovery Errors
    // ========================================================================
    /// No transport capability exists at all (e.g. radio unavailable).
    #[error("No transport adapter available")]
    NoAdapter,

    /// Target not found, or discovery timed out.
    #[error("Discovery of {target} failed: {message}")]
    Discovery {
        /// Target that was being resolved.
        target: TargetId,
        /// Description of the failure.
        message: String,
    },

    // ========================================================================
    // Transport Errors
    // ========================================================================
    /// I/O failure on an open connection.
    #[error("Transport error: {message}")]
    Transport {
        /// Description of the transport failure.
        message: String,
    },

    // ========================================================================
    // Protocol Errors
    // ========================================================================
    /// Malformed or missing reply to a query.
    #[error("Protocol error: {message}")]
    Protocol {
        /// Description of the protocol violation.
        message: String,
    },

    // ========================================================================
    // Caller Errors
    // ========================================================================
    /// A command was issued while no connection is established.
    #[error("Not connected")]
    NotConnected,

    /// Argument out of range (channel, intensity, target).
    #[error("Invalid argument: {message}")]
    InvalidArgument {
        /// Description of the invalid argument.
        message: String,
    },

    /// One or more channels of a broadcast could not be written.
    #[error("Broadcast failed on channel(s) {}", ChannelList(.failures))]
    PartialBroadcast {
        /// Channels that failed, with the underlying error.
        failures: Vec<(Channel, Box<Error>)>,
    },

    // ========================================================================
    // Timing Errors
    // ========================================================================
    /// Operation timeout.
    #[error("Timeout after {timeout_ms}ms: {operation}")]
    Timeout {
        /// Description of the operation that timed out.
        operation: String,
        /// Milliseconds waited before timeout.
        timeout_ms: u64,
    },

    // ========================================================================
    // External Errors
    // ========================================================================
    /// JSON configuration error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Formats the channel list of a [`Error::PartialBroadcast`].
struct ChannelList<'a>(&'a [(Channel, Box<Error>)]);

impl fmt::Display for ChannelList<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, (channel, _)) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{channel}")?;
        }
        Ok(())
    }
}

// ============================================================================
// Error Constructors
// ============================================================================

impl Error {
    /// Creates a configuration error.
    #[inline]
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Creates a discovery error.
    #[inline]
    pub fn discovery(target: &TargetId, message: impl Into<String>) -> Self {
        Self::Discovery {
            target: target.clone(),
            message: message.into(),
        }
    }

    /// Creates a transport error.
    #[inline]
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
        }
    }

    /// Creates a protocol error.
    #[inline]
    pub fn protocol(message: impl Into<String>) -> Self {
        Self::Protocol {
            message: message.into(),
        }
    }

    /// Creates an invalid argument error.
    #[inline]
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument {
            message: message.into(),
        }
    }

    /// Creates a timeout error.
    #[inline]
    pub fn timeout(operation: impl Into<String>, timeout_ms: u64) -> Self {
        Self::Timeout {
            operation: operation.into(),
            timeout_ms,
        }
    }
}

// ============================================================================
// Error Predicates
// ============================================================================

impl Error {
    /// Returns `true` if this is a timeout error.
    #[inline]
    #[must_use]
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }

    /// Returns `true` if the error comes from the link itself.
    #[inline]
    #[must_use]
    pub fn is_connection_error(&self) -> bool {
        matches!(
            self,
            Self::Transport { .. } | Self::NotConnected | Self::Discovery { .. }
        )
    }

    /// Returns `true` if the caller passed something out of range.
    #[inline]
    #[must_use]
    pub fn is_caller_error(&self) -> bool {
        matches!(self, Self::InvalidArgument { .. } | Self::NotConnected)
    }

    /// Returns `true` if this error is recoverable.
    ///
    /// Recoverable errors are handled by the reconnect loop and may
    /// succeed once the link is re-established.
    #[inline]
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::Discovery { .. } | Self::Transport { .. } | Self::Timeout { .. }
        )
    }

    /// Returns the failed channels of a broadcast, if any.
    #[must_use]
    pub fn failed_channels(&self) -> Vec<Channel> {
        match self {
            Self::PartialBroadcast { failures } => failures.iter().map(|(c, _)| *c).collect(),
            _ => Vec::new(),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
