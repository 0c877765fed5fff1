//! Session state as published by the manager.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;

use serde::{Deserialize, Serialize};

// ============================================================================
// ConnectionState
// ============================================================================

/// Where the manager is in its lifecycle.
///
/// ```text
/// Idle ──connect──► Discovering ──resolved──► Connected
///  ▲                  ▲     │                    │
///  │                  └─────┴──── lost / retry ◄─┘
///  └──── Disconnecting ◄──── disconnect / shutdown
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    /// No session, no link.
    #[default]
    Idle,
    /// A session is looking for the target or waiting to retry.
    Discovering,
    /// A link is open and commands are accepted.
    Connected,
    /// An explicit disconnect is tearing the session down.
    Disconnecting,
}

impl ConnectionState {
    /// Returns `true` if commands may be sent.
    #[inline]
    #[must_use]
    pub const fn is_connected(self) -> bool {
        matches!(self, Self::Connected)
    }

    /// Returns `true` while a session is running.
    #[inline]
    #[must_use]
    pub const fn is_active(self) -> bool {
        matches!(self, Self::Discovering | Self::Connected)
    }

    /// Returns the lowercase name.
    #[inline]
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Discovering => "discovering",
            Self::Connected => "connected",
            Self::Disconnecting => "disconnecting",
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_idle() {
        assert_eq!(ConnectionState::default(), ConnectionState::Idle);
    }

    #[test]
    fn test_predicates() {
        assert!(ConnectionState::Connected.is_connected());
        assert!(!ConnectionState::Discovering.is_connected());
        assert!(ConnectionState::Discovering.is_active());
        assert!(!ConnectionState::Idle.is_active());
        assert!(!ConnectionState::Disconnecting.is_active());
    }

    #[test]
    fn test_serde_lowercase() {
        let json = serde_json::to_string(&ConnectionState::Discovering).unwrap();
        assert_eq!(json, "\"discovering\"");

        let state: ConnectionState = serde_json::from_str("\"connected\"").unwrap();
        assert_eq!(state, ConnectionState::Connected);
        assert_eq!(state.to_string(), "connected");
    }
}
