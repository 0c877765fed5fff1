//! Connection management.
//!
//! The manager turns a discovery provider and a target into a link that
//! stays up on its own.
//!
//! # Components
//!
//! | Type | Description |
//! |------|-------------|
//! | [`ConnectionManager`] | Session control and command surface |
//! | [`ManagerBuilder`] | Fluent configuration builder |
//! | [`SessionOptions`] | Poll, discovery, and query timings |
//! | [`ReconnectPolicy`] | Retry delay, backoff, and attempt limit |
//! | [`ConnectionState`] | Published lifecycle state |
//!
//! # Lifecycle
//!
//! | From | Event | To |
//! |------|-------|----|
//! | Idle | `connect` | Discovering |
//! | Discovering | endpoint opened | Connected |
//! | Discovering | attempt failed | Discovering (after retry delay) |
//! | Discovering | attempts exhausted | Idle |
//! | Connected | keepalive sees loss | Discovering |
//! | any | `disconnect` / `shutdown` | Disconnecting, then Idle |

// ============================================================================
// Submodules
// ============================================================================

/// Fluent builder pattern for manager configuration.
pub mod builder;

/// Manager handle and command surface.
pub mod core;

/// Timing and retry configuration.
pub mod options;

/// Background session task.
mod session;

/// Lifecycle state.
pub mod state;

// ============================================================================
// Re-exports
// ============================================================================

pub use builder::ManagerBuilder;
pub use core::ConnectionManager;
pub use options::{ReconnectPolicy, SessionOptions};
pub use state::ConnectionState;
