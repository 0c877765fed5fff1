//! HUD link - resilient serial session to a wireless LED-bar controller.
//!
//! This library keeps a line-oriented serial link to one LED bar alive over
//! a discoverable, intermittently available radio transport, and exposes the
//! bar's small command set to callers on any task.
//!
//! # Architecture
//!
//! The crate is a thin state machine between a discovery collaborator and
//! the wire:
//!
//! - **Discovery (external)**: resolves a target to an open endpoint
//! - **Manager**: discovers, connects, polls liveness, and reconnects
//! - **Connection**: owns the endpoint, writes frames, reads reply lines
//! - **Protocol**: pure encoding of commands and decoding of replies
//!
//! Key design principles:
//!
//! - At most one live connection per [`ConnectionManager`]
//! - Reconnection is driven by the background session, never by callers
//! - Commands are refused unless connected, and written at most once
//! - State changes are pushed over a watch channel (no polling by callers)
//!
//! # Quick Start
//!
//! ```no_run
//! use std::time::Duration;
//! use hud_link::{ConnectionManager, QueueDiscovery, Result};
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     // Any DiscoveryProvider works; the queue provider hands out endpoints
//!     // pushed through its feed.
//!     let (provider, _feed) = QueueDiscovery::new();
//!
//!     let manager = ConnectionManager::builder()
//!         .provider(provider)
//!         .poll_interval(Duration::from_secs(3))
//!         .build()?;
//!
//!     manager.connect("RN42-HUD").await?;
//!     manager.wait_connected(Duration::from_secs(30)).await?;
//!
//!     manager.set_all(0.0).await?;
//!     manager.fade(2, 750, 1.0).await?;
//!
//!     let battery = manager.battery_query().await?;
//!     println!("battery: {} (~{:.2} V)", battery.raw(), battery.approx_volts());
//!
//!     manager.shutdown().await
//! }
//! ```
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`discovery`] | Provider contract, scanner adapter, queue provider |
//! | [`error`] | Error types and [`Result`] alias |
//! | [`identifiers`] | [`TargetId`] and [`Channel`] |
//! | [`manager`] | [`ConnectionManager`] and its configuration |
//! | [`protocol`] | Wire frames and reply decoding |
//! | [`transport`] | Endpoint contract and [`Connection`] |

// ============================================================================
// Modules
// ============================================================================

/// Discovery of the target peripheral.
///
/// Implement [`DiscoveryProvider`] directly, or implement [`DeviceScanner`]
/// and wrap it in [`ScanDiscovery`].
pub mod discovery;

/// Error types and result aliases.
///
/// All fallible operations return [`Result<T>`] which uses [`Error`].
pub mod error;

/// Target and channel identifiers.
pub mod identifiers;

/// Connection management.
///
/// Use [`ConnectionManager::builder()`] to create a configured manager.
pub mod manager;

/// Wire protocol.
///
/// Stateless encoding of outbound frames and decoding of battery replies.
pub mod protocol;

/// Byte-stream transport.
pub mod transport;

// ============================================================================
// Re-exports
// ============================================================================

// Discovery types
pub use discovery::{
    DeviceInfo, DeviceScanner, DiscoveryProvider, EndpointFeed, QueueDiscovery,
    SPP_SERVICE_UUID, ScanDiscovery,
};

// Error types
pub use error::{Error, Result};

// Identifier types
pub use identifiers::{Channel, TargetId};

// Manager types
pub use manager::{
    ConnectionManager, ConnectionState, ManagerBuilder, ReconnectPolicy, SessionOptions,
};

// Protocol types
pub use protocol::{BatteryReading, Command, Intensity};

// Transport types
pub use transport::{Connection, MemoryEndpoint, MemoryPeer, StreamEndpoint, TransportEndpoint};
