//! Byte-stream transport to the peripheral.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────┐                         ┌──────────────────┐
//! │  ConnectionManager   │                         │  LED bar         │
//! │                      │     RFCOMM / SPP        │                  │
//! │  Connection          │◄───────────────────────►│  ASCII frame     │
//! │   └ TransportEndpoint│   frames out, lines in  │  parser          │
//! └──────────────────────┘                         └──────────────────┘
//! ```
//!
//! # Connection Lifecycle
//!
//! 1. A [`DiscoveryProvider`](crate::discovery::DiscoveryProvider) yields a
//!    boxed [`TransportEndpoint`]
//! 2. [`Connection::open`] takes ownership and opens both directions
//! 3. Frames are written with [`Connection::write`]; replies read with
//!    [`Connection::read_line`]
//! 4. [`Connection::close`] releases writer, reader, and endpoint
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `endpoint` | Endpoint trait and a generic stream adapter |
//! | `connection` | Owned link with framed I/O and liveness |
//! | `memory` | In-memory endpoint pair for simulation |

// ============================================================================
// Submodules
// ============================================================================

/// Owned link with framed I/O and liveness.
pub mod connection;

/// Endpoint contract and stream adapter.
pub mod endpoint;

/// In-memory endpoint pair.
pub mod memory;

// ============================================================================
// Re-exports
// ============================================================================

pub use connection::Connection;
pub use endpoint::{BoxedReader, BoxedWriter, StreamEndpoint, TransportEndpoint};
pub use memory::{MemoryEndpoint, MemoryPeer};
