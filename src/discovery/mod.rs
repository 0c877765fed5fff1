//! Discovery of the target peripheral.
//!
//! Discovery turns a [`TargetId`] into a [`TransportEndpoint`]. The radio
//! scan itself is external; this crate only defines the contract it consumes
//! and a couple of adapters on top of it.
//!
//! | Type | Description |
//! |------|-------------|
//! | [`DiscoveryProvider`] | What the connection manager consumes |
//! | [`DeviceScanner`] | Raw radio operations (paired list, scan, open) |
//! | [`ScanDiscovery`] | Provider built from a scanner: paired first, then scan |
//! | [`QueueDiscovery`] | Provider handing out pre-built endpoints, for simulation |

// ============================================================================
// Imports
// ============================================================================

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::identifiers::TargetId;
use crate::transport::TransportEndpoint;

// ============================================================================
// Submodules
// ============================================================================

/// Pre-built endpoint queue.
pub mod queue;

/// Scanner-backed provider.
pub mod scan;

// ============================================================================
// Re-exports
// ============================================================================

pub use queue::{EndpointFeed, QueueDiscovery};
pub use scan::{DeviceScanner, SPP_SERVICE_UUID, ScanDiscovery};

// ============================================================================
// DeviceInfo
// ============================================================================

/// A device seen by the radio.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DeviceInfo {
    /// Hardware address.
    pub address: String,
    /// Advertised name, if the device reported one.
    pub name: Option<String>,
    /// Already bonded with this host.
    #[serde(default)]
    pub paired: bool,
}

impl DeviceInfo {
    /// Creates an unpaired device.
    #[must_use]
    pub fn new(address: impl Into<String>, name: Option<&str>) -> Self {
        Self {
            address: address.into(),
            name: name.map(str::to_string),
            paired: false,
        }
    }

    /// Marks the device as paired.
    #[must_use]
    pub fn paired(mut self) -> Self {
        self.paired = true;
        self
    }

    /// Returns `true` if this device is the target.
    #[inline]
    #[must_use]
    pub fn is_target(&self, target: &TargetId) -> bool {
        target.matches(&self.address, self.name.as_deref())
    }
}

// ============================================================================
// DiscoveryProvider
// ============================================================================

/// Resolves a target to an open endpoint.
///
/// Capabilities are typed queries on the provider rather than runtime
/// probing of the platform.
#[async_trait]
pub trait DiscoveryProvider: Send + Sync {
    /// Returns `false` when no transport capability exists at all.
    fn adapter_available(&self) -> bool;

    /// Returns `true` if the provider can list a device's services.
    fn supports_service_enumeration(&self) -> bool {
        false
    }

    /// Finds the target and opens an endpoint to it.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Discovery`](crate::Error::Discovery) if the target is
    /// not found within `timeout` or cannot be opened.
    async fn resolve(
        &self,
        target: &TargetId,
        timeout: Duration,
    ) -> Result<Box<dyn TransportEndpoint>>;
}

// ============================================================================
// Tests
// ============================================================================
