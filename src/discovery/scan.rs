//! Scanner-backed discovery.
//!
//! [`ScanDiscovery`] adapts a platform [`DeviceScanner`] into a
//! [`DiscoveryProvider`]:
//!
//! 1. Already-paired devices are checked first; no scan is needed when the
//!    target is bonded.
//! 2. Otherwise a scan is started and the first matching sighting wins.
//!    Dropping the scan future stops the scan.
//! 3. If the scanner can enumerate services, the device must offer the
//!    serial port service.
//! 4. An endpoint is opened on that service.
//!
//! The whole pipeline is bounded by the resolve timeout.

// ============================================================================
// Imports
// ============================================================================

use std::time::Duration;

use async_trait::async_trait;
use rustc_hash::FxHashSet;
use tokio::sync::mpsc;
use tokio::time::{Instant, timeout_at};
use tracing::{debug, info, trace};
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::identifiers::TargetId;
use crate::transport::TransportEndpoint;

use super::{DeviceInfo, DiscoveryProvider};

// ============================================================================
// Constants
// ============================================================================

/// Serial Port Profile service class.
pub const SPP_SERVICE_UUID: Uuid = Uuid::from_u128(0x0000_1101_0000_1000_8000_0080_5f9b_34fb);

/// Sightings buffered between the scanner and the matcher.
const SCAN_CHANNEL_CAPACITY: usize = 32;

// ============================================================================
// DeviceScanner
// ============================================================================

/// Platform radio operations.
#[async_trait]
pub trait DeviceScanner: Send + Sync {
    /// Returns `false` if the radio is missing entirely.
    fn is_available(&self) -> bool;

    /// Devices already bonded with this host.
    async fn paired_devices(&self) -> Result<Vec<DeviceInfo>>;

    /// Scans, sending each sighting to `found` until the scan completes.
    ///
    /// Implementations stop early when `found` is closed or the future is
    /// dropped.
    async fn scan(&self, found: mpsc::Sender<DeviceInfo>) -> Result<()>;

    /// Returns `true` if [`services`](Self::services) is supported.
    fn supports_service_enumeration(&self) -> bool {
        false
    }

    /// Service classes the device advertises.
    async fn services(&self, _device: &DeviceInfo) -> Result<Vec<Uuid>> {
        Ok(Vec::new())
    }

    /// Opens a stream to `service` on the device.
    async fn open(&self, device: &DeviceInfo, service: Uuid)
    -> Result<Box<dyn TransportEndpoint>>;
}

// ============================================================================
// ScanDiscovery
// ============================================================================

/// [`DiscoveryProvider`] on top of a [`DeviceScanner`].
pub struct ScanDiscovery<S> {
    /// Platform scanner.
    scanner: S,
    /// Service to connect to.
    service: Uuid,
}

impl<S: DeviceScanner> ScanDiscovery<S> {
    /// Creates a provider that connects to the serial port service.
    #[must_use]
    pub fn new(scanner: S) -> Self {
        Self {
            scanner,
            service: SPP_SERVICE_UUID,
        }
    }

    /// Connects to a different service class.
    #[must_use]
    pub fn with_service(mut self, service: Uuid) -> Self {
        self.service = service;
        self
    }

    /// Returns the scanner.
    #[inline]
    #[must_use]
    pub fn scanner(&self) -> &S {
        &self.scanner
    }

    /// Looks in the paired list, then scans.
    async fn find(&self, target: &TargetId) -> Result<DeviceInfo> {
        let paired = self.scanner.paired_devices().await?;
        for device in paired {
            trace!(address = %device.address, name = ?device.name, "Paired device");
            if device.is_target(target) {
                debug!(target = %target, address = %device.address, "Target already paired");
                return Ok(device);
            }
        }

        debug!(target = %target, "Target not paired, scanning");

        let (tx, mut rx) = mpsc::channel(SCAN_CHANNEL_CAPACITY);
        let scan = self.scanner.scan(tx);
        tokio::pin!(scan);

        let mut seen = FxHashSet::default();
        let mut scan_done = false;

        loop {
            tokio::select! {
                found = rx.recv() => {
                    let Some(device) = found else {
                        return Err(Error::discovery(target, "scan finished without a match"));
                    };
                    if !seen.insert(device.address.clone()) {
                        continue;
                    }
                    trace!(address = %device.address, name = ?device.name, "Device sighted");
                    if device.is_target(target) {
                        debug!(target = %target, address = %device.address, "Target sighted");
                        return Ok(device);
                    }
                }

                result = &mut scan, if !scan_done => {
                    scan_done = true;
                    result.map_err(|e| Error::discovery(target, format!("scan failed: {e}")))?;
                }
            }
        }
    }

    /// Requires the configured service when the scanner can list services.
    async fn check_services(&self, target: &TargetId, device: &DeviceInfo) -> Result<()> {
        if !self.scanner.supports_service_enumeration() {
            return Ok(());
        }

        let services = self.scanner.services(device).await?;
        for service in &services {
            debug!(address = %device.address, %service, "Available service");
        }

        if services.contains(&self.service) {
            Ok(())
        } else {
            Err(Error::discovery(
                target,
                format!("{} does not offer service {}", device.address, self.service),
            ))
        }
    }

    /// Full pipeline without the deadline.
    async fn resolve_inner(&self, target: &TargetId) -> Result<Box<dyn TransportEndpoint>> {
        let device = self.find(target).await?;
        self.check_services(target, &device).await?;

        let endpoint = self
            .scanner
            .open(&device, self.service)
            .await
            .map_err(|e| {
                Error::discovery(target, format!("cannot open {}: {e}", device.address))
            })?;

        info!(target = %target, address = %device.address, "Endpoint opened");
        Ok(endpoint)
    }
}

#[async_trait]
impl<S: DeviceScanner> DiscoveryProvider for ScanDiscovery<S> {
    fn adapter_available(&self) -> bool {
        self.scanner.is_available()
    }

    fn supports_service_enumeration(&self) -> bool {
        self.scanner.supports_service_enumeration()
    }

    async fn resolve(
        &self,
        target: &TargetId,
        timeout: Duration,
    ) -> Result<Box<dyn TransportEndpoint>> {
        let deadline = Instant::now() + timeout;
        match timeout_at(deadline, self.resolve_inner(target)).await {
            Ok(result) => result,
            Err(_) => Err(Error::discovery(
                target,
                format!("not found within {}ms", timeout.as_millis()),
            )),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::atomic::{AtomicUsize, Ordering};

    use parking_lot::Mutex;

    use crate::transport::{MemoryEndpoint, MemoryPeer};

    /// Scanner with scripted results.
    #[derive(Default)]
    struct FakeScanner {
        available: bool,
        paired: Vec<DeviceInfo>,
        sightings: Vec<DeviceInfo>,
        services: Option<Vec<Uuid>>,
        scans: AtomicUsize,
        opened: Mutex<Vec<(String, Uuid)>>,
        peers: Mutex<Vec<MemoryPeer>>,
        hang_scan: bool,
    }

    #[async_trait]
    impl DeviceScanner for FakeScanner {
        fn is_available(&self) -> bool {
            self.available
        }

        async fn paired_devices(&self) -> Result<Vec<DeviceInfo>> {
            Ok(self.paired.clone())
        }

        async fn scan(&self, found: mpsc::Sender<DeviceInfo>) -> Result<()> {
            self.scans.fetch_add(1, Ordering::SeqCst);
            for device in &self.sightings {
                if found.send(device.clone()).await.is_err() {
                    return Ok(());
                }
            }
            if self.hang_scan {
                std::future::pending::<()>().await;
            }
            Ok(())
        }

        fn supports_service_enumeration(&self) -> bool {
            self.services.is_some()
        }

        async fn services(&self, _device: &DeviceInfo) -> Result<Vec<Uuid>> {
            Ok(self.services.clone().unwrap_or_default())
        }

        async fn open(
            &self,
            device: &DeviceInfo,
            service: Uuid,
        ) -> Result<Box<dyn TransportEndpoint>> {
            self.opened.lock().push((device.address.clone(), service));
            let (endpoint, peer) = MemoryEndpoint::pair(device.address.clone());
            self.peers.lock().push(peer);
            Ok(Box::new(endpoint))
        }
    }

    fn target(raw: &str) -> TargetId {
        TargetId::parse(raw).unwrap()
    }

    #[tokio::test]
    async fn test_paired_device_skips_scan() {
        let scanner = FakeScanner {
            available: true,
            paired: vec![DeviceInfo::new("AA:BB:CC:DD:EE:FF", Some("HUD")).paired()],
            ..Default::default()
        };
        let discovery = ScanDiscovery::new(scanner);

        let endpoint = discovery
            .resolve(&target("aa:bb:cc:dd:ee:ff"), Duration::from_secs(1))
            .await
            .unwrap();

        assert_eq!(endpoint.peer(), "AA:BB:CC:DD:EE:FF");
        assert_eq!(discovery.scanner().scans.load(Ordering::SeqCst), 0);
        assert_eq!(
            discovery.scanner().opened.lock().as_slice(),
            &[("AA:BB:CC:DD:EE:FF".to_string(), SPP_SERVICE_UUID)]
        );
    }

    #[tokio::test]
    async fn test_scan_finds_by_name() {
        let scanner = FakeScanner {
            available: true,
            sightings: vec![
                DeviceInfo::new("00:00:00:00:00:01", Some("Phone")),
                DeviceInfo::new("00:00:00:00:00:02", None),
                DeviceInfo::new("00:00:00:00:00:03", Some("HUD")),
            ],
            ..Default::default()
        };
        let discovery = ScanDiscovery::new(scanner);

        let endpoint = discovery
            .resolve(&target("HUD"), Duration::from_secs(1))
            .await
            .unwrap();
        assert_eq!(endpoint.peer(), "00:00:00:00:00:03");
    }

    #[tokio::test]
    async fn test_scan_without_match_fails() {
        let scanner = FakeScanner {
            available: true,
            sightings: vec![DeviceInfo::new("00:00:00:00:00:01", Some("Phone"))],
            ..Default::default()
        };
        let discovery = ScanDiscovery::new(scanner);

        let err = discovery
            .resolve(&target("HUD"), Duration::from_secs(1))
            .await
            .err()
            .unwrap();
        assert!(matches!(err, Error::Discovery { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_hanging_scan_times_out() {
        let scanner = FakeScanner {
            available: true,
            hang_scan: true,
            ..Default::default()
        };
        let discovery = ScanDiscovery::new(scanner);

        let err = discovery
            .resolve(&target("HUD"), Duration::from_millis(500))
            .await
            .err()
            .unwrap();
        assert!(err.to_string().contains("not found within 500ms"));
    }

    #[tokio::test]
    async fn test_missing_service_rejected() {
        let scanner = FakeScanner {
            available: true,
            paired: vec![DeviceInfo::new("AA:BB:CC:DD:EE:FF", Some("HUD")).paired()],
            services: Some(vec![Uuid::from_u128(0x1234)]),
            ..Default::default()
        };
        let discovery = ScanDiscovery::new(scanner);
        assert!(discovery.supports_service_enumeration());

        let err = discovery
            .resolve(&target("HUD"), Duration::from_secs(1))
            .await
            .err()
            .unwrap();
        assert!(err.to_string().contains("does not offer service"));
        assert!(discovery.scanner().opened.lock().is_empty());
    }

    #[tokio::test]
    async fn test_custom_service_is_opened() {
        let custom = Uuid::from_u128(0xfeed);
        let scanner = FakeScanner {
            available: true,
            paired: vec![DeviceInfo::new("AA:BB:CC:DD:EE:FF", Some("HUD")).paired()],
            services: Some(vec![SPP_SERVICE_UUID, custom]),
            ..Default::default()
        };
        let discovery = ScanDiscovery::new(scanner).with_service(custom);

        discovery
            .resolve(&target("HUD"), Duration::from_secs(1))
            .await
            .unwrap();
        assert_eq!(discovery.scanner().opened.lock()[0].1, custom);
    }

    #[test]
    fn test_adapter_availability_follows_scanner() {
        let discovery = ScanDiscovery::new(FakeScanner::default());
        assert!(!discovery.adapter_available());
        assert_eq!(
            SPP_SERVICE_UUID.to_string(),
            "00001101-0000-1000-8000-00805f9b34fb"
        );
    }
}
